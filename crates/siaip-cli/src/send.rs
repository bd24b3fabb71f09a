//! `send`: act as a panel and print the receiver's reply.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Args;
use siaip_core::ReceiverConfig;
use siaip_network::{PanelClient, PanelClientConfig, PanelClientError};
use siaip_protocol::PanelFrame;

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Receiver address
    #[arg(long, default_value = "127.0.0.1:7000")]
    pub host: String,

    /// Account identifier sent in the id block
    #[arg(long)]
    pub account: String,

    /// Relevant-data block, e.g. `NBA012`
    #[arg(long)]
    pub signal: String,

    #[arg(long, default_value = "0001")]
    pub sequence: String,

    /// Seconds added to the panel clock
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub skew: i64,

    /// Reply timeout in milliseconds
    #[arg(long, default_value_t = 3000)]
    pub timeout_ms: u64,
}

impl SendArgs {
    fn frame(&self) -> PanelFrame {
        let panel_time = Utc::now() + Duration::seconds(self.skew);
        PanelFrame::new(&self.account)
            .sequence(&self.sequence)
            .signal(&self.signal)
            .timestamp(panel_time.naive_utc())
    }
}

pub async fn run(config: &ReceiverConfig, args: SendArgs) -> Result<()> {
    let server_addr = tokio::net::lookup_host(&args.host)
        .await
        .with_context(|| format!("cannot resolve {}", args.host))?
        .next()
        .with_context(|| format!("no address for {}", args.host))?;

    let mut client = PanelClient::new(PanelClientConfig {
        server_addr,
        timeout: std::time::Duration::from_millis(args.timeout_ms),
    });
    client.connect().await?;
    let result = client.exchange(&args.frame(), config.server.key_bytes()).await;
    client.close().await?;

    match result {
        Ok(reply) if reply.is_ack() => println!("ACK {}", reply.body()),
        Ok(reply) if reply.is_nak() => println!("NAK {}", reply.body()),
        Ok(reply) => println!("unexpected reply {}", reply.body()),
        Err(PanelClientError::ReadTimeout(ms)) => {
            println!("no reply within {ms}ms, frame dropped by the receiver");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
