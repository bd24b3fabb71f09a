//! `serve`: run the receiver until Ctrl-C.

use anyhow::{Context, Result};
use clap::Args;
use siaip_core::{Blacklist, CodeCatalog, ReceiverConfig, SinkSettings};
use siaip_network::{ReceiverContext, TcpServer, TcpServerConfig};
use siaip_protocol::{CipherKind, FrameProcessor};
use siaip_storage::Dispatcher;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Listening port, overrides the configuration
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Also print every accepted event
    #[arg(short, long)]
    pub debug: bool,
}

/// Apply command-line overrides to the loaded configuration.
fn apply_overrides(config: &mut ReceiverConfig, args: &ServeArgs) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.debug {
        let mut diagnostic = SinkSettings::of_kind("diagnostic");
        diagnostic.format = Some("human".to_string());
        config.sinks.push(diagnostic);
    }
}

/// Load the code catalog; a missing file means an empty catalog.
fn load_catalog(path: &Path) -> Result<CodeCatalog> {
    if !path.exists() {
        warn!(path = %path.display(), "code catalog not found, no code carries a zone address");
        return Ok(CodeCatalog::default());
    }
    CodeCatalog::load(path)
        .with_context(|| format!("failed to load code catalog from {}", path.display()))
}

/// Load the blacklist; a missing file means nothing is blacklisted.
fn load_blacklist(path: &Path) -> Result<Blacklist> {
    if !path.exists() {
        warn!(path = %path.display(), "blacklist not found, accepting all accounts");
        return Ok(Blacklist::default());
    }
    Blacklist::load(path).with_context(|| format!("failed to load blacklist from {}", path.display()))
}

pub async fn run(
    mut config: ReceiverConfig,
    codes: &Path,
    blacklist: &Path,
    args: ServeArgs,
) -> Result<()> {
    apply_overrides(&mut config, &args);

    if let Err(e) = CipherKind::select(config.server.key_bytes().len()) {
        warn!(error = %e, "every frame will fail to decrypt");
    }

    let catalog = Arc::new(load_catalog(codes)?);
    let blacklist = Arc::new(load_blacklist(blacklist)?);
    info!(codes = catalog.len(), blacklisted = blacklist.len(), "lookup tables loaded");

    let origin = config.instance_tag();
    let dispatcher = Dispatcher::from_settings(&config.sinks, &origin)
        .await
        .context("failed to set up dispatch sinks")?;
    if dispatcher.is_empty() {
        warn!("no sinks configured, accepted events are discarded");
    }

    let processor = FrameProcessor::from_settings(&config.server, catalog, blacklist);
    let server = TcpServer::bind(
        TcpServerConfig::from_settings(&config.server),
        ReceiverContext::new(processor, dispatcher),
    )
    .await?;

    info!(
        version = siaip_core::VERSION,
        origin = %origin,
        addr = %server.local_addr()?,
        drift = ?config.server.drift,
        "receiver started"
    );
    server.run_until(shutdown_signal()).await?;
    info!("receiver stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config() -> ReceiverConfig {
        ReceiverConfig::from_yaml_str("server:\n  port: 7000\n  key: \"0123456789abcdef\"\n").unwrap()
    }

    #[test]
    fn test_port_override_changes_instance_tag() {
        let mut config = config();
        apply_overrides(
            &mut config,
            &ServeArgs {
                port: Some(7100),
                debug: false,
            },
        );
        assert_eq!(config.server.port, 7100);
        assert_eq!(config.instance_tag(), "SiaIP_7100");
        assert!(config.sinks.is_empty());
    }

    #[test]
    fn test_debug_adds_diagnostic_sink() {
        let mut config = config();
        apply_overrides(
            &mut config,
            &ServeArgs {
                port: None,
                debug: true,
            },
        );
        assert_eq!(config.sinks.len(), 1);
        assert_eq!(config.sinks[0].kind, "diagnostic");
        assert_eq!(config.sinks[0].format.as_deref(), Some("human"));
    }

    #[test]
    fn test_missing_tables_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_catalog(&dir.path().join("codes.yml")).unwrap().is_empty());
        assert!(load_blacklist(&dir.path().join("blacklist.yml")).unwrap().is_empty());
    }

    #[test]
    fn test_load_tables_from_files() {
        let mut codes = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(codes, "codes:\n  - code: BA\n    address: zone").unwrap();
        let mut blacklist = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(blacklist, "codes:\n  - code: \"9999\"").unwrap();

        assert!(load_catalog(codes.path()).unwrap().is_zone("BA"));
        assert!(load_blacklist(blacklist.path()).unwrap().contains("9999"));
    }

    #[test]
    fn test_malformed_table_is_an_error() {
        let mut codes = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(codes, "codes: [[[").unwrap();
        assert!(load_catalog(codes.path()).is_err());
    }
}
