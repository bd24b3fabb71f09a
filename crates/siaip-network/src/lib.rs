//! Network layer of the SIA-IP event receiver
//!
//! # Components
//!
//! - **TcpServer**: accepts panel connections, one handler task per socket
//! - **ConnectionHandler**: chunk loop turning frames into ACK / NAK / silence
//! - **PanelClient**: panel emulator used by the `send` command and tests
//!
//! # Example
//!
//! ```no_run
//! use siaip_network::{PanelClient, PanelClientConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PanelClientConfig {
//!     server_addr: "127.0.0.1:7000".parse()?,
//!     timeout: Duration::from_millis(3000),
//! };
//!
//! let mut client = PanelClient::new(config);
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod handler;
mod server;

pub use client::{PanelClient, PanelClientConfig, PanelClientError};
pub use handler::ConnectionHandler;
pub use server::{ReceiverContext, TcpServer, TcpServerConfig, TcpServerError};
