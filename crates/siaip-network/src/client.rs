//! Panel emulator client.
//!
//! Connects to a receiver, sends encrypted frames built with
//! [`PanelFrame`] and reads back the verified ACK/NAK. Used by the `send`
//! command and by the end-to-end tests.
//!
//! # Example Usage
//!
//! ```no_run
//! use siaip_network::{PanelClient, PanelClientConfig};
//! use siaip_protocol::PanelFrame;
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
//!
//! let frame = PanelFrame::new("1234").signal("NBA012");
//! let reply = client.exchange(&frame, b"0123456789abcdef").await?;
//! println!("Received: {}", reply.body());
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Timeout Handling
//!
//! Connect, send and receive each have the configured timeout (default
//! 3000ms). A blacklisted or undecryptable frame gets no reply at all, so
//! a receive timeout is an expected outcome for those.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use siaip_protocol::{PanelFrame, ResponseFrame, SiaCodec};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

/// Configuration for the panel client
///
/// # Example
///
/// ```
/// use siaip_network::PanelClientConfig;
/// use std::time::Duration;
///
/// let config = PanelClientConfig {
///     server_addr: "127.0.0.1:7000".parse().unwrap(),
///     timeout: Duration::from_millis(5000),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct PanelClientConfig {
    /// Receiver address to connect to
    pub server_addr: SocketAddr,

    /// Timeout for all I/O operations (connect, send, recv)
    pub timeout: Duration,
}

impl Default for PanelClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], siaip_core::constants::DEFAULT_PORT)),
            timeout: Duration::from_millis(3000),
        }
    }
}

/// Errors that can occur during panel client operations
#[derive(Debug, Error)]
pub enum PanelClientError {
    /// Client is not connected to a receiver
    #[error("Not connected to receiver")]
    NotConnected,

    /// Connection attempt timed out
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// No reply within the timeout
    #[error("Read timeout after {0}ms")]
    ReadTimeout(u64),

    /// Write operation timed out
    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    /// Connection was lost during operation
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Frame building, framing or reply verification failed
    #[error("Protocol error: {0}")]
    Protocol(#[from] siaip_core::Error),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// TCP client acting as an alarm panel
pub struct PanelClient {
    server_addr: SocketAddr,

    /// Framed stream (None if not connected)
    framed: Option<Framed<TcpStream, SiaCodec>>,

    timeout: Duration,
}

impl PanelClient {
    /// Create a client; call [`PanelClient::connect`] before sending.
    ///
    /// # Example
    ///
    /// ```
    /// use siaip_network::{PanelClient, PanelClientConfig};
    ///
    /// let client = PanelClient::new(PanelClientConfig::default());
    /// assert!(!client.is_connected());
    /// ```
    pub fn new(config: PanelClientConfig) -> Self {
        debug!("Creating panel client for receiver {}", config.server_addr);

        Self {
            server_addr: config.server_addr,
            framed: None,
            timeout: config.timeout,
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Connect to the receiver
    ///
    /// # Errors
    ///
    /// Returns `ConnectionTimeout` if the connect does not complete in
    /// time, or the I/O error if the receiver refuses the connection.
    pub async fn connect(&mut self) -> Result<(), PanelClientError> {
        info!("Connecting to receiver at {}", self.server_addr);

        let stream =
            match tokio::time::timeout(self.timeout, TcpStream::connect(self.server_addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    error!("Connection failed: {}", e);
                    return Err(e.into());
                }
                Err(_) => {
                    warn!("Connection timeout after {}ms", self.timeout_ms());
                    return Err(PanelClientError::ConnectionTimeout(self.timeout_ms()));
                }
            };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        self.framed = Some(Framed::new(stream, SiaCodec::new()));
        debug!("Client connected and ready");
        Ok(())
    }

    /// Send an already built wire frame unchanged
    pub async fn send_raw(&mut self, frame: impl Into<Bytes>) -> Result<(), PanelClientError> {
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms();
        let framed = self.framed.as_mut().ok_or(PanelClientError::NotConnected)?;
        let frame: Bytes = frame.into();
        trace!(len = frame.len(), "Sending frame to receiver");

        match tokio::time::timeout(timeout, framed.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Failed to send frame: {}", e);
                Err(e.into())
            }
            Err(_) => {
                warn!("Send timeout after {}ms", timeout_ms);
                Err(PanelClientError::WriteTimeout(timeout_ms))
            }
        }
    }

    /// Encrypt `frame` with `key` and send it
    pub async fn send(&mut self, frame: &PanelFrame, key: &[u8]) -> Result<(), PanelClientError> {
        let wire = frame.encode(key)?;
        self.send_raw(wire.into_bytes()).await
    }

    /// Wait for the next reply and verify its CRC and size
    pub async fn recv(&mut self) -> Result<ResponseFrame, PanelClientError> {
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms();
        let framed = self.framed.as_mut().ok_or(PanelClientError::NotConnected)?;

        match tokio::time::timeout(timeout, framed.next()).await {
            Ok(Some(Ok(chunk))) => {
                let reply = ResponseFrame::parse(&chunk)?;
                trace!(%reply, "Received reply");
                Ok(reply)
            }
            Ok(Some(Err(e))) => {
                error!("Failed to read reply: {}", e);
                Err(e.into())
            }
            Ok(None) => {
                warn!("Connection closed by receiver");
                Err(PanelClientError::ConnectionLost(
                    "Receiver closed connection".to_string(),
                ))
            }
            Err(_) => {
                debug!("No reply after {}ms", timeout_ms);
                Err(PanelClientError::ReadTimeout(timeout_ms))
            }
        }
    }

    /// Send `frame` and wait for its reply
    pub async fn exchange(
        &mut self,
        frame: &PanelFrame,
        key: &[u8],
    ) -> Result<ResponseFrame, PanelClientError> {
        self.send(frame, key).await?;
        self.recv().await
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Flush and shut down the connection; a no-op when not connected.
    pub async fn close(&mut self) -> Result<(), PanelClientError> {
        if let Some(mut framed) = self.framed.take() {
            info!("Closing connection to {}", self.server_addr);

            let grace = Duration::from_millis(500);
            if let Ok(Err(e)) = tokio::time::timeout(grace, SinkExt::<Bytes>::flush(&mut framed)).await {
                warn!("Error flushing during close: {}", e);
            }

            let mut stream = framed.into_inner();
            match tokio::time::timeout(grace, stream.shutdown()).await {
                Ok(Ok(())) => debug!("Shutdown completed successfully"),
                Ok(Err(e)) => warn!("Error during shutdown: {}", e),
                Err(_) => warn!("Shutdown timeout during close ({}ms)", grace.as_millis()),
            }
        }

        Ok(())
    }
}
