//! TCP listener accepting panel connections.
//!
//! Each accepted socket gets its own task running a [`ConnectionHandler`].
//! Connections share nothing but the read-only [`ReceiverContext`].
//!
//! # Architecture
//!
//! ```text
//! Panel A ┐
//!         │
//! Panel B ├──> TcpServer ──> ConnectionHandler (one task per socket)
//!         │                        │
//! Panel C ┘                        ├──> FrameProcessor ──> ACK / NAK
//!                                  └──> Dispatcher ──> sinks (own tasks)
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use siaip_network::{ReceiverContext, TcpServer, TcpServerConfig};
//! use siaip_core::{Blacklist, CodeCatalog, ServerSettings};
//! use siaip_protocol::FrameProcessor;
//! use siaip_storage::Dispatcher;
//! use std::sync::Arc;
//!
//! # async fn example(settings: ServerSettings) -> Result<(), Box<dyn std::error::Error>> {
//! let processor = FrameProcessor::from_settings(
//!     &settings,
//!     Arc::new(CodeCatalog::default()),
//!     Arc::new(Blacklist::default()),
//! );
//! let context = ReceiverContext::new(processor, Dispatcher::new());
//!
//! let server = TcpServer::bind(TcpServerConfig::from_settings(&settings), context).await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Connection limit
//!
//! The server holds `max_connections` semaphore permits. A socket accepted
//! while none is free is closed immediately; panels retry on their own.

use crate::handler::ConnectionHandler;
use siaip_core::ServerSettings;
use siaip_core::constants::{DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT};
use siaip_protocol::FrameProcessor;
use siaip_storage::Dispatcher;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Back-off after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for the TCP server
///
/// # Example
///
/// ```
/// use siaip_network::TcpServerConfig;
///
/// let config = TcpServerConfig {
///     bind_addr: "0.0.0.0:7000".parse().unwrap(),
///     max_connections: 100,
///     max_frame_size: 64 * 1024,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct TcpServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,

    /// Maximum number of simultaneous connections
    pub max_connections: usize,

    /// Largest accepted chunk in bytes; larger ones close the connection
    pub max_frame_size: usize,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl TcpServerConfig {
    /// Listen on all interfaces at the configured port.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, settings.port)),
            max_connections: settings.max_connections,
            ..Self::default()
        }
    }
}

/// Errors that can occur during TCP server operations
#[derive(Debug, Error)]
pub enum TcpServerError {
    /// Failed to bind to address
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A configuration value cannot be used
    #[error("Invalid server configuration: {0}")]
    InvalidConfig(String),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-only state shared by every connection.
#[derive(Debug)]
pub struct ReceiverContext {
    pub processor: FrameProcessor,
    pub dispatcher: Dispatcher,
}

impl ReceiverContext {
    pub fn new(processor: FrameProcessor, dispatcher: Dispatcher) -> Arc<Self> {
        Arc::new(Self {
            processor,
            dispatcher,
        })
    }
}

/// TCP server for SIA-IP panels
pub struct TcpServer {
    /// TCP listener for accepting new connections
    listener: TcpListener,

    /// Connection slots; one permit per live connection
    permits: Arc<Semaphore>,

    context: Arc<ReceiverContext>,

    config: TcpServerConfig,
}

impl TcpServer {
    /// Bind the server to the configured address
    ///
    /// Binding to port `0` picks a free port; see [`TcpServer::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Address is already in use
    /// - Permission denied (e.g., binding to privileged port)
    /// - `max_connections` is zero
    pub async fn bind(
        config: TcpServerConfig,
        context: Arc<ReceiverContext>,
    ) -> Result<Self, TcpServerError> {
        if config.max_connections == 0 {
            return Err(TcpServerError::InvalidConfig(
                "max_connections must be at least 1".to_string(),
            ));
        }

        info!("Binding TCP server to {}", config.bind_addr);
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| TcpServerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;

        info!(
            "TCP server listening on {} (max {} connections)",
            listener.local_addr()?,
            config.max_connections
        );

        Ok(Self {
            listener,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            context,
            config,
        })
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr, TcpServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &TcpServerConfig {
        &self.config
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.config.max_connections - self.permits.available_permits()
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<(), TcpServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), TcpServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        debug!("Accepted new connection from {}", peer);

        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            warn!(
                %peer,
                max_connections = self.config.max_connections,
                "Connection rejected: maximum connections reached"
            );
            drop(stream);
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let handler = ConnectionHandler::new(
            stream,
            peer,
            Arc::clone(&self.context),
            self.config.max_frame_size,
        );
        tokio::spawn(async move {
            handler.run().await;
            drop(permit);
        });
    }
}
