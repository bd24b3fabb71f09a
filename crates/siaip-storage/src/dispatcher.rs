//! Fan-out of accepted events to the configured sinks.
//!
//! Each sink runs on its own spawned task. The connection handler calls
//! [`Dispatcher::dispatch`] and writes its reply without awaiting the
//! returned handles, so a slow sink never delays an ACK. A panicking sink is
//! caught and logged inside its own task.

use crate::connection::{Database, DatabaseConfig};
use crate::error::{StorageError, StorageResult};
use crate::pipeline::CorrelationPipeline;
use crate::store::{EventStore, SqliteEventStore};
use futures::FutureExt;
use futures::future::BoxFuture;
use siaip_core::constants::DIAGNOSTIC_LOG_TARGET;
use siaip_core::{DecodedEvent, SinkSettings};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Buffered events per diagnostic subscriber before it starts lagging.
const DIAGNOSTIC_CHANNEL_CAPACITY: usize = 256;

/// Sink kinds accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// `storage`, `mysql` or `sqlite`
    Storage,
    /// `diagnostic` or `console`
    Diagnostic,
}

impl FromStr for SinkKind {
    type Err = StorageError;

    fn from_str(kind: &str) -> StorageResult<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "storage" | "mysql" | "sqlite" => Ok(SinkKind::Storage),
            "diagnostic" | "console" => Ok(SinkKind::Diagnostic),
            other => Err(StorageError::Configuration(format!(
                "unknown sink kind '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SinkKind::Storage => write!(f, "storage"),
            SinkKind::Diagnostic => write!(f, "diagnostic"),
        }
    }
}

/// A destination for accepted events.
///
/// `deliver` must absorb its own errors; there is nobody to return them to.
pub trait EventSink: Send + Sync + 'static {
    fn kind(&self) -> SinkKind;

    fn deliver(&self, event: Arc<DecodedEvent>) -> BoxFuture<'_, ()>;
}

/// Runs the correlation pipeline for every event.
#[derive(Debug, Clone)]
pub struct StorageSink<S = SqliteEventStore> {
    pipeline: CorrelationPipeline<S>,
}

impl<S: EventStore> StorageSink<S> {
    pub fn new(pipeline: CorrelationPipeline<S>) -> Self {
        Self { pipeline }
    }
}

impl StorageSink<SqliteEventStore> {
    /// Open (and migrate) the sink's database.
    ///
    /// # Errors
    /// Returns `StorageError::Configuration` without a `database_url`, or the
    /// connection/migration error.
    pub async fn connect(settings: &SinkSettings, origin: &str) -> StorageResult<Self> {
        let config = DatabaseConfig::from_sink(settings)?;
        info!(url = %config.database_url, origin, "opening storage sink");

        let database = Database::new(config).await?;
        let store = Arc::new(SqliteEventStore::new(database.pool().clone()));
        Ok(Self::new(CorrelationPipeline::new(store, origin)))
    }
}

impl<S: EventStore + 'static> EventSink for StorageSink<S> {
    fn kind(&self) -> SinkKind {
        SinkKind::Storage
    }

    fn deliver(&self, event: Arc<DecodedEvent>) -> BoxFuture<'_, ()> {
        async move {
            let outcome = self.pipeline.correlate(&event).await;
            debug!(
                account = %event.account,
                record_id = ?outcome.record_id,
                signal_type_id = ?outcome.signal_type_id,
                system_id = ?outcome.system_id,
                zone_id = ?outcome.zone_id,
                "event correlated"
            );
        }
        .boxed()
    }
}

/// Output format of the diagnostic sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiagnosticFormat {
    /// Pretty `Debug` output
    #[default]
    Human,
    /// One JSON object per event
    Json,
}

impl DiagnosticFormat {
    /// Format named in sink settings; unknown names fall back to `Human`.
    pub fn from_settings(settings: &SinkSettings) -> Self {
        match settings.format.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("human") => DiagnosticFormat::Human,
            Some("json") => DiagnosticFormat::Json,
            Some(other) => {
                warn!(format = other, "unknown diagnostic format, using human");
                DiagnosticFormat::Human
            }
        }
    }
}

/// Logs each event and republishes it to in-process subscribers.
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    format: DiagnosticFormat,
    events: broadcast::Sender<Arc<DecodedEvent>>,
}

impl DiagnosticSink {
    pub fn new(format: DiagnosticFormat) -> Self {
        let (events, _) = broadcast::channel(DIAGNOSTIC_CHANNEL_CAPACITY);
        Self { format, events }
    }

    pub fn from_settings(settings: &SinkSettings) -> Self {
        Self::new(DiagnosticFormat::from_settings(settings))
    }

    pub fn format(&self) -> DiagnosticFormat {
        self.format
    }

    /// Receive every event delivered after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DecodedEvent>> {
        self.events.subscribe()
    }

    /// Render an event in this sink's format.
    pub fn render(&self, event: &DecodedEvent) -> StorageResult<String> {
        match self.format {
            DiagnosticFormat::Human => Ok(format!("{event:#?}")),
            DiagnosticFormat::Json => Ok(serde_json::to_string(event)?),
        }
    }

    fn record(&self, event: Arc<DecodedEvent>) {
        match self.render(&event) {
            Ok(text) => info!(target: DIAGNOSTIC_LOG_TARGET, "{text}"),
            Err(e) => warn!(account = %event.account, error = %e, "diagnostic render failed"),
        }
        // No subscribers is the normal case
        let _ = self.events.send(event);
    }
}

impl EventSink for DiagnosticSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Diagnostic
    }

    fn deliver(&self, event: Arc<DecodedEvent>) -> BoxFuture<'_, ()> {
        self.record(event);
        futures::future::ready(()).boxed()
    }
}

/// Ordered set of sinks receiving every accepted event.
#[derive(Clone, Default)]
pub struct Dispatcher {
    sinks: Vec<Arc<dyn EventSink>>,
    diagnostic: Option<DiagnosticSink>,
}

impl Dispatcher {
    /// Dispatcher with no sinks; events are dropped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured sink in order.
    ///
    /// Unknown kinds are logged and skipped. Storage sinks open their
    /// database here, so a bad URL fails startup.
    pub async fn from_settings(settings: &[SinkSettings], origin: &str) -> StorageResult<Self> {
        let mut dispatcher = Self::new();
        for sink in settings {
            match sink.kind.parse::<SinkKind>() {
                Ok(SinkKind::Storage) => {
                    dispatcher = dispatcher.with_sink(StorageSink::connect(sink, origin).await?);
                }
                Ok(SinkKind::Diagnostic) => {
                    dispatcher = dispatcher.with_diagnostic(DiagnosticSink::from_settings(sink));
                }
                Err(_) => warn!(kind = %sink.kind, "unknown sink kind, skipping"),
            }
        }

        info!(sinks = dispatcher.len(), "dispatcher ready");
        Ok(dispatcher)
    }

    /// Append a sink.
    pub fn with_sink(mut self, sink: impl EventSink) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Append a diagnostic sink; the first one also backs [`Dispatcher::subscribe`].
    pub fn with_diagnostic(mut self, sink: DiagnosticSink) -> Self {
        if self.diagnostic.is_none() {
            self.diagnostic = Some(sink.clone());
        }
        self.with_sink(sink)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Kinds of the configured sinks, in order.
    pub fn kinds(&self) -> Vec<SinkKind> {
        self.sinks.iter().map(|sink| sink.kind()).collect()
    }

    /// Subscribe to the first diagnostic sink, if one is configured.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Arc<DecodedEvent>>> {
        self.diagnostic.as_ref().map(DiagnosticSink::subscribe)
    }

    /// Hand `event` to every sink on its own task.
    ///
    /// Must be called from within a Tokio runtime. The handles only exist
    /// so callers (tests, shutdown) can wait for delivery.
    pub fn dispatch(&self, event: DecodedEvent) -> Vec<JoinHandle<()>> {
        let event = Arc::new(event);
        self.sinks
            .iter()
            .map(|sink| {
                let sink = Arc::clone(sink);
                let event = Arc::clone(&event);
                tokio::spawn(async move {
                    let kind = sink.kind();
                    let account = event.account.clone();
                    if AssertUnwindSafe(sink.deliver(event))
                        .catch_unwind()
                        .await
                        .is_err()
                    {
                        error!(sink = %kind, account = %account, "sink panicked");
                    }
                })
            })
            .collect()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sinks", &self.kinds())
            .finish()
    }
}
