//! Storage layer of the SIA-IP event receiver.
//!
//! Accepted events leave the reply path through the [`Dispatcher`], which
//! hands each one to every configured sink on its own task. The storage
//! sink runs the [`CorrelationPipeline`]: insert the event, then backfill
//! the signal type, system and zone ids from the lookup catalogs.
//!
//! # Components
//!
//! - [`Database`] - SQLite pool with embedded migrations
//! - [`EventStore`] - select / insert / conditional update, the only
//!   operations the pipeline needs; [`SqliteEventStore`] implements it
//! - [`CorrelationPipeline`] - insert plus three independent backfill stages
//! - [`Dispatcher`] - fan-out to [`StorageSink`] and [`DiagnosticSink`]
//!
//! # Concurrency
//!
//! There is no in-process write lock. Every backfill is a single
//! `UPDATE ... WHERE id IS NULL AND ...`, so concurrent events racing on the
//! same record cannot lose each other's updates.
//!
//! # Example
//!
//! ```no_run
//! use siaip_storage::Dispatcher;
//! use siaip_core::SinkSettings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut storage = SinkSettings::of_kind("storage");
//! storage.database_url = Some("sqlite://events.db".to_string());
//!
//! let dispatcher = Dispatcher::from_settings(&[storage], "SiaIP_7000").await?;
//! assert_eq!(dispatcher.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod store;

pub use connection::{Database, DatabaseConfig};
pub use dispatcher::{
    DiagnosticFormat, DiagnosticSink, Dispatcher, EventSink, SinkKind, StorageSink,
};
pub use error::{StorageError, StorageResult};
pub use models::{EventReception, NewEventReception, SignalType, System, Zone};
pub use pipeline::{CorrelationOutcome, CorrelationPipeline};
pub use store::{Condition, EventStore, Fields, Row, SqliteEventStore, Value};
