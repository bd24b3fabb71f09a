use crate::error::{StorageError, StorageResult};
use siaip_core::SinkSettings;
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const SQLITE_SCHEME: &str = "sqlite:";
const MEMORY_URL: &str = "sqlite::memory:";

/// Database connection configuration for SQLite
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL, e.g. `sqlite://events.db` or `sqlite::memory:`
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of idle connections to maintain
    pub min_connections: u32,

    /// Maximum lifetime of a connection before it's closed
    pub max_lifetime: Duration,

    /// Timeout for acquiring a connection from the pool
    pub acquire_timeout: Duration,

    /// Whether to create the database file if it doesn't exist
    pub create_if_missing: bool,

    /// Whether to run migrations on connection
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://events.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            max_lifetime: Duration::from_secs(1800), // 30 minutes
            acquire_timeout: Duration::from_secs(30),
            create_if_missing: true,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration for the given URL or file path
    pub fn new(database_url: impl Into<String>) -> Self {
        let url = database_url.into();
        let database_url = if url.starts_with(SQLITE_SCHEME) {
            url
        } else {
            format!("sqlite://{url}")
        };
        Self {
            database_url,
            ..Default::default()
        }
    }

    /// Configuration for a `storage` sink entry.
    ///
    /// # Errors
    /// Returns `StorageError::Configuration` if the sink has no `database_url`.
    pub fn from_sink(settings: &SinkSettings) -> StorageResult<Self> {
        let url = settings.database_url.as_deref().ok_or_else(|| {
            StorageError::Configuration(format!(
                "sink '{}' requires a database_url",
                settings.kind
            ))
        })?;

        let mut config = Self::new(url);
        if let Some(max) = settings.max_connections {
            config.max_connections = max;
        }
        Ok(config)
    }

    /// Set the maximum number of connections in the pool
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the minimum number of idle connections
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Set whether to create the database if it doesn't exist
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Set whether to run migrations automatically
    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }

    /// Returns `true` for in-memory databases, which live in a single connection.
    pub fn is_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    fn file_path(&self) -> Option<&Path> {
        if self.is_memory() {
            return None;
        }
        let path = self
            .database_url
            .trim_start_matches(SQLITE_SCHEME)
            .trim_start_matches("//");
        let path = path.split('?').next().unwrap_or(path);
        (!path.is_empty()).then(|| Path::new(path))
    }
}

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection pool with the given configuration
    ///
    /// # Example
    ///
    /// ```no_run
    /// use siaip_storage::connection::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = DatabaseConfig::new("sqlite://events.db")
    ///     .max_connections(5)
    ///     .auto_migrate(true);
    ///
    /// let db = Database::new(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config.file_path().and_then(Path::parent)
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!("Failed to create database directory: {}", e))
            })?;
        }

        let memory = config.is_memory();
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| StorageError::Configuration(format!("Invalid database URL: {}", e)))?
            .create_if_missing(config.create_if_missing)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10))
            .disable_statement_logging();
        let options = if memory {
            options
        } else {
            options
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        };

        // Every connection to `:memory:` is a distinct database
        let pool_options = if memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .min_connections(config.min_connections.min(config.max_connections))
                .max_lifetime(Some(config.max_lifetime))
        };

        let pool = pool_options
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        let db = Self { pool };

        if config.auto_migrate {
            db.migrate().await?;
        }

        Ok(db)
    }

    /// Create a migrated in-memory database (primarily for testing)
    pub async fn in_memory() -> StorageResult<Self> {
        Self::new(DatabaseConfig::new(MEMORY_URL)).await
    }

    /// Run database migrations
    ///
    /// The migration set is embedded at compile time from the workspace
    /// `migrations/` directory.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
