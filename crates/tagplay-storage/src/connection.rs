use crate::error::{StorageError, StorageResult};
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Path value that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Database connection configuration for SQLite
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub database_path: String,

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
            database_path: "rfid_audio.db".to_string(),
            max_connections: 4,
            min_connections: 1,
            max_lifetime: Duration::from_secs(1800), // 30 minutes
            acquire_timeout: Duration::from_secs(30),
            create_if_missing: true,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration with the given path
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Build a configuration from a `DATABASE_URL` value.
    ///
    /// Accepted forms:
    ///
    /// | Value                   | Database file      |
    /// |-------------------------|--------------------|
    /// | `sqlite:////var/x.db`   | `/var/x.db`        |
    /// | `sqlite:///x.db`        | `x.db` (relative)  |
    /// | `sqlite://x.db`         | `x.db`             |
    /// | `sqlite:x.db`           | `x.db`             |
    /// | `x.db`, `/var/x.db`     | as given           |
    /// | `sqlite::memory:`       | in-memory          |
    ///
    /// The three-slash form is relative, so `.env` files written for the
    /// Python player keep pointing at the same file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Configuration` for an empty path or a URL with a
    /// scheme other than `sqlite`.
    ///
    /// # Example
    ///
    /// ```
    /// use tagplay_storage::connection::DatabaseConfig;
    ///
    /// let config = DatabaseConfig::from_url("sqlite:////var/lib/tagplay/tags.db").unwrap();
    /// assert_eq!(config.database_path, "/var/lib/tagplay/tags.db");
    ///
    /// let config = DatabaseConfig::from_url("sqlite:///rfid_audio.db").unwrap();
    /// assert_eq!(config.database_path, "rfid_audio.db");
    /// ```
    pub fn from_url(url: &str) -> StorageResult<Self> {
        let url = url.trim();

        let path = match url.strip_prefix("sqlite:") {
            Some(rest) => match rest.strip_prefix("//") {
                Some(rest) => rest.strip_prefix('/').unwrap_or(rest),
                None => rest,
            },
            None if url.contains("://") => {
                return Err(StorageError::Configuration(format!(
                    "Unsupported database URL {url:?}: only sqlite is supported"
                )));
            }
            None => url,
        };

        // Drop query parameters such as `?mode=rwc`; options are set in code.
        let path = path.split('?').next().unwrap_or_default().trim();

        if path.is_empty() {
            return Err(StorageError::Configuration(format!(
                "Database URL {url:?} does not name a file"
            )));
        }

        Ok(Self::new(path))
    }

    /// Whether this configuration selects an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.database_path == IN_MEMORY_PATH
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
    /// use tagplay_storage::connection::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = DatabaseConfig::from_url("sqlite:///rfid_audio.db")?
    ///     .max_connections(4)
    ///     .auto_migrate(true);
    ///
    /// let db = Database::new(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        if config.is_in_memory() {
            return Self::in_memory().await;
        }

        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(&config.database_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Configuration(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.database_path))
            .map_err(|e| StorageError::Configuration(format!("Invalid database path: {}", e)))?
            .create_if_missing(config.create_if_missing)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(Some(config.max_lifetime))
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        info!("Opened mapping database at {}", config.database_path);
        let db = Self { pool };

        if config.auto_migrate {
            db.migrate().await?;
        }

        Ok(db)
    }

    /// Create an in-memory database (primarily for testing)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tagplay_storage::connection::Database;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::in_memory().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1) // In-memory databases should use single connection
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Executes the SQL files in the workspace `migrations/` directory. The
    /// files are embedded at compile time by `sqlx::migrate!`, so the binary
    /// does not need them at runtime.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail to execute.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        debug!("Database migrations applied");
        Ok(())
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool
    ///
    /// This will wait for all active connections to be returned to the pool
    /// before closing them.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_database_config_builder() {
        let config = DatabaseConfig::new("test.db")
            .max_connections(5)
            .min_connections(1)
            .create_if_missing(false)
            .auto_migrate(false);

        assert_eq!(config.database_path, "test.db");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.min_connections, 1);
        assert!(!config.create_if_missing);
        assert!(!config.auto_migrate);
    }

    #[test]
    fn test_database_config_defaults() {
        let config = DatabaseConfig::default();

        assert_eq!(config.database_path, "rfid_audio.db");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.max_lifetime, Duration::from_secs(1800));
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert!(config.create_if_missing);
        assert!(config.auto_migrate);
    }

    #[rstest]
    #[case("sqlite:////var/lib/tagplay/tags.db", "/var/lib/tagplay/tags.db")]
    #[case("sqlite:///rfid_audio.db", "rfid_audio.db")]
    #[case("sqlite://rfid_audio.db", "rfid_audio.db")]
    #[case("sqlite:data/rfid_audio.db", "data/rfid_audio.db")]
    #[case("/mnt/usb/tags.db", "/mnt/usb/tags.db")]
    #[case("  tags.db  ", "tags.db")]
    #[case("sqlite://tags.db?mode=rwc", "tags.db")]
    #[case("sqlite::memory:", ":memory:")]
    fn test_from_url(#[case] url: &str, #[case] expected: &str) {
        let config = DatabaseConfig::from_url(url).unwrap();
        assert_eq!(config.database_path, expected);
    }

    #[rstest]
    #[case("")]
    #[case("sqlite://")]
    #[case("sqlite:///")]
    #[case("postgres://localhost/tags")]
    fn test_from_url_rejected(#[case] url: &str) {
        let result = DatabaseConfig::from_url(url);
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }

    #[test]
    fn test_in_memory_detection() {
        assert!(DatabaseConfig::from_url("sqlite::memory:").unwrap().is_in_memory());
        assert!(!DatabaseConfig::new("tags.db").is_in_memory());
    }
}
