use log::debug;
use serde::{Deserialize, Serialize};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqlitePool,
};
use std::{
    future::Future,
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
    time::Duration as StdDuration,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqliteMode {
    ReadWriteCreate, // rwc - Read + Write + Create if missing
    ReadWrite,       // rw  - Read + Write (must exist)
    ReadOnly,        // ro  - Read only (must exist)
    Memory,          // memory - In-memory database
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqliteCache {
    Shared,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalMode {
    Wal,
    Delete,
    Truncate,
    Persist,
    Memory,
    Off,
}

impl JournalMode {
    fn pragma(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Off => "OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SynchronousMode {
    Off,
    Normal,
    Full,
    Extra,
}

impl SynchronousMode {
    fn pragma(&self) -> &'static str {
        match self {
            SynchronousMode::Off => "OFF",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Full => "FULL",
            SynchronousMode::Extra => "EXTRA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempStore {
    Default,
    File,
    Memory,
}

impl TempStore {
    fn pragma(&self) -> &'static str {
        match self {
            TempStore::Default => "default",
            TempStore::File => "file",
            TempStore::Memory => "memory",
        }
    }
}

/// sqlite connection tuning, read straight from the `[db_settings.sqlite_config]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    pub mode: SqliteMode,
    pub cache: SqliteCache,
    pub busy_timeout_ms: u32,
    pub journal_mode: JournalMode,
    pub synchronous: SynchronousMode,
    pub cache_size: i32,
    pub foreign_keys: bool,
    pub wal_autocheckpoint: Option<u32>,
    pub temp_store: TempStore,
    pub mmap_size: Option<u64>,
    pub page_size: Option<u32>,
}

impl SqliteConfig {
    pub fn read_only() -> Self {
        Self {
            mode: SqliteMode::ReadOnly,
            synchronous: SynchronousMode::Off,
            foreign_keys: false,
            ..Default::default()
        }
    }

    pub fn testing() -> Self {
        Self {
            mode: SqliteMode::Memory,
            journal_mode: JournalMode::Memory,
            synchronous: SynchronousMode::Off,
            busy_timeout_ms: 1000,
            cache_size: 10000,
            wal_autocheckpoint: None,
            mmap_size: None,
            page_size: None,
            ..Default::default()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.mode == SqliteMode::Memory
    }

    pub fn build_connect_options(&self, database_path: &str) -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new();

        let options = match self.mode {
            SqliteMode::Memory => {
                // Read and write pools must land on the same in-memory database,
                // so the name is derived from the path instead of being random
                let mut hasher = DefaultHasher::new();
                database_path.hash(&mut hasher);
                let memory_uri = format!(
                    "file:memdb_{}?mode=memory&cache=shared",
                    hasher.finish()
                );
                options.filename(&memory_uri).shared_cache(true)
            }
            SqliteMode::ReadOnly => {
                return options
                    .filename(database_path)
                    .read_only(true)
                    .shared_cache(self.cache == SqliteCache::Shared)
                    .busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64));
            }
            SqliteMode::ReadWrite => options
                .filename(database_path)
                .read_only(false)
                .shared_cache(self.cache == SqliteCache::Shared),
            SqliteMode::ReadWriteCreate => options
                .filename(database_path)
                .read_only(false)
                .create_if_missing(true)
                .shared_cache(self.cache == SqliteCache::Shared),
        };

        let mut options = options
            .busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64))
            .pragma("journal_mode", self.journal_mode.pragma())
            .pragma("synchronous", self.synchronous.pragma())
            .pragma("cache_size", self.cache_size.to_string())
            .pragma("temp_store", self.temp_store.pragma())
            .foreign_keys(self.foreign_keys);

        if let Some(checkpoint) = self.wal_autocheckpoint {
            options = options.pragma("wal_autocheckpoint", checkpoint.to_string());
        }
        if let Some(mmap_size) = self.mmap_size {
            options = options.pragma("mmap_size", mmap_size.to_string());
        }
        if let Some(page_size) = self.page_size {
            options = options.pragma("page_size", page_size.to_string());
        }

        options
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            mode: SqliteMode::ReadWriteCreate,
            cache: SqliteCache::Shared,
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::Wal,
            synchronous: SynchronousMode::Normal,
            cache_size: 1000000,
            foreign_keys: true,
            wal_autocheckpoint: Some(1000),
            temp_store: TempStore::Memory,
            mmap_size: Some(268435456), // 256MB
            page_size: Some(4096),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub write_min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfig,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            read_max_connections: 12,
            read_min_connections: 2,
            write_max_connections: 5,
            write_min_connections: 1,
            idle_timeout_secs: 600,
            acquire_timeout_secs: 15,
            sqlite_config: SqliteConfig::default(),
        }
    }
}

impl DatabasePoolConfig {
    pub fn testing() -> Self {
        Self {
            read_max_connections: 2,
            write_max_connections: 1,
            acquire_timeout_secs: 5,
            sqlite_config: SqliteConfig::testing(),
            ..Default::default()
        }
    }

    fn pool_options(&self, max_connections: u32, min_connections: u32) -> SqlitePoolOptions {
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections.min(max_connections))
            .acquire_timeout(StdDuration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(StdDuration::from_secs(self.idle_timeout_secs))
    }
}

impl From<crate::config::DBSettings> for DatabasePoolConfig {
    fn from(config: crate::config::DBSettings) -> Self {
        Self {
            read_max_connections: config.read_max_connections,
            read_min_connections: config.read_min_connections,
            write_max_connections: config.write_max_connections,
            write_min_connections: config.write_min_connections,
            idle_timeout_secs: config.idle_timeout_secs,
            acquire_timeout_secs: config.acquire_timeout_secs,
            sqlite_config: config.sqlite_config,
        }
    }
}

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, thiserror::Error)]
pub enum DatabaseWriteError {
    #[error("database write failed: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("timed out after {0:?} waiting for the write lock")]
    LockTimeout(StdDuration),
}

#[derive(Clone, Debug)]
pub struct DBConnection {
    pub database_path: String,
    read_pool: SqlitePool,
    write_pool: SqlitePool,
    /// sqlite allows one writer; holding this lock keeps writers queued in
    /// process instead of spinning on SQLITE_BUSY
    write_lock: Arc<Mutex<()>>,
    write_lock_timeout: StdDuration,
}

impl DBConnection {
    pub async fn new(
        path: &str,
        db_name: &str,
        database_pool_config: DatabasePoolConfig,
    ) -> Result<Self, sqlx::Error> {
        let database_path = format!("{}/{}.db", path, db_name);

        if !database_pool_config.sqlite_config.is_memory() {
            let database_url = format!("sqlite:{}", database_path);
            if !Sqlite::database_exists(&database_url).await? {
                Sqlite::create_database(&database_url).await?;
            }
        }

        let (read_pool, write_pool) =
            Self::create_pools(&database_path, &database_pool_config).await?;

        MIGRATOR
            .run(&write_pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        Ok(Self {
            database_path,
            read_pool,
            write_pool,
            write_lock: Arc::new(Mutex::new(())),
            write_lock_timeout: StdDuration::from_secs(database_pool_config.acquire_timeout_secs),
        })
    }

    async fn create_pools(
        database_path: &str,
        database_pool_config: &DatabasePoolConfig,
    ) -> Result<(SqlitePool, SqlitePool), sqlx::Error> {
        let base = &database_pool_config.sqlite_config;
        let (read_config, write_config) = if base.is_memory() {
            let read_config = SqliteConfig {
                cache_size: base.cache_size * 2,
                synchronous: SynchronousMode::Off,
                ..base.clone()
            };
            (read_config, base.clone())
        } else {
            let mut read_config = SqliteConfig::read_only();
            read_config.cache_size = base.cache_size * 2;
            read_config.busy_timeout_ms = base.busy_timeout_ms;

            let write_config = SqliteConfig {
                mode: SqliteMode::ReadWrite,
                ..base.clone()
            };
            (read_config, write_config)
        };

        let write_options = write_config.build_connect_options(database_path);
        debug!("earnings write pool options: {:?}", write_options);
        let write_pool = database_pool_config
            .pool_options(
                database_pool_config.write_max_connections,
                database_pool_config.write_min_connections,
            )
            .connect_with(write_options)
            .await?;

        let read_options = read_config.build_connect_options(database_path);
        debug!("earnings read pool options: {:?}", read_options);
        let read_pool = database_pool_config
            .pool_options(
                database_pool_config.read_max_connections,
                database_pool_config.read_min_connections,
            )
            .connect_with(read_options)
            .await?;

        Ok((read_pool, write_pool))
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.read_pool)
            .await?;
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.write_pool)
            .await?;

        Ok(())
    }

    pub async fn close(self) {
        self.read_pool.close().await;
        self.write_pool.close().await;
    }

    pub fn read(&self) -> &SqlitePool {
        &self.read_pool
    }

    /// Run `operation` against the write pool while holding the write lock
    pub async fn execute_write<F, Fut, T>(&self, operation: F) -> Result<T, DatabaseWriteError>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let _guard = tokio::time::timeout(self.write_lock_timeout, self.write_lock.lock())
            .await
            .map_err(|_| DatabaseWriteError::LockTimeout(self.write_lock_timeout))?;

        operation(self.write_pool.clone())
            .await
            .map_err(DatabaseWriteError::from)
    }
}

pub fn format_datetime(value: OffsetDateTime) -> Result<String, sqlx::Error> {
    value
        .format(&Rfc3339)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub fn parse_required_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<OffsetDateTime, sqlx::Error> {
    let date_str: String = row.try_get(column)?;
    OffsetDateTime::parse(&date_str, &Rfc3339).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn parse_optional_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<OffsetDateTime>, sqlx::Error> {
    row.try_get::<Option<String>, _>(column)?
        .map(|s| OffsetDateTime::parse(&s, &Rfc3339))
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

pub fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, sqlx::Error> {
    let value: String = row.try_get(column)?;
    Uuid::parse_str(&value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn parse_u32(row: &SqliteRow, column: &str) -> Result<u32, sqlx::Error> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn parse_optional_u32(row: &SqliteRow, column: &str) -> Result<Option<u32>, sqlx::Error> {
    row.try_get::<Option<i64>, _>(column)?
        .map(u32::try_from)
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

/// Parse a TEXT column into any `FromStr` domain enum
pub fn parse_enum<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: String = row.try_get(column)?;
    value.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
