use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const POOL_SIZE: u32 = 5;

/// Session writes happen after every runner step; wait instead of failing on a busy file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts `sqlite:path?mode=rwc`, a bare path, or `:memory:`.
pub fn database_path(database_url: &str) -> &str {
    let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
    path.split('?').next().unwrap_or(path)
}

pub fn create_pool(database_url: &str) -> Result<DbPool, r2d2::Error> {
    let path = database_path(database_url);

    if path == ":memory:" {
        return create_memory_pool();
    }

    let manager = SqliteConnectionManager::file(Path::new(path))
        .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));

    Pool::builder().max_size(POOL_SIZE).build(manager)
}

/// Single-connection pool; every connection to `:memory:` is its own database.
pub fn create_memory_pool() -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::memory();
    Pool::builder().max_size(1).build(manager)
}
