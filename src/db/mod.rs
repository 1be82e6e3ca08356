pub mod migrations;
pub mod queries;

use std::time::Duration;

use anyhow::Context;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

const MEMORY: &str = ":memory:";
const PRAGMAS: &str = "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;";

#[derive(Clone, Debug)]
pub struct PoolOptions {
    pub max_size: u32,
    pub busy_timeout: Duration,
    pub checkout_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 8,
            busy_timeout: Duration::from_millis(250),
            checkout_timeout: Duration::from_secs(2),
        }
    }
}

/// Single connection with migrations applied. Used by tools and tests.
pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch(PRAGMAS)
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Connection pool shared by request workers. Every worker checks out its own
/// connection, so write atomicity rests on SQLite's locking, not on a process mutex.
///
/// An in-memory database lives and dies with its connection, so `:memory:` gets a
/// single connection that is never recycled.
pub fn init_pool(path: &str, options: &PoolOptions) -> anyhow::Result<DbPool> {
    let busy_timeout = options.busy_timeout;
    let manager = if path == MEMORY {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(path)
    }
    .with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(PRAGMAS)
    });

    let mut builder = r2d2::Pool::builder()
        .max_size(options.max_size.max(1))
        .connection_timeout(options.checkout_timeout);
    if path == MEMORY {
        builder = builder.max_size(1).max_lifetime(None).idle_timeout(None);
    }

    let pool = builder
        .build(manager)
        .with_context(|| format!("failed to open database pool at {path}"))?;

    let conn = pool.get().context("failed to check out migration connection")?;
    migrations::run_migrations(&conn)?;

    tracing::info!(path, max_size = pool.max_size(), "database pool ready");
    Ok(pool)
}
