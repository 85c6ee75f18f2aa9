//! db.rs: Lazily opened, bounded pool of SQLite connections.
//!
//! Every pipeline run checks out one connection, runs one statement on it
//! and hands it back when the guard drops, on success and on error alike.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::PoolError;

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub path: PathBuf,
    pub max_connections: usize,
    pub busy_timeout: Duration,
}

impl PoolOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 4,
            busy_timeout: Duration::from_millis(5_000),
        }
    }

    pub fn from_config(cfg: &DatabaseConfig) -> Self {
        Self {
            path: resolve_db_path(&cfg.path),
            max_connections: cfg.max_connections.max(1),
            busy_timeout: Duration::from_millis(cfg.busy_timeout_ms),
        }
    }
}

pub struct ConnectionPool {
    options: PoolOptions,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Open the pool with one warm connection, which also validates the path.
    ///
    /// Every connection to `:memory:` is its own empty database, so such a
    /// pool is limited to that single connection.
    pub fn open(mut options: PoolOptions) -> Result<Arc<Self>, PoolError> {
        if is_in_memory(&options.path) && options.max_connections > 1 {
            warn!(
                "In-memory database requested with max_connections={}; using 1",
                options.max_connections
            );
            options.max_connections = 1;
        }
        let first = open_connection(&options)?;
        info!(
            "SQLite pool opened at {} (max_connections={})",
            options.path.display(),
            options.max_connections
        );
        Ok(Arc::new(Self {
            permits: Arc::new(Semaphore::new(options.max_connections)),
            idle: Mutex::new(vec![first]),
            closed: AtomicBool::new(false),
            options,
        }))
    }

    /// Wait for a free slot and check out a connection.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, PoolError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let reused = self.idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!("Opening new pooled connection to {}", self.options.path.display());
                open_connection(&self.options)?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Refuse new checkouts and drop idle connections. Checked-out
    /// connections are dropped when their guards go away.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();
        let drained = std::mem::take(&mut *self.idle()).len();
        info!("SQLite pool closed ({} idle connection(s) released)", drained);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    pub fn path(&self) -> &Path {
        &self.options.path
    }

    fn release(&self, conn: Connection) {
        if !self.is_closed() {
            self.idle().push(conn);
        }
    }

    // A panic while holding the lock cannot leave the Vec half-updated.
    fn idle(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A checked-out connection. Returned to the pool on drop.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Process-scoped handle. The pool is opened on first use; `connect` may be
/// called any number of times, concurrently, and opens it once.
pub struct Database {
    options: PoolOptions,
    pool: OnceCell<Arc<ConnectionPool>>,
}

impl Database {
    pub fn new(options: PoolOptions) -> Self {
        Self {
            options,
            pool: OnceCell::new(),
        }
    }

    pub async fn connect(&self) -> Result<Arc<ConnectionPool>, PoolError> {
        let pool = self
            .pool
            .get_or_try_init(|| async { ConnectionPool::open(self.options.clone()) })
            .await?;
        Ok(Arc::clone(pool))
    }

    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        self.connect().await?.acquire().await
    }

    pub fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.pool.get().is_some_and(|p| !p.is_closed())
    }

    pub fn path(&self) -> &Path {
        &self.options.path
    }
}

fn open_connection(options: &PoolOptions) -> Result<Connection, PoolError> {
    let wrap = |source| PoolError::Open {
        path: options.path.display().to_string(),
        source,
    };
    let conn = Connection::open(&options.path).map_err(wrap)?;
    conn.busy_timeout(options.busy_timeout).map_err(wrap)?;
    if !is_in_memory(&options.path) {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(wrap)?;
    }
    conn.execute_batch("PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")
        .map_err(wrap)?;
    Ok(conn)
}

fn is_in_memory(path: &Path) -> bool {
    path == Path::new(":memory:")
}

/// Resolve bare DB filenames to the local app data directory.
/// Absolute paths, explicit relative paths and `:memory:` are kept as given.
pub fn resolve_db_path(db_path: &str) -> PathBuf {
    let path = Path::new(db_path);
    if db_path == ":memory:" || path.is_absolute() || path.components().count() > 1 {
        return path.to_path_buf();
    }
    if let Some(data_dir) = dirs::data_local_dir() {
        let dir = data_dir.join("video-stats-bot");
        let _ = std::fs::create_dir_all(&dir);
        return dir.join(db_path);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_options(dir: &tempfile::TempDir, max: usize) -> PoolOptions {
        let mut opts = PoolOptions::new(dir.path().join("pool.db"));
        opts.max_connections = max;
        opts
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(temp_options(&dir, 2));
        assert!(!db.is_connected());

        let a = db.connect().await.unwrap();
        let b = db.connect().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(db.is_connected());
    }

    #[tokio::test]
    async fn test_connection_returned_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = ConnectionPool::open(temp_options(&dir, 2)).unwrap();
        assert_eq!(pool.idle_count(), 1);
        {
            let conn = pool.acquire().await.unwrap();
            let one: i64 = conn.query_row("SELECT 1", [], |r| r.get(0)).unwrap();
            assert_eq!(one, 1);
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_pool_bounds_checkouts() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = ConnectionPool::open(temp_options(&dir, 1)).unwrap();
        let held = pool.acquire().await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(waiting.is_err(), "second checkout must wait");

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(500), pool.acquire()).await;
        assert!(again.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_checkout() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(temp_options(&dir, 2));
        let held = db.acquire().await.unwrap();
        db.close();
        assert!(!db.is_connected());
        assert!(matches!(db.acquire().await, Err(PoolError::Closed)));

        drop(held);
        assert_eq!(db.connect().await.unwrap().idle_count(), 0);
    }

    #[tokio::test]
    async fn test_open_fails_for_missing_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let opts = PoolOptions::new(dir.path().join("missing").join("x.db"));
        assert!(matches!(ConnectionPool::open(opts), Err(PoolError::Open { .. })));
    }

    #[tokio::test]
    async fn test_in_memory_pool_shares_one_database() {
        let mut opts = PoolOptions::new(":memory:");
        opts.max_connections = 4;
        let pool = ConnectionPool::open(opts).unwrap();

        {
            let conn = pool.acquire().await.unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);").unwrap();

            let second = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
            assert!(second.is_err(), "in-memory pool holds a single connection");
        }

        let conn = pool.acquire().await.unwrap();
        let x: i64 = conn.query_row("SELECT x FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(x, 7);
    }

    #[test]
    fn test_resolve_keeps_explicit_paths() {
        assert_eq!(resolve_db_path("/tmp/videos.db"), PathBuf::from("/tmp/videos.db"));
        assert_eq!(resolve_db_path("./videos.db"), PathBuf::from("./videos.db"));
        assert_eq!(resolve_db_path(":memory:"), PathBuf::from(":memory:"));
        assert!(resolve_db_path("videos.db").ends_with("videos.db"));
    }
}
