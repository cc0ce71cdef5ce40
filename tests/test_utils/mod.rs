use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU32, Ordering},
};

use duckbridge::{error::DbResult, Connection, Db};

/// Sets up tracing subscriber.
#[allow(dead_code)]
pub fn setup_tracing(level: Option<&str>) {
    use tracing_subscriber::{
        fmt::{format::FmtSpan, layer},
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    };

    let filter_layer = level
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or("warn".into()));
    let fmt_layer = layer().with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    // Several tests in one binary may race to install the subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init();
}

/// A database instance backed by a temporary file, removed on drop.
#[allow(dead_code)]
pub struct TestDb(Db, PathBuf);

#[allow(dead_code)]
impl TestDb {
    /// Creates a new test database in a temporary file.
    pub fn new_temp() -> Self {
        Self(Db::new(4), test_path())
    }

    pub fn path(&self) -> &Path {
        &self.1
    }

    /// Opens a connection to the test database file.
    pub async fn connect(&self) -> DbResult<Connection> {
        self.0.open_file(&self.1).await
    }
}

impl Deref for TestDb {
    type Target = Db;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let wal = self.1.with_extension("duckdb.wal");
        for path in [&self.1, &wal] {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Generates a path to a test database.
fn test_path() -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(1);

    let id = COUNTER.fetch_add(1, Ordering::AcqRel);
    let dir = std::env::temp_dir().join("duckbridge-tests");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{}-{id}-test.duckdb", std::process::id()))
}

/// Opens an in-memory connection on a fresh instance.
#[allow(dead_code)]
pub async fn memory() -> DbResult<(Db, Connection)> {
    let db = Db::default();
    let conn = db.open_in_memory().await?;
    Ok((db, conn))
}
