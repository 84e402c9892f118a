use crate::catalog::ConnectionParams;
use anyhow::{Context, anyhow};
use log::debug;
use rusqlite::backup::Progress;
use rusqlite::{Connection, DatabaseName, OpenFlags};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A live connection owned by exactly one command run.
pub trait Session {
    fn begin(&mut self) -> anyhow::Result<()>;
    /// Runs `sql`, which may hold several statements, as a single command.
    fn execute(&mut self, sql: &str) -> anyhow::Result<()>;
    fn commit(&mut self) -> anyhow::Result<()>;
    fn rollback(&mut self) -> anyhow::Result<()>;

    /// Statements the engine ignores inside a transaction. They run on their
    /// own, in autocommit mode.
    fn is_non_transactional(&self, _statement: &str) -> bool {
        false
    }
}

pub trait Database: Send + Sync {
    fn open(&self, params: &ConnectionParams) -> anyhow::Result<Box<dyn Session>>;

    /// Replaces the target database with the contents of a raw backup file.
    fn restore_raw(&self, params: &ConnectionParams, source: &Path) -> anyhow::Result<()>;
}

/// SQLite driver. The database name is the path of the database file; the
/// timeout becomes the busy timeout. Sessions enforce foreign keys.
#[derive(Debug, Clone, Default)]
pub struct SqliteDatabase;

#[derive(Debug)]
struct SqliteSession {
    conn: Connection,
}

impl Database for SqliteDatabase {
    fn open(&self, params: &ConnectionParams) -> anyhow::Result<Box<dyn Session>> {
        let conn = open_readwrite(params)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")
            .context("enable foreign keys")?;
        Ok(Box::new(SqliteSession { conn }))
    }

    fn restore_raw(&self, params: &ConnectionParams, source: &Path) -> anyhow::Result<()> {
        let mut conn = open_readwrite(params)?;
        let last_logged = Cell::new(-1i64);
        let report = |p: Progress| {
            let total = i64::from(p.pagecount);
            let done = total - i64::from(p.remaining);
            // The callback fires after every step; log once per percent.
            let pct = if total > 0 { done * 100 / total } else { 100 };
            if pct != last_logged.get() {
                debug!("restore: {done}/{total} pages");
                last_logged.set(pct);
            }
        };
        conn.restore(DatabaseName::Main, source, Some(report))
            .with_context(|| format!("restore {} from {}", params.database, source.display()))
    }
}

impl Session for SqliteSession {
    fn begin(&mut self) -> anyhow::Result<()> {
        self.conn.execute_batch("BEGIN").context("begin transaction")
    }

    fn execute(&mut self, sql: &str) -> anyhow::Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.conn.execute_batch("COMMIT").context("commit transaction")
    }

    fn rollback(&mut self) -> anyhow::Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .context("roll back transaction")
    }

    // `PRAGMA foreign_keys` is a no-op while a transaction is open.
    fn is_non_transactional(&self, statement: &str) -> bool {
        statement
            .get(..PRAGMA.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(PRAGMA))
    }
}

const PRAGMA: &str = "pragma";

pub fn database_path(params: &ConnectionParams) -> anyhow::Result<PathBuf> {
    if params.database.trim().is_empty() {
        return Err(anyhow!("database name is empty"));
    }
    Ok(PathBuf::from(&params.database))
}

pub fn open_readonly(params: &ConnectionParams) -> anyhow::Result<Connection> {
    let path = database_path(params)?;
    if !path.exists() {
        return Err(anyhow!("database {} does not exist", path.display()));
    }
    let conn = Connection::open_with_flags(
        &path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("open database {}", path.display()))?;
    configure(&conn, params)?;
    Ok(conn)
}

fn open_readwrite(params: &ConnectionParams) -> anyhow::Result<Connection> {
    let path = database_path(params)?;
    debug!("connecting: {}", params.redacted());
    let conn = Connection::open_with_flags(
        &path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("open database {}", path.display()))?;
    configure(&conn, params)?;
    Ok(conn)
}

fn configure(conn: &Connection, params: &ConnectionParams) -> anyhow::Result<()> {
    conn.busy_timeout(Duration::from_secs(params.timeout_secs.into()))
        .context("set busy timeout")
}
