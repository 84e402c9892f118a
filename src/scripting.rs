use crate::catalog::ConnectionParams;
use crate::db;
use crate::encoding::{self, BOM_UTF16LE};
use crate::model::{ObjectStatus, ScriptMode, ScriptingEvent, ScriptingObject};
use crate::progress;
use anyhow::{Context, anyhow};
use crossbeam_channel::{self as channel, Sender};
use log::{debug, warn};
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Terminates every scripted statement; restore splits on it.
pub const BATCH_SEPARATOR: &str = "\r\nGO\r\n";

/// Object types never scripted: the dump must not create the database or its
/// logins, the restore target already has those.
pub const EXCLUDED_TYPES: &[&str] = &["Database", "User"];

#[derive(Debug, Clone, Serialize)]
pub struct ScriptingRequest {
    pub connection: ConnectionParams,
    pub file_path: PathBuf,
    pub mode: ScriptMode,
    pub exclude_types: Vec<String>,
    pub exclude_objects: Vec<ScriptingObject>,
}

impl ScriptingRequest {
    pub fn new(connection: ConnectionParams, file_path: PathBuf, mode: ScriptMode) -> Self {
        Self {
            connection,
            file_path,
            mode,
            exclude_types: EXCLUDED_TYPES.iter().map(|t| t.to_string()).collect(),
            exclude_objects: Vec::new(),
        }
    }

    pub fn excludes(&self, object: &ScriptingObject) -> bool {
        self.exclude_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&object.kind))
            || self.exclude_objects.iter().any(|o| o.matches(object))
    }
}

/// Statements that suspend and restore referential/check constraints around
/// a data load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintToggle {
    pub disable: &'static str,
    pub enable: &'static str,
}

pub trait ScriptingService: Send + Sync {
    /// Writes the script for `request`, reporting progress on `events`. The
    /// last event sent is always `ScriptingEvent::Complete`.
    fn script(&self, request: &ScriptingRequest, events: &Sender<ScriptingEvent>);

    fn constraint_toggle(&self) -> ConstraintToggle;
}

/// Runs one scripting pass on a worker thread and waits for it to finish.
pub fn run(service: &dyn ScriptingService, request: &ScriptingRequest) -> anyhow::Result<()> {
    debug!("scripting request: {}", serde_json::to_string(request)?);
    let (tx, rx) = channel::unbounded::<ScriptingEvent>();

    std::thread::scope(|scope| {
        let worker = scope.spawn(move || service.script(request, &tx));

        let label = match request.mode {
            ScriptMode::SchemaOnly => "Scripting schema…",
            ScriptMode::DataOnly => "Scripting data…",
            ScriptMode::SchemaAndData => "Scripting…",
        };
        let pb = progress::bar(0, label);
        let mut outcome = None;

        for event in rx.iter() {
            match event {
                ScriptingEvent::Progress {
                    completed,
                    total,
                    status,
                    object,
                    error_message,
                } => {
                    debug!("[{completed}/{total}] {status:?}, {}, {object}", object.kind);
                    if let Some(msg) = error_message {
                        warn!("{} {object}: {msg}", object.kind);
                    }
                    if let Some(pb) = &pb {
                        pb.set_length(total);
                        pb.set_position(completed);
                        pb.set_message(format!("{} {}", object.kind, object));
                    }
                }
                ScriptingEvent::Complete {
                    success,
                    error_message,
                    error_details,
                } => {
                    outcome = Some(if success {
                        Ok(())
                    } else {
                        let message = error_message.unwrap_or_else(|| "unknown error".into());
                        Err(match error_details {
                            Some(details) if details != message => {
                                anyhow!("scripting failed: {message}\n{details}")
                            }
                            _ => anyhow!("scripting failed: {message}"),
                        })
                    });
                }
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        if worker.join().is_err() {
            return Err(anyhow!("scripting worker panicked"));
        }
        outcome.unwrap_or_else(|| Err(anyhow!("scripting ended without reporting completion")))
    })
}

/// Scripts a SQLite database: schema from `sqlite_master`, data as one
/// `INSERT` per row.
#[derive(Debug, Clone, Default)]
pub struct SqliteScripter;

const SQLITE_CONSTRAINTS: ConstraintToggle = ConstraintToggle {
    disable: "PRAGMA foreign_keys = OFF;\r\nPRAGMA ignore_check_constraints = ON",
    enable: "PRAGMA ignore_check_constraints = OFF;\r\nPRAGMA foreign_keys = ON",
};

impl ScriptingService for SqliteScripter {
    fn script(&self, request: &ScriptingRequest, events: &Sender<ScriptingEvent>) {
        let complete = match script_sqlite(request, events) {
            Ok(()) => ScriptingEvent::Complete {
                success: true,
                error_message: None,
                error_details: None,
            },
            Err(err) => ScriptingEvent::Complete {
                success: false,
                error_message: Some(err.to_string()),
                error_details: Some(format!("{err:#}")),
            },
        };
        events.send(complete).ok();
    }

    fn constraint_toggle(&self) -> ConstraintToggle {
        SQLITE_CONSTRAINTS
    }
}

#[derive(Debug, Clone)]
struct SchemaObject {
    object: ScriptingObject,
    sql: String,
}

fn script_sqlite(request: &ScriptingRequest, events: &Sender<ScriptingEvent>) -> anyhow::Result<()> {
    let conn = db::open_readonly(&request.connection)?;
    let objects: Vec<SchemaObject> = schema_objects(&conn)?
        .into_iter()
        .filter(|o| !request.excludes(&o.object))
        .collect();
    let tables: Vec<&ScriptingObject> = objects
        .iter()
        .map(|o| &o.object)
        .filter(|o| o.kind == "Table")
        .collect();

    let mut total = 0u64;
    if request.mode.includes_schema() {
        total += objects.len() as u64;
    }
    if request.mode.includes_data() {
        total += tables.len() as u64;
    }

    let mut out = ScriptWriter::create(&request.file_path)?;
    let mut completed = 0u64;
    let mut report = |object: &ScriptingObject, error: Option<String>| {
        completed += 1;
        let status = match error {
            None => ObjectStatus::Completed,
            Some(_) => ObjectStatus::Failed,
        };
        events
            .send(ScriptingEvent::Progress {
                completed,
                total,
                status,
                object: object.clone(),
                error_message: error,
            })
            .ok();
    };

    if request.mode.includes_schema() {
        for o in &objects {
            out.statement(&o.sql)?;
            report(&o.object, None);
        }
    }
    if request.mode.includes_data() {
        for table in &tables {
            if let Err(err) = script_rows(&conn, &table.name, &mut out) {
                report(table, Some(format!("{err:#}")));
                return Err(err.context(format!("script data for table {}", table.name)));
            }
            report(table, None);
        }
    }
    out.finish()
}

fn schema_objects(conn: &Connection) -> anyhow::Result<Vec<SchemaObject>> {
    let mut stmt = conn.prepare(
        r#"
SELECT type, name, sql
FROM sqlite_master
WHERE sql IS NOT NULL
  AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
ORDER BY CASE type WHEN 'table' THEN 0 WHEN 'view' THEN 1 WHEN 'index' THEN 2 ELSE 3 END, rowid
"#,
    )?;
    let iter = stmt.query_map([], |row| {
        let kind: String = row.get(0)?;
        Ok(SchemaObject {
            object: ScriptingObject::new(object_kind(&kind), row.get::<_, String>(1)?),
            sql: row.get(2)?,
        })
    })?;
    let mut out = Vec::new();
    for o in iter {
        out.push(o?);
    }
    Ok(out)
}

fn object_kind(sqlite_type: &str) -> &'static str {
    match sqlite_type {
        "table" => "Table",
        "view" => "View",
        "index" => "Index",
        "trigger" => "Trigger",
        _ => "Unknown",
    }
}

fn script_rows(conn: &Connection, table: &str, out: &mut ScriptWriter) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
    let columns = stmt
        .column_names()
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let width = stmt.column_count();
    let prefix = format!("INSERT INTO {} ({columns}) VALUES (", quote_ident(table));

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut sql = prefix.clone();
        for i in 0..width {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&literal(row.get_ref(i)?));
        }
        sql.push(')');
        out.statement(&sql)?;
    }
    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) if f.is_nan() => "NULL".to_string(),
        ValueRef::Real(f) if f.is_infinite() => {
            if f > 0.0 { "9e999" } else { "-9e999" }.to_string()
        }
        ValueRef::Real(f) => format!("{f:?}"),
        ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t).replace('\'', "''")),
        ValueRef::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
            format!("X'{hex}'")
        }
    }
}

/// UTF-16LE script output with a leading byte-order mark.
struct ScriptWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl ScriptWriter {
    fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        out.write_all(&BOM_UTF16LE)
            .with_context(|| format!("write {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            out,
        })
    }

    fn statement(&mut self, sql: &str) -> anyhow::Result<()> {
        self.out
            .write_all(&encoding::utf16le(sql))
            .and_then(|_| self.out.write_all(&encoding::utf16le(BATCH_SEPARATOR)))
            .with_context(|| format!("write {}", self.path.display()))
    }

    fn finish(mut self) -> anyhow::Result<()> {
        self.out
            .flush()
            .with_context(|| format!("write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::read_script;
    use tempfile::tempdir;

    fn seed(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            r#"
CREATE TABLE Car (Id INTEGER PRIMARY KEY, Make TEXT NOT NULL, Model TEXT NOT NULL);
CREATE TABLE Owner (Id INTEGER PRIMARY KEY, CarId INTEGER REFERENCES Car(Id), Name TEXT, Photo BLOB, Score REAL);
CREATE INDEX OwnerByCar ON Owner (CarId);
CREATE VIEW Fleet AS SELECT Make, Model FROM Car;
INSERT INTO Car (Make, Model) VALUES ('Volvo', 'V70'), ('Toyota', 'Prius'), ('Tesla', 'Model S');
INSERT INTO Owner (CarId, Name, Photo, Score) VALUES (1, 'O''Brien', X'00FF', 1.0), (2, NULL, NULL, NULL);
"#,
        )
        .unwrap();
    }

    fn request(db: &Path, out: &Path, mode: ScriptMode) -> ScriptingRequest {
        let connection = ConnectionParams {
            server: "localhost".into(),
            database: db.to_string_lossy().into_owned(),
            user: "sa".into(),
            password: String::new(),
            timeout_secs: 5,
            integrated_security: false,
        };
        ScriptingRequest::new(connection, out.to_path_buf(), mode)
    }

    fn inserts_into(script: &str, table: &str) -> usize {
        let prefix = format!("INSERT INTO \"{table}\" ");
        script.lines().filter(|l| l.starts_with(&prefix)).count()
    }

    #[test]
    fn schema_only_scripts_objects_in_dependency_order() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("shop.db");
        let out = dir.path().join("schema.sql");
        seed(&db);

        run(&SqliteScripter, &request(&db, &out, ScriptMode::SchemaOnly)).unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(&bytes[..2], &BOM_UTF16LE);
        let script = read_script(&out).unwrap();
        assert!(!script.contains("INSERT"));
        let car = script.find("CREATE TABLE Car").unwrap();
        let index = script.find("CREATE INDEX OwnerByCar").unwrap();
        let view = script.find("CREATE VIEW Fleet").unwrap();
        assert!(car < view && view < index);
        assert_eq!(script.matches("\r\nGO\r\n").count(), 4);
    }

    #[test]
    fn data_only_writes_one_insert_per_row() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("shop.db");
        let out = dir.path().join("data.sql");
        seed(&db);

        run(&SqliteScripter, &request(&db, &out, ScriptMode::DataOnly)).unwrap();

        let script = read_script(&out).unwrap();
        assert!(!script.contains("CREATE"));
        assert_eq!(inserts_into(&script, "Car"), 3);
        assert_eq!(inserts_into(&script, "Owner"), 2);
        assert!(script.contains(
            r#"INSERT INTO "Owner" ("Id", "CarId", "Name", "Photo", "Score") VALUES (1, 1, 'O''Brien', X'00FF', 1.0)"#
        ));
        assert!(script.contains("VALUES (2, 2, NULL, NULL, NULL)"));
    }

    #[test]
    fn excluded_tables_produce_no_data() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("shop.db");
        let out = dir.path().join("data.sql");
        seed(&db);

        let mut req = request(&db, &out, ScriptMode::DataOnly);
        req.exclude_objects.push(ScriptingObject::table("car"));
        run(&SqliteScripter, &req).unwrap();

        let script = read_script(&out).unwrap();
        assert_eq!(inserts_into(&script, "Car"), 0);
        assert_eq!(inserts_into(&script, "Owner"), 2);
    }

    #[test]
    fn missing_database_reports_failure() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("nope.db");
        let out = dir.path().join("out.sql");

        let err = run(&SqliteScripter, &request(&db, &out, ScriptMode::SchemaOnly)).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err:#}");
        assert!(!out.exists());
    }

    #[test]
    fn request_excludes_database_and_user_objects() {
        let req = request(Path::new("x.db"), Path::new("x.sql"), ScriptMode::SchemaOnly);
        assert!(req.excludes(&ScriptingObject::new("database", "x")));
        assert!(req.excludes(&ScriptingObject::new("User", "dbo")));
        assert!(!req.excludes(&ScriptingObject::table("Car")));
    }

    #[test]
    fn literals_round_trip_through_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        for (value, sql) in [
            (ValueRef::Real(0.5), "0.5"),
            (ValueRef::Real(f64::INFINITY), "9e999"),
            (ValueRef::Integer(-7), "-7"),
            (ValueRef::Text(b"a'b"), "'a''b'"),
        ] {
            assert_eq!(literal(value), sql);
            let back: rusqlite::types::Value = conn
                .query_row(&format!("SELECT {sql}"), [], |r| r.get(0))
                .unwrap();
            assert_eq!(rusqlite::types::ValueRef::from(&back), value);
        }
    }

    struct Silent;

    impl ScriptingService for Silent {
        fn script(&self, _request: &ScriptingRequest, _events: &Sender<ScriptingEvent>) {}

        fn constraint_toggle(&self) -> ConstraintToggle {
            SQLITE_CONSTRAINTS
        }
    }

    #[test]
    fn service_that_never_completes_is_an_error() {
        let req = request(Path::new("x.db"), Path::new("x.sql"), ScriptMode::SchemaOnly);
        let err = run(&Silent, &req).unwrap_err();
        assert!(err.to_string().contains("without reporting completion"));
    }
}
