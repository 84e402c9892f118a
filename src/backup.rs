use crate::args::Flag;
use crate::catalog::Catalog;
use crate::command::Command;
use crate::encoding::{self, BOM_UTF16LE};
use crate::model::{ScriptMode, ScriptingObject};
use crate::scripting::{self, BATCH_SEPARATOR, ConstraintToggle, ScriptingRequest, ScriptingService};
use anyhow::{Context, ensure};
use log::{debug, info};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use time::macros::format_description;

const TEMP_SUFFIX: &str = ".temp";

/// Writes a schema script, then appends a data script bracketed by the
/// service's constraint toggle.
pub struct BackupCommand {
    scripting: Arc<dyn ScriptingService>,
}

impl BackupCommand {
    pub fn new(scripting: Arc<dyn ScriptingService>) -> Self {
        Self { scripting }
    }
}

impl Command for BackupCommand {
    fn name(&self) -> &'static str {
        "backup"
    }

    fn summary(&self) -> &'static str {
        "Script a database's schema and data to a SQL file"
    }

    fn accepted_arguments<'c>(&self, catalog: &'c Catalog) -> Vec<&'c dyn Flag> {
        vec![
            &catalog.server as &dyn Flag,
            &catalog.database,
            &catalog.user,
            &catalog.password,
            &catalog.output_file,
            &catalog.timeout,
            &catalog.exclude_table,
            &catalog.schema_only,
            &catalog.verbose,
        ]
    }

    fn examples(&self) -> &'static [&'static str] {
        &[
            "dbcli backup -d shop.db",
            "dbcli backup -d shop.db -o shop.sql --exclude-table AuditLog --exclude-table Sessions",
            "dbcli backup -d shop.db --schema-only",
        ]
    }

    fn execute(&self, catalog: &Catalog, args: &[String]) -> anyhow::Result<()> {
        let params = catalog.connection_params(args)?;
        let output = match catalog.output_file.get_or_default(args) {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir()
                .context("resolve current directory")?
                .join(default_file_name(&params.database, now())?),
        };
        let schema_only = catalog.schema_only.get_or_default(args).unwrap_or(false);
        let excluded = catalog.exclude_table.get_array(args);

        info!("backing up {} to {}", params.redacted(), output.display());
        let schema = ScriptingRequest::new(params.clone(), output.clone(), ScriptMode::SchemaOnly);
        scripting::run(self.scripting.as_ref(), &schema).context("script schema")?;

        if !schema_only {
            let temp = temp_path(&output);
            let mut data = ScriptingRequest::new(params, temp.clone(), ScriptMode::DataOnly);
            data.exclude_objects = excluded.into_iter().map(ScriptingObject::table).collect();
            scripting::run(self.scripting.as_ref(), &data).context("script data")?;

            stitch(&temp, &output, &self.scripting.constraint_toggle())?;
            std::fs::remove_file(&temp).with_context(|| format!("remove {}", temp.display()))?;
        }

        println!("OK: script written to '{}'", output.display());
        Ok(())
    }
}

/// Appends the data script at `data` to the schema script at `output`,
/// dropping the data script's byte-order mark so the result carries one.
pub fn stitch(data: &Path, output: &Path, toggle: &ConstraintToggle) -> anyhow::Result<()> {
    let mut source = File::open(data).with_context(|| format!("open {}", data.display()))?;
    let mut bom = [0u8; 2];
    source
        .read_exact(&mut bom)
        .with_context(|| format!("read byte-order mark of {}", data.display()))?;
    ensure!(
        bom == BOM_UTF16LE,
        "{} does not start with a UTF-16LE byte-order mark",
        data.display()
    );

    let mut target = OpenOptions::new()
        .append(true)
        .open(output)
        .with_context(|| format!("open {} for append", output.display()))?;
    let write_err = || format!("append to {}", output.display());

    target
        .write_all(&encoding::utf16le(&format!("{}{BATCH_SEPARATOR}", toggle.disable)))
        .with_context(write_err)?;
    let copied = io::copy(&mut source, &mut target).with_context(write_err)?;
    target
        .write_all(&encoding::utf16le(&format!("{}{BATCH_SEPARATOR}", toggle.enable)))
        .with_context(write_err)?;
    target.flush().with_context(write_err)?;

    debug!("appended {copied} bytes from {} to {}", data.display(), output.display());
    Ok(())
}

fn temp_path(output: &Path) -> PathBuf {
    let mut s = OsString::from(output.as_os_str());
    s.push(TEMP_SUFFIX);
    PathBuf::from(s)
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `{database}-{yyyyMMddHHmmss}.sql`, using the file stem when the database
/// is named by path.
pub fn default_file_name(database: &str, at: OffsetDateTime) -> anyhow::Result<String> {
    let stamp = at
        .format(format_description!("[year][month][day][hour][minute][second]"))
        .context("format timestamp")?;
    let stem = Path::new(database)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| database.to_string());
    Ok(format!("{stem}-{stamp}.sql"))
}
