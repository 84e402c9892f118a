use crate::args::Flag;
use crate::catalog::Catalog;
use crate::command::Command;
use crate::db::Database;
use crate::progress;
use anyhow::{Context, anyhow};
use log::info;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Restores a raw database backup file, as opposed to replaying a script.
pub struct RestoreBakCommand {
    database: Arc<dyn Database>,
}

impl RestoreBakCommand {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }
}

impl Command for RestoreBakCommand {
    fn name(&self) -> &'static str {
        "restore-bak"
    }

    fn summary(&self) -> &'static str {
        "Restore a database from a raw backup file"
    }

    fn accepted_arguments<'c>(&self, catalog: &'c Catalog) -> Vec<&'c dyn Flag> {
        vec![
            &catalog.server as &dyn Flag,
            &catalog.database,
            &catalog.user,
            &catalog.password,
            &catalog.input_file,
            &catalog.verbose,
        ]
    }

    fn examples(&self) -> &'static [&'static str] {
        &["dbcli restore-bak -d shop.db -i shop.bak"]
    }

    fn execute(&self, catalog: &Catalog, args: &[String]) -> anyhow::Result<()> {
        let input = catalog.input_file.require(args)?;
        let input = Path::new(&input);
        if !input.is_file() {
            return Err(anyhow!("backup file '{}' does not exist", input.display()));
        }
        let params = catalog.connection_params(args)?;

        info!("restoring {} from raw backup {}", params.redacted(), input.display());
        let started = Instant::now();
        let spinner = progress::spinner("Restoring…");
        let result = self
            .database
            .restore_raw(&params, input)
            .with_context(|| format!("restore database '{}'", params.database));
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        result?;

        println!(
            "OK: restored database '{}' in {} seconds",
            params.database,
            started.elapsed().as_secs()
        );
        Ok(())
    }
}
