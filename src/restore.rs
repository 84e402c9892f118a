use crate::args::Flag;
use crate::catalog::Catalog;
use crate::command::Command;
use crate::db::{Database, Session};
use crate::encoding;
use crate::progress;
use crate::splitter;
use anyhow::{Context, anyhow};
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Statements that cannot share a transaction with anything else.
const MUST_EXECUTE_ALONE: &[&str] = &["create database", "create schema"];

pub fn must_execute_alone(statement: &str) -> bool {
    MUST_EXECUTE_ALONE.iter().any(|prefix| {
        statement
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

const STATEMENT_END: &str = "\n;\n";

/// Groups statements into size-bounded transactions, preserving order.
pub struct BatchExecutor<'a, S: Session + ?Sized> {
    session: &'a mut S,
    batch_size: u64,
    batch: String,
    batched: usize,
    executed: usize,
}

impl<'a, S: Session + ?Sized> BatchExecutor<'a, S> {
    pub fn new(session: &'a mut S, batch_size: u64) -> Self {
        Self {
            session,
            batch_size,
            batch: String::new(),
            batched: 0,
            executed: 0,
        }
    }

    /// Statements committed so far.
    pub fn executed(&self) -> usize {
        self.executed
    }

    pub fn push(&mut self, statement: &str) -> anyhow::Result<()> {
        let statement = statement.trim();
        if statement.is_empty() {
            return Ok(());
        }

        if must_execute_alone(statement) {
            self.flush()?;
            return self.run_transaction(statement, 1);
        }
        if self.session.is_non_transactional(statement) {
            self.flush()?;
            debug!("executing outside a transaction: {statement}");
            self.session.execute(statement).with_context(|| {
                format!("statement failed after {} statements", self.executed)
            })?;
            self.executed += 1;
            return Ok(());
        }

        // A trailing `--` comment must not swallow the terminator.
        self.batch.push_str(statement);
        self.batch.push_str(STATEMENT_END);
        self.batched += 1;

        if self.batch.len() as u64 >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Executes whatever is still pending and returns the total executed.
    pub fn finish(mut self) -> anyhow::Result<usize> {
        self.flush()?;
        Ok(self.executed)
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if self.batched == 0 {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        let count = std::mem::take(&mut self.batched);
        self.run_transaction(&batch, count)
    }

    fn run_transaction(&mut self, sql: &str, count: usize) -> anyhow::Result<()> {
        debug!("executing {count} statement(s), {} bytes", sql.len());
        self.session.begin()?;
        if let Err(err) = self.session.execute(sql) {
            if let Err(rollback) = self.session.rollback() {
                warn!("rollback failed: {rollback:#}");
            }
            return Err(err).with_context(|| {
                format!("transaction failed after {} statements", self.executed)
            });
        }
        self.session.commit()?;
        self.executed += count;
        Ok(())
    }
}

/// Replays a SQL script against the target database.
pub struct RestoreCommand {
    database: Arc<dyn Database>,
}

impl RestoreCommand {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }
}

impl Command for RestoreCommand {
    fn name(&self) -> &'static str {
        "restore"
    }

    fn summary(&self) -> &'static str {
        "Replay a SQL script into a database"
    }

    fn accepted_arguments<'c>(&self, catalog: &'c Catalog) -> Vec<&'c dyn Flag> {
        vec![
            &catalog.server as &dyn Flag,
            &catalog.database,
            &catalog.user,
            &catalog.password,
            &catalog.input_file,
            &catalog.timeout,
            &catalog.batch_size,
            &catalog.verbose,
        ]
    }

    fn execute(&self, catalog: &Catalog, args: &[String]) -> anyhow::Result<()> {
        let input = catalog.input_file.require(args)?;
        let input = Path::new(&input);
        if !input.is_file() {
            return Err(anyhow!("input file '{}' does not exist", input.display()));
        }
        let params = catalog.connection_params(args)?;
        let batch_size = catalog
            .batch_size
            .get_or_default(args)
            .context("batch size has no default")?;
        let script = encoding::read_script(input)?;

        info!(
            "restoring {} into {} (batch size {})",
            input.display(),
            params.redacted(),
            batch_size
        );
        let mut session = self.database.open(&params)?;
        let started = Instant::now();
        let spinner = progress::spinner("Executing… 0 statements");
        let mut executor = BatchExecutor::new(session.as_mut(), batch_size.value());
        let mut reported = 0;

        for item in splitter::split(&script) {
            let stmt = match item {
                Ok(stmt) => stmt,
                Err(err) => {
                    warn!("{err}");
                    continue;
                }
            };
            for _ in 0..stmt.repeat_count {
                executor
                    .push(&stmt.text)
                    .with_context(|| format!("statement at line {}", stmt.line))?;
            }
            if executor.executed() != reported {
                reported = executor.executed();
                info!("executed {reported} statements");
                if let Some(spinner) = &spinner {
                    spinner.set_message(format!("Executing… {reported} statements"));
                }
            }
        }

        let executed = executor.finish()?;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        println!(
            "OK: executed {executed} statements in {} seconds",
            started.elapsed().as_secs()
        );
        Ok(())
    }
}
