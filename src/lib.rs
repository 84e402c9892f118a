pub mod args;
pub mod backup;
pub mod bak;
pub mod catalog;
pub mod cli;
pub mod command;
pub mod db;
pub mod encoding;
pub mod model;
mod progress;
pub mod restore;
pub mod scripting;
pub mod splitter;
mod tables;

use db::SqliteDatabase;
use env_logger::{Builder, Env};
use scripting::SqliteScripter;
use std::sync::Arc;

/// Runs the tool over `args` (program name excluded) and returns the exit code.
pub fn run(argv: Vec<String>) -> i32 {
    let registry = cli::Registry::new(Arc::new(SqliteDatabase), Arc::new(SqliteScripter));
    let verbose = args::exists(&registry.catalog().verbose, &argv);
    init_logger(verbose);
    cli::invoke(&registry, &argv)
}

fn init_logger(verbose: bool) {
    // RUST_LOG wins over -v.
    let default = if verbose { "debug" } else { "warn" };
    let _ = Builder::from_env(Env::default().default_filter_or(default))
        .format_timestamp(None)
        .try_init();
}
