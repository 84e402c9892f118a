use crate::args::{self, Flag};
use crate::backup::BackupCommand;
use crate::bak::RestoreBakCommand;
use crate::catalog::Catalog;
use crate::command::{Command, VersionCommand};
use crate::db::Database;
use crate::restore::RestoreCommand;
use crate::scripting::ScriptingService;
use crate::tables;
use comfy_table::Cell;
use log::debug;
use std::fmt::Write as _;
use std::sync::Arc;

const HELP_ALIASES: &[&str] = &["help", "--help", "-h", "-?", "/?"];

/// The flag catalog and every command, built once per process.
pub struct Registry {
    catalog: Catalog,
    commands: Vec<Box<dyn Command>>,
}

impl Registry {
    pub fn new(database: Arc<dyn Database>, scripting: Arc<dyn ScriptingService>) -> Self {
        Self::with_commands(vec![
            Box::new(BackupCommand::new(scripting)),
            Box::new(RestoreCommand::new(database.clone())),
            Box::new(RestoreBakCommand::new(database)),
            Box::new(VersionCommand),
        ])
    }

    pub fn with_commands(commands: Vec<Box<dyn Command>>) -> Self {
        Self {
            catalog: Catalog::new(),
            commands,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn find(&self, name: &str) -> Option<&dyn Command> {
        self.commands
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .map(|c| &**c)
    }

    /// Primary names of the required flags `command` accepts that are absent
    /// from `args`.
    pub fn missing_arguments(&self, command: &dyn Command, args: &[String]) -> Vec<&'static str> {
        command
            .accepted_arguments(&self.catalog)
            .into_iter()
            .filter(|flag| flag.is_required() && !args::exists(*flag, args))
            .map(|flag| flag.primary_name())
            .collect()
    }

    pub fn usage(&self, width: Option<u16>, color: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Usage: dbcli <command> [flags]");
        let _ = writeln!(out);
        let _ = writeln!(out, "Commands:");
        let pad = self.commands.iter().map(|c| c.name().len()).max().unwrap_or(0);
        for c in &self.commands {
            let _ = writeln!(out, "  {:<pad$}  {}", c.name(), c.summary());
        }

        for c in &self.commands {
            let flags = c.accepted_arguments(&self.catalog);
            let _ = writeln!(out);
            let _ = writeln!(out, "{}: {}", c.name(), c.summary());
            if !flags.is_empty() {
                let rows: Vec<FlagRow> = flags.into_iter().map(FlagRow::from_flag).collect();
                let _ = writeln!(out, "{}", tables::table_string(rows, width, color));
            }
            if !c.examples().is_empty() {
                let _ = writeln!(out, "Examples:");
                for example in c.examples() {
                    let _ = writeln!(out, "  {example}");
                }
            }
        }
        out
    }
}

struct FlagRow {
    names: String,
    default: String,
    description: String,
}

impl FlagRow {
    fn from_flag(flag: &dyn Flag) -> Self {
        let default = if flag.is_required() {
            "(required)".to_string()
        } else {
            match flag.default_as_string() {
                Some(d) if d.is_empty() => "\"\"".to_string(),
                Some(d) => d,
                None => String::new(),
            }
        };
        Self {
            names: flag.names().join(", "),
            default,
            description: flag.description().to_string(),
        }
    }
}

impl tables::TableRow for FlagRow {
    const HEADERS: &'static [&'static str] = &["Flag", "Default", "Description"];
    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::new(&self.names),
            Cell::new(&self.default),
            Cell::new(&self.description),
        ]
    }
}

fn print_usage(registry: &Registry) {
    println!(
        "{}",
        registry.usage(tables::terminal_width(), tables::should_color())
    );
}

/// Resolves and runs the command named by `args[0]`; returns the exit code.
pub fn invoke(registry: &Registry, args: &[String]) -> i32 {
    let Some((name, rest)) = args.split_first() else {
        print_usage(registry);
        return 1;
    };
    if HELP_ALIASES.iter().any(|h| h.eq_ignore_ascii_case(name)) {
        print_usage(registry);
        return 1;
    }
    let Some(command) = registry.find(name) else {
        eprintln!("error: unknown command '{name}'");
        print_usage(registry);
        return 1;
    };

    let missing = registry.missing_arguments(command, rest);
    if !missing.is_empty() {
        for name in missing {
            eprintln!("error: missing required argument '{name}'");
        }
        return 1;
    }

    debug!("running {}", command.name());
    match command.execute(registry.catalog(), rest) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    }
}
