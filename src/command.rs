use crate::args::Flag;
use crate::catalog::Catalog;

/// One top-level operation of the tool.
pub trait Command {
    /// Name the dispatcher matches, case-insensitively.
    fn name(&self) -> &'static str;

    fn summary(&self) -> &'static str;

    /// Flags this command reads, in the order usage lists them.
    fn accepted_arguments<'c>(&self, catalog: &'c Catalog) -> Vec<&'c dyn Flag>;

    /// Runs with the arguments that followed the command name. Required flags
    /// have already been checked for presence.
    fn execute(&self, catalog: &Catalog, args: &[String]) -> anyhow::Result<()>;

    /// Invocations shown under the command in usage.
    fn examples(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Prints the tool version.
#[derive(Debug, Default)]
pub struct VersionCommand;

impl Command for VersionCommand {
    fn name(&self) -> &'static str {
        "version"
    }

    fn summary(&self) -> &'static str {
        "Print the version and exit"
    }

    fn accepted_arguments<'c>(&self, _catalog: &'c Catalog) -> Vec<&'c dyn Flag> {
        Vec::new()
    }

    fn execute(&self, _catalog: &Catalog, _args: &[String]) -> anyhow::Result<()> {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        Ok(())
    }
}
