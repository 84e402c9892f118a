use crate::args::{Argument, Bytes, Flag};
use serde::Serialize;
use std::fmt;

/// Server names starting with this marker refer to a local, per-user
/// instance that authenticates as the calling OS user.
pub const LOCAL_INSTANCE_MARKER: &str = "(localdb)";

// Flag names follow sqlcmd where an equivalent exists.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub server: Argument<String>,
    pub database: Argument<String>,
    pub user: Argument<String>,
    pub password: Argument<String>,
    pub input_file: Argument<String>,
    pub output_file: Argument<String>,
    pub exclude_table: Argument<String>,
    pub schema_only: Argument<bool>,
    pub timeout: Argument<u32>,
    pub batch_size: Argument<Bytes>,
    pub verbose: Argument<bool>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            server: Argument::string("-S", &["--server"])
                .describe("Database host")
                .default_value("localhost".into()),
            database: Argument::string("-d", &["--database-name"])
                .describe("Database name")
                .required(),
            user: Argument::string("-U", &["--user-name"])
                .describe("Database username")
                .default_value("sa".into()),
            password: Argument::string("-P", &["--password"])
                .describe("Database password")
                .default_value(String::new()),
            input_file: Argument::string("-i", &["--input-file"])
                .describe("Input script path")
                .required(),
            output_file: Argument::string("-o", &["--output-file"])
                .describe("Output script path"),
            exclude_table: Argument::string("--exclude-table", &[])
                .describe("Exclude data from a table. May be specified multiple times"),
            schema_only: Argument::switch("--schema-only", &[])
                .describe("Export the database schema without including table data"),
            timeout: Argument::integer("-t", &["--query-timeout"])
                .describe("Query timeout for individual statements, in seconds")
                .default_value(10),
            batch_size: Argument::bytes("--batch-size", &[])
                .describe("Transaction batch size (e.g. 512k, 1M)")
                .default_value(Bytes::new("1M", 1_000_000)),
            verbose: Argument::switch("-v", &["--verbose"]).describe("Enable debug logging"),
        }
    }

    /// Every flag, in the order they are listed in help output.
    pub fn all(&self) -> Vec<&dyn Flag> {
        vec![
            &self.server as &dyn Flag,
            &self.database,
            &self.user,
            &self.password,
            &self.input_file,
            &self.output_file,
            &self.timeout,
            &self.exclude_table,
            &self.schema_only,
            &self.batch_size,
            &self.verbose,
        ]
    }

    pub fn connection_params(&self, args: &[String]) -> anyhow::Result<ConnectionParams> {
        let database = self.database.require(args)?;
        let server = self.server.get_or_default(args).unwrap_or_default();
        let integrated_security = is_local_instance(&server);
        Ok(ConnectionParams {
            server,
            database,
            user: self.user.get_or_default(args).unwrap_or_default(),
            password: self.password.get_or_default(args).unwrap_or_default(),
            timeout_secs: self.timeout.get_or_default(args).unwrap_or_default(),
            integrated_security,
        })
    }
}

pub fn is_local_instance(server: &str) -> bool {
    server
        .get(..LOCAL_INSTANCE_MARKER.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(LOCAL_INSTANCE_MARKER))
}

/// Resolved connection target. `Display` renders the driver descriptor string.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionParams {
    pub server: String,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub timeout_secs: u32,
    pub integrated_security: bool,
}

impl ConnectionParams {
    /// Descriptor with the password masked, for logs.
    pub fn redacted(&self) -> String {
        let mut masked = self.clone();
        if !masked.password.is_empty() {
            masked.password = "***".into();
        }
        masked.to_string()
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Data Source={};Initial Catalog={};",
            self.server, self.database
        )?;
        if self.integrated_security {
            f.write_str("Integrated Security=True;")?;
        } else {
            write!(f, "User ID={};Password={};", self.user, self.password)?;
        }
        write!(
            f,
            "Connect Timeout={0};Command Timeout={0};Encrypt=False",
            self.timeout_secs
        )
    }
}
