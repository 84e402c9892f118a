use serde::{Deserialize, Serialize};
use std::fmt;

/// A database object as the scripting service names it, e.g. `Table` / `Car`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptingObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

impl ScriptingObject {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self::new("Table", name)
    }

    pub fn matches(&self, other: &ScriptingObject) -> bool {
        self.kind.eq_ignore_ascii_case(&other.kind) && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl fmt::Display for ScriptingObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptMode {
    SchemaOnly,
    DataOnly,
    SchemaAndData,
}

impl ScriptMode {
    pub fn includes_schema(self) -> bool {
        matches!(self, ScriptMode::SchemaOnly | ScriptMode::SchemaAndData)
    }

    pub fn includes_data(self) -> bool {
        matches!(self, ScriptMode::DataOnly | ScriptMode::SchemaAndData)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectStatus {
    Completed,
    Failed,
}

/// Notifications a scripting pass emits while it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptingEvent {
    Progress {
        completed: u64,
        total: u64,
        status: ObjectStatus,
        object: ScriptingObject,
        error_message: Option<String>,
    },
    /// Always the last event of a pass.
    Complete {
        success: bool,
        error_message: Option<String>,
        error_details: Option<String>,
    },
}
