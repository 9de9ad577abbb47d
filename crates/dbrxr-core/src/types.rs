// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain types shared by the session manager.
//!
//! These are independent of the remote API version; the `wire` module maps
//! the JSON payloads onto them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Language tag attached to a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    R,
    Scala,
    Sql,
}

impl Language {
    /// Wire name of the language.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::R => "r",
            Language::Scala => "scala",
            Language::Sql => "sql",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "r" => Ok(Language::R),
            "scala" => Ok(Language::Scala),
            "sql" => Ok(Language::Sql),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

/// Which interpreter a package is installed into.
///
/// The host runtime is the one the execution context is created for
/// (Python); the guest runtime (R) is reached through the interpreter
/// bridge running inside the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Host,
    Guest,
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runtime::Host => f.write_str("host"),
            Runtime::Guest => f.write_str("guest"),
        }
    }
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" | "python" => Ok(Runtime::Host),
            "guest" | "r" => Ok(Runtime::Guest),
            other => Err(format!("unsupported runtime: {}", other)),
        }
    }
}

/// Lifecycle state of an execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextState {
    Pending,
    Running,
    Error,
    /// Torn down. Handles are dropped on destroy, so this only shows up in
    /// values built by callers.
    Destroyed,
    /// A status string this client does not know; treated as transient.
    Unknown(String),
}

impl ContextState {
    /// Parse a remote status string.
    pub fn from_wire(status: &str) -> Self {
        match status {
            "Pending" => ContextState::Pending,
            "Running" => ContextState::Running,
            "Error" => ContextState::Error,
            other => ContextState::Unknown(other.to_string()),
        }
    }
}

/// Remote view of a context, as returned by a status call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextStatus {
    pub context_id: String,
    pub state: ContextState,
}

/// Local handle to the live execution context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextHandle {
    /// Remote context id.
    pub context_id: String,
    /// Cluster the context lives on.
    pub cluster_id: String,
    /// Name given at creation.
    pub name: String,
    /// When the create call returned.
    pub created_at: DateTime<Utc>,
    pub state: ContextState,
}

/// Command state as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandState {
    Queued,
    Running,
    Cancelling,
    Finished,
    Error,
    Cancelled,
    /// Unrecognized status string. Treated as "still running".
    Unknown(String),
}

impl CommandState {
    /// Parse a remote status string.
    pub fn from_wire(status: &str) -> Self {
        match status {
            "Queued" => CommandState::Queued,
            "Running" => CommandState::Running,
            "Cancelling" => CommandState::Cancelling,
            "Finished" => CommandState::Finished,
            "Error" => CommandState::Error,
            "Cancelled" => CommandState::Cancelled,
            other => CommandState::Unknown(other.to_string()),
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandState::Finished | CommandState::Error | CommandState::Cancelled
        )
    }

    /// Position in the forward-only lifecycle. Unknown states have no rank.
    fn rank(&self) -> Option<u8> {
        match self {
            CommandState::Queued => Some(0),
            CommandState::Running => Some(1),
            CommandState::Cancelling => Some(2),
            CommandState::Finished | CommandState::Error | CommandState::Cancelled => Some(3),
            CommandState::Unknown(_) => None,
        }
    }

    /// Whether moving from `self` to `next` goes forward (or stays put).
    pub fn can_advance_to(&self, next: &CommandState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(current), Some(next)) => next >= current,
            _ => true,
        }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandState::Unknown(raw) => write!(f, "{} (unrecognized)", raw),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Remote error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub summary: String,
    pub trace: String,
}

/// A column of a tabular result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

/// Payload of a finished command.
///
/// Serializes as the payload itself: text as a string, tables as
/// `{columns, rows, truncated}`, opaque results as the raw value and `Empty`
/// as `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultData {
    /// Command produced no output.
    Empty,
    /// Text output (stdout or the repr of the last expression).
    Text { text: String },
    /// Rows of named columns.
    Table {
        columns: Vec<Column>,
        rows: Vec<Vec<Value>>,
        truncated: bool,
    },
    /// A result shape this client does not model, passed through as-is.
    Opaque {
        result_type: Option<String>,
        raw: Value,
    },
    /// Remote failure.
    Error(ErrorPayload),
}

impl ResultData {
    /// Text output, if this is a text result.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResultData::Text { text } => Some(text),
            _ => None,
        }
    }
}

impl Serialize for ResultData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResultData::Empty => serializer.serialize_none(),
            ResultData::Text { text } => serializer.serialize_str(text),
            ResultData::Table {
                columns,
                rows,
                truncated,
            } => {
                let mut table = serializer.serialize_struct("Table", 3)?;
                table.serialize_field("columns", columns)?;
                table.serialize_field("rows", rows)?;
                table.serialize_field("truncated", truncated)?;
                table.end()
            }
            ResultData::Opaque { raw, .. } => raw.serialize(serializer),
            ResultData::Error(payload) => payload.serialize(serializer),
        }
    }
}

/// One observation of a command's state.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandStatus {
    pub command_id: String,
    pub state: CommandState,
    pub result: Option<ResultData>,
}

/// A submitted command, tracked locally while it is polled.
#[derive(Debug, Clone)]
pub struct Command {
    pub command_id: String,
    pub context_id: String,
    pub language: Language,
    pub source_text: String,
    pub state: CommandState,
    pub result: Option<ResultData>,
}

impl Command {
    pub fn submitted(
        command_id: String,
        context_id: &str,
        language: Language,
        source_text: &str,
    ) -> Self {
        Self {
            command_id,
            context_id: context_id.to_string(),
            language,
            source_text: source_text.to_string(),
            state: CommandState::Queued,
            result: None,
        }
    }

    /// Apply an observed status. Returns false when the observation would move
    /// the command backwards, in which case it is ignored.
    pub fn observe(&mut self, status: CommandStatus) -> bool {
        if !self.state.can_advance_to(&status.state) {
            return false;
        }
        // Unknown states never overwrite a known one.
        if !matches!(status.state, CommandState::Unknown(_)) {
            self.state = status.state;
        }
        if status.result.is_some() {
            self.result = status.result;
        }
        true
    }
}

/// Outcome reported back to callers of `execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

/// `{status, data, error?}` as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command_id: String,
    pub data: ResultData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl CommandResult {
    /// Successful result. Trailing newlines of text output are dropped.
    pub fn ok(command_id: impl Into<String>, data: ResultData) -> Self {
        let data = match data {
            ResultData::Text { text } => ResultData::Text {
                text: text.trim_end_matches(['\n', '\r']).to_string(),
            },
            other => other,
        };
        Self {
            status: ResultStatus::Ok,
            command_id: command_id.into(),
            data,
            error: None,
        }
    }

    /// Failed result carrying the remote error. `command_id` may be empty when
    /// the failure is reported without one.
    pub fn error(command_id: impl Into<String>, error: ErrorPayload) -> Self {
        Self {
            status: ResultStatus::Error,
            command_id: command_id.into(),
            data: ResultData::Empty,
            error: Some(error),
        }
    }

    /// Text output, trimmed of trailing newlines.
    pub fn text(&self) -> Option<&str> {
        self.data.as_text().map(|t| t.trim_end_matches(['\n', '\r']))
    }
}

/// Result of a package installation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallOutcome {
    /// Package was importable before anything was installed.
    AlreadyPresent,
    /// Package was installed and verified.
    Installed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_state_from_wire() {
        assert_eq!(CommandState::from_wire("Queued"), CommandState::Queued);
        assert_eq!(CommandState::from_wire("Finished"), CommandState::Finished);
        assert_eq!(
            CommandState::from_wire("Paused"),
            CommandState::Unknown("Paused".to_string())
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(CommandState::Finished.is_terminal());
        assert!(CommandState::Error.is_terminal());
        assert!(CommandState::Cancelled.is_terminal());
        assert!(!CommandState::Running.is_terminal());
        assert!(!CommandState::Unknown("X".into()).is_terminal());
    }

    #[test]
    fn test_command_only_moves_forward() {
        let mut cmd = Command::submitted("c1".into(), "ctx", Language::Python, "1");
        let status = |state| CommandStatus {
            command_id: "c1".into(),
            state,
            result: None,
        };

        assert!(cmd.observe(status(CommandState::Running)));
        assert!(!cmd.observe(status(CommandState::Queued)));
        assert_eq!(cmd.state, CommandState::Running);

        assert!(cmd.observe(status(CommandState::Unknown("Warming".into()))));
        assert_eq!(cmd.state, CommandState::Running);

        assert!(cmd.observe(status(CommandState::Finished)));
        assert!(!cmd.observe(status(CommandState::Running)));
        assert_eq!(cmd.state, CommandState::Finished);
    }

    #[test]
    fn test_language_parse() {
        assert_eq!("R".parse::<Language>().unwrap(), Language::R);
        assert_eq!("py".parse::<Language>().unwrap(), Language::Python);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_command_result_serialization() {
        let result = CommandResult::ok(
            "cmd-1",
            ResultData::Text {
                text: "2\n".to_string(),
            },
        );
        assert_eq!(result.text(), Some("2"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["data"], "2");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_table_and_empty_serialize_bare() {
        let table = CommandResult::ok(
            "cmd-2",
            ResultData::Table {
                columns: vec![Column {
                    name: "x".to_string(),
                    data_type: Some("int".to_string()),
                }],
                rows: vec![vec![serde_json::json!(1)]],
                truncated: false,
            },
        );
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(
            json["data"],
            serde_json::json!({
                "columns": [{"name": "x", "type": "int"}],
                "rows": [[1]],
                "truncated": false
            })
        );

        let empty = serde_json::to_value(CommandResult::ok("cmd-3", ResultData::Empty)).unwrap();
        assert!(empty["data"].is_null());
    }

    #[test]
    fn test_error_result_serialization() {
        let result = CommandResult::error(
            "",
            ErrorPayload {
                summary: "boom".to_string(),
                trace: "Traceback".to_string(),
            },
        );
        assert_eq!(result.status, ResultStatus::Error);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "error",
                "data": null,
                "error": {"summary": "boom", "trace": "Traceback"}
            })
        );
    }
}
