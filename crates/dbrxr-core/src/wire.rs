// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command execution API 1.2 message shapes.
//!
//! Everything that knows the remote JSON layout lives here. The rest of the
//! crate only sees the domain types from [`crate::types`], so a new status
//! name or result tag is absorbed by this adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    Column, CommandState, CommandStatus, ContextState, ContextStatus, ErrorPayload, ResultData,
};

/// API version segment appended to the workspace host.
pub const API_VERSION: &str = "1.2";

#[derive(Serialize, Debug)]
pub struct ContextCreateRequest<'a> {
    pub language: &'a str,
    #[serde(rename = "clusterId")]
    pub cluster_id: &'a str,
    pub name: &'a str,
}

#[derive(Serialize, Debug)]
pub struct ContextRequest<'a> {
    #[serde(rename = "clusterId")]
    pub cluster_id: &'a str,
    #[serde(rename = "contextId")]
    pub context_id: &'a str,
}

#[derive(Serialize, Debug)]
pub struct CommandExecuteRequest<'a> {
    pub language: &'a str,
    #[serde(rename = "clusterId")]
    pub cluster_id: &'a str,
    #[serde(rename = "contextId")]
    pub context_id: &'a str,
    pub command: &'a str,
}

/// `{ "id": ... }`, returned by context create and command execute.
#[derive(Deserialize, Debug)]
pub struct IdResponse {
    pub id: String,
}

#[derive(Deserialize, Debug)]
pub struct ContextStatusResponse {
    pub id: String,
    pub status: String,
}

#[derive(Deserialize, Debug)]
pub struct CommandStatusResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub results: Option<Value>,
}

impl From<ContextStatusResponse> for ContextStatus {
    fn from(resp: ContextStatusResponse) -> Self {
        ContextStatus {
            context_id: resp.id,
            state: ContextState::from_wire(&resp.status),
        }
    }
}

impl From<CommandStatusResponse> for CommandStatus {
    fn from(resp: CommandStatusResponse) -> Self {
        CommandStatus {
            command_id: resp.id,
            state: CommandState::from_wire(&resp.status),
            result: resp.results.and_then(parse_results),
        }
    }
}

/// Map a `results` object onto [`ResultData`].
///
/// `null` maps to `None`. Shapes we do not model come back as
/// [`ResultData::Opaque`] instead of failing.
pub fn parse_results(results: Value) -> Option<ResultData> {
    if results.is_null() {
        return None;
    }

    let result_type = results
        .get("resultType")
        .and_then(Value::as_str)
        .map(str::to_string);

    let data = match result_type.as_deref() {
        Some("text") => match results.get("data") {
            None | Some(Value::Null) => ResultData::Empty,
            Some(Value::String(text)) => ResultData::Text {
                text: text.trim_end_matches(['\n', '\r']).to_string(),
            },
            Some(_) => opaque(result_type.clone(), results),
        },
        Some("table") => parse_table(&results).unwrap_or_else(|| opaque(result_type, results)),
        Some("error") => ResultData::Error(ErrorPayload {
            summary: string_field(&results, "summary")
                .or_else(|| string_field(&results, "cause"))
                .unwrap_or_default(),
            trace: string_field(&results, "cause").unwrap_or_default(),
        }),
        None if results.get("data").is_none() => ResultData::Empty,
        _ => opaque(result_type, results),
    };

    Some(data)
}

fn parse_table(results: &Value) -> Option<ResultData> {
    let rows = results.get("data")?.as_array()?;
    let rows = rows
        .iter()
        .map(|row| row.as_array().cloned())
        .collect::<Option<Vec<_>>>()?;

    let columns = match results.get("schema") {
        Some(schema) => serde_json::from_value::<Vec<Column>>(schema.clone()).ok()?,
        None => Vec::new(),
    };

    let truncated = results
        .get("truncated")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Some(ResultData::Table {
        columns,
        rows,
        truncated,
    })
}

fn opaque(result_type: Option<String>, raw: Value) -> ResultData {
    ResultData::Opaque { result_type, raw }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(body: Value) -> CommandStatus {
        serde_json::from_value::<CommandStatusResponse>(body)
            .unwrap()
            .into()
    }

    #[test]
    fn test_text_result() {
        let s = status(json!({
            "id": "cmd-1",
            "status": "Finished",
            "results": {"resultType": "text", "data": "2"}
        }));
        assert_eq!(s.state, CommandState::Finished);
        assert_eq!(
            s.result,
            Some(ResultData::Text {
                text: "2".to_string()
            })
        );
    }

    #[test]
    fn test_text_result_drops_trailing_newline() {
        let s = status(json!({
            "id": "cmd-1",
            "status": "Finished",
            "results": {"resultType": "text", "data": "[1] 2\r\n"}
        }));
        assert_eq!(s.result.as_ref().and_then(ResultData::as_text), Some("[1] 2"));
    }

    #[test]
    fn test_running_without_results() {
        let s = status(json!({"id": "cmd-1", "status": "Running"}));
        assert_eq!(s.state, CommandState::Running);
        assert!(s.result.is_none());

        let s = status(json!({"id": "cmd-1", "status": "Queued", "results": null}));
        assert!(s.result.is_none());
    }

    #[test]
    fn test_error_result_keeps_summary_and_cause() {
        let s = status(json!({
            "id": "cmd-2",
            "status": "Finished",
            "results": {
                "resultType": "error",
                "summary": "RRuntimeError: could not find function \"undefined_fn\"",
                "cause": "Traceback (most recent call last): ..."
            }
        }));
        match s.result {
            Some(ResultData::Error(payload)) => {
                assert!(payload.summary.contains("could not find function"));
                assert!(payload.trace.starts_with("Traceback"));
            }
            other => panic!("expected error payload, got {:?}", other),
        }
    }

    #[test]
    fn test_table_result() {
        let s = status(json!({
            "id": "cmd-3",
            "status": "Finished",
            "results": {
                "resultType": "table",
                "schema": [{"name": "quality", "type": "double"}],
                "data": [[5.1], [5.4]],
                "truncated": false
            }
        }));
        match s.result {
            Some(ResultData::Table {
                columns,
                rows,
                truncated,
            }) => {
                assert_eq!(columns[0].name, "quality");
                assert_eq!(columns[0].data_type.as_deref(), Some("double"));
                assert_eq!(rows.len(), 2);
                assert!(!truncated);
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_shape_is_opaque() {
        let s = status(json!({
            "id": "cmd-4",
            "status": "Finished",
            "results": {"resultType": "images", "fileNames": ["/plots/a.png"]}
        }));
        match s.result {
            Some(ResultData::Opaque { result_type, raw }) => {
                assert_eq!(result_type.as_deref(), Some("images"));
                assert_eq!(raw["fileNames"][0], "/plots/a.png");
            }
            other => panic!("expected opaque, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_status_string() {
        let s = status(json!({"id": "cmd-5", "status": "Rebalancing"}));
        assert_eq!(s.state, CommandState::Unknown("Rebalancing".to_string()));
    }

    #[test]
    fn test_request_field_names() {
        let req = CommandExecuteRequest {
            language: "python",
            cluster_id: "0101-abc",
            context_id: "ctx-1",
            command: "print(1)",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["clusterId"], "0101-abc");
        assert_eq!(json["contextId"], "ctx-1");
        assert_eq!(json["command"], "print(1)");
    }
}
