//! Tool registry
//!
//! Tool descriptions (JSON schemas) and dispatch into the memory façade.
//! The schemas are what `export-schema` dumps and what `tools/list` serves.

use serde::Serialize;
use serde_json::{Value, json};

use mnemo_core::{
    EventContext, EventKind, Memory, MemoryError, ResolutionIntent, SearchMode, Source,
};

use crate::protocol::types::JsonRpcError;
use crate::server::Role;

/// One advertised tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Minimum role required to call each tool.
pub fn required_role(tool: &str) -> Option<Role> {
    match tool {
        "get_decisions" | "get_recent_events" | "search_decisions" => Some(Role::Viewer),
        "record_decision" | "supersede_decision" | "process_event" => Some(Role::Agent),
        "run_decay" | "run_reflection" | "accept_proposal" => Some(Role::Admin),
        _ => None,
    }
}

/// All tool descriptions, in advertisement order.
pub fn descriptions() -> Vec<ToolDescription> {
    vec![
        ToolDescription {
            name: "record_decision".into(),
            description: "Record a new decision in semantic memory. Refused when an active \
                          decision already governs the target; supersede instead."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "target": {"type": "string", "description": "Area the decision governs"},
                    "rationale": {"type": "string"},
                    "consequences": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["title", "target", "rationale"]
            }),
        },
        ToolDescription {
            name: "supersede_decision".into(),
            description: "Replace active decisions on a target with a new one, rewriting the \
                          supersede graph atomically."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "target": {"type": "string"},
                    "rationale": {"type": "string"},
                    "old_decision_ids": {"type": "array", "items": {"type": "string"}},
                    "consequences": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["title", "target", "rationale", "old_decision_ids"]
            }),
        },
        ToolDescription {
            name: "process_event".into(),
            description: "Ingest one raw event through the routing pipeline.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source": {"type": "string", "enum": ["user", "agent", "system"]},
                    "kind": {"type": "string", "enum": [
                        "decision", "error", "config_change", "assumption",
                        "constraint", "result", "proposal"
                    ]},
                    "content": {"type": "string"},
                    "context": {"type": "object"},
                    "intent": {
                        "type": "object",
                        "properties": {
                            "resolution_type": {"type": "string", "enum": ["supersede", "deprecate", "abort"]},
                            "rationale": {"type": "string"},
                            "target_decision_ids": {"type": "array", "items": {"type": "string"}}
                        },
                        "required": ["resolution_type", "rationale", "target_decision_ids"]
                    }
                },
                "required": ["source", "kind", "content"]
            }),
        },
        ToolDescription {
            name: "get_decisions".into(),
            description: "List all record ids in the semantic store.".into(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescription {
            name: "get_recent_events".into(),
            description: "Recent episodic rows, newest first.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "integer", "minimum": 1, "default": 10},
                    "include_archived": {"type": "boolean", "default": false}
                }
            }),
        },
        ToolDescription {
            name: "search_decisions".into(),
            description: "Similarity search over decision records. Modes: strict (active \
                          decisions only), balanced (latest active per target), audit (full \
                          history)."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "default": 5},
                    "mode": {"type": "string", "enum": ["strict", "balanced", "audit"], "default": "balanced"}
                },
                "required": ["query"]
            }),
        },
        ToolDescription {
            name: "run_decay".into(),
            description: "Archive and prune stale episodic rows per the TTL policy.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "dry_run": {"type": "boolean", "default": false}
                }
            }),
        },
        ToolDescription {
            name: "run_reflection".into(),
            description: "Run one reflection cycle: cluster evidence, evaluate and decay \
                          hypotheses."
                .into(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescription {
            name: "accept_proposal".into(),
            description: "Activate a draft proposal, superseding the decisions it suggests."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "proposal_id": {"type": "string"}
                },
                "required": ["proposal_id"]
            }),
        },
    ]
}

/// Execute one tool call against the façade.
pub fn dispatch(memory: &Memory, tool: &str, args: &Value) -> Result<Value, JsonRpcError> {
    match tool {
        "record_decision" => {
            let title = require_str(args, "title")?;
            let target = require_str(args, "target")?;
            let rationale = require_str(args, "rationale")?;
            if rationale.trim().len() < 10 {
                return Err(JsonRpcError::invalid_params("rationale too short"));
            }
            let decision = memory
                .record_decision(title, target, rationale, string_list(args, "consequences"))
                .map_err(to_rpc_error)?;
            to_value(&decision)
        }
        "supersede_decision" => {
            let title = require_str(args, "title")?;
            let target = require_str(args, "target")?;
            let rationale = require_str(args, "rationale")?;
            let old_ids = string_list(args, "old_decision_ids");
            if old_ids.is_empty() {
                return Err(JsonRpcError::invalid_params("old_decision_ids is required"));
            }
            let decision = memory
                .supersede_decision(
                    title,
                    target,
                    rationale,
                    old_ids,
                    string_list(args, "consequences"),
                )
                .map_err(to_rpc_error)?;
            to_value(&decision)
        }
        "process_event" => {
            let source = Source::parse_name(require_str(args, "source")?);
            let kind = EventKind::parse_name(require_str(args, "kind")?)
                .ok_or_else(|| JsonRpcError::invalid_params("unknown event kind"))?;
            let content = require_str(args, "content")?;
            let context = match args.get("context") {
                Some(Value::Object(map)) => EventContext::Free(map.clone()),
                Some(_) => {
                    return Err(JsonRpcError::invalid_params("context must be an object"));
                }
                None => EventContext::default(),
            };
            let intent: Option<ResolutionIntent> = match args.get("intent") {
                Some(value) => Some(
                    serde_json::from_value(value.clone())
                        .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
                ),
                None => None,
            };
            let decision = memory
                .process_event(source, kind, content, context, intent)
                .map_err(to_rpc_error)?;
            to_value(&decision)
        }
        "get_decisions" => {
            let ids = memory.get_decisions().map_err(to_rpc_error)?;
            to_value(&ids)
        }
        "get_recent_events" => {
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
            let include_archived = args
                .get("include_archived")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let rows = memory
                .get_recent_events(limit, include_archived)
                .map_err(to_rpc_error)?;
            to_value(&rows)
        }
        "search_decisions" => {
            let query = require_str(args, "query")?;
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5) as usize;
            let mode = args
                .get("mode")
                .and_then(Value::as_str)
                .map(|s| {
                    SearchMode::parse_name(s)
                        .ok_or_else(|| JsonRpcError::invalid_params("unknown search mode"))
                })
                .transpose()?
                .unwrap_or(SearchMode::Balanced);
            let hits = memory
                .search_decisions(query, limit, mode)
                .map_err(to_rpc_error)?;
            to_value(&hits)
        }
        "run_decay" => {
            let dry_run = args.get("dry_run").and_then(Value::as_bool).unwrap_or(false);
            let report = memory.run_decay(dry_run).map_err(to_rpc_error)?;
            to_value(&report)
        }
        "run_reflection" => {
            let touched = memory.run_reflection().map_err(to_rpc_error)?;
            to_value(&touched)
        }
        "accept_proposal" => {
            let proposal_id = require_str(args, "proposal_id")?;
            let decision = memory.accept_proposal(proposal_id).map_err(to_rpc_error)?;
            to_value(&decision)
        }
        _ => Err(JsonRpcError::method_not_found()),
    }
}

fn require_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, JsonRpcError> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcError::invalid_params(&format!("{field} is required")))
}

fn string_list(args: &Value, field: &str) -> Vec<String> {
    args.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
}

fn to_rpc_error(err: MemoryError) -> JsonRpcError {
    match err {
        MemoryError::Permission(message) => JsonRpcError::permission_denied(&message),
        MemoryError::Schema(message) => JsonRpcError::invalid_params(&message),
        other => JsonRpcError::internal_error(&other.to_string()),
    }
}
