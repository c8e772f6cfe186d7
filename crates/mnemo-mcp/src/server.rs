//! RPC Server Core
//!
//! Stateless adapter over the memory façade: routes JSON-RPC requests to
//! tool handlers and enforces the session role on every call.

use clap::ValueEnum;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use mnemo_core::Memory;

use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use crate::tools;

/// Session role; each tool demands a minimum role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    Viewer,
    Agent,
    Admin,
}

impl Role {
    fn rank(self) -> u8 {
        match self {
            Role::Viewer => 0,
            Role::Agent => 1,
            Role::Admin => 2,
        }
    }

    pub fn allows(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }
}

/// JSON-RPC server bound to one memory instance and one role.
pub struct RpcServer {
    memory: Memory,
    server_name: String,
    role: Role,
    initialized: bool,
}

impl RpcServer {
    pub fn new(memory: Memory, server_name: impl Into<String>, role: Role) -> Self {
        Self {
            memory,
            server_name: server_name.into(),
            role,
            initialized: false,
        }
    }

    /// Handle one request; notifications produce no response.
    pub fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "notifications/initialized" => return None,
            "tools/list" => Ok(json!({
                "tools": tools::descriptions(),
            })),
            "tools/call" => self.handle_tools_call(request.params),
            "ping" => Ok(json!({})),
            method => {
                warn!("unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self) -> Result<Value, JsonRpcError> {
        self.initialized = true;
        info!(role = ?self.role, "session initialized");
        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": self.server_name,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {
                "tools": { "listChanged": false },
            },
            "instructions": "Durable knowledge memory for this project. Record decisions with \
                             record_decision, evolve them with supersede_decision, and query \
                             what is currently in force with search_decisions(mode='strict').",
        }))
    }

    fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("missing tool name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let required = tools::required_role(name).ok_or_else(JsonRpcError::method_not_found)?;
        if !self.role.allows(required) {
            warn!(tool = name, role = ?self.role, "permission denied");
            return Err(JsonRpcError::permission_denied(&format!(
                "tool '{name}' requires the {required:?} role"
            )));
        }

        let result = tools::dispatch(&self.memory, name, &arguments)?;
        let text = serde_json::to_string(&result)
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))?;
        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "isError": false,
        }))
    }
}
