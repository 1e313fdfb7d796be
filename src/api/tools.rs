use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{collections::BTreeMap, sync::Arc};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::middleware::AuthPrincipal,
    error::{AppError, AppResult},
    models::AppState,
};

/// Handler variants a tool name can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolHandler {
    WhoAmI,
    Echo,
}

impl ToolHandler {
    fn run(self, principal: &AuthPrincipal, arguments: &Value) -> AppResult<Value> {
        match self {
            ToolHandler::WhoAmI => Ok(json!({
                "principal_id": principal.principal_id,
                "client_id": principal.client_id,
                "scopes": principal.scopes,
            })),
            ToolHandler::Echo => {
                let message = arguments
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AppError::Validation("'message' must be a string".to_string())
                    })?;
                Ok(json!({ "message": message }))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub required_scope: &'static str,
    pub handler: ToolHandler,
    pub input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolView {
    pub name: String,
    pub description: String,
    pub required_scope: String,
    #[schema(value_type = Object)]
    pub input_schema: Value,
}

impl From<&ToolDefinition> for ToolView {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.to_string(),
            required_scope: tool.required_scope.to_string(),
            input_schema: tool.input_schema.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ToolCall {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub arguments: Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolResult {
    pub tool: String,
    #[schema(value_type = Object)]
    pub result: Value,
}

/// Tools resolved once at startup.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, ToolDefinition>,
}

impl ToolRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(ToolDefinition {
            name: "whoami",
            description: "Describe the authenticated principal and its granted scopes",
            required_scope: "read",
            handler: ToolHandler::WhoAmI,
            input_schema: json!({ "type": "object", "properties": {} }),
        });
        registry.register(ToolDefinition {
            name: "echo",
            description: "Return the supplied message",
            required_scope: "write",
            handler: ToolHandler::Echo,
            input_schema: json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            }),
        });
        registry
    }

    pub fn register(&mut self, tool: ToolDefinition) {
        self.tools.insert(tool.name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values()
    }
}

// GET /api/tools
#[utoipa::path(
    get,
    path = "/api/tools",
    responses(
        (status = 200, description = "Available tools", body = [ToolView]),
        (status = 401, description = "Missing or invalid bearer token", body = crate::error::ErrorBody),
        (status = 429, description = "Rate limited", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "tools"
)]
pub async fn list_tools(
    _principal: AuthPrincipal,
    State(state): State<Arc<AppState>>,
) -> Json<Vec<ToolView>> {
    Json(state.tools.list().map(ToolView::from).collect())
}

// POST /api/tools/{name}
#[utoipa::path(
    post,
    path = "/api/tools/{name}",
    params(("name" = String, Path, description = "Tool name")),
    request_body = ToolCall,
    responses(
        (status = 200, description = "Tool output", body = ToolResult),
        (status = 400, description = "Invalid arguments", body = crate::error::ErrorBody),
        (status = 401, description = "Missing or invalid bearer token", body = crate::error::ErrorBody),
        (status = 403, description = "Missing required scope", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown tool", body = crate::error::ErrorBody),
        (status = 429, description = "Rate limited", body = crate::error::ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "tools"
)]
pub async fn execute_tool(
    principal: AuthPrincipal,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    WithRejection(Json(call), _): WithRejection<Json<ToolCall>, AppError>,
) -> AppResult<Json<ToolResult>> {
    let tool = state.tools.get(&name).ok_or(AppError::NotFound)?;
    principal.require_scope(tool.required_scope)?;

    let result = tool.handler.run(&principal, &call.arguments)?;
    info!(tool = tool.name, principal_id = %principal.principal_id, "tool executed");

    Ok(Json(ToolResult {
        tool: tool.name.to_string(),
        result,
    }))
}
