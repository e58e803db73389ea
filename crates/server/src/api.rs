//! Agent HTTP API.
//!
//! The caller's ID token arrives as the bearer credential. Each request gets
//! its own [`progear_agent::SalesAgent`], so cached tokens live exactly as long
//! as the request that obtained them.

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use progear_agent::{TaskContext, TaskResult, ToolResult};
use progear_core::{ApplicationError, InterfaceError};
use progear_identity::UserAssertion;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bootstrap::AppState;

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            InterfaceError::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.error_code().to_string(),
            message: format!("{} {}", self.0.user_message(), self.0.message()),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/tools/", post(call_unnamed_tool))
        .route("/api/tools/{name}", post(call_tool))
        .with_state(state)
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<TaskResult>, ApiError> {
    let Json(request) = body.map_err(|rejection| bad_body(&headers, rejection))?;
    let context = task_context(&headers, request.context);
    let assertion = bearer_assertion(&headers, &context.correlation_id)?;

    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApplicationError::from(progear_core::DomainError::InvariantViolation(
            "message must not be empty".to_string(),
        ))
        .into_interface(&context.correlation_id)
        .into());
    }

    info!(
        event_name = "api.chat.received",
        correlation_id = %context.correlation_id,
        agent_id = state.identity.id(),
        "chat request received"
    );

    let agent = state.agent_for(assertion);
    match tokio::time::timeout(state.request_timeout, agent.process(message, &context)).await {
        Ok(result) => Ok(Json(result)),
        Err(_) => {
            warn!(
                event_name = "api.chat.timed_out",
                correlation_id = %context.correlation_id,
                agent_id = state.identity.id(),
                timeout_secs = state.request_timeout.as_secs(),
                "chat request exceeded request timeout"
            );
            Err(ApplicationError::Timeout(format!(
                "task did not finish within {}s",
                state.request_timeout.as_secs()
            ))
            .into_interface(&context.correlation_id)
            .into())
        }
    }
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ToolResult>, ApiError> {
    invoke_tool(state, name, headers, body).await
}

/// `POST /api/tools/` carries an empty tool name; the agent rejects it as a bad request.
async fn call_unnamed_tool(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ToolResult>, ApiError> {
    invoke_tool(state, String::new(), headers, body).await
}

async fn invoke_tool(
    state: AppState,
    name: String,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ToolResult>, ApiError> {
    let Json(params) = body.map_err(|rejection| bad_body(&headers, rejection))?;
    let context = task_context(&headers, None);
    let assertion = bearer_assertion(&headers, &context.correlation_id)?;

    let agent = state.agent_for(assertion);
    let call = agent.call_tool(&name, params, &context);
    match tokio::time::timeout(state.request_timeout, call).await {
        Ok(Ok(result)) => Ok(Json(result)),
        Ok(Err(error)) => {
            warn!(
                event_name = "api.tool.failed",
                correlation_id = %context.correlation_id,
                agent_id = state.identity.id(),
                tool = %name,
                error = %error,
                "tool call failed"
            );
            Err(ApplicationError::from(error).into_interface(&context.correlation_id).into())
        }
        Err(_) => Err(ApplicationError::Timeout(format!("tool `{name}` timed out"))
            .into_interface(&context.correlation_id)
            .into()),
    }
}

fn bad_body(headers: &HeaderMap, rejection: JsonRejection) -> ApiError {
    InterfaceError::BadRequest {
        message: rejection.body_text(),
        correlation_id: correlation_id(headers),
    }
    .into()
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn task_context(headers: &HeaderMap, extra: Option<Map<String, Value>>) -> TaskContext {
    let correlation_id = correlation_id(headers);

    let metadata = extra
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(text) => (key, text),
            other => (key, other.to_string()),
        })
        .collect::<BTreeMap<_, _>>();

    TaskContext { correlation_id, metadata }
}

fn bearer_assertion(headers: &HeaderMap, correlation_id: &str) -> Result<UserAssertion, ApiError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty());

    match token {
        Some(token) => Ok(UserAssertion::new(token)),
        None => Err(ApplicationError::Authentication(
            "an `Authorization: Bearer <id token>` header is required".to_string(),
        )
        .into_interface(correlation_id)
        .into()),
    }
}
