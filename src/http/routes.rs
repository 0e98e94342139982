//! Route table and handlers.
//!
//! - `GET /health` answers `ok`.
//! - `POST /{provider}/{action}` resolves the caller's credentials for the
//!   provider and runs the mapped tool on the provider's module.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::credentials::TokenRequirements;
use crate::mcp::InvokeOptions;
use crate::AppError;

use super::error::ApiError;
use super::state::AppState;

/// Request body of `POST /{provider}/{action}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeBody {
    /// Caller identity used for credential lookup.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Tool arguments; must be an object when present.
    #[serde(default)]
    pub args: Option<Value>,
}

/// Build the router over `state`.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/{provider}/{action}", post(invoke))
        .fallback(not_found)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn not_found() -> ApiError {
    ApiError::from(AppError::NotFound("no such route".into()))
}

async fn invoke(
    State(state): State<Arc<AppState>>,
    Path((provider_name, action)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let provider = state.config.provider(&provider_name)?;
    let tool = provider.tool_for(&action).ok_or_else(|| {
        AppError::NotFound(format!(
            "unknown action '{action}' for provider '{provider_name}'"
        ))
    })?;

    let body = parse_body(&body)?;
    let user_id = body
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing required field: userId".into()))?;
    let with_user = |error: AppError| ApiError::new(error, Some(user_id.clone()));

    let arguments = match body.args {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(with_user(AppError::BadRequest(
                "args must be a JSON object".into(),
            )))
        }
    };

    let requirements = TokenRequirements::from(provider);
    let credentials = state
        .resolver
        .resolve(&user_id, &provider_name, &requirements)
        .await
        .map_err(with_user)?;

    let options = InvokeOptions {
        access_token: provider
            .pass_access_token
            .then(|| credentials.access_token().map(str::to_owned))
            .flatten(),
        environment: credentials.environment,
        timeout_ms: provider.timeout_ms,
    };

    info!(
        user_id = user_id.as_str(),
        provider = provider_name.as_str(),
        action = action.as_str(),
        "invoking provider action"
    );

    let result = state
        .client
        .invoke(&provider.module, tool, arguments, options)
        .await
        .map_err(with_user)?;
    Ok(Json(result))
}

fn parse_body(raw: &[u8]) -> Result<InvokeBody, AppError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(InvokeBody::default());
    }
    serde_json::from_slice(raw)
        .map_err(|err| AppError::BadRequest(format!("invalid JSON body: {err}")))
}
