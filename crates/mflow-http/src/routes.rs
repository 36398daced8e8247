use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use mflow_core::ParameterMap;
use serde_json::{json, Value};

use crate::envelope::{Envelope, HttpError};
use crate::AppState;

fn parse_optional_params(body: &[u8]) -> Result<ParameterMap, HttpError> {
    if body.is_empty() {
        return Ok(ParameterMap::new());
    }
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        HttpError(mflow_core::NodeError::InvalidParameter {
            name: "body".to_string(),
            reason: format!("expected a JSON object of parameters: {e}"),
        })
    })?;
    match value {
        // `preserve_order` keeps `serde_json::Map` insertion-ordered, so this
        // collects straight into a `ParameterMap` without re-sorting.
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(ParameterMap::new()),
        _ => Err(HttpError(mflow_core::NodeError::InvalidParameter {
            name: "body".to_string(),
            reason: "expected a JSON object of parameters".to_string(),
        })),
    }
}

pub async fn help(State(state): State<AppState>) -> Result<Envelope, HttpError> {
    let text = state.manager.describe().await?;
    Ok(Envelope::ok(json!(text)))
}

pub async fn status(State(state): State<AppState>) -> Result<Envelope, HttpError> {
    let is_running = state.manager.is_running().await?;
    let processor_name = state.manager.describe().await?;
    let parameters = state.manager.get_parameters().await?;
    Ok(Envelope::ok(json!({
        "processor_name": processor_name,
        "is_running": is_running,
        "parameters": parameters,
    })))
}

pub async fn get_parameters(State(state): State<AppState>) -> Result<Envelope, HttpError> {
    let parameters = state.manager.get_parameters().await?;
    Ok(Envelope::ok(json!(parameters)))
}

pub async fn set_parameters(
    State(state): State<AppState>,
    Json(params): Json<ParameterMap>,
) -> Result<Envelope, HttpError> {
    state.manager.set_parameters(params).await?;
    Ok(Envelope::ok_empty())
}

pub async fn statistics(State(state): State<AppState>) -> Result<Envelope, HttpError> {
    let snapshot = state.manager.get_statistics().await?;
    Ok(Envelope::ok(json!(snapshot)))
}

pub async fn statistics_raw(State(state): State<AppState>) -> Result<Envelope, HttpError> {
    let raw = state.manager.get_statistics_raw().await?;
    Ok(Envelope::ok(json!(raw)))
}

pub async fn start(State(state): State<AppState>, body: axum::body::Bytes) -> Result<Envelope, HttpError> {
    let params = parse_optional_params(&body)?;
    if !params.is_empty() {
        state.manager.set_parameters(params).await?;
    }
    state.manager.start().await?;
    Ok(Envelope::ok_empty())
}

pub async fn stop(State(state): State<AppState>) -> Result<Envelope, HttpError> {
    state.manager.stop().await?;
    Ok(Envelope::ok_empty())
}

pub async fn reset(State(state): State<AppState>) -> Result<Envelope, HttpError> {
    let parameters = state.manager.reset().await?;
    Ok(Envelope::ok(json!(parameters)))
}

pub async fn logging_get(State(state): State<AppState>) -> Result<Envelope, HttpError> {
    let levels = state.logging.as_map()?;
    Ok(Envelope::ok(json!(levels)))
}

pub async fn logging_post(
    State(state): State<AppState>,
    Json(levels): Json<BTreeMap<String, String>>,
) -> Result<Envelope, HttpError> {
    state.logging.set_map(levels)?;
    Ok(Envelope::ok_empty())
}

/// `DELETE kill` stops the manager and asks the owning server to begin
/// graceful shutdown. The connection may close before the client observes
/// the response, matching the distilled contract's "(may close connection)".
pub async fn kill(State(state): State<AppState>) -> Result<Envelope, HttpError> {
    state.manager.stop().await?;
    state.shutdown.notify_one();
    Ok(Envelope::ok_empty())
}
