//! Program and execution handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::err::ApiError;
use crate::session::Registry;
use crate::svc::{Registers, StdinBody, StepKind};

/// Body of `POST /load`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct LoadBody {
    source: String,
    #[allow(dead_code)]
    filename: Option<String>,
}

pub(super) async fn load(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Json(body): Json<LoadBody>,
) -> Result<Response, ApiError> {
    let session = registry.get(id).await?;
    let reply = session.load(&body.source).await?;
    let status = if reply.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(reply)).into_response())
}

async fn step(
    registry: &Registry,
    id: Uuid,
    kind: StepKind,
) -> Result<Json<Registers>, ApiError> {
    let session = registry.get(id).await?;
    Ok(Json(session.step(kind).await?))
}

pub(super) async fn step_into(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Registers>, ApiError> {
    step(&registry, id, StepKind::Into).await
}

pub(super) async fn step_over(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Registers>, ApiError> {
    step(&registry, id, StepKind::Over).await
}

pub(super) async fn step_out(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Registers>, ApiError> {
    step(&registry, id, StepKind::Out).await
}

pub(super) async fn run(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.run().await?;
    Ok(Json(json!({ "running": true })))
}

pub(super) async fn stop(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.stop();
    Ok(Json(json!({ "stopping": true })))
}

pub(super) async fn reset(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.reset().await;
    Ok(Json(json!({ "reset": true })))
}

pub(super) async fn restart(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.restart().await;
    Ok(Json(json!({ "restarted": true })))
}

pub(super) async fn stdin(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Json(body): Json<StdinBody>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.send_stdin(&body.data).await?;
    Ok(Json(json!({ "queued": body.data.len() })))
}

/// Body of `POST /command`.
#[derive(Debug, Deserialize)]
pub(super) struct CommandBody {
    command: String,
}

pub(super) async fn command(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Json(body): Json<CommandBody>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    let output = session.command(&body.command).await?;
    Ok(Json(json!({ "output": output })))
}

/// Body of `POST /eval`.
#[derive(Debug, Deserialize)]
pub(super) struct EvalBody {
    expression: String,
}

pub(super) async fn eval(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Json(body): Json<EvalBody>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    let value = session.evaluate(&body.expression).await?;
    Ok(Json(json!({
        "expression": body.expression,
        "value": value,
        "hex": format!("{:#010x}", value as u32),
    })))
}
