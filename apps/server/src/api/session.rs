//! Session lifecycle handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use super::CreateBody;
use crate::err::ApiError;
use crate::session::Registry;
use crate::svc::Summary;

pub(super) async fn create(
    State(registry): State<Arc<Registry>>,
    body: Option<Json<CreateBody>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let session = registry.create(body.memory_size).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "sessionId": session.id,
            "createdAt": session.created_at,
        })),
    ))
}

pub(super) async fn list(State(registry): State<Arc<Registry>>) -> Json<Value> {
    let mut sessions: Vec<Summary> = Vec::new();
    for session in registry.list().await {
        sessions.push(session.summary().await);
    }
    sessions.sort_by_key(|summary| summary.created_at);
    Json(json!({ "sessions": sessions }))
}

pub(super) async fn info(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::svc::Info>, ApiError> {
    let session = registry.get(id).await?;
    Ok(Json(session.info().await))
}

pub(super) async fn destroy(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    registry.destroy(id).await?;
    Ok(Json(json!({ "destroyed": id })))
}
