//! Breakpoint and watchpoint handlers.

use std::sync::Arc;

use armlet::arch::Word;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::err::ApiError;
use crate::session::Registry;

#[derive(Debug, Deserialize)]
pub(super) struct BreakpointBody {
    address: Word,
    condition: Option<String>,
}

pub(super) async fn add_breakpoint(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Json(body): Json<BreakpointBody>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session
        .add_breakpoint(body.address, body.condition.as_deref())
        .await?;
    Ok(Json(json!({ "address": body.address })))
}

#[derive(Debug, Deserialize)]
pub(super) struct RemoveBreakpointBody {
    address: Word,
}

pub(super) async fn remove_breakpoint(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Json(body): Json<RemoveBreakpointBody>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.remove_breakpoint(body.address).await?;
    Ok(Json(json!({ "removed": body.address })))
}

pub(super) async fn breakpoints(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    Ok(Json(json!({ "breakpoints": session.breakpoints().await })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct WatchpointBody {
    address: Word,
    #[serde(rename = "type")]
    kind: String,
}

pub(super) async fn add_watchpoint(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Json(body): Json<WatchpointBody>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    let wp = session.add_watchpoint(body.address, &body.kind).await?;
    Ok(Json(json!({ "id": wp, "address": body.address })))
}

pub(super) async fn remove_watchpoint(
    State(registry): State<Arc<Registry>>,
    Path((id, wp)): Path<(Uuid, u32)>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.remove_watchpoint(wp).await?;
    Ok(Json(json!({ "removed": wp })))
}

pub(super) async fn watchpoints(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    Ok(Json(json!({ "watchpoints": session.watchpoints().await })))
}
