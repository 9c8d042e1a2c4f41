//! Inspection handlers.

use std::sync::Arc;

use armlet::arch::Word;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::err::ApiError;
use crate::session::Registry;
use crate::svc::{DisasmLine, MemoryReply, Registers, StatsReply};

/// Accepts both decimal and `0x`-prefixed addresses.
fn parse_addr(text: &str) -> Result<Word, ApiError> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Word::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| ApiError::invalid(format!("bad address `{text}`")))
}

#[derive(Debug, Deserialize)]
pub(super) struct MemoryQuery {
    address: String,
    length: usize,
}

pub(super) async fn memory(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Query(query): Query<MemoryQuery>,
) -> Result<Json<MemoryReply>, ApiError> {
    let session = registry.get(id).await?;
    let addr = parse_addr(&query.address)?;
    Ok(Json(session.read_memory(addr, query.length).await?))
}

pub(super) async fn registers(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Registers>, ApiError> {
    let session = registry.get(id).await?;
    Ok(Json(session.registers().await))
}

#[derive(Debug, Deserialize)]
pub(super) struct DisasmQuery {
    address: String,
    count: Option<usize>,
}

pub(super) async fn disassembly(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Query(query): Query<DisasmQuery>,
) -> Result<Json<Vec<DisasmLine>>, ApiError> {
    let session = registry.get(id).await?;
    let addr = parse_addr(&query.address)?;
    Ok(Json(
        session.disassembly(addr, query.count.unwrap_or(16)).await?,
    ))
}

pub(super) async fn console(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    Ok(Json(json!({ "output": session.console().await })))
}

pub(super) async fn source_map(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    Ok(Json(json!({ "sourceMap": session.source_map().await })))
}

pub(super) async fn stack(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    Ok(Json(json!({ "stack": session.stack().await })))
}

pub(super) async fn trace_enable(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.set_trace(true).await;
    Ok(Json(json!({ "tracing": true })))
}

pub(super) async fn trace_disable(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.set_trace(false).await;
    Ok(Json(json!({ "tracing": false })))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct TraceQuery {
    from: Option<u64>,
    to: Option<u64>,
}

pub(super) async fn trace_data(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
    Query(query): Query<TraceQuery>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    let entries = session.trace(query.from, query.to).await;
    Ok(Json(json!({ "trace": entries })))
}

pub(super) async fn stats_enable(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.set_stats(true).await;
    Ok(Json(json!({ "stats": true })))
}

pub(super) async fn stats_disable(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(id).await?;
    session.set_stats(false).await;
    Ok(Json(json!({ "stats": false })))
}

pub(super) async fn stats(
    State(registry): State<Arc<Registry>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatsReply>, ApiError> {
    let session = registry.get(id).await?;
    Ok(Json(session.stats().await))
}
