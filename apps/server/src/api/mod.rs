//! HTTP transport.
//!
//! Thin handlers: decode the request, look up the session, invoke the
//! service operation, encode the response. CORS is restricted to loopback
//! and file origins; anything else gets no `Access-Control-Allow-Origin`
//! and the browser refuses it.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cfg::Config;
use crate::demos;
use crate::err::ApiError;
use crate::session::Registry;

mod exec;
mod inspect;
mod points;
mod session;
mod ws;

/// Builds the application router.
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/version", get(version))
        .route("/api/v1/config", get(get_config).put(put_config))
        .route("/api/v1/examples", get(list_examples))
        .route("/api/v1/examples/:name", get(get_example))
        .route(
            "/api/v1/session",
            post(session::create).get(session::list),
        )
        .route(
            "/api/v1/session/:id",
            get(session::info).delete(session::destroy),
        )
        .route("/api/v1/session/:id/load", post(exec::load))
        .route("/api/v1/session/:id/step", post(exec::step_into))
        .route("/api/v1/session/:id/stepover", post(exec::step_over))
        .route("/api/v1/session/:id/stepout", post(exec::step_out))
        .route("/api/v1/session/:id/run", post(exec::run))
        .route("/api/v1/session/:id/stop", post(exec::stop))
        .route("/api/v1/session/:id/reset", post(exec::reset))
        .route("/api/v1/session/:id/restart", post(exec::restart))
        .route("/api/v1/session/:id/stdin", post(exec::stdin))
        .route("/api/v1/session/:id/command", post(exec::command))
        .route("/api/v1/session/:id/eval", post(exec::eval))
        .route("/api/v1/session/:id/registers", get(inspect::registers))
        .route("/api/v1/session/:id/memory", get(inspect::memory))
        .route("/api/v1/session/:id/disassembly", get(inspect::disassembly))
        .route("/api/v1/session/:id/console", get(inspect::console))
        .route("/api/v1/session/:id/sourcemap", get(inspect::source_map))
        .route("/api/v1/session/:id/stack", get(inspect::stack))
        .route(
            "/api/v1/session/:id/trace/enable",
            post(inspect::trace_enable),
        )
        .route(
            "/api/v1/session/:id/trace/disable",
            post(inspect::trace_disable),
        )
        .route("/api/v1/session/:id/trace/data", get(inspect::trace_data))
        .route(
            "/api/v1/session/:id/stats/enable",
            post(inspect::stats_enable),
        )
        .route(
            "/api/v1/session/:id/stats/disable",
            post(inspect::stats_disable),
        )
        .route("/api/v1/session/:id/stats", get(inspect::stats))
        .route(
            "/api/v1/session/:id/breakpoint",
            post(points::add_breakpoint).delete(points::remove_breakpoint),
        )
        .route("/api/v1/session/:id/breakpoints", get(points::breakpoints))
        .route("/api/v1/session/:id/watchpoint", post(points::add_watchpoint))
        .route(
            "/api/v1/session/:id/watchpoint/:wp",
            axum::routing::delete(points::remove_watchpoint),
        )
        .route("/api/v1/session/:id/watchpoints", get(points::watchpoints))
        .route("/api/v1/session/:id/events", get(ws::events))
        .with_state(registry)
        .layer(TraceLayer::new_for_http())
        .layer(cors())
}

/// Loopback-only CORS: localhost, 127.0.0.1, and file origins are echoed
/// back with credentials; everything else is denied by omission.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin.to_str().is_ok_and(is_local_origin)
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

fn is_local_origin(origin: &str) -> bool {
    origin == "http://localhost"
        || origin.starts_with("http://localhost:")
        || origin == "http://127.0.0.1"
        || origin.starts_with("http://127.0.0.1:")
        || origin.starts_with("file://")
        || origin == "null"
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("ARMLET_COMMIT").unwrap_or("unknown"),
        "date": option_env!("ARMLET_BUILD_DATE").unwrap_or("unknown"),
    }))
}

async fn get_config(State(registry): State<Arc<Registry>>) -> Json<Config> {
    Json(*registry.cfg.read().await)
}

async fn put_config(
    State(registry): State<Arc<Registry>>,
    Json(config): Json<Config>,
) -> Result<Json<Config>, ApiError> {
    config.validate().map_err(ApiError::invalid)?;
    *registry.cfg.write().await = config;
    Ok(Json(config))
}

/// One example catalogue row.
#[derive(Serialize)]
struct ExampleRow {
    name: &'static str,
    title: &'static str,
}

async fn list_examples() -> Json<Value> {
    let examples: Vec<ExampleRow> = demos::EXAMPLES
        .iter()
        .map(|example| ExampleRow {
            name: example.name,
            title: example.title,
        })
        .collect();
    Json(json!({ "examples": examples }))
}

/// Example lookup is by catalogue name only; there is no path to
/// traverse.
async fn get_example(
    axum::extract::Path(name): axum::extract::Path<String>,
) -> Result<Json<Value>, ApiError> {
    let example = demos::find(&name)
        .ok_or_else(|| ApiError::new(crate::err::Kind::NotFound, format!("no example `{name}`")))?;
    Ok(Json(json!({
        "name": example.name,
        "title": example.title,
        "source": example.source,
    })))
}

/// `{memorySize?}` body of `POST /session`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateBody {
    pub memory_size: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_origins_only() {
        assert!(is_local_origin("http://localhost:5173"));
        assert!(is_local_origin("http://127.0.0.1:8080"));
        assert!(is_local_origin("file:///home/user/ui.html"));
        assert!(is_local_origin("null"));
        assert!(!is_local_origin("https://evil.example"));
        assert!(!is_local_origin("http://localhost.evil.example"));
    }
}
