//! API error taxonomy.
//!
//! Program faults do not surface as HTTP errors; they transition the
//! session to `error` status and are published as events. [`ApiError`] is
//! the transport-level surface: unknown sessions, malformed or over-size
//! requests, invalid breakpoints, expression failures.

use armlet::arch::Word;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Abstract error kinds, mirrored in the event stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Source failed to assemble.
    Parse,
    /// Opcode not recognised.
    InvalidInstruction,
    /// Out-of-bounds, unaligned, or permission-violating access.
    MemoryFault,
    /// Memory fault just below the stack region.
    StackOverflow,
    /// SWI immediate without a handler.
    UnhandledSwi,
    /// Run stopped at the configured cycle cap.
    CycleLimitExceeded,
    /// No session with the given ID.
    NoActiveSession,
    /// Resource not found.
    NotFound,
    /// Resource already exists.
    AlreadyExists,
    /// Malformed or over-size request.
    InvalidRequest,
    /// Expression failed to parse or evaluate.
    ExpressionError,
}

impl Kind {
    /// Wire name, as embedded in error events.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::InvalidInstruction => "invalid_instruction",
            Self::MemoryFault => "memory_fault",
            Self::StackOverflow => "stack_overflow",
            Self::UnhandledSwi => "unhandled_swi",
            Self::CycleLimitExceeded => "cycle_limit_exceeded",
            Self::NoActiveSession => "no_active_session",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::InvalidRequest => "invalid_request",
            Self::ExpressionError => "expression_error",
        }
    }

    const fn status(self) -> StatusCode {
        match self {
            Self::NoActiveSession | Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// A transport-level error response body.
#[derive(Clone, Debug, Serialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
    /// Machine-readable kind.
    pub kind: Kind,
    /// Optional extra context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiError {
    /// Constructs an error of the given kind.
    pub fn new(kind: Kind, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind,
            detail: None,
        }
    }

    /// Attaches extra context.
    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Unknown session ID.
    pub fn no_session(id: impl std::fmt::Display) -> Self {
        Self::new(Kind::NoActiveSession, format!("no session {id}"))
    }

    /// Malformed or over-size request.
    pub fn invalid(error: impl Into<String>) -> Self {
        Self::new(Kind::InvalidRequest, error)
    }

    /// Expression failure.
    pub fn expression(error: impl Into<String>) -> Self {
        Self::new(Kind::ExpressionError, error)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ApiError {}

impl From<armlet::dbg::Error> for ApiError {
    fn from(err: armlet::dbg::Error) -> Self {
        use armlet::dbg::Error;
        let kind = match &err {
            Error::Exists(_) => Kind::AlreadyExists,
            Error::Missing(_) | Error::MissingWatch(_) => Kind::NotFound,
            Error::NotCode(_) | Error::NoReturn(_) | Error::WatchKind(_) => Kind::InvalidRequest,
            Error::Language(_) | Error::Eval(_) => Kind::ExpressionError,
        };
        Self::new(kind, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.kind.status(), Json(self)).into_response()
    }
}

/// Classifies a program fault for the event stream.
#[must_use]
pub fn fault_kind(fault: &armlet::core::Error, stack_overflow: bool) -> (Kind, Option<Word>) {
    use armlet::core::Error;
    match fault {
        Error::Invalid { addr, .. } | Error::Mode { addr, .. } => {
            (Kind::InvalidInstruction, Some(*addr))
        }
        Error::Memory(err) => {
            let kind = if stack_overflow {
                Kind::StackOverflow
            } else {
                Kind::MemoryFault
            };
            (kind, Some(err.addr()))
        }
        Error::UnhandledSwi { addr, .. } => (Kind::UnhandledSwi, Some(*addr)),
    }
}
