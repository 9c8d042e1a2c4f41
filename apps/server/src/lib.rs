//! # Armlet Server
//!
//! Multi-session debugger service for the armlet virtual machine: a REST
//! API plus a per-session WebSocket event stream. Each session owns an
//! isolated VM + debugger pair; the transport is a thin layer over the
//! per-session service operations.

#![warn(clippy::pedantic)]

pub mod api;
pub mod cfg;
pub mod demos;
pub mod err;
pub mod evt;
pub mod session;
pub mod svc;

pub use crate::cfg::Config;
pub use crate::session::{Registry, Session};
