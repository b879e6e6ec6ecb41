//! HTTP server module.
//!
//! This module owns the listening socket and the server task:
//! - Binding the listener up front so a taken port fails startup immediately
//! - Serving the router on a background task
//! - Graceful shutdown on SIGTERM/SIGINT with connection draining

mod server;
mod shutdown;

pub use server::{bind_listener, spawn_server, ServerError, ServerTask};
pub use shutdown::ShutdownSignal;
