//! Per-context message routing.
//!
//! Provides:
//! - `HandlerTable` - Kind to handler mapping, built once per context
//! - `Router` - Dispatch with the single-reply guarantee
//! - `Listener` / `RouterHandle` - The router running as its own task

pub mod error;
pub mod router;
pub mod table;

pub use error::HandlerError;
pub use router::{Inbound, Listener, ListenerClosed, Router, RouterHandle};
pub use table::HandlerTable;
