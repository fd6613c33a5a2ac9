//! Transport between extension contexts.
//!
//! Provides:
//! - `MessageBus` - The host's tabs, windows and per-context listeners
//! - `Channel` - `send_to_background` / `send_to_tab` / `send_to_active_tab`

pub mod bus;
pub mod channel;
pub mod error;

pub use bus::{MessageBus, is_privileged_url};
pub use channel::{Channel, Destination};
pub use error::TransportError;
