//! Interactive session management module
//!
//! Session context lifecycle, command routing, and the per-view event loop.

pub mod action_channel;
pub mod command_router;
pub mod context;
pub mod view_session;

pub use action_channel::{ActionChannel, SessionEvent};
pub use command_router::{CommandRouter, InteractiveCommand};
pub use context::SessionContext;
pub use view_session::{SessionState, SessionStats, ViewSession};
