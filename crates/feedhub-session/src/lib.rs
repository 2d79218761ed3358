//! Connected-client state for feedhub.
//!
//! Three pieces live here:
//!
//! 1. **Sessions**: one per WebSocket client, holding its outbound queue,
//!    feed subscriptions and liveness flag ([`Session`])
//! 2. **The registry**: the set of sessions broadcasts can reach
//!    ([`Registry`])
//! 3. **One-time tokens**: short-lived, single-use upgrade credentials
//!    ([`TokenStore`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)   ← runs the socket loops, routes events, serves HTTP
//!     ↕
//! Session Layer (this crate)  ← who is connected and what they want
//!     ↕
//! Protocol / Transport (below)  ← Event envelope, ConnectionId
//! ```

mod config;
mod error;
mod registry;
mod session;
mod token;

pub use config::{SessionConfig, TokenConfig};
pub use error::SessionError;
pub use registry::Registry;
pub use session::Session;
pub use token::{Token, TokenStore};
