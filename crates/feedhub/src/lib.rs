//! # feedhub
//!
//! Real-time WebSocket hub. Clients log in over HTTP for a one-time token,
//! spend it to open a WebSocket, then exchange typed JSON events: chat
//! messages broadcast to everyone, and subscriptions to synthetic price
//! feeds that push an update on every tick.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feedhub::prelude::*;
//!
//! # async fn start() -> Result<(), HubError> {
//! let server = HubServer::builder()
//!     .settings(Settings::default())
//!     .build()
//!     .await?;
//! server.run(CancellationToken::new()).await
//! # }
//! ```

mod config;
mod error;
pub mod pump;
mod router;
mod server;

pub use config::{Credentials, FeedSettings, KeepaliveSettings, Settings, TokenSettings};
pub use error::{ConfigError, HubError, RouteError};
pub use router::{EventRouter, Handler};
pub use server::{HubServer, HubServerBuilder};

/// Common imports for running a hub.
pub mod prelude {
    pub use crate::{
        ConfigError, EventRouter, HubError, HubServer, HubServerBuilder, RouteError, Settings,
    };
    pub use feedhub_protocol::{Event, kinds};
    pub use feedhub_session::{Registry, Session, SessionConfig, TokenConfig, TokenStore};
    pub use feedhub_ticker::{FeedCatalog, FeedConfig, TickerBroadcaster};
    pub use tokio_util::sync::CancellationToken;
}
