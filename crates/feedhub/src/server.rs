//! `HubServer` builder and server loop.
//!
//! This is the entry point for running a hub. It ties the layers together:
//! HTTP (login + upgrade) → transport → session → router / ticker.
//!
//! Routes:
//!
//! | Route          | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `POST /login`  | credentials in, one-time token (`{"otp": ..}`) out   |
//! | `GET /ws?otp=` | spends the token and upgrades to a WebSocket session |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use feedhub_session::{Registry, Session, SessionError, TokenStore};
use feedhub_ticker::{Feed, FeedCatalog, TickerBroadcaster};
use feedhub_transport::{Connection, WebSocketConnection};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pump::{self, SessionContext};
use crate::{Credentials, EventRouter, HubError, Settings};

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
struct HubState {
    tokens: Arc<TokenStore>,
    sessions: SessionContext,
    credentials: Option<Arc<Credentials>>,
    allowed_origins: Arc<[String]>,
    max_message_size: usize,
    /// Cancelled by [`HubServer::run`] once it stops serving.
    stopping: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct UpgradeParams {
    otp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    otp: String,
}

fn build_router(state: HubState) -> Router {
    Router::new()
        .route("/ws", get(upgrade_handler))
        .route("/login", post(login_handler))
        .with_state(state)
}

/// Origin check, then token check, then upgrade. A token is only spent
/// on a request that can actually be upgraded.
async fn upgrade_handler(
    State(state): State<HubState>,
    Query(params): Query<UpgradeParams>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !origin_allowed(&headers, &state.allowed_origins) {
        debug!(origin = ?headers.get(header::ORIGIN), "upgrade refused: origin not allowed");
        return StatusCode::FORBIDDEN.into_response();
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let Some(otp) = params.otp.filter(|otp| !otp.is_empty()) else {
        debug!("upgrade refused: no token");
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if !state.tokens.verify(&otp) {
        debug!("upgrade refused: token unknown, used or expired");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    upgrade
        .max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            if let Some(session) = admit_session(WebSocketConnection::new(socket), &state) {
                info!(conn_id = %session.id(), "WebSocket session started");
            }
        })
}

/// Starts a session for an upgraded connection unless the server is
/// stopping.
///
/// The flag is checked again after registration: `run` cancels it before
/// it closes the registered sessions, so a session registered after that
/// sweep sees the flag here and removes itself.
fn admit_session<C: Connection>(conn: C, state: &HubState) -> Option<Arc<Session>> {
    if state.stopping.is_cancelled() {
        debug!(conn_id = %conn.id(), "upgrade finished during shutdown, dropping");
        return None;
    }
    let session = pump::spawn_session(conn, &state.sessions);
    if state.stopping.is_cancelled() {
        state.sessions.registry.remove(session.id());
        return None;
    }
    Some(session)
}

/// Requests without an `Origin` header come from non-browser clients and
/// are let through; browsers always send one.
fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match headers.get(header::ORIGIN) {
        None => true,
        Some(origin) => origin
            .to_str()
            .is_ok_and(|origin| allowed.iter().any(|a| a == origin)),
    }
}

async fn login_handler(
    State(state): State<HubState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(%peer, error = %rejection, "malformed login request");
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };

    let authorized = state
        .credentials
        .as_ref()
        .is_some_and(|c| c.matches(&request.username, &request.password));
    if !authorized {
        info!(%peer, username = %request.username, "login refused");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.tokens.issue(peer.ip()) {
        Ok(token) => {
            info!(%peer, username = %request.username, "login accepted, token issued");
            (StatusCode::OK, Json(LoginResponse { otp: token.key })).into_response()
        }
        Err(e @ SessionError::TokenOutstanding(_)) => {
            warn!(%peer, "login refused: token already outstanding");
            (
                StatusCode::UNAUTHORIZED,
                format!("{e}; use it or wait for it to expire"),
            )
                .into_response()
        }
        Err(e) => {
            warn!(%peer, error = %e, "token issue failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Builder for configuring and starting a hub.
///
/// # Example
///
/// ```rust,ignore
/// use feedhub::prelude::*;
///
/// let server = HubServer::builder()
///     .settings(Settings::load(path)?)
///     .build()
///     .await?;
/// server.run(shutdown).await
/// ```
#[derive(Debug, Default)]
pub struct HubServerBuilder {
    settings: Settings,
    bind: Option<SocketAddr>,
}

impl HubServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole settings block. Validated in [`build`](Self::build).
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Overrides `settings.bind`.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind = Some(addr);
        self
    }

    /// Validates the settings, builds the feeds and binds the listener.
    ///
    /// # Errors
    /// [`HubError::Config`] or [`HubError::Ticker`] for bad settings,
    /// [`HubError::Io`] if the address cannot be bound.
    pub async fn build(self) -> Result<HubServer, HubError> {
        let settings = self.settings;
        settings.validate()?;

        let feed_configs = settings.feed_configs();
        let catalog = FeedCatalog::from_configs(&feed_configs);
        let feeds = feed_configs
            .into_iter()
            .map(Feed::new)
            .collect::<Result<Vec<_>, _>>()?;

        let registry = Arc::new(Registry::new());
        let tokens = Arc::new(TokenStore::new(settings.token_config()));
        let router = EventRouter::with_builtin_handlers(Arc::clone(&registry), catalog);

        let stopping = CancellationToken::new();
        let state = HubState {
            tokens: Arc::clone(&tokens),
            sessions: SessionContext {
                registry: Arc::clone(&registry),
                router: Arc::new(router),
                config: settings.session_config(),
            },
            credentials: settings.credentials.clone().map(Arc::new),
            allowed_origins: settings.allowed_origins.clone().into(),
            max_message_size: settings.max_message_size,
            stopping: stopping.clone(),
        };
        if state.credentials.is_none() {
            warn!("no credentials configured, every login will be refused");
        }

        let listener = TcpListener::bind(self.bind.unwrap_or(settings.bind)).await?;
        let local_addr = listener.local_addr()?;

        Ok(HubServer {
            listener,
            local_addr,
            app: build_router(state),
            registry,
            tokens,
            feeds,
            stopping,
        })
    }
}

/// A bound hub, ready to serve.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct HubServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    app: Router,
    registry: Arc<Registry>,
    tokens: Arc<TokenStore>,
    feeds: Vec<Feed>,
    stopping: CancellationToken,
}

impl HubServer {
    /// Creates a new builder.
    pub fn builder() -> HubServerBuilder {
        HubServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle to the session registry.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Shared handle to the one-time token store.
    pub fn tokens(&self) -> Arc<TokenStore> {
        Arc::clone(&self.tokens)
    }

    /// Serves until `shutdown` is cancelled.
    ///
    /// Starts the token sweeper and one ticker task per feed. On shutdown
    /// stops accepting, closes every live session, aborts the feed tasks
    /// and waits for the sweeper to finish.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), HubError> {
        let sweeper = self.tokens.spawn_sweeper(shutdown.clone());
        let tickers = TickerBroadcaster::new(Arc::clone(&self.registry)).spawn(self.feeds);

        info!(addr = %self.local_addr, "feedhub listening");

        let signal = shutdown.clone();
        let served = axum::serve(
            self.listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await;

        // Upgrades still in flight see this and do not register.
        self.stopping.cancel();
        for id in self.registry.ids() {
            self.registry.remove(id);
        }
        for ticker in &tickers {
            ticker.abort();
        }
        // If serving failed on its own the sweeper is still running.
        shutdown.cancel();
        if let Err(e) = sweeper.await {
            warn!(error = %e, "token sweeper did not stop cleanly");
        }

        info!("feedhub stopped");
        served.map_err(HubError::Io)
    }
}
