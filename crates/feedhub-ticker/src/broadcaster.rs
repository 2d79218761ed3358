//! Per-feed ticking tasks that push updates to subscribed sessions.
//!
//! Each feed runs in its own task:
//!
//! ```text
//! loop {
//!     advance value ──→ encode snapshot ──→ deliver to each subscriber
//!     sleep(interval)
//! }
//! ```
//!
//! Delivery goes through [`Session::deliver`](feedhub_session::Session::deliver),
//! which never waits, so a stalled client only loses its own updates.

use std::sync::Arc;

use feedhub_protocol::{Event, kinds};
use feedhub_session::Registry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::{Feed, TickerError};

/// Starts and owns nothing but a handle to the registry; the spawned
/// tasks run until aborted.
#[derive(Debug, Clone)]
pub struct TickerBroadcaster {
    registry: Arc<Registry>,
}

impl TickerBroadcaster {
    /// Creates a broadcaster that publishes to the sessions in `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Spawns one task per feed. Abort the returned handles to stop them.
    pub fn spawn(&self, feeds: Vec<Feed>) -> Vec<JoinHandle<()>> {
        feeds
            .into_iter()
            .map(|feed| tokio::spawn(run_feed(feed, Arc::clone(&self.registry))))
            .collect()
    }
}

/// Advances `feed` once and queues the new snapshot for every session
/// subscribed to it. Returns how many sessions accepted the update.
///
/// # Errors
/// [`TickerError::Protocol`] if the snapshot cannot be encoded; nothing is
/// delivered in that case.
pub fn publish_tick<R: Rng + ?Sized>(
    feed: &mut Feed,
    registry: &Registry,
    rng: &mut R,
) -> Result<usize, TickerError> {
    feed.advance(rng);
    let event = Event::new(kinds::NEW_MESSAGE, &feed.snapshot())?;

    let mut delivered = 0;
    registry.for_each_subscriber(feed.name(), |session| {
        match session.deliver(event.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
                debug!(
                    feed = %feed.name(),
                    conn_id = %session.id(),
                    dropped = session.dropped_count(),
                    error = %e,
                    "feed update dropped"
                );
            }
        }
    });
    Ok(delivered)
}

async fn run_feed(mut feed: Feed, registry: Arc<Registry>) {
    let mut rng = StdRng::from_rng(&mut rand::rng());
    info!(
        feed = %feed.name(),
        interval_ms = feed.interval().as_millis() as u64,
        "feed loop started"
    );

    loop {
        match publish_tick(&mut feed, &registry, &mut rng) {
            Ok(delivered) => {
                trace!(feed = %feed.name(), value = feed.value(), delivered, "feed ticked");
            }
            Err(e) => warn!(feed = %feed.name(), error = %e, "feed tick not published"),
        }
        tokio::time::sleep(feed.interval()).await;
    }
}
