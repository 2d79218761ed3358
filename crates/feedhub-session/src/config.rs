//! Session and token configuration.

use std::time::Duration;

/// Keepalive and queueing parameters for every live session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long the read loop waits for a Pong before giving up on the
    /// client. Each Pong pushes the deadline out by this much again. Also
    /// the longest a single outbound write may take.
    pub pong_wait: Duration,

    /// How often the client must send an `acknowledge` event. A window
    /// that closes without one ends the session.
    pub ack_window: Duration,

    /// Capacity of the per-session outbound queue. Deliveries beyond it
    /// are dropped instead of blocking the sender.
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pong_wait: Duration::from_secs(10),
            ack_window: Duration::from_secs(30),
            outbound_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Interval between protocol pings: nine tenths of `pong_wait`, so a
    /// ping always lands before the read deadline.
    pub fn ping_interval(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

/// Lifetime parameters for the one-time token store.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// How long an issued token stays valid.
    pub retention: Duration,

    /// How often the background sweep runs. Independent of `retention`.
    pub sweep_interval: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
        }
    }
}
