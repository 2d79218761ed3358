//! Synthetic feeds: named integer series that random-walk over time.
//!
//! A feed's value is a fixed-point number stored as an integer with
//! `decimals` implied digits. Each tick applies one uniformly drawn delta
//! from `[delta_min, delta_max)`. A negative delta that would take the
//! value to zero or below is applied with its sign inverted instead, so
//! the value never goes negative and never changes by more than the
//! widest end of the range.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::TickerError;

// ---------------------------------------------------------------------------
// FeedConfig
// ---------------------------------------------------------------------------

/// Static description of one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub name: String,
    pub initial_value: i64,
    /// Implied decimal places in `value`.
    pub decimals: u8,
    /// Inclusive lower bound of the per-tick delta.
    pub delta_min: i64,
    /// Exclusive upper bound of the per-tick delta.
    pub delta_max: i64,
    /// Time between ticks.
    pub interval: Duration,
}

impl FeedConfig {
    /// Checks that the feed can actually tick.
    ///
    /// # Errors
    /// [`TickerError::InvalidFeed`] for an empty name, a negative start
    /// value, an empty delta range or a zero interval.
    pub fn validate(&self) -> Result<(), TickerError> {
        let reason = if self.name.trim().is_empty() {
            Some("name is empty".to_owned())
        } else if self.initial_value < 0 {
            Some(format!("initial value {} is negative", self.initial_value))
        } else if self.delta_min >= self.delta_max {
            Some(format!(
                "delta range [{}, {}) is empty",
                self.delta_min, self.delta_max
            ))
        } else if self.interval.is_zero() {
            Some("interval is zero".to_owned())
        } else {
            None
        };
        match reason {
            Some(reason) => Err(TickerError::InvalidFeed {
                name: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Largest absolute change a single tick can make.
    pub fn max_step(&self) -> u64 {
        self.delta_min
            .unsigned_abs()
            .max(self.delta_max.unsigned_abs())
    }
}

/// The four feeds served when none are configured.
pub fn default_feeds() -> Vec<FeedConfig> {
    vec![
        FeedConfig {
            name: "Nani".into(),
            initial_value: 123_456_789_012_345_678,
            decimals: 8,
            delta_min: -12_345_678,
            delta_max: 12_345_678,
            interval: Duration::from_secs(10),
        },
        FeedConfig {
            name: "Programming".into(),
            initial_value: 999_888_777_666,
            decimals: 6,
            delta_min: -555_444_333,
            delta_max: 555_444_333,
            interval: Duration::from_secs(5),
        },
        FeedConfig {
            name: "Is".into(),
            initial_value: 987_654_321_098_765_432,
            decimals: 12,
            delta_min: -12_345,
            delta_max: 12_345,
            interval: Duration::from_millis(800),
        },
        FeedConfig {
            name: "Fun".into(),
            initial_value: 11_111_111_111,
            decimals: 11,
            delta_min: -1_111,
            delta_max: 1_111,
            interval: Duration::from_millis(1_111),
        },
    ]
}

// ---------------------------------------------------------------------------
// FeedSnapshot
// ---------------------------------------------------------------------------

/// Wire form of a feed's current state, sent inside a `new_message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub name: String,
    /// The raw integer as a decimal string; JSON numbers lose precision
    /// past 2^53.
    pub value: String,
    pub decimal: u8,
    pub interval_in_ms: u64,
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// A feed and its current value. Owned by exactly one ticking task.
#[derive(Debug, Clone)]
pub struct Feed {
    config: FeedConfig,
    value: i64,
}

impl Feed {
    /// # Errors
    /// See [`FeedConfig::validate`].
    pub fn new(config: FeedConfig) -> Result<Self, TickerError> {
        config.validate()?;
        let value = config.initial_value;
        Ok(Self { config, value })
    }

    /// The feed's name, which is also what clients subscribe to.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current raw value, with `decimals` implied digits.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Time between two ticks of this feed.
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// The configuration this feed was built from.
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Draws a delta from `[delta_min, delta_max)` and applies it.
    /// Returns the change actually made.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) -> i64 {
        let delta = rng.random_range(self.config.delta_min..self.config.delta_max);
        self.apply_delta(delta)
    }

    /// Applies `delta`, inverting it if it would take the value to zero
    /// or below. Returns the change actually made.
    pub fn apply_delta(&mut self, delta: i64) -> i64 {
        let before = self.value;
        self.value = if delta < 0 && self.value.saturating_add(delta) <= 0 {
            self.value.saturating_sub(delta)
        } else {
            self.value.saturating_add(delta)
        };
        self.value - before
    }

    /// The current state in wire form.
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            name: self.config.name.clone(),
            value: self.value.to_string(),
            decimal: self.config.decimals,
            interval_in_ms: u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

// ---------------------------------------------------------------------------
// FeedCatalog
// ---------------------------------------------------------------------------

/// The set of feed names clients may subscribe to. Fixed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedCatalog {
    names: BTreeSet<String>,
}

impl FeedCatalog {
    /// Collects the names of `configs`. Duplicates collapse into one entry.
    pub fn from_configs<'a, I>(configs: I) -> Self
    where
        I: IntoIterator<Item = &'a FeedConfig>,
    {
        Self {
            names: configs.into_iter().map(|c| c.name.clone()).collect(),
        }
    }

    /// Returns `true` if `name` is a configured feed. Case-sensitive.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Feed names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
