//! Synthetic price feeds for feedhub.
//!
//! Each configured [`Feed`] random-walks on its own fixed interval. On every
//! tick the [`TickerBroadcaster`] encodes the feed's [`FeedSnapshot`] as a
//! `new_message` event and queues it for every session subscribed to that
//! feed's name.
//!
//! # Integration
//!
//! The server builds the feeds once at startup and hands them over:
//!
//! ```ignore
//! let feeds = configs.into_iter().map(Feed::new).collect::<Result<Vec<_>, _>>()?;
//! let handles = TickerBroadcaster::new(Arc::clone(&registry)).spawn(feeds);
//! // ... on shutdown
//! for handle in handles {
//!     handle.abort();
//! }
//! ```

mod broadcaster;
mod error;
mod feed;

pub use broadcaster::{TickerBroadcaster, publish_tick};
pub use error::TickerError;
pub use feed::{Feed, FeedCatalog, FeedConfig, FeedSnapshot, default_feeds};
