//! Wargame Timeline
//!
//! One merged, deduplicated, time-ordered event feed per move, assembled from
//! the records every role page writes.
//!
//! # Core Concepts
//!
//! - [`TimelineItem`]: leniently decoded event with a dedup [`Identity`]
//! - [`aggregate`] / [`deduplicate`]: order-independent merge, newest first
//! - [`Feed`]: reads the per-move sources (White Cell record, notes, submission)
//! - [`TimelineWriter`]: validated append to the shared timeline with retries
//! - [`partition_by_team`]: split a feed into team lanes

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod append;
mod dedup;
mod error;
mod feed;
mod item;

// Re-exports
pub use append::{
    AppendOutcome, TimelineUpdate, TimelineWriter, DEFAULT_ATTEMPTS, DEFAULT_BACKOFF,
    MSG_TIMELINE_APPEND_FAILED, MSG_TIMELINE_STORAGE_FULL,
};
pub use dedup::{aggregate, deduplicate, partition_by_team, search, TeamTimelines};
pub use error::TimelineError;
pub use feed::{Feed, TIMELINE_FIELD};
pub use item::{decode_items, split_items, Identity, ItemId, ItemType, Team, TimelineItem, CONTENT_PREFIX_CHARS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
