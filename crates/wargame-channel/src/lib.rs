//! Wargame Shared Channels
//!
//! Singleton records that several pages race on: the game clock (move and
//! phase) and the countdown timer.
//!
//! # Core Concepts
//!
//! - [`ChannelRecord`]: a record with a change predicate
//! - [`ReadWrite`] / [`ReadOnly`]: owner and follower capability views
//! - [`GameState`]: published by the White Cell, followed by everyone
//! - [`TimerController`] / [`TimerDisplay`]: countdown owner and recomputing reader

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod channel;
mod error;
mod game_state;
mod timer;

// Re-exports
pub use channel::{ChannelRecord, ReadOnly, ReadWrite, SubscriptionId};
pub use error::ChannelError;
pub use game_state::{
    game_state_reader, game_state_writer, publish_game_state, GameState, GameStateChange,
};
pub use timer::{
    TimerController, TimerDisplay, TimerPolicy, TimerReading, TimerState, Urgency, CRITICAL_SECS,
    MSG_TIMER_RESET, WARNING_SECS,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
