//! # Audio Module
//!
//! Playback and voice-link logic for the bot.
//!
//! ## Architecture
//!
//! ### [`playlist`] - Playlist Store
//! - Ordered, immutable list of track references shared by every guild
//! - Per-guild wrapping cursor
//!
//! ### [`player`] - Player State Machine
//! - `Stopped -> Starting -> Playing -> (Idle|Errored) -> Playing|Stopped`
//! - Auto-advance on track end (YouTube) or single-file loop (local)
//! - Skip-and-retry on resolution and playback failures
//!
//! ### [`connection`] - Connection Supervisor
//! - Voice link state per guild
//! - Resume wait, delayed rejoin and bounded retry budget
//!
//! Both state machines are free of I/O. Each transition returns a list of
//! effects that the per-guild worker in [`crate::bot::session`] executes, and
//! every asynchronous result is tagged with the epoch it was started under so
//! stale results can be dropped.

pub mod connection;
pub mod player;
pub mod playlist;
