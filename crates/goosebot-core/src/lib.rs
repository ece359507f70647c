//! Low-level utilities shared across goosebot crates.
//!
//! Provides the overwrite-in-place scratch slot used to keep the latest agent
//! output on disk, clock helpers, and log-safe text truncation.

pub mod scratch_slot;
pub mod text_utils;
pub mod time_utils;

pub use scratch_slot::ScratchSlot;
pub use text_utils::truncate_for_log;
pub use time_utils::current_unix_timestamp_ms;
