//! Entry-point runtimes for goosebot.
//!
//! Hosts the scheduled release poll loop, the per-mention prompt relay, and
//! the notification sink seam both of them post through.

pub mod mention_runtime;
pub mod notification;
pub mod release_poll_runtime;

#[cfg(test)]
mod test_support;

pub use mention_runtime::*;
pub use notification::*;
pub use release_poll_runtime::*;
