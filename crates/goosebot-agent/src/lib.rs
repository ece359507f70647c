//! External agent invocation and result extraction for goosebot.
//!
//! `goose_cli` runs the `goose` CLI in single-shot mode and captures its text
//! output; `block_extract` pulls the `<slack>` block out of that output.

pub mod block_extract;
pub mod goose_cli;
pub mod invocation;

pub use block_extract::{extract_slack_block, BlockMarkers, SLACK_BLOCK_MARKERS};
pub use goose_cli::{GooseCliConfig, GooseCliInvoker};
pub use invocation::{AgentInvoker, InvocationError, InvocationRequest, InvocationResult};
