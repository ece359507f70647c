//! Delimited-block extraction from agent text output.

/// Open/close marker pair bounding the block the agent is asked to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMarkers {
    pub open: &'static str,
    pub close: &'static str,
}

pub const SLACK_BLOCK_MARKERS: BlockMarkers = BlockMarkers {
    open: "<slack>",
    close: "</slack>",
};

impl BlockMarkers {
    /// Returns the trimmed interior of the first complete marker pair in `raw`.
    ///
    /// The close marker is searched for only after the end of the first open
    /// marker, so the span is non-greedy and may cross line breaks. An open
    /// marker without a later close marker yields `None`.
    pub fn extract(&self, raw: &str) -> Option<String> {
        let open_at = raw.find(self.open)?;
        let body_start = open_at + self.open.len();
        let body_len = raw[body_start..].find(self.close)?;
        Some(raw[body_start..body_start + body_len].trim().to_string())
    }
}

/// Extracts the `<slack>...</slack>` block from goose output.
pub fn extract_slack_block(raw: &str) -> Option<String> {
    SLACK_BLOCK_MARKERS.extract(raw)
}
