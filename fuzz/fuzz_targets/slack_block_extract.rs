#![no_main]

use goosebot_agent::{extract_slack_block, SLACK_BLOCK_MARKERS};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Some(block) = extract_slack_block(&raw) else {
        return;
    };

    assert_eq!(block, block.trim());
    assert!(raw.contains(block.as_str()));
    let rewrapped = format!("{}{}{}", SLACK_BLOCK_MARKERS.open, block, SLACK_BLOCK_MARKERS.close);
    if !block.contains(SLACK_BLOCK_MARKERS.close) {
        assert_eq!(extract_slack_block(&rewrapped).as_deref(), Some(block.as_str()));
    }
});
