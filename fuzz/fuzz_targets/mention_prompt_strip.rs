#![no_main]

use goosebot_runtime::strip_self_mention;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let (bot_user_id, text) = raw.split_once('\n').unwrap_or(("U123", raw.as_ref()));
    if bot_user_id.is_empty() {
        return;
    }

    let mention = format!("<@{bot_user_id}>");
    let stripped = strip_self_mention(text, bot_user_id);
    assert_eq!(stripped, stripped.trim());
    if !text.contains(&mention) {
        assert_eq!(stripped, text.trim());
    }
});
