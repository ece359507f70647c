/// Truncates `value` to at most `max_chars` characters, appending `...` when cut.
///
/// Counts `char`s rather than bytes so multi-byte text never splits mid-codepoint.
pub fn truncate_for_log(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
