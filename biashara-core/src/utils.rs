// biashara-core/src/utils.rs

/// One-line preview of `input` for logs and listings: whitespace runs collapse
/// to a single space and anything past `max_chars` is cut with an ellipsis.
pub fn preview(input: &str, max_chars: usize) -> String {
    let flat = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    if max_chars < 3 {
        return flat.chars().take(max_chars).collect();
    }
    let mut cut: String = flat.chars().take(max_chars - 3).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(preview("hello", 10), "hello");
        assert_eq!(preview("", 0), "");
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(preview("  GDP\n\tgrowth   rate ", 40), "GDP growth rate");
    }

    #[test]
    fn test_long_text_cut_with_ellipsis() {
        assert_eq!(preview("hello world", 8), "hello...");
        assert_eq!(preview("hello world", 2), "he");
    }

    #[test]
    fn test_multibyte_characters() {
        assert_eq!(preview("habari ya asubuhi ☀☀☀", 21), "habari ya asubuhi ☀☀☀");
        assert_eq!(preview("☀☀☀☀☀", 4), "☀...");
    }
}
