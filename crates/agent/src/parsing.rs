//! Helpers for parsing list-shaped LLM replies

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading list markers: "1.", "2)", "-", "*", "•"
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+[.)](?:\s+|$)|[-*•]\s*)").unwrap());

/// Split a reply into items: one per non-blank line, markers stripped
pub(crate) fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Drop repeated items, keeping first occurrences in order
pub(crate) fn dedup_preserving_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines_strips_markers_and_blanks() {
        let reply = "1. What is RRF?\n\n2) How is k chosen?\n- Why fuse?\n* plain bullet\n   \nNo marker";
        assert_eq!(
            parse_lines(reply),
            vec![
                "What is RRF?",
                "How is k chosen?",
                "Why fuse?",
                "plain bullet",
                "No marker"
            ]
        );
    }

    #[test]
    fn test_parse_lines_keeps_inner_numbers() {
        assert_eq!(parse_lines("Is 3.5 > 2?"), vec!["Is 3.5 > 2?"]);
        assert_eq!(parse_lines("3.5 percent"), vec!["3.5 percent"]);
    }

    #[test]
    fn test_dedup_preserving_order() {
        let items = vec!["b".to_string(), "a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(dedup_preserving_order(items), vec!["b", "a", "c"]);
    }
}
