use crate::core::SearchResult;
use std::fmt::Write;

/// Renders search results as a numbered list for LLM prompts, keeping at most
/// `max_items` items overall. Failed searches are listed with their error.
pub fn format_results_for_prompt(results: &[SearchResult], max_items: usize) -> String {
    let mut out = String::new();
    let mut remaining = max_items;
    let mut index = 1;

    for result in results {
        if let Some(error) = &result.error {
            let _ = writeln!(
                out,
                "- [subtask {}] search '{}' on {} failed: {}",
                result.task_id, result.query, result.source, error
            );
            continue;
        }
        for item in result.items.iter().take(remaining) {
            let _ = writeln!(
                out,
                "{}. [subtask {}] {} ({})\n   {}",
                index,
                result.task_id,
                item.title,
                item.url,
                truncate_chars(&item.snippet, 500)
            );
            index += 1;
            remaining -= 1;
        }
        if remaining == 0 {
            break;
        }
    }

    if out.is_empty() {
        out.push_str("(no findings)\n");
    }
    out
}

/// Cuts `text` to at most `limit` characters, marking the cut with "..."
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SearchItem;

    fn result(task_id: u32, titles: &[&str], error: Option<&str>) -> SearchResult {
        SearchResult {
            task_id,
            query: "q".into(),
            source: "tavily".into(),
            items: titles
                .iter()
                .map(|t| SearchItem {
                    title: t.to_string(),
                    url: format!("https://example.org/{}", t),
                    snippet: "snippet".into(),
                    score: Some(0.5),
                })
                .collect(),
            error: error.map(String::from),
        }
    }

    #[test]
    fn prompt_listing_respects_item_budget() {
        let results = vec![
            result(1, &["a", "b"], None),
            result(2, &[], Some("timeout")),
            result(3, &["c", "d"], None),
        ];
        let listing = format_results_for_prompt(&results, 3);
        assert!(listing.contains("1. [subtask 1] a"));
        assert!(listing.contains("failed: timeout"));
        assert!(listing.contains("3. [subtask 3] c"));
        assert!(!listing.contains("] d"));
        assert_eq!(format_results_for_prompt(&[], 3), "(no findings)\n");
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }
}
