//! Name helpers for columns, uploads and output files.

use std::collections::HashSet;

/// Lowercase, underscore-separated identifier safe for column and file names.
pub fn sanitize_name(name: &str) -> String {
    let lowered: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();

    let mut result = String::with_capacity(lowered.len());
    let mut last_was_underscore = false;
    for c in lowered.chars() {
        if c == '_' {
            if !last_was_underscore {
                result.push(c);
            }
            last_was_underscore = true;
        } else {
            result.push(c);
            last_was_underscore = false;
        }
    }

    let result = result.trim_matches('_');
    if result.is_empty() {
        "col".to_owned()
    } else if result.starts_with(|c: char| c.is_ascii_digit()) {
        format!("col_{result}")
    } else {
        result.to_owned()
    }
}

/// Keeps names as given but suffixes repeats with `_1`, `_2`, ...
pub fn dedupe_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for base in names {
        let mut candidate = base.clone();
        let mut count = 0;
        while seen.contains(&candidate) {
            count += 1;
            candidate = format!("{base}_{count}");
        }
        seen.insert(candidate.clone());
        unique.push(candidate);
    }
    unique
}

/// Sanitizes every name, then de-duplicates as [`dedupe_names`] does.
pub fn sanitize_names(names: &[String]) -> Vec<String> {
    dedupe_names(names.iter().map(|n| sanitize_name(n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Customer ID "), "customer_id");
        assert_eq!(sanitize_name("Price ($)"), "price");
        assert_eq!(sanitize_name("2020 sales"), "col_2020_sales");
        assert_eq!(sanitize_name("***"), "col");
    }

    #[test]
    fn test_sanitize_names_dedupes() {
        let names = vec!["A b".to_owned(), "a_b".to_owned(), "A-B".to_owned()];
        assert_eq!(sanitize_names(&names), vec!["a_b", "a_b_1", "a_b_2"]);
    }

    #[test]
    fn test_dedupe_names_keeps_text() {
        let names = ["Total", "Total", "Total_1"].map(str::to_owned);
        assert_eq!(dedupe_names(names), vec!["Total", "Total_1", "Total_1_1"]);
    }
}
