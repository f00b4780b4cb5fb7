// Text Processing Service
// Tokenization and set-overlap helpers for lexical ranking

use std::collections::HashSet;

/// Collapse all runs of whitespace into single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cased whitespace tokens as a set
pub fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// Lower-cased set of the first `n` whitespace tokens
pub fn leading_word_set(text: &str, n: usize) -> HashSet<String> {
    text.split_whitespace()
        .take(n)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Jaccard index of two token sets. Two empty sets score 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  c "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_word_set_is_case_insensitive() {
        let set = word_set("Rust rust RUST async");
        assert_eq!(set.len(), 2);
        assert!(set.contains("rust"));
    }

    #[test]
    fn test_leading_word_set() {
        let set = leading_word_set("one two three four", 2);
        assert_eq!(set.len(), 2);
        assert!(set.contains("two"));
        assert!(!set.contains("three"));
    }

    #[test]
    fn test_jaccard() {
        let a = word_set("memory safety in rust");
        let b = word_set("memory safety in go");
        assert!((jaccard(&a, &b) - 3.0 / 5.0).abs() < 1e-9);
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&a, &HashSet::new()), 0.0);
    }
}
