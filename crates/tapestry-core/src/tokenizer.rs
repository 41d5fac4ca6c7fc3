use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "is", "at", "which", "on", "and", "a", "an", "in", "of", "to", "for", "with", "by",
        "from", "as", "but", "or", "so", "it", "this", "that", "are", "was", "were", "be", "been",
        "being", "have", "has", "had", "do", "does", "did", "will", "would", "shall", "should",
        "can", "could", "may", "might", "must", "my", "your", "his", "her", "its", "our",
        "their",
    ]
    .into_iter()
    .collect()
});

/// Tokenize free text into lowercase words.
/// Punctuation is dropped, so "don't" becomes "dont".
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned = NON_WORD.replace_all(text, "");
    cleaned
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Tokens that carry meaning for similarity: longer than two characters
/// and not an English stop word.
pub fn title_terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() > 2 && !STOP_WORDS.contains(t.as_str()))
        .collect()
}
