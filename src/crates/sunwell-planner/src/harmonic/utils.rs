//! Keyword extraction for lightweight semantic checks
//!
//! Fast, no-LLM keyword extraction used for goal/artifact coverage scoring
//! and for the auto scoring-version switch.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Stopwords filtered out of keyword extraction
static STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "shall", "can", "need",
    "it", "its", "this", "that", "these", "those", "i", "you", "he", "she", "we", "they", "me",
    "him", "her", "us", "them", "my", "your", "his", "our", "their", "what", "which", "who",
    "where", "when", "why", "how", "all", "each", "every", "both", "few", "more", "most",
    "other", "some", "such", "no", "nor", "not", "only", "same", "so", "than", "too", "very",
    "just", "also", "now", "here", "there", "then", "once", "into", "onto", "upon", "after",
    "before", "above", "below", "between", "under", "over", "through", "during", "without",
    "within", "along", "across", "behind", "beyond", "plus", "except", "about", "like",
    "create", "build", "make", "add", "implement", "write", "using", "use",
];

fn word_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9]+").expect("static regex"))
}

fn stopword_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// Extract significant keywords: lowercase, longer than 3 chars, no stopwords
pub fn extract_keywords(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let lowered = text.to_lowercase();
    word_split_re()
        .split(&lowered)
        .filter(|w| w.len() > 3 && !stopword_set().contains(w))
        .map(str::to_string)
        .collect()
}
