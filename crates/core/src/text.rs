//! Pure text transforms: keywords, titles, numbered lists
//!
//! Deterministic helpers with no external calls. Tokenization targets the
//! deployed Spanish corpus (lowercase alphabetic tokens, accented vowels
//! included).

use regex::Regex;
use std::sync::OnceLock;

/// Spanish stopwords excluded from keyword extraction
const STOPWORDS: &[&str] = &[
    "el", "la", "los", "las", "un", "una", "unos", "unas", "de", "del", "al",
    "a", "en", "con", "por", "para", "es", "son", "fue", "han", "ha", "ser",
    "estar", "que", "se", "no", "si", "como", "pero", "más", "este", "esta",
    "estos", "estas", "ese", "esa", "y", "o", "e", "u", "ni", "cuando", "donde",
    "sobre", "entre", "desde", "hasta", "porque", "también", "muy", "esto",
];

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-záéíóúñü]{4,}\b").expect("valid regex"))
}

fn numbered_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+[\.\)\-]\s*(.+)$").expect("valid regex"))
}

/// Extract up to 10 unique keywords from free text
///
/// Alphabetic tokens of at least 4 characters, lowercased, stopword-filtered,
/// kept in first-seen order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut keywords = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for m in word_regex().find_iter(&lower) {
        let word = m.as_str();
        if STOPWORDS.contains(&word) || !seen.insert(word.to_string()) {
            continue;
        }
        keywords.push(word.to_string());
        if keywords.len() == 10 {
            break;
        }
    }
    keywords
}

/// Short title: first 8 words, ellipsis-suffixed when truncated
pub fn short_title(description: &str) -> String {
    let words: Vec<&str> = description.split_whitespace().take(8).collect();
    let title = words.join(" ");
    if description.trim().len() > title.len() {
        format!("{title}...")
    } else {
        title
    }
}

/// Parse a numbered list ("1.", "2)", "3-") out of generated text
///
/// When no numbered lines are found the whole text is returned as a single
/// item, so callers always get something to show.
pub fn parse_numbered_list(text: &str) -> Vec<String> {
    let items: Vec<String> = text
        .lines()
        .filter_map(|line| {
            numbered_line_regex()
                .captures(line)
                .map(|c| c[1].trim().to_string())
        })
        .collect();

    if items.is_empty() {
        vec![text.trim().to_string()]
    } else {
        items
    }
}
