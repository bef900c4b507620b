//! Text segmentation helpers shared by the rule scorer and critic heuristics.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'\-]*").expect("WORD_RE regex should compile"));
static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?。！？]+(\s+|$)").expect("SENTENCE_END_RE regex should compile"));
static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("PARAGRAPH_BREAK_RE regex should compile"));

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "how",
    "if", "in", "into", "is", "it", "its", "may", "more", "most", "not", "of", "on", "or", "other",
    "our", "over", "should", "so", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "to", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "will", "with", "would", "you", "your",
];

/// Whether `word` (lowercase) is a stopword.
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// All word tokens in order, original casing.
pub fn words(text: &str) -> Vec<&str> {
    WORD_RE.find_iter(text).map(|m| m.as_str()).collect()
}

pub fn word_count(text: &str) -> usize {
    WORD_RE.find_iter(text).count()
}

/// Lowercase, stopword-filtered tokens of length ≥ 3, de-duplicated.
pub fn keywords(text: &str) -> BTreeSet<String> {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() >= 3 && !is_stopword(w))
        .collect()
}

/// Blank-line separated, non-empty paragraphs.
pub fn paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK_RE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Whether the text contains at least one blank-line paragraph break.
pub fn has_paragraph_breaks(text: &str) -> bool {
    paragraphs(text).len() > 1
}

/// Sentences split on terminal punctuation; trailing fragments count.
pub fn sentences(text: &str) -> Vec<&str> {
    SENTENCE_END_RE
        .split(text)
        .map(str::trim)
        .filter(|s| word_count(s) > 0)
        .collect()
}

/// Count case-insensitive occurrences of each phrase (word-bounded).
pub fn count_phrases(text: &str, phrases: &[&str]) -> usize {
    let lower = format!(" {} ", normalize_spaces(&text.to_lowercase()));
    phrases
        .iter()
        .map(|p| lower.matches(&format!(" {} ", p)).count())
        .sum()
}

/// Whether any of `phrases` occurs in `text` (case-insensitive, word-bounded).
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    count_phrases(text, phrases) > 0
}

fn normalize_spaces(text: &str) -> String {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwords_are_sorted_for_binary_search() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn test_keywords_filter_stopwords_and_short_tokens() {
        let kw = keywords("The role of CRISPR in gene therapy");
        assert!(kw.contains("crispr"));
        assert!(kw.contains("gene"));
        assert!(kw.contains("therapy"));
        assert!(kw.contains("role"));
        assert!(!kw.contains("the"));
        assert!(!kw.contains("of"));
    }

    #[test]
    fn test_paragraphs_split_on_blank_lines() {
        let text = "First paragraph.\n\nSecond one.\n  \nThird.";
        assert_eq!(paragraphs(text).len(), 3);
        assert!(!has_paragraph_breaks("one line only"));
    }

    #[test]
    fn test_non_latin_words_counted() {
        assert_eq!(word_count("Über die Wirkung von Impfstoffen"), 5);
        assert_eq!(word_count("Влияние вакцин на иммунитет"), 4);
        assert_eq!(words("naïve café-style résumé"), vec!["naïve", "café-style", "résumé"]);
        assert!(keywords("Влияние вакцин").contains("влияние"));
        assert_eq!(sentences("Первое предложение. Второе!").len(), 2);
    }

    #[test]
    fn test_sentences() {
        let s = sentences("One two three. Four five! Six? trailing fragment");
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn test_count_phrases_word_bounded() {
        let text = "It might work. Perhaps it might not, mighty as it is.";
        assert_eq!(count_phrases(text, &["might"]), 2);
        assert_eq!(count_phrases(text, &["perhaps", "might"]), 3);
        assert!(contains_any("In conclusion, yes.", &["in conclusion"]));
    }
}
