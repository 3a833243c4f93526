//! Freshness scoring and query-term highlighting (§4.B).

use chrono::{DateTime, Utc};
use regex::Regex;

const MARK_OPEN: &str = "\u{2039}mark\u{203a}";
const MARK_CLOSE: &str = "\u{2039}/mark\u{203a}";

/// Time-decayed freshness score in `[0.30, 1.00]` from a reference
/// timestamp relative to `now`. A step function; boundaries are
/// inclusive of the upper bound. Missing/unparsable timestamps get the
/// neutral default `0.50`.
pub fn freshness_score(reference: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(reference) = reference else {
        return 0.50;
    };
    let age_days = (now - reference).num_days();
    if age_days < 0 {
        // Clock skew / future timestamp: treat as freshest.
        return 1.00;
    }
    match age_days {
        0 => 1.00,
        d if d <= 30 => 0.95,
        d if d <= 90 => 0.85,
        d if d <= 365 => 0.70,
        d if d <= 1825 => 0.50,
        _ => 0.30,
    }
}

/// Tokenizes a user query per §4.B: whitespace split, fixed stopword
/// removal (case-insensitive), tokens with more than 3 alphanumeric
/// characters retained. Returns lowercase, deduplicated tokens in
/// first-seen order.
pub fn tokenize_query(query: &str, stopwords: &[String]) -> Vec<String> {
    let stopwords_lower: std::collections::HashSet<String> =
        stopwords.iter().map(|s| s.to_lowercase()).collect();
    let mut seen = std::collections::HashSet::new();
    let mut tokens = Vec::new();
    for raw in query.split_whitespace() {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.chars().count() <= 3 {
            continue;
        }
        if stopwords_lower.contains(&cleaned) {
            continue;
        }
        if seen.insert(cleaned.clone()) {
            tokens.push(cleaned);
        }
    }
    tokens
}

fn strip_marks(text: &str) -> String {
    text.replace(MARK_OPEN, "").replace(MARK_CLOSE, "")
}

/// Wraps every case-insensitive whole-word match of a query term in
/// `snippet` with a neutral marker. Word boundaries prevent partial
/// matches (`contract` must not match inside `contracted`).
///
/// Idempotent: marks are stripped before re-matching, so calling this
/// twice with the same query yields the same output as calling it once.
pub fn highlight(snippet: &str, query: &str, stopwords: &[String]) -> String {
    let tokens = tokenize_query(query, stopwords);
    let mut text = strip_marks(snippet);
    for token in tokens {
        let pattern = format!(r"(?i)\b{}\b", regex::escape(&token));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        text = re
            .replace_all(&text, |caps: &regex::Captures| {
                format!("{MARK_OPEN}{}{MARK_CLOSE}", &caps[0])
            })
            .into_owned();
    }
    text
}
