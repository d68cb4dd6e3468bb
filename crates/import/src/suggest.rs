use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use bucketeer_core::transaction::Transaction;

/// A proposed bucket derived from recurring description patterns. Accepting
/// a suggestion creates a real [`bucketeer_core::Bucket`] scoped to an
/// account; the suggestion itself is account-agnostic analysis output.
#[derive(Debug, Clone, Serialize)]
pub struct BucketSuggestion {
    pub name: String,
    pub keywords: Vec<String>,
    pub match_count: usize,
    pub examples: Vec<String>,
}

const MIN_OCCURRENCES: usize = 2;
const MAX_KEYWORDS: usize = 10;
const MAX_EXAMPLES: usize = 3;

fn pattern_regexes() -> &'static Vec<Regex> {
    static R: OnceLock<Vec<Regex>> = OnceLock::new();
    R.get_or_init(|| {
        [
            r"(?i)transfer\s+to\s+(\w+)",
            r"(?i)transfer\s+from\s+(\w+)",
            r"(?i)(\w+)\s+fund",
            r"(?i)(\w+)\s+buffer",
            r"(?i)(\w+)\s+savings",
            r"(?i)(\w+)\s+account",
            r"(?i)loan\s+(\w+)",
            r"(?i)(\w+)\s+repayment",
            r"(?i)(\w+)\s+payment",
            r"(?i)(\w+)\s+deposit",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid regex"))
        .collect()
    })
}

/// Generic banking words that make poor bucket seeds.
const GENERIC_WORDS: &[&str] = &["transfer", "payment", "deposit", "withdrawal"];

#[derive(Default)]
struct PatternEntry {
    keywords: Vec<String>,
    count: usize,
    examples: Vec<String>,
}

/// Analyse transaction descriptions and propose buckets. Only patterns seen
/// at least twice qualify; keywords are capped and up to three example
/// descriptions are kept for the user to judge the suggestion by.
pub fn suggest_buckets(transactions: &[Transaction]) -> Vec<BucketSuggestion> {
    let mut entries: HashMap<String, PatternEntry> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for tx in transactions {
        let text = tx.display_description().to_lowercase();
        if text.is_empty() {
            continue;
        }

        for pattern in extract_patterns(&text) {
            let entry = entries.entry(pattern.clone()).or_insert_with(|| {
                order.push(pattern.clone());
                PatternEntry::default()
            });
            entry.count += 1;

            push_unique(&mut entry.keywords, &pattern);
            for word in text.split_whitespace().filter(|w| w.len() > 3) {
                push_unique(&mut entry.keywords, word);
            }

            if entry.examples.len() < MAX_EXAMPLES {
                entry.examples.push(tx.display_description().to_string());
            }
        }
    }

    let mut suggestions: Vec<BucketSuggestion> = order
        .into_iter()
        .filter_map(|pattern| {
            let entry = entries.remove(&pattern)?;
            if entry.count < MIN_OCCURRENCES {
                return None;
            }
            let mut keywords = entry.keywords;
            keywords.truncate(MAX_KEYWORDS);
            Some(BucketSuggestion {
                name: bucket_name(&pattern),
                keywords,
                match_count: entry.count,
                examples: entry.examples,
            })
        })
        .collect();

    suggestions.sort_by(|a, b| b.match_count.cmp(&a.match_count));
    suggestions
}

/// Pattern targets from a lowercased description; falls back to the first
/// significant non-generic word when no shape matches.
fn extract_patterns(text: &str) -> Vec<String> {
    let mut patterns: Vec<String> = Vec::new();
    for re in pattern_regexes() {
        if let Some(caps) = re.captures(text) {
            push_unique(&mut patterns, &caps[1].to_lowercase());
        }
    }

    if patterns.is_empty() {
        if let Some(word) = text
            .split_whitespace()
            .find(|w| w.len() > 3 && !GENERIC_WORDS.contains(w))
        {
            patterns.push(word.to_string());
        }
    }

    patterns
}

fn bucket_name(pattern: &str) -> String {
    let mut chars = pattern.chars();
    match chars.next() {
        Some(first) => format!("{}{} Fund", first.to_uppercase(), chars.as_str()),
        None => "Fund".to_string(),
    }
}

fn push_unique(keywords: &mut Vec<String>, keyword: &str) {
    if !keywords.iter().any(|k| k == keyword) {
        keywords.push(keyword.to_string());
    }
}
