use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;

use bucketeer_core::transaction::Transaction;

use crate::util::word_similarity;

fn re_reference_token() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)(?:NET|APP|Ref)[#.]\s*\d+").expect("invalid regex"))
}

/// Reference token from a description (`NET#123`, `APP#123`, `Ref#123`,
/// `Ref.123`), normalized to uppercase with internal whitespace removed.
pub fn extract_ref_token(description: &str) -> Option<String> {
    re_reference_token()
        .find(description)
        .map(|m| m.as_str().to_uppercase().split_whitespace().collect())
}

/// Whether two transactions describe the same real-world event.
///
/// Rules apply in order of signal strength; the first decisive rule wins.
/// A shared reference token with near-equal magnitudes short-circuits all
/// other checks — the same transfer reported by two export formats can
/// carry differently-masked account numbers and a one-day date skew.
/// Absent a reference token, the amounts, dates, account numbers and
/// descriptions must all be compatible.
pub fn are_duplicates(a: &Transaction, b: &Transaction) -> bool {
    let amount_a = a.amount.abs();
    let amount_b = b.amount.abs();

    // 1. Reference token match.
    let ref_a = extract_ref_token(a.match_description());
    let ref_b = extract_ref_token(b.match_description());
    if let (Some(ref_a), Some(ref_b)) = (ref_a, ref_b) {
        if ref_a == ref_b && (amount_a - amount_b).abs() < Decimal::new(5, 2) {
            return true;
        }
    }

    // 2. Amount magnitudes within a cent.
    if (amount_a - amount_b).abs() > Decimal::new(1, 2) {
        return false;
    }

    // 3. Dates within one day.
    let days = (a.date_or_epoch() - b.date_or_epoch()).num_days().abs();
    if days > 1 {
        return false;
    }

    // 4. Account numbers compatible, tolerating masked forms.
    if !accounts_compatible(a.account_number.trim(), b.account_number.trim()) {
        return false;
    }

    // 5. Descriptions compatible: containment handles truncated vs full
    //    text, word overlap handles reworded variants.
    let desc_a = a.match_description().to_lowercase();
    let desc_b = b.match_description().to_lowercase();
    let desc_a = desc_a.trim();
    let desc_b = desc_b.trim();
    if !desc_a.is_empty() && !desc_b.is_empty() {
        if desc_a.contains(desc_b) || desc_b.contains(desc_a) {
            return true;
        }
        if word_similarity(desc_a, desc_b) < 0.5 {
            return false;
        }
    }

    true
}

/// Suffix comparison of digit-stripped account numbers, so `***1234`
/// matches `991234`. Known weakness: two unrelated accounts sharing a
/// short suffix can collide; kept as-is rather than silently tightened.
fn accounts_compatible(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }

    let digits_a: String = a.chars().filter(char::is_ascii_digit).collect();
    let digits_b: String = b.chars().filter(char::is_ascii_digit).collect();

    if digits_a.len() >= 3 && digits_b.len() >= 3 {
        digits_a.ends_with(&digits_b) || digits_b.ends_with(&digits_a)
    } else {
        digits_a == digits_b || a == b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub existing: usize,
    pub new: usize,
    pub unique: usize,
    pub duplicates: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: Vec<Transaction>,
    pub stats: MergeStats,
}

/// Fold newly parsed transactions into an existing set. The caller's slice
/// is never mutated. Each incoming transaction is matched against the
/// merged set by linear scan — first duplicate wins, with no attempt to
/// find a best match — and either enriches the matched record in place or
/// is appended as unique. O(existing × incoming); fine at personal-finance
/// scale (hundreds to low thousands of rows).
pub fn merge_transactions(existing: &[Transaction], incoming: &[Transaction]) -> MergeOutcome {
    let mut merged = existing.to_vec();
    let mut duplicates = 0;
    let mut unique = 0;

    for new_tx in incoming {
        match merged.iter_mut().find(|m| are_duplicates(new_tx, m)) {
            Some(matched) => {
                duplicates += 1;
                enrich(matched, new_tx);
            }
            None => {
                merged.push(new_tx.clone());
                unique += 1;
            }
        }
    }

    let stats = MergeStats {
        existing: existing.len(),
        new: incoming.len(),
        unique,
        duplicates,
        total: merged.len(),
    };

    MergeOutcome { merged, stats }
}

/// Improve the surviving record with data from its duplicate: the longer
/// description wins (propagating to a user description that was still in
/// sync), and an unmasked account number replaces a masked or unknown one —
/// never the reverse.
fn enrich(existing: &mut Transaction, incoming: &Transaction) {
    if incoming.description.len() > existing.description.len() {
        let old_description = std::mem::replace(&mut existing.description, incoming.description.clone());
        if existing.user_description == old_description || existing.user_description.is_empty() {
            existing.user_description = incoming.description.clone();
        }
    }

    let old_masked = existing.account_number.is_empty()
        || existing.account_number == "unknown"
        || existing.account_number.to_lowercase().contains('x');
    let new_explicit = !incoming.account_number.is_empty()
        && !incoming.account_number.to_lowercase().contains('x');
    if old_masked && new_explicit {
        existing.account_number = incoming.account_number.clone();
    }
}
