use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

fn re_day_first() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").expect("invalid regex"))
}

/// Permissive statement-amount parser. The magnitude is whatever digits and
/// decimal point survive stripping currency symbols, commas and spaces; a
/// literal `-` anywhere in the raw token makes it negative. Returns `None`
/// (not zero) on unparseable input so callers can skip the row.
pub(crate) fn parse_amount(value: &str) -> Option<Decimal> {
    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    let negative = raw.contains('-');
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let magnitude = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Day-first `D/M/YYYY` date, matched anywhere in the token. Calendar
/// validation applies, so an impossible day/month is a parse failure.
pub(crate) fn parse_date_day_first(value: &str) -> Option<NaiveDate> {
    let caps = re_day_first().captures(value)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Day-first date, then the common export formats.
pub(crate) fn parse_date_flexible(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(date) = parse_date_day_first(value) {
        return Some(date);
    }

    for fmt in &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date);
        }
    }

    None
}

/// Word-overlap similarity in [0.0, 1.0] for already-lowercased strings.
/// Words of three or more characters count; a word matches when it is
/// substring-related to any word on the other side; the score is the match
/// count over the larger word set. With no qualifying words on either side,
/// whole-string containment scores 0.6, anything else 0.
pub(crate) fn word_similarity(s1: &str, s2: &str) -> f64 {
    if s1 == s2 {
        return 1.0;
    }
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }

    let words1: Vec<&str> = s1.split_whitespace().filter(|w| w.len() > 2).collect();
    let words2: Vec<&str> = s2.split_whitespace().filter(|w| w.len() > 2).collect();

    if words1.is_empty() || words2.is_empty() {
        return if s1.contains(s2) || s2.contains(s1) { 0.6 } else { 0.0 };
    }

    let matches = words1
        .iter()
        .filter(|w1| words2.iter().any(|w2| w1.contains(w2) || w2.contains(*w1)))
        .count();

    matches as f64 / words1.len().max(words2.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    // ── parse_amount ──────────────────────────────────────────────────────────

    #[test]
    fn parse_amount_plain_and_signed() {
        assert_eq!(parse_amount("123.45"), Some(dec("123.45")));
        assert_eq!(parse_amount("-50.00"), Some(dec("-50.00")));
    }

    #[test]
    fn parse_amount_currency_and_commas() {
        assert_eq!(parse_amount("$1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("-$1,234.56"), Some(dec("-1234.56")));
    }

    #[test]
    fn parse_amount_sign_anywhere_in_token() {
        assert_eq!(parse_amount("$4.50-"), Some(dec("-4.50")));
    }

    #[test]
    fn parse_amount_unparseable_is_none_not_zero() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("pending"), None);
        assert_eq!(parse_amount("$"), None);
    }

    // ── dates ─────────────────────────────────────────────────────────────────

    #[test]
    fn day_first_date() {
        assert_eq!(
            parse_date_day_first("15/01/2024"),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(
            parse_date_day_first("1/2/2024"),
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
    }

    #[test]
    fn day_first_rejects_impossible_dates() {
        assert_eq!(parse_date_day_first("32/01/2024"), None);
        assert_eq!(parse_date_day_first("15/13/2024"), None);
        assert_eq!(parse_date_day_first("January 15"), None);
    }

    #[test]
    fn flexible_date_falls_back_to_iso() {
        assert_eq!(
            parse_date_flexible("2024-01-15"),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(parse_date_flexible("not a date"), None);
    }

    #[test]
    fn flexible_date_prefers_day_first() {
        // 03/04/2024 reads as 3 April, not 4 March.
        assert_eq!(
            parse_date_flexible("03/04/2024"),
            NaiveDate::from_ymd_opt(2024, 4, 3)
        );
    }

    // ── word similarity ───────────────────────────────────────────────────────

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(word_similarity("transfer to savings", "transfer to savings"), 1.0);
    }

    #[test]
    fn related_words_score_high() {
        let score = word_similarity("transfer savings account", "transfer savings");
        assert!(score >= 0.5, "score was {score}");
    }

    #[test]
    fn unrelated_strings_score_low() {
        let score = word_similarity("coffee shop purchase", "salary deposit jun");
        assert!(score < 0.5, "score was {score}");
    }

    #[test]
    fn short_words_only_falls_back_to_containment() {
        assert_eq!(word_similarity("at", "at no 1"), 0.6);
        assert_eq!(word_similarity("at", "zz"), 0.0);
    }
}
