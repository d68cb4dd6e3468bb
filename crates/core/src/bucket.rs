use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// A user-named spending/savings category scoped to one account. A bucket
/// never matches transactions from a different account; callers group per
/// account before matching (see the auto-classifier for the enforced check).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
    pub account_number: String,
    /// Lowercase-compared substrings; the bucket name seeds the first
    /// keyword on creation and the user may edit the list freely.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Bucket {
    pub fn new(name: &str, account_number: &str) -> Self {
        Bucket {
            id: format!("bucket_{}", uuid::Uuid::new_v4().simple()),
            name: name.to_string(),
            account_number: account_number.to_string(),
            keywords: vec![name.to_lowercase()],
        }
    }
}

/// Anchor balance for a bucket: "the balance was exactly `amount` as of
/// `date`". Transactions dated strictly before `date` are excluded from
/// that bucket's running balance; no date means no floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartingAllocation {
    pub amount: Decimal,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Starting allocations keyed by bucket id; at most one per bucket.
pub type AllocationMap = HashMap<String, StartingAllocation>;

/// Buckets whose keywords match the transaction's display description.
/// A match requires at least one non-empty keyword contained in the
/// lowercased description; multiple buckets may match the same transaction.
pub fn find_matching_buckets<'a>(tx: &Transaction, buckets: &'a [Bucket]) -> Vec<&'a Bucket> {
    let desc = tx.display_description().to_lowercase();
    if desc.is_empty() {
        return Vec::new();
    }

    buckets
        .iter()
        .filter(|bucket| {
            bucket.keywords.iter().any(|keyword| {
                let keyword = keyword.to_lowercase();
                !keyword.is_empty() && desc.contains(&keyword)
            })
        })
        .collect()
}

// ── TOML bucket configuration ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BucketFile {
    #[serde(default)]
    buckets: Vec<BucketDef>,
}

#[derive(Debug, Deserialize)]
struct BucketDef {
    id: Option<String>,
    name: String,
    account_number: String,
    #[serde(default)]
    keywords: Vec<String>,
    starting_amount: Option<f64>,
    /// ISO date string; quoted in the TOML file.
    starting_date: Option<String>,
}

/// Load bucket definitions (and optional starting allocations) from a TOML
/// document. Ids default to a slug of name and account so repeated loads of
/// the same file produce the same buckets.
pub fn buckets_from_toml(content: &str) -> Result<(Vec<Bucket>, AllocationMap), String> {
    let file: BucketFile =
        toml::from_str(content).map_err(|e| format!("Failed to parse TOML: {e}"))?;

    let mut buckets = Vec::with_capacity(file.buckets.len());
    let mut allocations = AllocationMap::new();

    for def in file.buckets {
        let id = def
            .id
            .unwrap_or_else(|| format!("{}-{}", slug(&def.name), def.account_number));

        let keywords = if def.keywords.is_empty() {
            vec![def.name.to_lowercase()]
        } else {
            def.keywords
        };

        if let Some(raw) = def.starting_amount {
            let amount = Decimal::from_f64(raw)
                .ok_or_else(|| format!("Invalid starting amount for '{}': {raw}", def.name))?
                .round_dp(2);
            let date = match &def.starting_date {
                Some(s) => Some(
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .map_err(|_| format!("Invalid starting date for '{}': {s}", def.name))?,
                ),
                None => None,
            };
            allocations.insert(id.clone(), StartingAllocation { amount, date });
        }

        buckets.push(Bucket {
            id,
            name: def.name,
            account_number: def.account_number,
            keywords,
        });
    }

    Ok((buckets, allocations))
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Source;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn tx(description: &str) -> Transaction {
        Transaction {
            transaction_id: "tx_1".into(),
            description: description.into(),
            user_description: description.into(),
            amount: Decimal::from_str("-10.00").unwrap(),
            currency: None,
            transaction_date: None,
            posted_date: None,
            account_number: "12345678".into(),
            account_name: String::new(),
            credit_debit: None,
            transaction_type: None,
            provider_name: None,
            merchant_name: None,
            budget_category: None,
            category_name: None,
            user_tags: None,
            notes: None,
            included: true,
            balance: None,
            source: Source::Csv,
            source_file: None,
        }
    }

    fn bucket(name: &str, keywords: &[&str]) -> Bucket {
        Bucket {
            id: name.to_lowercase(),
            name: name.to_string(),
            account_number: "12345678".into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    // ── keyword matching ──────────────────────────────────────────────────────

    #[test]
    fn matches_keyword_case_insensitively() {
        let buckets = vec![bucket("Groceries", &["woolworths"])];
        let hits = find_matching_buckets(&tx("WOOLWORTHS METRO 123"), &buckets);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Groceries");
    }

    #[test]
    fn multiple_buckets_can_match() {
        let buckets = vec![
            bucket("Coffee", &["coffee"]),
            bucket("Eating Out", &["coffee", "restaurant"]),
        ];
        let hits = find_matching_buckets(&tx("Corner Coffee Shop"), &buckets);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn empty_keyword_never_matches() {
        let buckets = vec![bucket("Broken", &[""])];
        assert!(find_matching_buckets(&tx("anything at all"), &buckets).is_empty());
    }

    #[test]
    fn no_keywords_never_matches() {
        let buckets = vec![bucket("Empty", &[])];
        assert!(find_matching_buckets(&tx("anything"), &buckets).is_empty());
    }

    #[test]
    fn empty_description_never_matches() {
        let buckets = vec![bucket("Coffee", &["coffee"])];
        assert!(find_matching_buckets(&tx(""), &buckets).is_empty());
    }

    #[test]
    fn prefers_user_description_for_matching() {
        let mut t = tx("raw text");
        t.user_description = "holiday fund transfer".into();
        let buckets = vec![bucket("Holiday", &["holiday"])];
        assert_eq!(find_matching_buckets(&t, &buckets).len(), 1);
    }

    // ── bucket creation ───────────────────────────────────────────────────────

    #[test]
    fn new_bucket_seeds_name_keyword() {
        let b = Bucket::new("Holiday Fund", "12345678");
        assert!(b.id.starts_with("bucket_"));
        assert_eq!(b.keywords, vec!["holiday fund".to_string()]);
    }

    // ── TOML config ───────────────────────────────────────────────────────────

    #[test]
    fn buckets_from_toml_basic() {
        let content = r#"
            [[buckets]]
            name = "Groceries"
            account_number = "12345678"
            keywords = ["woolworths", "coles"]

            [[buckets]]
            name = "Holiday Fund"
            account_number = "12345678"
            starting_amount = 1500.0
            starting_date = "2024-06-01"
        "#;
        let (buckets, allocations) = buckets_from_toml(content).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].keywords, vec!["woolworths", "coles"]);
        // Keyword defaulted from the name.
        assert_eq!(buckets[1].keywords, vec!["holiday fund"]);

        let alloc = &allocations[&buckets[1].id];
        assert_eq!(alloc.amount, Decimal::from_str("1500.00").unwrap());
        assert_eq!(
            alloc.date,
            Some(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        );
    }

    #[test]
    fn buckets_from_toml_stable_ids() {
        let content = r#"
            [[buckets]]
            name = "Holiday Fund"
            account_number = "12345678"
        "#;
        let (a, _) = buckets_from_toml(content).unwrap();
        let (b, _) = buckets_from_toml(content).unwrap();
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[0].id, "holiday-fund-12345678");
    }

    #[test]
    fn buckets_from_toml_rejects_bad_date() {
        let content = r#"
            [[buckets]]
            name = "X"
            account_number = "1"
            starting_amount = 10.0
            starting_date = "junk"
        "#;
        assert!(buckets_from_toml(content).is_err());
    }
}
