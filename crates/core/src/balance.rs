use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::bucket::{find_matching_buckets, AllocationMap, Bucket};
use crate::classify::Classifications;
use crate::transaction::Transaction;

/// Keyword-driven bucket balances (the per-account aggregate view).
///
/// Each bucket starts at its starting allocation (0 without one). Included,
/// non-zero transactions are applied in date order; the signed amount fans
/// out to every keyword-matching bucket. A bucket with a dated allocation
/// ignores transactions dated strictly before that date — other matching
/// buckets still receive the amount.
pub fn calculate_balances(
    buckets: &[Bucket],
    transactions: &[Transaction],
    allocations: &AllocationMap,
) -> HashMap<String, Decimal> {
    let mut balances = initial_balances(buckets, allocations);

    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|tx| tx.date_or_epoch());

    for tx in ordered {
        if !tx.included || tx.amount.is_zero() {
            continue;
        }

        let signed = tx.signed_amount();
        let tx_date = tx.date_or_epoch();

        for bucket in find_matching_buckets(tx, buckets) {
            if before_allocation_date(allocations, &bucket.id, tx_date) {
                continue;
            }
            if let Some(balance) = balances.get_mut(&bucket.id) {
                *balance += signed;
            }
        }
    }

    balances
}

/// Classification-driven bucket balances (the per-transaction assignment
/// view). Each transaction contributes to at most one bucket — the one in
/// the classification map. Unmapped or excluded transactions contribute
/// nothing; the allocation date floor applies as in keyword mode.
pub fn calculate_classified_balances(
    buckets: &[Bucket],
    transactions: &[Transaction],
    classifications: &Classifications,
    allocations: &AllocationMap,
) -> HashMap<String, Decimal> {
    let mut balances = initial_balances(buckets, allocations);

    for tx in transactions {
        if !tx.included {
            continue;
        }

        let Some(bucket_id) = classifications.get(&tx.transaction_id) else {
            continue;
        };
        if !balances.contains_key(bucket_id) {
            continue;
        }
        if before_allocation_date(allocations, bucket_id, tx.date_or_epoch()) {
            continue;
        }

        *balances.get_mut(bucket_id).unwrap() += tx.signed_amount();
    }

    balances
}

/// Sum of all bucket balances.
pub fn calculate_total(balances: &HashMap<String, Decimal>) -> Decimal {
    balances.values().copied().sum()
}

fn initial_balances(buckets: &[Bucket], allocations: &AllocationMap) -> HashMap<String, Decimal> {
    buckets
        .iter()
        .map(|bucket| {
            let start = allocations
                .get(&bucket.id)
                .map(|a| a.amount)
                .unwrap_or(Decimal::ZERO);
            (bucket.id.clone(), start)
        })
        .collect()
}

fn before_allocation_date(
    allocations: &AllocationMap,
    bucket_id: &str,
    tx_date: chrono::NaiveDate,
) -> bool {
    allocations
        .get(bucket_id)
        .and_then(|a| a.date)
        .is_some_and(|floor| tx_date < floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::StartingAllocation;
    use crate::transaction::{CreditDebit, Source};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx(id: &str, desc: &str, amount: &str, cd: Option<CreditDebit>) -> Transaction {
        Transaction {
            transaction_id: id.into(),
            description: desc.into(),
            user_description: desc.into(),
            amount: dec(amount),
            currency: None,
            transaction_date: Some(date(2024, 6, 15)),
            posted_date: None,
            account_number: "12345678".into(),
            account_name: String::new(),
            credit_debit: cd,
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

    fn bucket(id: &str, keywords: &[&str]) -> Bucket {
        Bucket {
            id: id.into(),
            name: id.into(),
            account_number: "12345678".into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    // ── keyword mode ──────────────────────────────────────────────────────────

    #[test]
    fn balance_is_sum_of_matching_signed_amounts() {
        let buckets = vec![bucket("coffee", &["coffee"])];
        let transactions = vec![
            tx("tx_1", "Coffee Shop", "-4.50", Some(CreditDebit::Debit)),
            tx("tx_2", "Salary", "2000.00", Some(CreditDebit::Credit)),
        ];
        let balances = calculate_balances(&buckets, &transactions, &AllocationMap::new());
        assert_eq!(balances["coffee"], dec("-4.50"));
    }

    #[test]
    fn transaction_fans_out_to_all_matching_buckets() {
        let buckets = vec![bucket("a", &["transfer"]), bucket("b", &["transfer"])];
        let transactions = vec![tx("tx_1", "Transfer from savings", "50.00", None)];
        let balances = calculate_balances(&buckets, &transactions, &AllocationMap::new());
        assert_eq!(balances["a"], dec("50.00"));
        assert_eq!(balances["b"], dec("50.00"));
    }

    #[test]
    fn allocation_date_floor_excludes_earlier_transactions() {
        let buckets = vec![bucket("fund", &["fund"])];
        let mut allocations = AllocationMap::new();
        allocations.insert(
            "fund".into(),
            StartingAllocation { amount: dec("100.00"), date: Some(date(2024, 6, 1)) },
        );

        let mut early = tx("tx_1", "fund top-up", "-20.00", None);
        early.transaction_date = Some(date(2024, 5, 15));
        let balances = calculate_balances(&buckets, &[early], &allocations);
        assert_eq!(balances["fund"], dec("100.00"));

        let mut late = tx("tx_2", "fund top-up", "-20.00", None);
        late.transaction_date = Some(date(2024, 6, 2));
        let balances = calculate_balances(&buckets, &[late], &allocations);
        assert_eq!(balances["fund"], dec("80.00"));
    }

    #[test]
    fn allocation_date_is_inclusive() {
        let buckets = vec![bucket("fund", &["fund"])];
        let mut allocations = AllocationMap::new();
        allocations.insert(
            "fund".into(),
            StartingAllocation { amount: dec("100.00"), date: Some(date(2024, 6, 1)) },
        );

        let mut on_the_day = tx("tx_1", "fund top-up", "25.00", None);
        on_the_day.transaction_date = Some(date(2024, 6, 1));
        let balances = calculate_balances(&buckets, &[on_the_day], &allocations);
        assert_eq!(balances["fund"], dec("125.00"));
    }

    #[test]
    fn date_floor_skips_only_the_anchored_bucket() {
        let buckets = vec![bucket("anchored", &["shared"]), bucket("open", &["shared"])];
        let mut allocations = AllocationMap::new();
        allocations.insert(
            "anchored".into(),
            StartingAllocation { amount: dec("0.00"), date: Some(date(2024, 7, 1)) },
        );

        let transactions = vec![tx("tx_1", "shared expense", "-10.00", None)]; // 2024-06-15
        let balances = calculate_balances(&buckets, &transactions, &allocations);
        assert_eq!(balances["anchored"], dec("0.00"));
        assert_eq!(balances["open"], dec("-10.00"));
    }

    #[test]
    fn excluded_and_zero_transactions_are_skipped() {
        let buckets = vec![bucket("coffee", &["coffee"])];
        let mut excluded = tx("tx_1", "coffee", "-5.00", None);
        excluded.included = false;
        let zero = tx("tx_2", "coffee", "0.00", None);
        let balances = calculate_balances(&buckets, &[excluded, zero], &AllocationMap::new());
        assert_eq!(balances["coffee"], Decimal::ZERO);
    }

    #[test]
    fn undated_transactions_fall_before_any_floor() {
        let buckets = vec![bucket("fund", &["fund"])];
        let mut allocations = AllocationMap::new();
        allocations.insert(
            "fund".into(),
            StartingAllocation { amount: dec("100.00"), date: Some(date(2024, 1, 1)) },
        );

        let mut undated = tx("tx_1", "fund transfer", "-30.00", None);
        undated.transaction_date = None;
        let balances = calculate_balances(&buckets, &[undated], &allocations);
        assert_eq!(balances["fund"], dec("100.00"));
    }

    // ── classification mode ───────────────────────────────────────────────────

    #[test]
    fn classified_balance_uses_only_the_mapped_bucket() {
        let buckets = vec![bucket("a", &["coffee"]), bucket("b", &["coffee"])];
        let transactions = vec![tx("tx_1", "coffee", "-4.00", None)];
        let mut classifications = Classifications::new();
        classifications.insert("tx_1".into(), "b".into());

        let balances = calculate_classified_balances(
            &buckets,
            &transactions,
            &classifications,
            &AllocationMap::new(),
        );
        // No keyword fan-out: only the assigned bucket moves.
        assert_eq!(balances["a"], Decimal::ZERO);
        assert_eq!(balances["b"], dec("-4.00"));
    }

    #[test]
    fn unmapped_and_excluded_transactions_contribute_nothing() {
        let buckets = vec![bucket("a", &[])];
        let mut excluded = tx("tx_1", "x", "-4.00", None);
        excluded.included = false;
        let unmapped = tx("tx_2", "y", "-9.00", None);

        let mut classifications = Classifications::new();
        classifications.insert("tx_1".into(), "a".into());

        let balances = calculate_classified_balances(
            &buckets,
            &[excluded, unmapped],
            &classifications,
            &AllocationMap::new(),
        );
        assert_eq!(balances["a"], Decimal::ZERO);
    }

    #[test]
    fn classified_mode_honors_allocation_floor() {
        let buckets = vec![bucket("fund", &[])];
        let mut allocations = AllocationMap::new();
        allocations.insert(
            "fund".into(),
            StartingAllocation { amount: dec("50.00"), date: Some(date(2024, 7, 1)) },
        );
        let mut classifications = Classifications::new();
        classifications.insert("tx_1".into(), "fund".into());

        let transactions = vec![tx("tx_1", "x", "-10.00", None)]; // 2024-06-15
        let balances =
            calculate_classified_balances(&buckets, &transactions, &classifications, &allocations);
        assert_eq!(balances["fund"], dec("50.00"));
    }

    #[test]
    fn stale_classification_to_unknown_bucket_is_ignored() {
        let buckets = vec![bucket("a", &[])];
        let mut classifications = Classifications::new();
        classifications.insert("tx_1".into(), "deleted_bucket".into());

        let transactions = vec![tx("tx_1", "x", "-10.00", None)];
        let balances = calculate_classified_balances(
            &buckets,
            &transactions,
            &classifications,
            &AllocationMap::new(),
        );
        assert_eq!(balances["a"], Decimal::ZERO);
        assert_eq!(balances.len(), 1);
    }

    // ── totals ────────────────────────────────────────────────────────────────

    #[test]
    fn total_sums_all_buckets() {
        let mut balances = HashMap::new();
        balances.insert("a".to_string(), dec("10.50"));
        balances.insert("b".to_string(), dec("-3.25"));
        assert_eq!(calculate_total(&balances), dec("7.25"));
        assert_eq!(calculate_total(&HashMap::new()), Decimal::ZERO);
    }
}
