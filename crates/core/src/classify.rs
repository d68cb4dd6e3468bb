use std::collections::HashMap;

use crate::bucket::Bucket;
use crate::transaction::Transaction;

/// Explicit transaction→bucket assignment: at most one bucket per
/// transaction, never overwritten automatically once set.
pub type Classifications = HashMap<String, String>;

/// Assign unclassified transactions to buckets by keyword. Only buckets of
/// the transaction's own account are candidates; the first matching bucket
/// wins; existing assignments are left untouched. Returns the number of
/// assignments made.
pub fn auto_assign_by_keywords(
    transactions: &[Transaction],
    buckets: &[Bucket],
    classifications: &mut Classifications,
) -> usize {
    let mut assigned = 0;

    for tx in transactions {
        if classifications.contains_key(&tx.transaction_id) {
            continue;
        }

        let description = tx.match_description().to_lowercase();
        let account_number = if tx.account_number.is_empty() {
            "unknown"
        } else {
            tx.account_number.as_str()
        };

        for bucket in buckets {
            if bucket.account_number != account_number {
                continue;
            }

            let matches = bucket.keywords.iter().any(|keyword| {
                let keyword = keyword.to_lowercase();
                let keyword = keyword.trim();
                !keyword.is_empty() && description.contains(keyword)
            });

            if matches {
                classifications.insert(tx.transaction_id.clone(), bucket.id.clone());
                assigned += 1;
                break;
            }
        }
    }

    assigned
}

/// Cascade for bucket deletion: drop every classification pointing at the
/// bucket. Returns the number of entries removed.
pub fn remove_bucket_classifications(
    classifications: &mut Classifications,
    bucket_id: &str,
) -> usize {
    let before = classifications.len();
    classifications.retain(|_, assigned| assigned != bucket_id);
    before - classifications.len()
}
