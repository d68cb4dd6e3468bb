pub mod account;
pub mod balance;
pub mod bucket;
pub mod classify;
pub mod transaction;

pub use account::{
    detect_accounts, extract_accounts, AccountSuggestion, AccountSummary, AccountType,
    SavedAccount,
};
pub use balance::{calculate_balances, calculate_classified_balances, calculate_total};
pub use bucket::{buckets_from_toml, find_matching_buckets, AllocationMap, Bucket, StartingAllocation};
pub use classify::{auto_assign_by_keywords, remove_bucket_classifications, Classifications};
pub use transaction::{content_id, CreditDebit, Source, Transaction, TransactionType};
