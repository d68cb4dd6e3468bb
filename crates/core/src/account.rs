use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Savings,
    DayToDay,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Savings => write!(f, "savings"),
            AccountType::DayToDay => write!(f, "day_to_day"),
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "savings" => Ok(AccountType::Savings),
            "day_to_day" => Ok(AccountType::DayToDay),
            other => Err(format!("Unknown account type: '{other}'")),
        }
    }
}

/// User-confirmed account metadata, persisted independently of the
/// transaction set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAccount {
    pub account_number: String,
    pub account_name: String,
    #[serde(default)]
    pub bsb: Option<String>,
    #[serde(default)]
    pub account_type: Option<AccountType>,
}

/// Per-account aggregate derived from the transaction set. The balance is
/// always recomputed, never persisted as authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_number: String,
    pub account_name: String,
    pub transaction_count: usize,
    pub balance: Decimal,
}

/// An account surfaced for user confirmation after import, cross-referenced
/// against saved metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSuggestion {
    pub account_number: String,
    pub account_name: String,
    #[serde(default)]
    pub bsb: Option<String>,
    pub transaction_count: usize,
    pub balance: Decimal,
    #[serde(default)]
    pub account_type: Option<AccountType>,
    /// Exact match found in the saved accounts list.
    pub is_saved: bool,
    /// Needs user confirmation (no saved match).
    pub suggested: bool,
}

impl AccountSuggestion {
    pub fn is_valid(&self) -> bool {
        self.account_number != "unknown" && self.transaction_count > 0
    }
}

fn group_key(tx: &Transaction) -> &str {
    if tx.account_number.is_empty() {
        "unknown"
    } else {
        &tx.account_number
    }
}

/// Group transactions by account number ("unknown" when absent) in
/// first-seen order, with transaction counts and net signed balances.
pub fn extract_accounts(transactions: &[Transaction]) -> Vec<AccountSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut by_number: HashMap<String, AccountSummary> = HashMap::new();

    for tx in transactions {
        let number = group_key(tx);
        let entry = by_number.entry(number.to_string()).or_insert_with(|| {
            order.push(number.to_string());
            AccountSummary {
                account_number: number.to_string(),
                account_name: if tx.account_name.is_empty() {
                    "Unknown Account".to_string()
                } else {
                    tx.account_name.clone()
                },
                transaction_count: 0,
                balance: Decimal::ZERO,
            }
        });
        entry.transaction_count += 1;
        entry.balance += tx.signed_amount();
    }

    order
        .into_iter()
        .map(|number| by_number.remove(&number).unwrap())
        .collect()
}

/// Detect accounts for confirmation: group as [`extract_accounts`], prefer
/// saved name/bsb/type over values observed in the data, flag saved vs
/// suggested, and sort by transaction count descending so the most active
/// account surfaces first.
pub fn detect_accounts(
    transactions: &[Transaction],
    saved_accounts: &[SavedAccount],
) -> Vec<AccountSuggestion> {
    let mut suggestions: Vec<AccountSuggestion> = extract_accounts(transactions)
        .into_iter()
        .map(|summary| {
            let saved = saved_accounts
                .iter()
                .find(|sa| sa.account_number == summary.account_number);

            let account_name = match saved {
                Some(sa) => sa.account_name.clone(),
                None if summary.account_name != "Unknown Account" => summary.account_name.clone(),
                None => format!("Account {}", summary.account_number),
            };

            AccountSuggestion {
                account_number: summary.account_number,
                account_name,
                bsb: saved.and_then(|sa| sa.bsb.clone()),
                transaction_count: summary.transaction_count,
                balance: summary.balance,
                account_type: saved.and_then(|sa| sa.account_type),
                is_saved: saved.is_some(),
                suggested: saved.is_none(),
            }
        })
        .collect();

    suggestions.sort_by(|a, b| b.transaction_count.cmp(&a.transaction_count));
    suggestions
}
