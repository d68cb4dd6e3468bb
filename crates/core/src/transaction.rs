use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditDebit {
    Credit,
    Debit,
}

impl fmt::Display for CreditDebit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditDebit::Credit => write!(f, "credit"),
            CreditDebit::Debit => write!(f, "debit"),
        }
    }
}

impl std::str::FromStr for CreditDebit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "credit" => Ok(CreditDebit::Credit),
            "debit" => Ok(CreditDebit::Debit),
            other => Err(format!("Unknown credit/debit marker: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Csv,
    Pdf,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Csv => write!(f, "csv"),
            Source::Pdf => write!(f, "pdf"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Transfer,
    ExternalTransfer,
    DirectDebit,
    Bpay,
    #[serde(rename = "payto")]
    PayTo,
    Purchase,
    Payment,
    Deposit,
    Withdrawal,
    Interest,
    Fee,
    Other,
    Unknown,
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transfer" => Ok(TransactionType::Transfer),
            "external_transfer" => Ok(TransactionType::ExternalTransfer),
            "direct_debit" => Ok(TransactionType::DirectDebit),
            "bpay" => Ok(TransactionType::Bpay),
            "payto" => Ok(TransactionType::PayTo),
            "purchase" => Ok(TransactionType::Purchase),
            "payment" => Ok(TransactionType::Payment),
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "interest" => Ok(TransactionType::Interest),
            "fee" => Ok(TransactionType::Fee),
            "other" => Ok(TransactionType::Other),
            "unknown" => Ok(TransactionType::Unknown),
            other => Err(format!("Unknown transaction type: '{other}'")),
        }
    }
}

/// The canonical record produced by every statement parser.
///
/// `amount` is signed; when `credit_debit` is present it wins over the sign
/// for resolving the net effect (see [`Transaction::signed_amount`]). Dates
/// are calendar dates only — statement exports carry no time component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_description: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<NaiveDate>,
    #[serde(default)]
    pub posted_date: Option<NaiveDate>,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub credit_debit: Option<CreditDebit>,
    #[serde(default)]
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub budget_category: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub user_tags: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// False means soft-deleted: excluded from all balance computation.
    #[serde(default = "default_included")]
    pub included: bool,
    /// Running balance when the export carries one (bank-export dialect).
    #[serde(default)]
    pub balance: Option<Decimal>,
    pub source: Source,
    #[serde(default)]
    pub source_file: Option<String>,
}

fn default_included() -> bool {
    true
}

impl Transaction {
    /// Description used for display, bucket matching and suggestion:
    /// the user-supplied text when present, the raw statement text otherwise.
    pub fn display_description(&self) -> &str {
        if self.user_description.is_empty() {
            &self.description
        } else {
            &self.user_description
        }
    }

    /// Description used for duplicate matching: the raw statement text when
    /// present, the user-supplied text otherwise.
    pub fn match_description(&self) -> &str {
        if self.description.is_empty() {
            &self.user_description
        } else {
            &self.description
        }
    }

    /// `transaction_date` is authoritative, `posted_date` is the fallback.
    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.transaction_date.or(self.posted_date)
    }

    /// Effective date with the Unix epoch substituted when both dates are
    /// missing, giving callers a total order.
    pub fn date_or_epoch(&self) -> NaiveDate {
        self.effective_date().unwrap_or(epoch())
    }

    /// Net effect of the transaction: positive for money in, negative for
    /// money out. An explicit `credit_debit` marker wins over the sign of
    /// `amount`; absent both, the amount is treated as a debit.
    pub fn signed_amount(&self) -> Decimal {
        let magnitude = self.amount.abs();
        if matches!(self.credit_debit, Some(CreditDebit::Credit)) || self.amount > Decimal::ZERO {
            magnitude
        } else {
            -magnitude
        }
    }
}

pub fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

/// Deterministic content-addressed transaction id over the fields that
/// identify a real-world event. Identical (date, description, amount,
/// account) always yields the same id; collisions across unrelated rows are
/// an accepted simplification — duplicate detection does not rely on ids.
pub fn content_id(
    date: Option<NaiveDate>,
    description: &str,
    amount: Decimal,
    account_number: &str,
) -> String {
    let date_part = date.map(|d| d.to_string()).unwrap_or_default();
    let desc_part: String = description.chars().take(50).collect();
    let amount_part = format!("{:.2}", amount.round_dp(2));
    let key = format!("{date_part}-{desc_part}-{amount_part}-{account_number}");
    format!("tx_{}", string_hash_32(&key).unsigned_abs())
}

// 32-bit wrapping string hash (h = h * 31 + unit) over UTF-16 code units.
fn string_hash_32(s: &str) -> i32 {
    let mut hash: i32 = 0;
    for unit in s.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
    }
    hash
}
