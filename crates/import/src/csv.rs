use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use thiserror::Error;

use bucketeer_core::transaction::{content_id, CreditDebit, Source, Transaction, TransactionType};

use crate::util::{parse_amount, parse_date_day_first, parse_date_flexible};

/// The two recognized statement-export shapes.
///
/// A bank export carries entered/effective dates, a description, amount and
/// running balance but no account column — the account number arrives as a
/// filename side-channel. An aggregator export is fully self-describing
/// with an explicit `account_number` column and one column per record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    BankExport,
    Aggregator,
}

/// Header tokens expected of a bank export, compared by substring
/// containment to tolerate header variants.
const BANK_EXPORT_HEADERS: &[&str] = &[
    "effective_date",
    "entered_date",
    "transaction_description",
    "amount",
    "balance",
];

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("CSV must contain a header row and at least one data row")]
    TooFewLines,
    #[error("Missing required headers: {0}")]
    MissingHeaders(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Tokenize one CSV line with RFC4180 quoting: quoted fields, `""` as an
/// escaped quote, commas inside quotes are not delimiters.
pub fn tokenize_line(line: &str) -> Result<Vec<String>, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Dialect detection by header-shape voting. The bank export has no
/// discriminator column, so three or more of its expected tokens select it;
/// otherwise an `account_number` column selects the aggregator; a lone
/// `entered`/`transaction_description` still reads as a bank export; the
/// aggregator is the default since its missing-header validation produces a
/// clear error rather than a silent misparse.
pub fn detect_dialect(headers: &[String]) -> Dialect {
    let votes = BANK_EXPORT_HEADERS
        .iter()
        .filter(|expected| headers.iter().any(|h| h.contains(*expected)))
        .count();
    if votes >= 3 {
        return Dialect::BankExport;
    }

    if headers.iter().any(|h| h.contains("account_number")) {
        return Dialect::Aggregator;
    }

    if headers
        .iter()
        .any(|h| h.contains("entered") || h.contains("transaction_description"))
    {
        return Dialect::BankExport;
    }

    Dialect::Aggregator
}

fn re_statement_prefix() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)Statement_(\d{8,10})_").expect("invalid regex"))
}

fn re_account_digits() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(\d{8,10})").expect("invalid regex"))
}

/// Account number from a statement filename: a `Statement_` prefix followed
/// by 8–10 digits, else any 8–10 digit run.
pub fn extract_account_from_filename(filename: &str) -> Option<String> {
    if let Some(caps) = re_statement_prefix().captures(filename) {
        return Some(caps[1].to_string());
    }
    re_account_digits()
        .captures(filename)
        .map(|caps| caps[1].to_string())
}

/// Parse statement CSV text into normalized transactions. The filename is
/// consumed only for bank-export account-number inference and diagnostics.
pub fn parse(text: &str, filename: Option<&str>) -> Result<Vec<Transaction>, CsvError> {
    let lines: Vec<&str> = text.trim().lines().collect();
    if lines.len() < 2 {
        return Err(CsvError::TooFewLines);
    }

    let headers: Vec<String> = tokenize_line(lines[0])?
        .iter()
        .map(|h| normalize_header(h))
        .collect();

    match detect_dialect(&headers) {
        Dialect::BankExport => parse_bank_export(&lines[1..], &headers, filename),
        Dialect::Aggregator => parse_aggregator(&lines[1..], &headers, filename),
    }
}

// ── Bank export ───────────────────────────────────────────────────────────────

fn parse_bank_export(
    rows: &[&str],
    headers: &[String],
    filename: Option<&str>,
) -> Result<Vec<Transaction>, CsvError> {
    let account_number = filename
        .and_then(extract_account_from_filename)
        .unwrap_or_else(|| "unknown".to_string());
    let account_name = format!("Account {account_number}");

    let entered_idx = headers.iter().position(|h| h.contains("entered"));
    let effective_idx = headers.iter().position(|h| h.contains("effective"));
    let description_idx = headers.iter().position(|h| h.contains("description"));
    let amount_idx = headers.iter().position(|h| h == "amount");
    let balance_idx = headers.iter().position(|h| h == "balance");

    let mut transactions = Vec::new();

    for row in rows {
        if row.trim().is_empty() {
            continue;
        }
        let values = tokenize_line(row)?;

        // Prefer the entered date, fall back to the effective date.
        let mut date_str = field(&values, entered_idx);
        if date_str.trim().is_empty() {
            date_str = field(&values, effective_idx);
        }

        let description = field(&values, description_idx).trim().to_string();
        let amount = parse_amount(field(&values, amount_idx));
        let balance = parse_amount(field(&values, balance_idx));
        let date = parse_date_day_first(date_str);

        // Rows without a parseable amount and date are silently dropped —
        // tolerance over strictness for noisy bank exports.
        let (Some(amount), Some(date)) = (amount, date) else {
            continue;
        };

        let credit_debit = if amount >= Decimal::ZERO {
            CreditDebit::Credit
        } else {
            CreditDebit::Debit
        };

        transactions.push(Transaction {
            transaction_id: content_id(Some(date), &description, amount, &account_number),
            description: description.clone(),
            user_description: description.clone(),
            amount,
            currency: Some("AUD".to_string()),
            transaction_date: Some(date),
            posted_date: Some(date),
            account_number: account_number.clone(),
            account_name: account_name.clone(),
            credit_debit: Some(credit_debit),
            transaction_type: Some(infer_bank_transaction_type(&description)),
            provider_name: None,
            merchant_name: Some(extract_merchant_name(&description)),
            budget_category: None,
            category_name: None,
            user_tags: None,
            notes: None,
            included: true,
            balance,
            source: Source::Csv,
            source_file: filename.map(str::to_string),
        });
    }

    Ok(transactions)
}

fn field<'a>(values: &'a [String], idx: Option<usize>) -> &'a str {
    idx.and_then(|i| values.get(i)).map_or("", |s| s.as_str())
}

fn infer_bank_transaction_type(description: &str) -> TransactionType {
    let desc = description.to_lowercase();
    if desc.contains("external transfer") {
        TransactionType::ExternalTransfer
    } else if desc.contains("transfer") {
        TransactionType::Transfer
    } else if desc.contains("direct debit") {
        TransactionType::DirectDebit
    } else if desc.contains("bpay") {
        TransactionType::Bpay
    } else if desc.contains("payto") {
        TransactionType::PayTo
    } else if desc.contains("interest") {
        TransactionType::Interest
    } else {
        TransactionType::Other
    }
}

fn re_direct_debit_merchant() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)Direct Debit\s+([^-]+)").expect("invalid regex"))
}

fn re_payto_merchant() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)PayTo:\s+([^R]+)").expect("invalid regex"))
}

fn re_bpay_merchant() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)Bpay\s+\S+\s+to\s+([^\d]+)").expect("invalid regex"))
}

/// Merchant/payee extracted from the known description shapes; the full
/// description when none apply.
fn extract_merchant_name(description: &str) -> String {
    for re in [re_direct_debit_merchant(), re_payto_merchant(), re_bpay_merchant()] {
        if let Some(caps) = re.captures(description) {
            return caps[1].trim().to_string();
        }
    }
    description.to_string()
}

// ── Aggregator export ─────────────────────────────────────────────────────────

fn parse_aggregator(
    rows: &[&str],
    headers: &[String],
    filename: Option<&str>,
) -> Result<Vec<Transaction>, CsvError> {
    let required = ["amount", "transaction_date", "account_number", "account_name"];
    let missing: Vec<&str> = required
        .iter()
        .filter(|r| !headers.iter().any(|h| h.contains(*r)))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(CsvError::MissingHeaders(missing.join(", ")));
    }

    let mut transactions = Vec::new();

    for row in rows {
        if row.trim().is_empty() {
            continue;
        }
        let values = tokenize_line(row)?;

        let mut id = String::new();
        let mut description = String::new();
        let mut user_description = String::new();
        let mut amount: Option<Decimal> = None;
        let mut currency: Option<String> = None;
        let mut transaction_date = None;
        let mut posted_date = None;
        let mut account_number = String::new();
        let mut account_name = String::new();
        let mut credit_debit = None;
        let mut transaction_type = None;
        let mut provider_name = None;
        let mut merchant_name = None;
        let mut budget_category = None;
        let mut category_name = None;
        let mut user_tags = None;
        let mut notes = None;
        let mut included: Option<bool> = None;

        for (i, header) in headers.iter().enumerate() {
            let value = values.get(i).map_or("", |s| s.as_str()).trim();
            match header.as_str() {
                "transaction_id" => id = value.to_string(),
                "description" => description = value.to_string(),
                "user_description" => user_description = value.to_string(),
                "amount" => amount = parse_amount(value),
                "currency" => currency = non_empty(value),
                "transaction_date" => transaction_date = parse_date_flexible(value),
                "posted_date" => posted_date = parse_date_flexible(value),
                "account_number" => account_number = value.to_string(),
                "account_name" => account_name = value.to_string(),
                "credit_debit" => credit_debit = CreditDebit::from_str(value).ok(),
                "transaction_type" => {
                    transaction_type = if value.is_empty() {
                        None
                    } else {
                        Some(TransactionType::from_str(value).unwrap_or(TransactionType::Unknown))
                    }
                }
                "provider_name" => provider_name = non_empty(value),
                "merchant_name" => merchant_name = non_empty(value),
                "budget_category" => budget_category = non_empty(value),
                "category_name" => category_name = non_empty(value),
                "user_tags" => user_tags = non_empty(value),
                "notes" => notes = non_empty(value),
                "included" => {
                    included = Some(value.eq_ignore_ascii_case("true") || value == "1")
                }
                _ => {}
            }
        }

        // The row must carry an amount and a transaction date.
        let (Some(amount), Some(date)) = (amount, transaction_date) else {
            continue;
        };

        let transaction_id = if id.is_empty() {
            content_id(Some(date), &description, amount, &account_number)
        } else {
            id
        };

        transactions.push(Transaction {
            transaction_id,
            description,
            user_description,
            amount,
            currency,
            transaction_date: Some(date),
            posted_date,
            account_number,
            account_name,
            credit_debit,
            transaction_type,
            provider_name,
            merchant_name,
            budget_category,
            category_name,
            user_tags,
            notes,
            included: included.unwrap_or(true),
            balance: None,
            source: Source::Csv,
            source_file: filename.map(str::to_string),
        });
    }

    Ok(transactions)
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
