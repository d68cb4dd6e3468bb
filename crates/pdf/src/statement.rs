use std::fmt;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

use bucketeer_core::transaction::{content_id, CreditDebit, Source, Transaction, TransactionType};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_summary_start, r"(?i)account\s+summary");
re!(re_summary_end, r"(?i)posting\s+effective");
re!(re_summary_account,
    r"([A-Z]{2,3})\s*\|?\s*(\d{8,10})\s*\|?\s*([^|]+?)(?:\s*\|?\s*\$[\d,]+\.\d{2})?$");

re!(re_account_label, r"(?i)AC No:|Account No\.|Account Number");
re!(re_account_capture, r"(?i)AC No:\s*(\d{8,10})");

re!(re_table_header_piped, r"(?i)date\s*\|.*balance");
re!(re_table_header_worded,
    r"(?i)date\s+.*(?:description|details|transaction)\s+.*(?:debit|credit|amount|withdrawal|deposit)");
re!(re_page_footer, r"(?i)^page\s+\d+\s+of\s+\d+$");
re!(re_page_marker, r"(?i)page\s+\d+");

re!(re_dated_line, r"^(\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}|\d{1,2}\s+[A-Za-z]{3})");
re!(re_amount, r"(-?)\$?([\d,]+\.\d{2})");
re!(re_amount_tail, r"\|?\s*-?\$?[\d,]+\.\d{2}.*$");

re!(re_year_statement, r"(?i)statement\s+begins\s+.*?(\d{4})");
re!(re_year_period, r"(?i)period\s+.*?(\d{4})");
re!(re_year_date, r"(?i)date\s+.*?(\d{4})");
re!(re_year_generic, r"\b(20\d{2})\b");

re!(re_date_numeric, r"(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{2,4})");
re!(re_date_day_month, r"(\d{1,2})\s+([A-Za-z]{3})");

re!(re_visa_merchant, r"(?i)visa-([^(]+)");

// ── Types ────────────────────────────────────────────────────────────────────

/// Account learned from the statement's summary table.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryAccount {
    pub kind: String,
    pub number: String,
    pub name: String,
}

#[derive(Debug, Clone)]
struct Section {
    text: String,
    account_number: Option<String>,
    account_name: Option<String>,
}

/// What the parser saw, for troubleshooting lossy statements: how many
/// accounts the summary yielded, how many per-account sections were found,
/// how many transactions came out, and whether the aggressive whole-document
/// scan had to run.
#[derive(Debug, Clone, Serialize)]
pub struct ParseTrace {
    pub accounts: Vec<SummaryAccount>,
    pub sections: usize,
    pub transactions: usize,
    pub used_fallback: bool,
}

impl fmt::Display for ParseTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accounts: {}, sections: {}, transactions: {}, fallback: {}",
            self.accounts.len(),
            self.sections,
            self.transactions,
            self.used_fallback
        )
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

/// Parse extracted statement text into transactions.
///
/// Layered: a structured pass learns accounts from the summary table, splits
/// the document into per-account sections and walks each section's
/// transaction table; if that yields nothing, an aggressive line scan over
/// the whole document runs instead. Zero transactions with a trace is a
/// valid (if suspicious) outcome, never an error.
pub fn parse_statement_text(text: &str) -> (Vec<Transaction>, ParseTrace) {
    let accounts = extract_accounts_from_summary(text);
    tracing::debug!(accounts = accounts.len(), "statement summary scanned");

    let sections = split_into_account_sections(text, &accounts);
    tracing::debug!(sections = sections.len(), "account sections found");

    let mut transactions: Vec<Transaction> = sections
        .iter()
        .flat_map(parse_account_section)
        .collect();

    let mut used_fallback = false;
    if transactions.is_empty() {
        used_fallback = true;
        let fallback_account = if sections.is_empty() {
            None
        } else {
            accounts.first().map(|a| a.number.as_str())
        };
        transactions = aggressive_line_scan(text, fallback_account);
        tracing::debug!(
            transactions = transactions.len(),
            "section parse found nothing, aggressive scan used"
        );
    }

    let trace = ParseTrace {
        accounts,
        sections: sections.len(),
        transactions: transactions.len(),
        used_fallback,
    };
    (transactions, trace)
}

// ── Structured pass ──────────────────────────────────────────────────────────

/// Learn `{type, number, name}` triples from the "Account Summary" block.
fn extract_accounts_from_summary(text: &str) -> Vec<SummaryAccount> {
    let mut accounts = Vec::new();
    let mut in_summary = false;

    for line in text.lines() {
        if re_summary_start().is_match(line) {
            in_summary = true;
            continue;
        }
        if !in_summary {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        if re_summary_end().is_match(line) {
            break;
        }

        if let Some(caps) = re_summary_account().captures(line) {
            accounts.push(SummaryAccount {
                kind: caps[1].to_string(),
                number: caps[2].to_string(),
                name: caps[3].trim().to_string(),
            });
        }
    }

    accounts
}

/// Split the document into per-account sections, keyed by lines that carry a
/// known account number near an account-number label. Without known
/// accounts, an explicit `AC No:` line starts a section.
fn split_into_account_sections(text: &str, known: &[SummaryAccount]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section { text: String::new(), account_number: None, account_name: None };

    for line in text.lines() {
        let mut found: Option<(String, String)> = None;

        for account in known {
            if line.contains(&account.number) && re_account_label().is_match(line) {
                found = Some((account.number.clone(), account.name.clone()));
                break;
            }
        }

        if found.is_none() && known.is_empty() {
            if let Some(caps) = re_account_capture().captures(line) {
                let number = caps[1].to_string();
                found = Some((number.clone(), format!("Account {number}")));
            }
        }

        match found {
            Some((number, name)) => {
                if !current.text.is_empty() && current.account_number.is_some() {
                    sections.push(current);
                }
                current = Section {
                    text: format!("{line}\n"),
                    account_number: Some(number),
                    account_name: Some(name),
                };
            }
            None => {
                current.text.push_str(line);
                current.text.push('\n');
            }
        }
    }

    if !current.text.is_empty() && current.account_number.is_some() {
        sections.push(current);
    }

    sections
}

fn statement_year(section_text: &str) -> i32 {
    // Year context lives in the section header, not the transaction rows.
    let header: String = section_text.chars().take(1000).collect();

    for re in [re_year_statement(), re_year_period(), re_year_date()] {
        if let Some(caps) = re.captures(&header) {
            if let Ok(year) = caps[1].parse::<i32>() {
                if (2000..=2100).contains(&year) {
                    return year;
                }
            }
        }
    }

    if let Some(caps) = re_year_generic().captures(&header) {
        if let Ok(year) = caps[1].parse::<i32>() {
            return year;
        }
    }

    chrono::Utc::now().year()
}

struct PendingTx {
    date: Option<NaiveDate>,
    amount: Decimal,
    description_lines: Vec<String>,
}

fn parse_account_section(section: &Section) -> Vec<Transaction> {
    let mut transactions = Vec::new();
    let year = statement_year(&section.text);
    let mut in_table = false;
    let mut pending: Option<PendingTx> = None;

    let flush = |pending: &mut Option<PendingTx>, out: &mut Vec<Transaction>| {
        if let Some(p) = pending.take() {
            let description = p.description_lines.join(" ").trim().to_string();
            out.push(finalize(
                p.date,
                &description,
                p.amount,
                section.account_number.as_deref(),
                section.account_name.as_deref(),
            ));
        }
    };

    for line in section.text.lines() {
        if re_table_header_piped().is_match(line) || re_table_header_worded().is_match(line) {
            in_table = true;
            continue;
        }

        if re_page_footer().is_match(line.trim()) {
            in_table = false;
            flush(&mut pending, &mut transactions);
            continue;
        }

        let date_match = re_dated_line().find(line);
        let has_amount = re_amount().is_match(line);

        if let Some(m) = date_match.filter(|_| in_table || has_amount) {
            flush(&mut pending, &mut transactions);

            let date = parse_statement_date(m.as_str(), Some(year));
            let amount = line_amount(line);
            let description = clean_description(&line[m.end()..]);

            pending = Some(PendingTx {
                date,
                amount,
                description_lines: vec![description],
            });
        } else if let Some(p) = pending.as_mut() {
            // Continuation of a multi-line description.
            if !line.contains('$') && !re_page_marker().is_match(line) {
                p.description_lines.push(line.trim().to_string());
            }
        }
    }

    flush(&mut pending, &mut transactions);
    transactions
}

/// Signed amount for a transaction line: an explicit `-` on the first
/// matched amount always wins; otherwise credit/debit keywords decide; with
/// no evidence at all the amount is treated as a debit — safer for bank
/// statements than assuming income, though it can misclassify credits.
fn line_amount(line: &str) -> Decimal {
    let Some(caps) = re_amount().captures(line) else {
        return Decimal::ZERO;
    };
    let magnitude = parse_magnitude(&caps[2]);

    if !caps[1].is_empty() {
        return -magnitude;
    }

    let lower = line.to_lowercase();
    let is_credit = ["payment from", "deposit", "transfer from", "interest"]
        .iter()
        .any(|k| lower.contains(k));

    if is_credit {
        magnitude
    } else {
        // Debit keywords (purchase, payment to, transfer to, withdrawal,
        // loan payment) and the no-evidence default agree: money out.
        -magnitude
    }
}

fn parse_magnitude(digits: &str) -> Decimal {
    Decimal::from_str(&digits.replace(',', "")).unwrap_or(Decimal::ZERO)
}

/// Strip the amount columns and table pipes off a transaction line's tail,
/// leaving only the description text.
fn clean_description(rest: &str) -> String {
    let stripped = re_amount_tail().replace(rest.trim(), "");
    stripped
        .trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .trim()
        .to_string()
}

/// Statement dates: numeric `D/M/Y` (two-digit years read as 2000s), or
/// `D Mon` with the year supplied from statement context.
fn parse_statement_date(value: &str, default_year: Option<i32>) -> Option<NaiveDate> {
    if let Some(caps) = re_date_numeric().captures(value) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let mut year: i32 = caps[3].parse().ok()?;
        if year < 100 {
            year += 2000;
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = re_date_day_month().captures(value) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year = default_year.unwrap_or_else(|| chrono::Utc::now().year());
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

fn month_number(abbr: &str) -> Option<u32> {
    match abbr.to_lowercase().as_str() {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

fn finalize(
    date: Option<NaiveDate>,
    description: &str,
    amount: Decimal,
    account_number: Option<&str>,
    account_name: Option<&str>,
) -> Transaction {
    let description = if description.is_empty() { "Transaction" } else { description };
    let account_number = account_number.unwrap_or("unknown").to_string();
    let account_name = account_name.unwrap_or("Bank Account").to_string();

    let credit_debit = if amount >= Decimal::ZERO {
        CreditDebit::Credit
    } else {
        CreditDebit::Debit
    };

    Transaction {
        transaction_id: content_id(date, description, amount, &account_number),
        description: description.to_string(),
        user_description: description.to_string(),
        amount,
        currency: Some("AUD".to_string()),
        transaction_date: date,
        posted_date: date,
        account_number,
        account_name,
        credit_debit: Some(credit_debit),
        transaction_type: Some(infer_statement_type(description)),
        provider_name: None,
        merchant_name: Some(extract_statement_merchant(description)),
        budget_category: None,
        category_name: None,
        user_tags: None,
        notes: None,
        included: true,
        balance: None,
        source: Source::Pdf,
        source_file: None,
    }
}

fn infer_statement_type(description: &str) -> TransactionType {
    let desc = description.to_lowercase();
    if desc.contains("transfer") {
        TransactionType::Transfer
    } else if desc.contains("purchase") {
        TransactionType::Purchase
    } else if desc.contains("payment") {
        TransactionType::Payment
    } else if desc.contains("deposit") {
        TransactionType::Deposit
    } else if desc.contains("withdrawal") {
        TransactionType::Withdrawal
    } else if desc.contains("interest") {
        TransactionType::Interest
    } else if desc.contains("fee") {
        TransactionType::Fee
    } else {
        TransactionType::Unknown
    }
}

fn extract_statement_merchant(description: &str) -> String {
    if let Some(caps) = re_visa_merchant().captures(description) {
        return caps[1].trim().to_string();
    }
    description.to_string()
}

// ── Aggressive fallback ──────────────────────────────────────────────────────

/// Whole-document line scan with no section or table context: any line that
/// starts with a date and carries an amount becomes a transaction. The
/// description keeps the raw line tail and the sign heuristic is cruder
/// than the structured pass — this is a last resort for statements whose
/// layout defeated section detection.
fn aggressive_line_scan(text: &str, account_number: Option<&str>) -> Vec<Transaction> {
    let mut transactions = Vec::new();

    for line in text.lines() {
        let Some(date_match) = re_dated_line().find(line) else {
            continue;
        };
        let Some(caps) = re_amount().captures(line) else {
            continue;
        };

        let date = parse_statement_date(date_match.as_str(), None);
        let magnitude = parse_magnitude(&caps[2]);
        let signed = if line.contains('-') || line.to_lowercase().contains("debit") {
            -magnitude
        } else {
            magnitude
        };
        let description = line[date_match.end()..].trim().to_string();

        transactions.push(finalize(date, &description, signed, account_number, None));
    }

    transactions
}
