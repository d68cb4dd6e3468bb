use std::path::Path;

use anyhow::Context;
use rust_decimal::Decimal;

use bucketeer_core::bucket::Bucket;
use bucketeer_core::{
    auto_assign_by_keywords, buckets_from_toml, calculate_balances,
    calculate_classified_balances, calculate_total, detect_accounts,
};
use bucketeer_import::{merge_transactions, suggest_buckets, MergeStats};
use bucketeer_storage::DbPool;

use crate::BalanceMode;

pub async fn import(pool: &DbPool, files: &[std::path::PathBuf]) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("No files given — pass one or more .csv or .pdf statements");
    }

    let mut errors: Vec<(String, String)> = Vec::new();

    // Strictly sequential: each file's parse→merge→persist completes before
    // the next file starts, so duplicate detection always sees the previous
    // file's results.
    for file in files {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("statement")
            .to_string();

        match import_file(pool, file, &name).await {
            Ok((parsed, stats)) => {
                if parsed == 0 {
                    println!("{name}: no transactions found");
                } else {
                    println!(
                        "{name}: imported {parsed} transactions, {} duplicates merged, store total {}",
                        stats.duplicates, stats.total
                    );
                }
            }
            Err(err) => errors.push((name, format!("{err:#}"))),
        }
    }

    if !errors.is_empty() {
        println!();
        println!("{} file(s) failed:", errors.len());
        for (name, err) in &errors {
            println!("  {name}: {err}");
        }
    }

    // Surface account suggestions for confirmation, most active first.
    let transactions = bucketeer_storage::get_transactions(pool).await?;
    if !transactions.is_empty() {
        let saved = bucketeer_storage::get_saved_accounts(pool).await?;
        println!();
        println!("Detected accounts:");
        for suggestion in detect_accounts(&transactions, &saved) {
            let status = if suggestion.is_saved { "saved" } else { "needs confirmation" };
            println!(
                "  {} {} — {} transactions, balance {} ({status})",
                suggestion.account_number,
                suggestion.account_name,
                suggestion.transaction_count,
                money(suggestion.balance),
            );
        }
    }

    Ok(())
}

async fn import_file(
    pool: &DbPool,
    path: &Path,
    name: &str,
) -> anyhow::Result<(usize, MergeStats)> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let transactions = match extension.as_str() {
        "csv" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            bucketeer_import::csv::parse(&text, Some(name))?
        }
        "pdf" => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let text = bucketeer_pdf::extract_text(&bytes)?;
            let (mut transactions, trace) = bucketeer_pdf::parse_statement_text(&text);
            tracing::info!(%trace, file = name, "statement parsed");
            if transactions.is_empty() {
                println!("{name}: nothing parsed ({trace})");
            }
            for tx in &mut transactions {
                tx.source_file = Some(name.to_string());
            }
            transactions
        }
        other => anyhow::bail!("Unsupported file type '{other}' — expected .csv or .pdf"),
    };

    let parsed = transactions.len();
    let existing = bucketeer_storage::get_transactions(pool).await?;
    let outcome = merge_transactions(&existing, &transactions);
    bucketeer_storage::save_transactions(pool, &outcome.merged).await?;

    Ok((parsed, outcome.stats))
}

pub async fn accounts(pool: &DbPool) -> anyhow::Result<()> {
    let transactions = bucketeer_storage::get_transactions(pool).await?;
    if transactions.is_empty() {
        println!("No transactions imported yet.");
        return Ok(());
    }

    let saved = bucketeer_storage::get_saved_accounts(pool).await?;
    for suggestion in detect_accounts(&transactions, &saved) {
        let kind = suggestion
            .account_type
            .map(|t| format!(" [{t}]"))
            .unwrap_or_default();
        let status = if suggestion.is_saved { "saved" } else { "suggested" };
        println!(
            "{} {}{kind} — {} transactions, balance {} ({status})",
            suggestion.account_number,
            suggestion.account_name,
            suggestion.transaction_count,
            money(suggestion.balance),
        );
    }

    Ok(())
}

pub async fn buckets(pool: &DbPool, from_toml: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = from_toml {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let (loaded, loaded_allocations) =
            buckets_from_toml(&content).map_err(|e| anyhow::anyhow!(e))?;

        // Upsert by id so repeated loads of the same file are idempotent.
        let mut buckets = bucketeer_storage::get_buckets(pool).await?;
        for bucket in loaded {
            match buckets.iter_mut().find(|b| b.id == bucket.id) {
                Some(existing) => *existing = bucket,
                None => buckets.push(bucket),
            }
        }
        let mut allocations = bucketeer_storage::get_starting_allocations(pool).await?;
        allocations.extend(loaded_allocations);

        bucketeer_storage::save_buckets(pool, &buckets).await?;
        bucketeer_storage::save_starting_allocations(pool, &allocations).await?;
        println!("Loaded {} buckets from {}", buckets.len(), path.display());
        return Ok(());
    }

    let buckets = bucketeer_storage::get_buckets(pool).await?;
    if buckets.is_empty() {
        println!("No buckets defined. Load some with --from-toml or accept suggestions.");
        return Ok(());
    }

    let allocations = bucketeer_storage::get_starting_allocations(pool).await?;
    for bucket in &buckets {
        let start = allocations
            .get(&bucket.id)
            .map(|a| {
                let date = a
                    .date
                    .map(|d| format!(" as of {d}"))
                    .unwrap_or_default();
                format!(", starts at {}{date}", money(a.amount))
            })
            .unwrap_or_default();
        println!(
            "{} (account {}) keywords: {}{start}",
            bucket.name,
            bucket.account_number,
            bucket.keywords.join(", "),
        );
    }

    Ok(())
}

pub async fn suggest(pool: &DbPool) -> anyhow::Result<()> {
    let transactions = bucketeer_storage::get_transactions(pool).await?;
    let suggestions = suggest_buckets(&transactions);
    if suggestions.is_empty() {
        println!("No recurring patterns found.");
        return Ok(());
    }

    for suggestion in suggestions {
        println!(
            "{} — {} matches, keywords: {}",
            suggestion.name,
            suggestion.match_count,
            suggestion.keywords.join(", ")
        );
        for example in &suggestion.examples {
            println!("    e.g. {example}");
        }
    }

    Ok(())
}

pub async fn classify(pool: &DbPool) -> anyhow::Result<()> {
    let transactions = bucketeer_storage::get_transactions(pool).await?;
    let buckets = bucketeer_storage::get_buckets(pool).await?;
    let mut classifications = bucketeer_storage::get_classifications(pool).await?;

    let assigned = auto_assign_by_keywords(&transactions, &buckets, &mut classifications);
    bucketeer_storage::save_classifications(pool, &classifications).await?;

    println!(
        "Auto-assigned {assigned} transactions ({} classified in total)",
        classifications.len()
    );
    Ok(())
}

pub async fn balances(
    pool: &DbPool,
    account: Option<&str>,
    mode: BalanceMode,
) -> anyhow::Result<()> {
    let buckets = bucketeer_storage::get_buckets(pool).await?;
    if buckets.is_empty() {
        println!("No buckets defined.");
        return Ok(());
    }

    let transactions = bucketeer_storage::get_transactions(pool).await?;
    let allocations = bucketeer_storage::get_starting_allocations(pool).await?;
    let classifications = bucketeer_storage::get_classifications(pool).await?;
    let confirmed = bucketeer_storage::get_confirmed_accounts(pool).await?;

    let mut account_numbers: Vec<String> = Vec::new();
    for bucket in &buckets {
        if !account_numbers.contains(&bucket.account_number) {
            account_numbers.push(bucket.account_number.clone());
        }
    }

    for number in account_numbers {
        if account.is_some_and(|wanted| wanted != number) {
            continue;
        }

        let account_buckets: Vec<Bucket> = buckets
            .iter()
            .filter(|b| b.account_number == number)
            .cloned()
            .collect();
        let account_transactions: Vec<_> = transactions
            .iter()
            .filter(|tx| {
                let tx_number =
                    if tx.account_number.is_empty() { "unknown" } else { &tx.account_number };
                tx_number == number
            })
            .cloned()
            .collect();

        let bucket_balances = match mode {
            BalanceMode::Keyword => {
                calculate_balances(&account_buckets, &account_transactions, &allocations)
            }
            BalanceMode::Assigned => calculate_classified_balances(
                &account_buckets,
                &account_transactions,
                &classifications,
                &allocations,
            ),
        };

        let name = confirmed
            .iter()
            .find(|c| c.account_number == number)
            .map(|c| c.account_name.clone())
            .unwrap_or_else(|| format!("Account {number}"));

        println!("{name} ({number})");
        for bucket in &account_buckets {
            let balance = bucket_balances.get(&bucket.id).copied().unwrap_or(Decimal::ZERO);
            println!("  {}: {}", bucket.name, money(balance));
        }
        println!("  Total allocated: {}", money(calculate_total(&bucket_balances)));
        println!();
    }

    Ok(())
}

pub async fn export(pool: &DbPool, output: &Path) -> anyhow::Result<()> {
    let buckets = bucketeer_storage::get_buckets(pool).await?;
    if buckets.is_empty() {
        anyhow::bail!("No buckets to export");
    }

    let transactions = bucketeer_storage::get_transactions(pool).await?;
    let allocations = bucketeer_storage::get_starting_allocations(pool).await?;
    let balances = calculate_balances(&buckets, &transactions, &allocations);
    let total = calculate_total(&balances);

    let mut csv = String::from("Bucket Name,Balance\n");
    for bucket in &buckets {
        let balance = balances.get(&bucket.id).copied().unwrap_or(Decimal::ZERO);
        csv.push_str(&format!("{},{:.2}\n", csv_quote(&bucket.name), balance));
    }
    csv.push_str(&format!("{},{total:.2}\n", csv_quote("Total")));

    std::fs::write(output, csv)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Exported {} buckets to {}", buckets.len(), output.display());
    Ok(())
}

pub async fn summary(pool: &DbPool) -> anyhow::Result<()> {
    let buckets = bucketeer_storage::get_buckets(pool).await?;
    if buckets.is_empty() {
        println!("No buckets defined.");
        return Ok(());
    }

    let transactions = bucketeer_storage::get_transactions(pool).await?;
    let allocations = bucketeer_storage::get_starting_allocations(pool).await?;
    let balances = calculate_balances(&buckets, &transactions, &allocations);
    let total = calculate_total(&balances);

    println!("Bucket Summary");
    println!("==============");
    println!();
    for bucket in &buckets {
        let balance = balances.get(&bucket.id).copied().unwrap_or(Decimal::ZERO);
        println!("{}: {}", bucket.name, money(balance));
    }
    println!();
    println!("Total: {}", money(total));
    Ok(())
}

pub async fn diagnostics(pool: &DbPool, output: &Path) -> anyhow::Result<()> {
    let transactions = bucketeer_storage::get_transactions(pool).await?;
    let buckets = bucketeer_storage::get_buckets(pool).await?;
    let classifications = bucketeer_storage::get_classifications(pool).await?;
    let confirmed = bucketeer_storage::get_confirmed_accounts(pool).await?;

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    writer.write_record([
        "transaction_id",
        "transaction_date",
        "posted_date",
        "description",
        "user_description",
        "amount",
        "signed_amount",
        "credit_debit",
        "account_number",
        "account_name",
        "account_type",
        "bucket",
        "included",
        "source",
        "source_file",
    ])?;

    for tx in &transactions {
        let account_type = confirmed
            .iter()
            .find(|c| c.account_number == tx.account_number)
            .and_then(|c| c.account_type)
            .map(|t| t.to_string())
            .unwrap_or_default();
        let bucket = classifications
            .get(&tx.transaction_id)
            .map(|bucket_id| resolve_bucket_name(&buckets, bucket_id))
            .unwrap_or_default();

        let transaction_date = tx.transaction_date.map(|d| d.to_string()).unwrap_or_default();
        let posted_date = tx.posted_date.map(|d| d.to_string()).unwrap_or_default();
        let amount = format!("{:.2}", tx.amount);
        let signed_amount = format!("{:.2}", tx.signed_amount());
        let credit_debit = tx.credit_debit.map(|cd| cd.to_string()).unwrap_or_default();
        let source = tx.source.to_string();

        writer.write_record([
            tx.transaction_id.as_str(),
            transaction_date.as_str(),
            posted_date.as_str(),
            tx.description.as_str(),
            tx.user_description.as_str(),
            amount.as_str(),
            signed_amount.as_str(),
            credit_debit.as_str(),
            tx.account_number.as_str(),
            tx.account_name.as_str(),
            account_type.as_str(),
            bucket.as_str(),
            if tx.included { "true" } else { "false" },
            source.as_str(),
            tx.source_file.as_deref().unwrap_or(""),
        ])?;
    }
    writer.flush()?;

    println!(
        "Wrote {} transactions to {}",
        transactions.len(),
        output.display()
    );
    Ok(())
}

fn resolve_bucket_name(buckets: &[Bucket], bucket_id: &str) -> String {
    buckets
        .iter()
        .find(|b| b.id == bucket_id)
        .map(|b| b.name.clone())
        .unwrap_or_else(|| bucket_id.to_string())
}

pub async fn reset(pool: &DbPool, yes: bool) -> anyhow::Result<()> {
    if !yes {
        println!("This deletes all imported transactions and confirmed accounts.");
        println!("Saved accounts, buckets and starting allocations are preserved.");
        println!("Re-run with --yes to confirm.");
        return Ok(());
    }

    let saved_accounts = bucketeer_storage::get_saved_accounts(pool).await?;
    let buckets = bucketeer_storage::get_buckets(pool).await?;
    let allocations = bucketeer_storage::get_starting_allocations(pool).await?;

    bucketeer_storage::clear_all(pool).await?;

    if !saved_accounts.is_empty() {
        bucketeer_storage::save_saved_accounts(pool, &saved_accounts).await?;
    }
    if !buckets.is_empty() {
        bucketeer_storage::save_buckets(pool, &buckets).await?;
    }
    if !allocations.is_empty() {
        bucketeer_storage::save_starting_allocations(pool, &allocations).await?;
    }

    let mut message = String::from("All imported data has been reset");
    if !saved_accounts.is_empty() {
        message.push_str(&format!(". {} saved account(s) preserved", saved_accounts.len()));
    }
    println!("{message}");
    Ok(())
}

fn money(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-${:.2}", -amount)
    } else {
        format!("${:.2}", amount)
    }
}

/// Bucket balance CSV quoting: names always quoted, embedded quotes doubled.
fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATEMENT_NAME: &str = "Statement_12345678_01.01.24-31.01.24.csv";
    const STATEMENT_CSV: &str = "\
effective_date,entered_date,transaction_description,amount,balance
15/01/2024,15/01/2024,Coffee,-$50.00,$950.00
16/01/2024,16/01/2024,Pay,$100.00,\"$1,050.00\"
";

    #[tokio::test]
    async fn import_file_parses_merges_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let pool = bucketeer_storage::create_db(&dir.path().join("ledger.db"))
            .await
            .unwrap();
        let file = dir.path().join(STATEMENT_NAME);
        std::fs::write(&file, STATEMENT_CSV).unwrap();

        let (parsed, stats) = import_file(&pool, &file, STATEMENT_NAME).await.unwrap();
        assert_eq!(parsed, 2);
        assert_eq!(stats.unique, 2);
        assert_eq!(stats.total, 2);

        // Re-importing the same statement detects every row as a duplicate
        // and the store does not grow.
        let (_, stats) = import_file(&pool, &file, STATEMENT_NAME).await.unwrap();
        assert_eq!(stats.duplicates, 2);
        assert_eq!(stats.total, 2);

        let stored = bucketeer_storage::get_transactions(&pool).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].account_number, "12345678");
    }

    #[tokio::test]
    async fn import_file_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let pool = bucketeer_storage::create_db(&dir.path().join("ledger.db"))
            .await
            .unwrap();
        let file = dir.path().join("statement.xlsx");
        std::fs::write(&file, "not a statement").unwrap();

        assert!(import_file(&pool, &file, "statement.xlsx").await.is_err());
    }

    #[test]
    fn csv_quote_doubles_embedded_quotes() {
        assert_eq!(csv_quote("Groceries"), "\"Groceries\"");
        assert_eq!(csv_quote("Say \"hi\""), "\"Say \"\"hi\"\"\"");
    }

    #[test]
    fn money_formats_sign_outside_symbol() {
        use std::str::FromStr;
        assert_eq!(money(Decimal::from_str("4.50").unwrap()), "$4.50");
        assert_eq!(money(Decimal::from_str("-4.50").unwrap()), "-$4.50");
        assert_eq!(money(Decimal::ZERO), "$0.00");
    }
}
