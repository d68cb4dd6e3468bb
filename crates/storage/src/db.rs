use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use thiserror::Error;

use bucketeer_core::account::SavedAccount;
use bucketeer_core::bucket::{AllocationMap, Bucket};
use bucketeer_core::classify::Classifications;
use bucketeer_core::transaction::Transaction;

pub type DbPool = Pool<Sqlite>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The store is out of space — surfaced distinctly so import flows can
    /// tell the user to export and prune rather than showing a generic
    /// database failure.
    #[error("storage capacity exceeded")]
    Capacity,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        // SQLITE_FULL (13) is the capacity signal.
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("13") {
                return StorageError::Capacity;
            }
        }
        StorageError::Database(err)
    }
}

// One key per persisted collection; each value is the collection as JSON.
const KEY_TRANSACTIONS: &str = "transactions";
const KEY_BUCKETS: &str = "buckets";
const KEY_STARTING_ALLOCATIONS: &str = "starting_allocations";
const KEY_CLASSIFICATIONS: &str = "classifications";
const KEY_SAVED_ACCOUNTS: &str = "saved_accounts";
const KEY_CONFIRMED_ACCOUNTS: &str = "confirmed_accounts";

pub async fn create_db(path: &Path) -> Result<DbPool, StorageError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

async fn load_or_default<T: DeserializeOwned + Default>(
    pool: &DbPool,
    key: &str,
) -> Result<T, StorageError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM ledger_kv WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some((json,)) => Ok(serde_json::from_str(&json)?),
        None => Ok(T::default()),
    }
}

async fn save_value<T: Serialize>(pool: &DbPool, key: &str, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string(value)?;
    sqlx::query(
        "INSERT INTO ledger_kv (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(json)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_transactions(pool: &DbPool) -> Result<Vec<Transaction>, StorageError> {
    load_or_default(pool, KEY_TRANSACTIONS).await
}

pub async fn save_transactions(
    pool: &DbPool,
    transactions: &[Transaction],
) -> Result<(), StorageError> {
    save_value(pool, KEY_TRANSACTIONS, &transactions).await
}

pub async fn get_buckets(pool: &DbPool) -> Result<Vec<Bucket>, StorageError> {
    load_or_default(pool, KEY_BUCKETS).await
}

pub async fn save_buckets(pool: &DbPool, buckets: &[Bucket]) -> Result<(), StorageError> {
    save_value(pool, KEY_BUCKETS, &buckets).await
}

pub async fn get_starting_allocations(pool: &DbPool) -> Result<AllocationMap, StorageError> {
    load_or_default(pool, KEY_STARTING_ALLOCATIONS).await
}

pub async fn save_starting_allocations(
    pool: &DbPool,
    allocations: &AllocationMap,
) -> Result<(), StorageError> {
    save_value(pool, KEY_STARTING_ALLOCATIONS, allocations).await
}

pub async fn get_classifications(pool: &DbPool) -> Result<Classifications, StorageError> {
    load_or_default(pool, KEY_CLASSIFICATIONS).await
}

pub async fn save_classifications(
    pool: &DbPool,
    classifications: &Classifications,
) -> Result<(), StorageError> {
    save_value(pool, KEY_CLASSIFICATIONS, classifications).await
}

pub async fn get_saved_accounts(pool: &DbPool) -> Result<Vec<SavedAccount>, StorageError> {
    load_or_default(pool, KEY_SAVED_ACCOUNTS).await
}

pub async fn save_saved_accounts(
    pool: &DbPool,
    accounts: &[SavedAccount],
) -> Result<(), StorageError> {
    save_value(pool, KEY_SAVED_ACCOUNTS, &accounts).await
}

pub async fn get_confirmed_accounts(pool: &DbPool) -> Result<Vec<SavedAccount>, StorageError> {
    load_or_default(pool, KEY_CONFIRMED_ACCOUNTS).await
}

pub async fn save_confirmed_accounts(
    pool: &DbPool,
    accounts: &[SavedAccount],
) -> Result<(), StorageError> {
    save_value(pool, KEY_CONFIRMED_ACCOUNTS, &accounts).await
}

/// Remove every persisted collection. Callers that preserve configuration
/// (saved accounts, buckets, allocations) re-save it afterwards.
pub async fn clear_all(pool: &DbPool) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM ledger_kv").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketeer_core::bucket::StartingAllocation;
    use bucketeer_core::transaction::Source;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    async fn test_db() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("ledger.db")).await.unwrap();
        (dir, pool)
    }

    fn tx(id: &str) -> Transaction {
        Transaction {
            transaction_id: id.into(),
            description: "Coffee".into(),
            user_description: "Coffee".into(),
            amount: Decimal::from_str("-4.50").unwrap(),
            currency: Some("AUD".into()),
            transaction_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 15),
            posted_date: None,
            account_number: "12345678".into(),
            account_name: "Everyday".into(),
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

    #[tokio::test]
    async fn empty_reads_return_empty_collections() {
        let (_dir, pool) = test_db().await;
        assert!(get_transactions(&pool).await.unwrap().is_empty());
        assert!(get_buckets(&pool).await.unwrap().is_empty());
        assert!(get_starting_allocations(&pool).await.unwrap().is_empty());
        assert!(get_classifications(&pool).await.unwrap().is_empty());
        assert!(get_saved_accounts(&pool).await.unwrap().is_empty());
        assert!(get_confirmed_accounts(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transactions_round_trip() {
        let (_dir, pool) = test_db().await;
        save_transactions(&pool, &[tx("tx_1"), tx("tx_2")]).await.unwrap();

        let loaded = get_transactions(&pool).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].transaction_id, "tx_1");
        assert_eq!(loaded[0].amount, Decimal::from_str("-4.50").unwrap());
    }

    #[tokio::test]
    async fn save_overwrites_previous_value() {
        let (_dir, pool) = test_db().await;
        save_transactions(&pool, &[tx("tx_1")]).await.unwrap();
        save_transactions(&pool, &[tx("tx_2"), tx("tx_3")]).await.unwrap();

        let loaded = get_transactions(&pool).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].transaction_id, "tx_2");
    }

    #[tokio::test]
    async fn allocations_and_classifications_round_trip() {
        let (_dir, pool) = test_db().await;

        let mut allocations = AllocationMap::new();
        allocations.insert(
            "bucket_1".into(),
            StartingAllocation {
                amount: Decimal::from_str("250.00").unwrap(),
                date: chrono::NaiveDate::from_ymd_opt(2024, 6, 1),
            },
        );
        save_starting_allocations(&pool, &allocations).await.unwrap();

        let mut classifications = Classifications::new();
        classifications.insert("tx_1".into(), "bucket_1".into());
        save_classifications(&pool, &classifications).await.unwrap();

        let allocations = get_starting_allocations(&pool).await.unwrap();
        assert_eq!(
            allocations["bucket_1"].amount,
            Decimal::from_str("250.00").unwrap()
        );
        let classifications = get_classifications(&pool).await.unwrap();
        assert_eq!(classifications["tx_1"], "bucket_1");
    }

    #[tokio::test]
    async fn clear_all_wipes_every_collection() {
        let (_dir, pool) = test_db().await;
        save_transactions(&pool, &[tx("tx_1")]).await.unwrap();
        save_buckets(&pool, &[Bucket::new("Holiday", "12345678")]).await.unwrap();

        clear_all(&pool).await.unwrap();

        assert!(get_transactions(&pool).await.unwrap().is_empty());
        assert!(get_buckets(&pool).await.unwrap().is_empty());
    }
}
