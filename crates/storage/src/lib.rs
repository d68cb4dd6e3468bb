pub mod db;

pub use db::{
    clear_all, create_db, get_buckets, get_classifications, get_confirmed_accounts,
    get_saved_accounts, get_starting_allocations, get_transactions, save_buckets,
    save_classifications, save_confirmed_accounts, save_saved_accounts,
    save_starting_allocations, save_transactions, DbPool, StorageError,
};
