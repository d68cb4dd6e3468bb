pub mod csv;
pub mod match_engine;
pub mod suggest;
pub(crate) mod util;

// `self::` disambiguates the module from the csv crate itself.
pub use self::csv::{detect_dialect, extract_account_from_filename, tokenize_line, CsvError, Dialect};
pub use match_engine::{are_duplicates, merge_transactions, MergeOutcome, MergeStats};
pub use suggest::{suggest_buckets, BucketSuggestion};
