pub mod extract;
pub mod statement;

pub use extract::{extract_text, ExtractError};
pub use statement::{parse_statement_text, ParseTrace, SummaryAccount};
