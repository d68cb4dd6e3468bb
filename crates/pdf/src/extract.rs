use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("PDF text extraction failed: {0}")]
    Extraction(#[from] pdf_extract::OutputError),
}

/// Best-effort text extraction from raw PDF bytes. Line breaks are
/// approximated from glyph positions by the extractor; the statement parser
/// downstream treats the result as a plain sequence of lines and tolerates
/// layout noise.
pub fn extract_text(data: &[u8]) -> Result<String, ExtractError> {
    Ok(pdf_extract::extract_text_from_mem(data)?)
}
