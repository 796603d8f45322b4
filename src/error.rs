use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a whole extractor run (the transaction is rolled back).
///
/// Per-record problems never show up here: they are counted as discards.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to read source file {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed input in {}: {message}", path.display())]
    MalformedInput { path: PathBuf, message: String },

    #[error("No extractor for region {0}")]
    UnsupportedRegion(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ExtractError {
    pub fn malformed(path: &std::path::Path, message: impl ToString) -> Self {
        ExtractError::MalformedInput {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}
