use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("rule '{0}' already exists")]
    DuplicateRule(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid price table: {0}")]
    InvalidPriceTable(String),

    #[error("'{filename}' is not valid UTF-8: {reason}")]
    Decode { filename: String, reason: String },
}
