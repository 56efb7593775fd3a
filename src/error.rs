use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid ISSN: {0:?}")]
    InvalidIssn(String),

    #[error("invalid date {0:?} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("invalid month {0} (expected 1-12)")]
    InvalidMonth(u32),

    #[error("from-date {from} is after to-date {to}")]
    #[diagnostic(help("swap the dates or pick a later --to"))]
    InvertedRange { from: String, to: String },

    #[error("no query window given")]
    #[diagnostic(help("pass --year, or both --from and --to"))]
    MissingWindow,

    #[error("input file {0} has no header row")]
    MissingHeader(String),

    #[error("input file {0} has no column whose name contains 'issn'")]
    MissingIssnColumn(String),

    #[error("no ISSNs found in the given inputs")]
    #[diagnostic(help("type ISSNs with --issn or upload a file with an ISSN column"))]
    NoIdentifiers,

    #[error("unsupported input file: {0}")]
    #[diagnostic(help("supported formats are .csv, .xlsx and .txt"))]
    UnsupportedInput(String),

    #[error("failed to read input {path}: {message}")]
    InputRead { path: String, message: String },

    #[error("failed to read spreadsheet {path}: {message}")]
    Spreadsheet { path: String, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Crossref request failed: {0}")]
    CrossrefHttp(String),

    #[error("Crossref returned status {status}: {message}")]
    CrossrefStatus { status: u16, message: String },

    #[error("unexpected Crossref response: {0}")]
    CrossrefParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl HarvestError {
    /// Input and configuration problems stop a run before any request is sent.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            HarvestError::InvalidIssn(_)
                | HarvestError::InvalidDate(_)
                | HarvestError::InvalidMonth(_)
                | HarvestError::InvertedRange { .. }
                | HarvestError::MissingWindow
                | HarvestError::MissingHeader(_)
                | HarvestError::MissingIssnColumn(_)
                | HarvestError::NoIdentifiers
                | HarvestError::UnsupportedInput(_)
                | HarvestError::InputRead { .. }
                | HarvestError::Spreadsheet { .. }
                | HarvestError::ConfigRead(_)
                | HarvestError::ConfigParse(_)
                | HarvestError::InvalidConfig(_)
        )
    }
}
