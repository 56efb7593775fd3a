//! Identifier sources and the normalizer that merges them.
//!
//! Every input format implements [`IdentifierSource`]; the run only sees the
//! merged, trimmed list returned by [`normalize`].

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::domain::{DedupPolicy, Issn};
use crate::error::HarvestError;

mod manual;
mod tabular;
mod text;
mod xlsx;

pub use manual::ManualText;
pub use tabular::TabularFile;
pub use text::TextFile;
pub use xlsx::SpreadsheetFile;

pub trait IdentifierSource: Send + Sync {
    /// Short human-readable description used in logs and errors.
    fn label(&self) -> String;

    /// Raw, untrimmed identifier values in source order.
    fn read_identifiers(&self) -> Result<Vec<String>, HarvestError>;
}

/// Picks the reader for `path` from its extension.
pub fn source_for_path(path: &Path) -> Result<Box<dyn IdentifierSource>, HarvestError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => Ok(Box::new(TabularFile::new(path))),
        "xlsx" => Ok(Box::new(SpreadsheetFile::new(path))),
        "txt" => Ok(Box::new(TextFile::new(path))),
        _ => Err(HarvestError::UnsupportedInput(path.display().to_string())),
    }
}

pub fn normalize(
    sources: &[Box<dyn IdentifierSource>],
    policy: DedupPolicy,
) -> Result<Vec<Issn>, HarvestError> {
    let mut identifiers = Vec::new();
    let mut seen = HashSet::new();

    for source in sources {
        let values = source.read_identifiers()?;
        debug!(source = %source.label(), values = values.len(), "read identifiers");
        for value in values {
            let Ok(issn) = value.parse::<Issn>() else {
                continue;
            };
            if policy == DedupPolicy::Unique && !seen.insert(issn.dedup_key()) {
                continue;
            }
            if !issn.is_well_formed() {
                warn!(issn = %issn, "identifier does not look like an ISSN; querying anyway");
            }
            identifiers.push(issn);
        }
    }

    if identifiers.is_empty() {
        return Err(HarvestError::NoIdentifiers);
    }
    Ok(identifiers)
}

/// Index of the first header containing `issn`, ignoring case.
pub(crate) fn issn_column<S: AsRef<str>>(headers: &[S]) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.as_ref().to_lowercase().contains("issn"))
}

pub(crate) fn read_lossy(path: &Path) -> Result<String, HarvestError> {
    let bytes = std::fs::read(path).map_err(|err| HarvestError::InputRead {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
