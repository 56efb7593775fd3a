use std::path::{Path, PathBuf};

use csv::ReaderBuilder;

use crate::error::HarvestError;

use super::{IdentifierSource, issn_column, read_lossy};

/// CSV file with a header row; the identifier column is detected by name.
#[derive(Debug, Clone)]
pub struct TabularFile {
    path: PathBuf,
}

impl TabularFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl IdentifierSource for TabularFile {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn read_identifiers(&self) -> Result<Vec<String>, HarvestError> {
        let content = read_lossy(&self.path)?;
        parse_csv(&content, &self.label())
    }
}

pub(crate) fn parse_csv(content: &str, label: &str) -> Result<Vec<String>, HarvestError> {
    let read_error = |err: csv::Error| HarvestError::InputRead {
        path: label.to_string(),
        message: err.to_string(),
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(read_error)?.clone();
    if headers.iter().all(|header| header.trim().is_empty()) {
        return Err(HarvestError::MissingHeader(label.to_string()));
    }
    let column = issn_column(headers.iter().collect::<Vec<_>>().as_slice())
        .ok_or_else(|| HarvestError::MissingIssnColumn(label.to_string()))?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record.map_err(read_error)?;
        if let Some(value) = record.get(column) {
            let value = value.trim();
            if !value.is_empty() {
                values.push(value.to_string());
            }
        }
    }
    Ok(values)
}
