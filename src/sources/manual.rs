use crate::error::HarvestError;

use super::IdentifierSource;

/// Free text typed by the user; commas and line breaks both separate values.
#[derive(Debug, Clone)]
pub struct ManualText {
    text: String,
}

impl ManualText {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl IdentifierSource for ManualText {
    fn label(&self) -> String {
        "manual input".to_string()
    }

    fn read_identifiers(&self) -> Result<Vec<String>, HarvestError> {
        Ok(self
            .text
            .split([',', '\n'])
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect())
    }
}
