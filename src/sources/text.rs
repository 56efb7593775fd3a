use std::path::{Path, PathBuf};

use crate::error::HarvestError;

use super::{IdentifierSource, read_lossy};

/// Plain text file, one identifier per non-empty line.
#[derive(Debug, Clone)]
pub struct TextFile {
    path: PathBuf,
}

impl TextFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl IdentifierSource for TextFile {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn read_identifiers(&self) -> Result<Vec<String>, HarvestError> {
        let content = read_lossy(&self.path)?;
        Ok(content
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}
