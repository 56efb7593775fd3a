use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::{OutputRow, OutputSchema, QueryWindow};
use crate::error::HarvestError;

pub const DEFAULT_MAX_ROWS_PER_FILE: usize = 200_000;
pub const CSV_CONTENT_TYPE: &str = "text/csv";

const TEMP_PREFIX: &str = ".issn-harvester-part";
const TEMP_SUFFIX: &str = ".csv.tmp";

/// A finalized part file, ready for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartFile {
    pub part: usize,
    pub file_name: String,
    pub path: String,
    pub rows: usize,
    pub content_type: &'static str,
}

pub fn part_file_name(window_label: &str, part: usize) -> String {
    format!("issn_articles_{window_label}_part{part}.csv")
}

/// Deletes unfinished part files left in `dir` by a run that never reached
/// `finish` (for example one whose process exited mid-write). Returns the
/// number removed.
pub fn remove_stale_parts(dir: &Utf8Path) -> Result<usize, HarvestError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("read {dir}: {err}")))?;
    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX) {
            fs::remove_file(entry.path())
                .map_err(|err| HarvestError::Filesystem(format!("remove {name}: {err}")))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Writes output rows for one query window, rolling over to a new part once
/// the open part holds `max_rows` rows.
///
/// A part is written to a temporary file in the output directory and only
/// appears under its final name once finalized.
pub struct PartWriter {
    dir: Utf8PathBuf,
    label: String,
    schema: OutputSchema,
    max_rows: usize,
    part: usize,
    rows: usize,
    current: Option<csv::Writer<NamedTempFile>>,
    finished: Vec<PartFile>,
}

impl PartWriter {
    pub fn create(
        dir: &Utf8Path,
        window: &QueryWindow,
        max_rows: usize,
    ) -> Result<Self, HarvestError> {
        if max_rows == 0 {
            return Err(HarvestError::InvalidConfig(
                "max rows per file must be at least 1".to_string(),
            ));
        }
        let mut writer = Self {
            dir: dir.to_path_buf(),
            label: window.label(),
            schema: window.schema(),
            max_rows,
            part: 1,
            rows: 0,
            current: None,
            finished: Vec::new(),
        };
        writer.open_part()?;
        Ok(writer)
    }

    pub fn current_part(&self) -> usize {
        self.part
    }

    pub fn write_row(&mut self, row: &OutputRow<'_>) -> Result<(), HarvestError> {
        if self.rows >= self.max_rows {
            self.finalize_part()?;
            self.part += 1;
            self.open_part()?;
        }
        let writer = self
            .current
            .as_mut()
            .ok_or_else(|| HarvestError::Filesystem("no open part file".to_string()))?;
        writer
            .write_record(row.cells())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        self.rows += 1;
        Ok(())
    }

    /// Finalizes the open part, even when it holds no rows.
    pub fn finish(mut self) -> Result<Vec<PartFile>, HarvestError> {
        self.finalize_part()?;
        Ok(self.finished)
    }

    fn open_part(&mut self) -> Result<(), HarvestError> {
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(self.dir.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let mut writer = csv::Writer::from_writer(temp);
        writer
            .write_record(self.schema.header())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        self.current = Some(writer);
        self.rows = 0;
        Ok(())
    }

    fn finalize_part(&mut self) -> Result<(), HarvestError> {
        let Some(writer) = self.current.take() else {
            return Ok(());
        };
        let temp = writer
            .into_inner()
            .map_err(|err| HarvestError::Filesystem(err.error().to_string()))?;
        let file_name = part_file_name(&self.label, self.part);
        let path = self.dir.join(&file_name);
        temp.persist(path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("persist {path}: {}", err.error)))?;
        debug!(file = %file_name, rows = self.rows, "finalized part file");
        self.finished.push(PartFile {
            part: self.part,
            file_name,
            path: path.to_string(),
            rows: self.rows,
            content_type: CSV_CONTENT_TYPE,
        });
        Ok(())
    }
}
