use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::crossref::{CROSSREF_BASE, CrossrefSettings, DEFAULT_ROWS, DEFAULT_TIMEOUT};
use crate::domain::{DedupPolicy, MonthEnd, QueryWindow, parse_date};
use crate::error::HarvestError;
use crate::sources::{IdentifierSource, ManualText, source_for_path};
use crate::writer::DEFAULT_MAX_ROWS_PER_FILE;

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(1);

/// Run description as read from a JSON file or assembled from CLI flags.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RunFile {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub issns: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub rows_per_query: Option<usize>,
    #[serde(default)]
    pub max_rows_per_file: Option<usize>,
    #[serde(default)]
    pub pause_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub dedup: Option<bool>,
    #[serde(default)]
    pub month_end: Option<MonthEnd>,
    #[serde(default)]
    pub mailto: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl RunFile {
    /// Values set in `other` win; identifier lists are concatenated.
    pub fn overlay(mut self, other: RunFile) -> RunFile {
        if other.year.is_some() {
            self.year = other.year;
            self.from = None;
            self.to = None;
        }
        if other.from.is_some() || other.to.is_some() {
            self.year = other.year;
            self.from = other.from;
            self.to = other.to;
        }
        self.issns.extend(other.issns);
        self.inputs.extend(other.inputs);
        self.output_dir = other.output_dir.or(self.output_dir);
        self.rows_per_query = other.rows_per_query.or(self.rows_per_query);
        self.max_rows_per_file = other.max_rows_per_file.or(self.max_rows_per_file);
        self.pause_ms = other.pause_ms.or(self.pause_ms);
        self.timeout_secs = other.timeout_secs.or(self.timeout_secs);
        self.dedup = other.dedup.or(self.dedup);
        self.month_end = other.month_end.or(self.month_end);
        self.mailto = other.mailto.or(self.mailto);
        self.base_url = other.base_url.or(self.base_url);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    /// Every month of the year, one window per month.
    Year(i32),
    Range { from: NaiveDate, to: NaiveDate },
}

impl WindowSpec {
    pub fn windows(&self) -> Result<Vec<QueryWindow>, HarvestError> {
        match *self {
            WindowSpec::Year(year) => (1..=12)
                .map(|month| QueryWindow::month(year, month))
                .collect(),
            WindowSpec::Range { from, to } => Ok(vec![QueryWindow::range(from, to)?]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub window: WindowSpec,
    pub output_dir: Utf8PathBuf,
    pub rows_per_query: usize,
    pub max_rows_per_file: usize,
    pub pause: Duration,
    pub dedup: DedupPolicy,
    pub crossref: CrossrefSettings,
}

impl RunConfig {
    pub fn new(window: WindowSpec) -> Self {
        Self {
            window,
            output_dir: Utf8PathBuf::from(DEFAULT_OUTPUT_DIR),
            rows_per_query: DEFAULT_ROWS,
            max_rows_per_file: DEFAULT_MAX_ROWS_PER_FILE,
            pause: DEFAULT_PAUSE,
            dedup: DedupPolicy::default(),
            crossref: CrossrefSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub config: RunConfig,
    pub manual: Vec<String>,
    pub inputs: Vec<PathBuf>,
}

impl ResolvedRun {
    /// Typed identifiers first, then files in the order given.
    pub fn sources(&self) -> Result<Vec<Box<dyn IdentifierSource>>, HarvestError> {
        let mut sources: Vec<Box<dyn IdentifierSource>> = Vec::new();
        if !self.manual.is_empty() {
            sources.push(Box::new(ManualText::new(self.manual.join("\n"))));
        }
        for path in &self.inputs {
            sources.push(source_for_path(path)?);
        }
        Ok(sources)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &str) -> Result<RunFile, HarvestError> {
        let path = PathBuf::from(path);
        let content =
            fs::read_to_string(&path).map_err(|_| HarvestError::ConfigRead(path.clone()))?;
        serde_json::from_str(&content).map_err(|err| HarvestError::ConfigParse(err.to_string()))
    }

    pub fn resolve(file: RunFile) -> Result<ResolvedRun, HarvestError> {
        let window = match (file.year, file.from.as_deref(), file.to.as_deref()) {
            (Some(year), None, None) => WindowSpec::Year(year),
            (None, Some(from), Some(to)) => WindowSpec::Range {
                from: parse_date(from)?,
                to: parse_date(to)?,
            },
            (None, None, None) => return Err(HarvestError::MissingWindow),
            (Some(_), _, _) => {
                return Err(HarvestError::InvalidConfig(
                    "use either a year or a from/to date range, not both".to_string(),
                ));
            }
            (None, _, _) => {
                return Err(HarvestError::InvalidConfig(
                    "a date range needs both from and to".to_string(),
                ));
            }
        };

        let rows_per_query = file.rows_per_query.unwrap_or(DEFAULT_ROWS);
        if rows_per_query == 0 {
            return Err(HarvestError::InvalidConfig(
                "rows per query must be at least 1".to_string(),
            ));
        }
        let max_rows_per_file = file.max_rows_per_file.unwrap_or(DEFAULT_MAX_ROWS_PER_FILE);
        if max_rows_per_file == 0 {
            return Err(HarvestError::InvalidConfig(
                "max rows per file must be at least 1".to_string(),
            ));
        }

        let config = RunConfig {
            window,
            output_dir: Utf8PathBuf::from(
                file.output_dir
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
            rows_per_query,
            max_rows_per_file,
            pause: file
                .pause_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_PAUSE),
            dedup: match file.dedup {
                Some(false) => DedupPolicy::KeepAll,
                _ => DedupPolicy::Unique,
            },
            crossref: CrossrefSettings {
                base_url: file.base_url.unwrap_or_else(|| CROSSREF_BASE.to_string()),
                timeout: file
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_TIMEOUT),
                mailto: file.mailto,
                month_end: file.month_end.unwrap_or_default(),
            },
        };

        Ok(ResolvedRun {
            config,
            manual: file.issns,
            inputs: file.inputs.into_iter().map(PathBuf::from).collect(),
        })
    }
}
