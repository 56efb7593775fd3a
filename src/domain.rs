use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

static ISSN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{3}[\dXx]$").expect("valid ISSN pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issn(String);

impl Issn {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `NNNN-NNNC` where the check character may be `X`.
    pub fn is_well_formed(&self) -> bool {
        ISSN_PATTERN.is_match(&self.0)
    }

    pub fn dedup_key(&self) -> String {
        self.0
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect::<String>()
            .to_uppercase()
    }
}

impl fmt::Display for Issn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Issn {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(HarvestError::InvalidIssn(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MonthEnd {
    /// Always day 31, whatever the month.
    Nominal,
    #[default]
    Calendar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    #[default]
    Unique,
    KeepAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputSchema {
    MonthWise,
    DateRange,
}

impl OutputSchema {
    pub fn header(self) -> &'static [&'static str] {
        match self {
            OutputSchema::MonthWise => &[
                "Year",
                "Month",
                "ISSN",
                "DOI",
                "Article Title",
                "Volume",
                "Issue",
                "Page",
                "Journal Title",
                "Publisher",
            ],
            OutputSchema::DateRange => &[
                "ISSN",
                "DOI",
                "Article Title",
                "Volume",
                "Issue",
                "Page",
                "Journal Title",
                "Publisher",
                "From Date",
                "To Date",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryWindow {
    Month { year: i32, month: u32 },
    Range { from: NaiveDate, to: NaiveDate },
}

impl QueryWindow {
    pub fn month(year: i32, month: u32) -> Result<Self, HarvestError> {
        if !(1..=12).contains(&month) {
            return Err(HarvestError::InvalidMonth(month));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(HarvestError::InvalidConfig(format!(
                "year {year} is outside {MIN_YEAR}-{MAX_YEAR}"
            )));
        }
        Ok(QueryWindow::Month { year, month })
    }

    pub fn range(from: NaiveDate, to: NaiveDate) -> Result<Self, HarvestError> {
        if from > to {
            return Err(HarvestError::InvertedRange {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(QueryWindow::Range { from, to })
    }

    pub fn schema(&self) -> OutputSchema {
        match self {
            QueryWindow::Month { .. } => OutputSchema::MonthWise,
            QueryWindow::Range { .. } => OutputSchema::DateRange,
        }
    }

    /// Fragment embedded in part file names.
    pub fn label(&self) -> String {
        match self {
            QueryWindow::Month { year, month } => format!("{year}-{month:02}"),
            QueryWindow::Range { from, to } => format!("{from}_to_{to}"),
        }
    }

    /// `from-pub-date` / `until-pub-date` values for the API filter.
    pub fn bounds(&self, month_end: MonthEnd) -> (String, String) {
        match self {
            QueryWindow::Month { year, month } => {
                let last = match month_end {
                    MonthEnd::Nominal => 31,
                    MonthEnd::Calendar => last_day_of_month(*year, *month).unwrap_or(31),
                };
                (
                    format!("{year}-{month:02}-01"),
                    format!("{year}-{month:02}-{last:02}"),
                )
            }
            QueryWindow::Range { from, to } => (from.to_string(), to.to_string()),
        }
    }
}

impl fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, HarvestError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| HarvestError::InvalidDate(value.to_string()))
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?
        .pred_opt()
        .map(|date| date.day())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArticleRecord {
    pub doi: Option<String>,
    pub title: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub page: Option<String>,
    pub journal_title: Option<String>,
    pub publisher: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct OutputRow<'a> {
    pub issn: &'a Issn,
    pub window: &'a QueryWindow,
    pub record: &'a ArticleRecord,
}

impl OutputRow<'_> {
    /// Cells in the column order of `self.window.schema()`.
    pub fn cells(&self) -> Vec<String> {
        let record = self.record;
        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        let article = [
            field(&record.doi),
            field(&record.title),
            field(&record.volume),
            field(&record.issue),
            field(&record.page),
            field(&record.journal_title),
            field(&record.publisher),
        ];

        let mut cells = Vec::with_capacity(10);
        match self.window {
            QueryWindow::Month { year, month } => {
                cells.push(year.to_string());
                cells.push(format!("{year}-{month:02}"));
                cells.push(self.issn.to_string());
                cells.extend(article);
            }
            QueryWindow::Range { from, to } => {
                cells.push(self.issn.to_string());
                cells.extend(article);
                cells.push(from.to_string());
                cells.push(to.to_string());
            }
        }
        cells
    }
}
