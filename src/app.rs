use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::crossref::WorksClient;
use crate::domain::{ArticleRecord, Issn, OutputRow, OutputSchema, QueryWindow};
use crate::error::HarvestError;
use crate::sources::{IdentifierSource, normalize};
use crate::writer::{PartFile, PartWriter, remove_stale_parts};

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub schema: OutputSchema,
    pub windows: Vec<String>,
    pub identifiers: usize,
    pub units: usize,
    pub records: usize,
    pub failed_fetches: usize,
    pub files: Vec<PartFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub schema: OutputSchema,
    pub windows: Vec<String>,
    pub identifiers: Vec<String>,
    pub units: usize,
    pub output_dir: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub completed: usize,
    pub total: usize,
    pub elapsed: Option<Duration>,
    /// Set on the event announcing a finalized part.
    pub file: Option<PartFile>,
}

impl ProgressEvent {
    /// Completion in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.total as f64).min(1.0)
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Validated inputs of one run: the windows to query and the identifiers to
/// query them for.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub windows: Vec<QueryWindow>,
    pub identifiers: Vec<Issn>,
}

impl RunPlan {
    /// Number of (window, identifier) fetches the run issues.
    pub fn units(&self) -> usize {
        self.windows.len() * self.identifiers.len()
    }
}

pub struct App<C: WorksClient> {
    client: C,
}

impl<C: WorksClient> App<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Validates the window and merges the identifier sources. Nothing is
    /// fetched.
    pub fn prepare(
        &self,
        config: &RunConfig,
        sources: &[Box<dyn IdentifierSource>],
    ) -> Result<RunPlan, HarvestError> {
        let windows = config.window.windows()?;
        let identifiers = normalize(sources, config.dedup)?;
        Ok(RunPlan {
            windows,
            identifiers,
        })
    }

    pub fn plan(
        &self,
        config: &RunConfig,
        sources: &[Box<dyn IdentifierSource>],
    ) -> Result<PlanResult, HarvestError> {
        let plan = self.prepare(config, sources)?;
        Ok(PlanResult {
            schema: schema_of(&plan.windows),
            windows: plan.windows.iter().map(QueryWindow::label).collect(),
            identifiers: plan.identifiers.iter().map(Issn::to_string).collect(),
            units: plan.units(),
            output_dir: config.output_dir.to_string(),
        })
    }

    pub fn run(
        &self,
        config: &RunConfig,
        sources: &[Box<dyn IdentifierSource>],
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, HarvestError> {
        let plan = self.prepare(config, sources)?;
        let total = plan.units();
        info!(
            identifiers = plan.identifiers.len(),
            windows = plan.windows.len(),
            "starting extraction"
        );
        sink.event(ProgressEvent {
            message: format!("loaded {} ISSNs", plan.identifiers.len()),
            completed: 0,
            total,
            elapsed: None,
            file: None,
        });

        fs::create_dir_all(config.output_dir.as_std_path()).map_err(|err| {
            HarvestError::Filesystem(format!("create {}: {err}", config.output_dir))
        })?;
        let stale = remove_stale_parts(&config.output_dir)?;
        if stale > 0 {
            warn!(removed = stale, dir = %config.output_dir, "removed unfinished part files from an earlier run");
        }

        let started = Instant::now();
        let mut completed = 0usize;
        let mut records = 0usize;
        let mut failed_fetches = 0usize;
        let mut files = Vec::new();

        for window in &plan.windows {
            sink.event(ProgressEvent {
                message: format!("processing {window}"),
                completed,
                total,
                elapsed: Some(started.elapsed()),
                file: None,
            });
            let mut writer =
                PartWriter::create(&config.output_dir, window, config.max_rows_per_file)?;

            for issn in &plan.identifiers {
                let articles = match self.fetch(issn, window, config.rows_per_query) {
                    Ok(articles) => articles,
                    Err(_) => {
                        failed_fetches += 1;
                        Vec::new()
                    }
                };
                for record in &articles {
                    writer.write_row(&OutputRow {
                        issn,
                        window,
                        record,
                    })?;
                }
                records += articles.len();

                if !config.pause.is_zero() {
                    thread::sleep(config.pause);
                }
                completed += 1;
                sink.event(ProgressEvent {
                    message: format!("{issn} {window}: {} records", articles.len()),
                    completed,
                    total,
                    elapsed: Some(started.elapsed()),
                    file: None,
                });
            }

            let parts = writer.finish()?;
            for part in &parts {
                sink.event(ProgressEvent {
                    message: format!("wrote {} ({} rows)", part.file_name, part.rows),
                    completed,
                    total,
                    elapsed: Some(started.elapsed()),
                    file: Some(part.clone()),
                });
            }
            files.extend(parts);
        }

        info!(
            records,
            failed_fetches,
            files = files.len(),
            "extraction completed"
        );

        Ok(RunResult {
            schema: schema_of(&plan.windows),
            windows: plan.windows.iter().map(QueryWindow::label).collect(),
            identifiers: plan.identifiers.len(),
            units: total,
            records,
            failed_fetches,
            files,
        })
    }

    /// A failed fetch is reported but never stops the run; the caller treats
    /// it as zero records.
    fn fetch(
        &self,
        issn: &Issn,
        window: &QueryWindow,
        rows: usize,
    ) -> Result<Vec<ArticleRecord>, HarvestError> {
        self.client
            .fetch_works(issn, window, rows)
            .inspect_err(|err| {
                warn!(issn = %issn, window = %window, error = %err, "fetch failed; treating as no results")
            })
    }
}

fn schema_of(windows: &[QueryWindow]) -> OutputSchema {
    windows
        .first()
        .map(QueryWindow::schema)
        .unwrap_or(OutputSchema::DateRange)
}
