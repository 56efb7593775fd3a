use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{PlanResult, ProgressEvent, ProgressSink, RunResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_plan(result: &PlanResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Non-interactive progress goes to the log; stdout stays JSON only.
impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        info!(
            completed = event.completed,
            total = event.total,
            percent = %format!("{:.1}", event.fraction() * 100.0),
            "{}",
            event.message
        );
    }
}
