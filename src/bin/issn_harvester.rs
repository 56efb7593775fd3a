use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use issn_harvester::app::App;
use issn_harvester::config::{ConfigLoader, ResolvedRun, RunFile};
use issn_harvester::crossref::CrossrefHttpClient;
use issn_harvester::domain::MonthEnd;
use issn_harvester::error::HarvestError;
use issn_harvester::output::{JsonOutput, OutputMode};
use issn_harvester::tui::Tui;

#[derive(Parser)]
#[command(name = "issn-harvester")]
#[command(about = "Extract month-wise or date-range article metadata for a list of ISSNs from Crossref")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Query Crossref and write CSV part files")]
    Run(RunArgs),
    #[command(about = "Validate inputs and show the queries a run would issue")]
    Plan(RunArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Publication year; queries every month separately.
    #[arg(long, conflicts_with_all = ["from", "to"])]
    year: Option<i32>,

    /// First publication date of the range (YYYY-MM-DD).
    #[arg(long, requires = "to")]
    from: Option<String>,

    /// Last publication date of the range (YYYY-MM-DD).
    #[arg(long, requires = "from")]
    to: Option<String>,

    /// ISSNs separated by commas or newlines; may be repeated.
    #[arg(long = "issn")]
    issns: Vec<String>,

    /// CSV, XLSX or TXT file holding ISSNs; may be repeated.
    #[arg(long = "input")]
    inputs: Vec<String>,

    /// JSON run file; flags given here override its values.
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,

    /// Result cap for each query (single page, no pagination).
    #[arg(long = "rows")]
    rows_per_query: Option<usize>,

    #[arg(long)]
    max_rows_per_file: Option<usize>,

    /// Pause after each query, in milliseconds.
    #[arg(long)]
    pause_ms: Option<u64>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Query every occurrence, even repeated ISSNs.
    #[arg(long)]
    keep_duplicates: bool,

    #[arg(long, value_enum)]
    month_end: Option<MonthEnd>,

    /// Contact address sent in the User-Agent header.
    #[arg(long)]
    mailto: Option<String>,

    /// Same as the plan subcommand.
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    fn into_run_file(self) -> RunFile {
        RunFile {
            year: self.year,
            from: self.from,
            to: self.to,
            issns: self.issns,
            inputs: self.inputs,
            output_dir: self.output_dir,
            rows_per_query: self.rows_per_query,
            max_rows_per_file: self.max_rows_per_file,
            pause_ms: self.pause_ms,
            timeout_secs: self.timeout_secs,
            dedup: self.keep_duplicates.then_some(false),
            month_end: self.month_end,
            mailto: self.mailto,
            base_url: None,
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    if error.is_input_error() {
        return 2;
    }
    match error {
        HarvestError::CrossrefHttp(_)
        | HarvestError::CrossrefStatus { .. }
        | HarvestError::CrossrefParse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) if args.dry_run => run_plan(resolve(args)?),
        Commands::Run(args) => run_extraction(resolve(args)?, output_mode),
        Commands::Plan(args) => run_plan(resolve(args)?),
    }
}

fn resolve(args: RunArgs) -> miette::Result<ResolvedRun> {
    let base = match args.config.as_deref() {
        Some(path) => ConfigLoader::load(path)?,
        None => RunFile::default(),
    };
    let file = base.overlay(args.into_run_file());
    Ok(ConfigLoader::resolve(file)?)
}

fn run_plan(resolved: ResolvedRun) -> miette::Result<()> {
    let app = App::new(CrossrefHttpClient::new(resolved.config.crossref.clone())?);
    let sources = resolved.sources()?;
    let plan = app.plan(&resolved.config, &sources)?;
    JsonOutput::print_plan(&plan).into_diagnostic()?;
    Ok(())
}

fn run_extraction(resolved: ResolvedRun, output_mode: OutputMode) -> miette::Result<()> {
    let app = App::new(CrossrefHttpClient::new(resolved.config.crossref.clone())?);
    let sources = resolved.sources()?;
    let config = resolved.config;

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.run(&config, &sources, &JsonOutput)?;
            JsonOutput::print_run(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new("ISSN Article Metadata Extractor");
            let result = tui.run(move |sink| app.run(&config, &sources, sink))?;
            tui.finish_run(&result)?;
            Ok(())
        }
    }
}
