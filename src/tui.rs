use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink, RunResult};
use crate::error::HarvestError;

const EVENTS_MAX: usize = 200;
const SPINNER: &[char] = &['|', '/', '-', '\\'];

#[derive(Debug)]
struct ViewState {
    status: String,
    completed: usize,
    total: usize,
    events: VecDeque<String>,
    files: Vec<String>,
    started: Instant,
    active: bool,
}

pub struct Tui {
    title: String,
    state: Arc<Mutex<ViewState>>,
}

struct TuiProgress {
    state: Arc<Mutex<ViewState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            state.completed = event.completed;
            state.total = event.total;
            if let Some(file) = event.file {
                state
                    .files
                    .push(format!("{} ({} rows)", file.file_name, file.rows));
            }
            state.status = message.clone();
            push_event(&mut state.events, format!("[{}] {message}", timestamp()));
        }
    }
}

impl Tui {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            state: Arc::new(Mutex::new(ViewState {
                status: "ready".to_string(),
                completed: 0,
                total: 0,
                events: VecDeque::new(),
                files: Vec::new(),
                started: Instant::now(),
                active: false,
            })),
        }
    }

    /// Runs `f` on a worker thread while drawing its progress. Leaving the
    /// view early (`q`/`Esc`) does not stop the worker; the process exits and
    /// the open part stays behind as a temp file, which the next run in the
    /// same output directory removes.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, HarvestError> + Send + 'static,
        R: Send + 'static,
    {
        self.set_active(true);

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, &self.title, &state, tick))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                self.set_active(false);
                restore_terminal()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if is_quit(key) {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        self.set_active(false);
        restore_terminal()?;
        Err(miette::Report::msg("aborted"))
    }

    /// Plain-text summary printed after the alternate screen is gone.
    pub fn finish_run(&self, result: &RunResult) -> miette::Result<()> {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        println!("{cyan}{}{reset}", self.title);
        println!(
            "{green}Extraction completed: {} records from {} ISSNs{reset}",
            result.records, result.identifiers
        );
        if result.failed_fetches > 0 {
            println!(
                "{yellow}{} queries failed and were counted as empty{reset}",
                result.failed_fetches
            );
        }
        for file in &result.files {
            println!(
                "{cyan}  {} ({} rows, {}){reset}  {}",
                file.file_name, file.rows, file.content_type, file.path
            );
        }
        Ok(())
    }

    fn set_active(&self, active: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.active = active;
            if active {
                state.started = Instant::now();
                state.completed = 0;
                state.files.clear();
            }
        }
    }
}

fn restore_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    let mut stdout = io::stdout();
    stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
    Ok(())
}

fn is_quit(key: KeyEvent) -> bool {
    key.kind == KeyEventKind::Press && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
}

fn draw_ui(frame: &mut ratatui::Frame, title: &str, state: &ViewState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let spinner = if state.active {
        SPINNER[tick % SPINNER.len()]
    } else {
        ' '
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            title.to_string(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("  "),
        Span::styled(spinner.to_string(), Style::default().fg(Color::Green)),
        Span::raw(" "),
        Span::styled(state.status.clone(), Style::default().fg(Color::White)),
    ]))
    .block(Block::default().borders(Borders::BOTTOM))
    .alignment(Alignment::Left);
    frame.render_widget(header, chunks[0]);

    let ratio = if state.total == 0 {
        0.0
    } else {
        (state.completed as f64 / state.total as f64).min(1.0)
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio)
        .label(format!(
            "{}/{} queries  {:.0}%  {}s",
            state.completed,
            state.total,
            ratio * 100.0,
            state.started.elapsed().as_secs()
        ));
    frame.render_widget(gauge, chunks[1]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[2]);

    let visible = body[0].height.saturating_sub(2) as usize;
    let events = state
        .events
        .iter()
        .skip(state.events.len().saturating_sub(visible))
        .map(|line| Line::from(line.clone()))
        .collect::<Vec<_>>();
    let events = Paragraph::new(events)
        .block(Block::default().borders(Borders::ALL).title("Events"))
        .wrap(Wrap { trim: true });
    frame.render_widget(events, body[0]);

    let files = if state.files.is_empty() {
        vec![Line::from(Span::styled(
            "no files finalized yet",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        state
            .files
            .iter()
            .map(|file| Line::from(Span::styled(file.clone(), Style::default().fg(Color::Cyan))))
            .collect()
    };
    let files = Paragraph::new(files)
        .block(Block::default().borders(Borders::ALL).title("Files"))
        .wrap(Wrap { trim: true });
    frame.render_widget(files, body[1]);

    let footer = Paragraph::new(Line::from(Span::styled(
        "q / Esc: leave view",
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(footer, chunks[3]);
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs();
    let hours = (secs / 3600) % 24;
    let mins = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{hours:02}:{mins:02}:{seconds:02}")
}
