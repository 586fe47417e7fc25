//! cursor-monitor: prints system cursor changes until interrupted.
//!
//! The main thread is the host: it pumps the monitor's call queue, so the
//! printing callback never leaves this thread. Ctrl-C or `--duration` ends the
//! session; events produced before the tap stopped are still printed.

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use serde::Serialize;

use cursor_monitor::{
    Config, ConfigError, CursorMonitor, CursorType, Dispatch, MonitorError, OutputFormat,
};

/// How long one pump of the call queue may block before flags are re-checked.
const PUMP_SLICE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Print system cursor changes as they happen.
#[derive(Parser, Debug)]
#[command(name = "cursor-monitor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format; overrides `output.format`
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Stop after this many seconds (0 = until interrupted)
    #[arg(short, long, default_value_t = 0)]
    duration: u64,

    /// Do not print the cursor visible at start
    #[arg(long)]
    no_initial: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    log::info!("cursor-monitor v{}", env!("CARGO_PKG_VERSION"));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout carries only cursor changes.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    if cli.no_initial {
        config.monitor.emit_initial = false;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(&cli)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))?;
    }

    // The callback runs on this thread only, so plain Rc state is enough.
    let output = OutputStatus::default();
    let mut printer = Printer::new(config.output.format);
    let callback = {
        let output = output.clone();
        move |cursor: CursorType| {
            if output.failed() {
                return;
            }
            if let Err(e) = printer.print(&mut io::stdout().lock(), cursor) {
                output.fail(e);
            }
        }
    };

    let (monitor, mut queue) = CursorMonitor::builder()
        .config(config.monitor.clone())
        .platform(config.platform.clone())
        .build(callback)?;
    monitor.start()?;

    let deadline = (cli.duration > 0).then(|| Instant::now() + Duration::from_secs(cli.duration));
    loop {
        if interrupted.load(Ordering::SeqCst) {
            log::info!("interrupted, stopping");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("duration elapsed, stopping");
            break;
        }
        if output.failed() {
            break;
        }
        if queue.run_for(PUMP_SLICE) == Dispatch::Closed {
            break;
        }
    }

    monitor.stop()?;
    drop(monitor);
    // Flush whatever the tap produced before it stopped.
    queue.run();
    output.into_result()
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// First error hit while writing cursor changes.
#[derive(Clone, Default)]
struct OutputStatus(Rc<RefCell<Option<io::Error>>>);

impl OutputStatus {
    fn fail(&self, e: io::Error) {
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(e);
        }
    }

    fn failed(&self) -> bool {
        self.0.borrow().is_some()
    }

    fn into_result(self) -> Result<(), AppError> {
        let failure = self.0.borrow_mut().take();
        match failure {
            Some(e) => Err(AppError::Output(e)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChangeRecord {
    cursor: CursorType,
    previous: Option<CursorType>,
    timestamp_ms: u64,
}

/// Formats cursor changes, remembering the previous cursor.
struct Printer {
    format: OutputFormat,
    previous: Option<CursorType>,
}

impl Printer {
    fn new(format: OutputFormat) -> Self {
        Self {
            format,
            previous: None,
        }
    }

    fn print(&mut self, out: &mut impl Write, cursor: CursorType) -> io::Result<()> {
        let line = self.line(cursor, now_ms())?;
        writeln!(out, "{line}")?;
        out.flush()
    }

    fn line(&mut self, cursor: CursorType, timestamp_ms: u64) -> io::Result<String> {
        let previous = self.previous.replace(cursor);
        match self.format {
            OutputFormat::Text => Ok(match previous {
                Some(previous) => format!("{previous} -> {cursor}"),
                None => cursor.to_string(),
            }),
            OutputFormat::Json => {
                let record = ChangeRecord {
                    cursor,
                    previous,
                    timestamp_ms,
                };
                serde_json::to_string(&record).map_err(io::Error::from)
            }
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
