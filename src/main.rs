mod classify;
mod config;
mod error;
mod inspect;
mod keys;
mod report;
mod scan;
mod trust;
mod validate;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, CommandFactory, Parser};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::error::ValidateError;
use crate::inspect::{PackageInspector, RpmTools};
use crate::report::{ReportMode, EXIT_ERROR, EXIT_OK};

pub const VERSION: &str = "v0.1.0";

/// Validates that every RPM in a SIMP release directory (as extracted from an ISO
/// or tarball) is signed by a key shipped in the simp-gpgkeys RPM and was built on
/// trusted infrastructure.
///
/// Exit codes: 0 no issues found, 1 general error, 2 invalid RPMs found.
#[derive(Parser, Debug)]
#[command(name = "rpm-sigcheck", version = VERSION)]
struct Cli {
    /// Directory with SIMP RPMs
    #[arg(value_name = "DIRECTORY")]
    target_dir: PathBuf,

    /// Output a report of this type
    #[arg(short = 't', long = "report-type", value_name = "REPORT_TYPE", value_enum, default_value_t = ReportMode::Invalid)]
    report_type: ReportMode,

    /// No output, returns 1 if invalid RPMs present, 0 otherwise. All other options are ignored
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Additional configuration file, applied after the system and user ones
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(cli: &Cli) {
    let filter = if cli.quiet {
        EnvFilter::new("off")
    } else {
        let level = match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    pb.enable_steady_tick(Duration::from_millis(120));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {elapsed_precise} [{pos}/{len}] {msg}") {
        pb.set_style(style);
    }
    pb
}

/// Output and exit code of a completed run. `stdout` is `None` in quiet mode.
#[derive(Debug)]
struct Outcome {
    stdout: Option<String>,
    exit_code: u8,
}

fn execute(cli: &Cli, inspector: &dyn PackageInspector, progress: &ProgressBar) -> Result<Outcome, ValidateError> {
    let target_dir = scan::resolve_target_dir(&cli.target_dir)?;
    let cfg = AppConfig::load(cli.config.as_deref())?;

    let validation = validate::validate(inspector, &target_dir, &cfg, progress)?;

    if cli.quiet {
        return Ok(Outcome {
            stdout: None,
            exit_code: report::quiet_exit_code(&validation.results),
        });
    }

    let rendered = report::render(cli.report_type, &validation.results, &validation.trust);
    Ok(Outcome {
        stdout: Some(rendered.text),
        exit_code: rendered.exit_code,
    })
}

fn main() -> ExitCode {
    // clap exits 2 on usage errors; this tool promises 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { EXIT_ERROR } else { EXIT_OK });
        }
    };
    init_logging(&cli);

    let progress = progress_bar(cli.quiet);
    let outcome = execute(&cli, &RpmTools::new(), &progress);
    progress.finish_and_clear();

    match outcome {
        Ok(outcome) => {
            if let Some(text) = outcome.stdout {
                print!("{}", text);
            }
            ExitCode::from(outcome.exit_code)
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            if e.wants_usage() {
                eprintln!("{}", Cli::command().render_usage());
            }
            ExitCode::from(EXIT_ERROR)
        }
    }
}
