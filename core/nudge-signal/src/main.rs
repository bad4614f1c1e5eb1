//! nudge: signal reporter and inspector for the nudge daemon.
//!
//! Observation points (editor plugins, browser hooks, shell aliases) call this
//! binary to forward signals. The same binary reads state, metrics and the
//! event log back out.
//!
//! ## Subcommands
//!
//! - `start`, `activity`, `tab-switch`, `continue`, `accept`, `tone`: signals
//! - `state`, `metrics`, `export`, `watch`, `health`: inspection
//! - `reset-log`: clears the stored event log

mod daemon_client;
mod logging;
mod render;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use nudge_core::{Event, ExportFormat, MetricsSummary, NudgeError, Tone};
use nudge_daemon_protocol::Method;
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

use daemon_client::ClientError;

#[derive(Parser)]
#[command(name = "nudge")]
#[command(about = "Ambient task-restart nudges")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Declare the task you are working on
    Start {
        /// Task name (words are joined with spaces)
        #[arg(value_name = "TASK", required = true, num_args = 1..)]
        task: Vec<String>,
    },

    /// Report an activity sample
    Activity {
        /// The user typed since the last sample
        #[arg(long)]
        typing: bool,

        /// Pixels scrolled since the last sample
        #[arg(long, value_name = "PX", default_value_t = 0.0, allow_negative_numbers = true)]
        scroll: f64,
    },

    /// Report that the user switched browser tab or window
    TabSwitch,

    /// Resume after a stall prompt
    Continue,

    /// Accept the current stall prompt
    Accept,

    /// Set prompt wording tone
    Tone {
        #[arg(value_enum)]
        tone: ToneArg,
    },

    /// Show the current session
    State {
        /// Print the raw JSON payload
        #[arg(long)]
        json: bool,
    },

    /// Show summary metrics
    Metrics {
        /// Print the raw JSON payload
        #[arg(long)]
        json: bool,
    },

    /// Export the event log
    Export {
        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,

        /// Write to a file instead of stdout
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Clear the event log
    ResetLog,

    /// Stream session snapshots as they change
    Watch {
        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Check that the daemon is reachable
    Health,
}

#[derive(Clone, Copy, ValueEnum)]
enum ToneArg {
    Gentle,
    Firm,
}

impl From<ToneArg> for Tone {
    fn from(value: ToneArg) -> Self {
        match value {
            ToneArg::Gentle => Tone::Gentle,
            ToneArg::Firm => Tone::Firm,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Daemon(#[from] ClientError),

    #[error("Unexpected payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Nudge(#[from] NudgeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli.command) {
        tracing::error!(error = %err, "nudge command failed");
        eprintln!("nudge: {}", err);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Start { task } => {
            let task_name = task.join(" ");
            tracing::info!(task_name = %task_name, "Declaring task");
            signal(Method::DeclareTask, Some(json!({ "task_name": task_name })))
        }
        Commands::Activity { typing, scroll } => signal(
            Method::ReportActivity,
            Some(json!({ "typing": typing, "scroll_distance": scroll })),
        ),
        Commands::TabSwitch => signal(Method::ReportTabSwitch, None),
        Commands::Continue => signal(Method::Continue, None),
        Commands::Accept => signal(Method::AcceptPrompt, None),
        Commands::Tone { tone } => {
            let tone = Tone::from(tone);
            daemon_client::call(Method::SetTone, Some(json!({ "tone": tone })))?;
            println!("Tone set to {}", tone.as_str());
            Ok(())
        }
        Commands::State { json } => {
            let data = daemon_client::call(Method::GetState, None)?;
            if json {
                return print_json(&data);
            }
            let snapshot = daemon_client::parse_snapshot(data["session"].clone())?;
            println!("{}", render::snapshot(&snapshot, Utc::now()));
            Ok(())
        }
        Commands::Metrics { json } => {
            let data = daemon_client::call(Method::GetMetrics, None)?;
            if json {
                return print_json(&data);
            }
            let tone = serde_json::from_value::<Tone>(data["tone"].clone()).ok();
            let summary: MetricsSummary = serde_json::from_value(data)?;
            println!("{}", render::metrics(&summary, tone));
            Ok(())
        }
        Commands::Export { format, output } => {
            let data = daemon_client::call(Method::ExportEvents, None)?;
            let events: Vec<Event> = serde_json::from_value(data)?;
            let rendered = ExportFormat::from(format).render(&events)?;
            match output {
                Some(path) => {
                    fs_err::write(&path, rendered)?;
                    tracing::info!(events = events.len(), path = %path.display(), "Exported events");
                    eprintln!("Exported {} events to {}", events.len(), path.display());
                }
                None => println!("{}", rendered),
            }
            Ok(())
        }
        Commands::ResetLog => {
            let data = daemon_client::call(Method::ResetEventLog, None)?;
            println!("Cleared {} events", data["cleared"].as_u64().unwrap_or(0));
            Ok(())
        }
        Commands::Watch { json } => {
            let stdout = std::io::stdout();
            daemon_client::subscribe(|snapshot| {
                let mut out = stdout.lock();
                let written = if json {
                    serde_json::to_string(&snapshot)
                        .map_err(std::io::Error::from)
                        .and_then(|line| writeln!(out, "{}", line))
                } else {
                    writeln!(out, "{}\n", render::snapshot(&snapshot, Utc::now()))
                };
                written.and_then(|_| out.flush()).is_ok()
            })?;
            Ok(())
        }
        Commands::Health => {
            let data = daemon_client::call(Method::GetHealth, None)?;
            print_json(&data)
        }
    }
}

/// Forwards a signal and prints the resulting status line.
fn signal(method: Method, params: Option<Value>) -> Result<(), CliError> {
    let data = daemon_client::call(method, params)?;
    let snapshot = daemon_client::parse_snapshot(data)?;
    tracing::debug!(
        method = ?method,
        status = snapshot.status.as_str(),
        revision = snapshot.revision,
        "Signal delivered"
    );
    match (&snapshot.current_prompt, snapshot.stall_kind) {
        (Some(prompt), Some(kind)) => {
            println!("{} ({}): {}", snapshot.status.as_str(), kind.as_str(), prompt)
        }
        _ => println!("{}", snapshot.status.as_str()),
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_joins_task_words() {
        let cli = Cli::try_parse_from(["nudge", "start", "Q4", "report"]).unwrap();
        match cli.command {
            Commands::Start { task } => assert_eq!(task.join(" "), "Q4 report"),
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn activity_accepts_negative_scroll() {
        let cli = Cli::try_parse_from(["nudge", "activity", "--scroll", "-340"]).unwrap();
        match cli.command {
            Commands::Activity { typing, scroll } => {
                assert!(!typing);
                assert_eq!(scroll, -340.0);
            }
            _ => panic!("expected activity"),
        }
    }

    #[test]
    fn tone_rejects_unknown_values() {
        assert!(Cli::try_parse_from(["nudge", "tone", "loud"]).is_err());
        let cli = Cli::try_parse_from(["nudge", "tone", "firm"]).unwrap();
        match cli.command {
            Commands::Tone { tone } => assert_eq!(Tone::from(tone), Tone::Firm),
            _ => panic!("expected tone"),
        }
    }

    #[test]
    fn export_defaults_to_json_on_stdout() {
        let cli = Cli::try_parse_from(["nudge", "export"]).unwrap();
        match cli.command {
            Commands::Export { format, output } => {
                assert_eq!(ExportFormat::from(format), ExportFormat::Json);
                assert!(output.is_none());
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn start_requires_a_task() {
        assert!(Cli::try_parse_from(["nudge", "start"]).is_err());
    }
}
