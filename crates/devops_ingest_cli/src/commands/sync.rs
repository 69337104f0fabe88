//! Run one ingestion window and keep the run state between invocations.
//!
//! The state file holds the window that was run and the checkpoint it ended
//! with. A checkpoint with `has_more` resumes the same window; a terminal one
//! starts the next window where the last one ended.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use console::{Term, style};
use devops_ingest::{Checkpoint, DataType, Step};
use serde::{Deserialize, Serialize};

use crate::commands::shared::{JsonLines, OutputLine, connect};
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::is_shutdown_requested;

const MAX_LOOKBACK_DAYS: i64 = 3650;

/// Options for the `sync` command.
#[derive(Debug, Clone, clap::Args)]
pub struct SyncArgs {
    /// Window start (RFC 3339). Defaults to where the previous run ended
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Window end (RFC 3339). Defaults to now
    #[arg(long)]
    end: Option<DateTime<Utc>>,

    /// State file (default from config or the XDG state directory)
    #[arg(short = 'k', long)]
    checkpoint: Option<PathBuf>,

    /// Ignore any saved state and start a new window
    #[arg(long)]
    fresh: bool,

    /// Stop after this many query pages and save a resumable checkpoint
    #[arg(short = 'p', long)]
    max_pages: Option<usize>,

    /// Only ingest these data types (repeatable, e.g. -t work_items -t wikis)
    #[arg(short = 't', long = "type")]
    data_types: Vec<DataType>,

    /// Don't fetch work item comments
    #[arg(long)]
    no_comments: bool,
}

/// What the sync command persists between invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RunState {
    pub(crate) start: DateTime<Utc>,
    pub(crate) end: DateTime<Utc>,
    pub(crate) checkpoint: Checkpoint,
}

impl RunState {
    fn load(path: &Path) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let state: RunState = serde_json::from_str(&text)
                    .map_err(|e| format!("invalid state file {}: {e}", path.display()))?;
                state.checkpoint.validate()?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so an interrupted save never leaves half a file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)
    }
}

/// Decide the window and starting checkpoint for this run.
pub(crate) fn plan_run(
    previous: Option<RunState>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    lookback: Duration,
    now: DateTime<Utc>,
) -> RunState {
    match previous {
        Some(state) if state.checkpoint.has_more && start.is_none() && end.is_none() => state,
        previous => {
            let end = end.unwrap_or(now);
            let start = start
                .or_else(|| previous.map(|s| s.end))
                .unwrap_or(end - lookback);
            RunState {
                start,
                end,
                checkpoint: Checkpoint::initial(),
            }
        }
    }
}

#[derive(Debug, Default)]
struct Summary {
    documents: usize,
    failures: usize,
}

/// Handle the `sync` command.
pub async fn handle_sync(
    args: SyncArgs,
    mut config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(max_pages) = args.max_pages {
        config.connector.max_pages_per_run = Some(max_pages);
    }
    if !args.data_types.is_empty() {
        config.connector.data_types = args.data_types.clone();
        config.connector.content_scope = None;
    }
    if args.no_comments {
        config.connector.include_comments = false;
    }

    let state_path = args
        .checkpoint
        .clone()
        .or_else(|| config.checkpoint_path())
        .ok_or("could not determine a state file location; pass --checkpoint")?;
    let previous = if args.fresh {
        None
    } else {
        RunState::load(&state_path)?
    };
    let plan = plan_run(
        previous,
        args.start,
        args.end,
        Duration::days(config.sync.lookback_days.clamp(0, MAX_LOOKBACK_DAYS)),
        Utc::now(),
    );
    tracing::info!(
        start = %plan.start,
        end = %plan.end,
        resumed = plan.checkpoint.continuation_token.is_some(),
        state = %state_path.display(),
        "Starting sync window"
    );

    let reporter = Arc::new(ProgressReporter::new());
    let connector = connect(&config, Some(reporter.as_callback()))?;
    let mut sync =
        connector.load_from_checkpoint(plan.start, plan.end, plan.checkpoint.clone())?;

    let mut out = JsonLines::new(io::stdout());
    let mut summary = Summary::default();
    let mut finished = None;
    while let Some(step) = sync.next_step().await {
        match &step {
            Step::Content(doc) => {
                out.write(&OutputLine::Document(doc))?;
                summary.documents += 1;
            }
            Step::Failure(failure) => {
                out.write(&OutputLine::Failure(failure))?;
                summary.failures += 1;
            }
            Step::End(checkpoint) => {
                out.write(&OutputLine::Checkpoint(checkpoint))?;
                finished = Some(checkpoint.clone());
            }
        }
        if finished.is_none() && is_shutdown_requested() {
            break;
        }
    }
    out.flush()?;
    reporter.finish();

    let Some(checkpoint) = finished else {
        tracing::warn!("Run interrupted before its checkpoint; state file left unchanged");
        return Ok(());
    };
    let has_more = checkpoint.has_more;
    RunState {
        start: plan.start,
        end: plan.end,
        checkpoint,
    }
    .save(&state_path)?;

    print_summary(&summary, has_more);
    Ok(())
}

fn print_summary(summary: &Summary, has_more: bool) {
    if Term::stderr().is_term() {
        let next = if has_more {
            style("more pages remain, run again to continue").yellow()
        } else {
            style("window complete").green()
        };
        eprintln!(
            "\n{} {} documents, {} failures; {}",
            style("Done:").bold(),
            summary.documents,
            summary.failures,
            next
        );
    } else {
        tracing::info!(
            documents = summary.documents,
            failures = summary.failures,
            has_more,
            "Sync finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(text: &str) -> DateTime<Utc> {
        text.parse().unwrap()
    }

    #[test]
    fn test_first_run_uses_lookback() {
        let now = at("2024-03-31T00:00:00Z");
        let plan = plan_run(None, None, None, Duration::days(30), now);
        assert_eq!(plan.start, at("2024-03-01T00:00:00Z"));
        assert_eq!(plan.end, now);
        assert_eq!(plan.checkpoint, Checkpoint::initial());
    }

    #[test]
    fn test_unfinished_window_is_resumed_as_is() {
        let previous = RunState {
            start: at("2024-01-01T00:00:00Z"),
            end: at("2024-02-01T00:00:00Z"),
            checkpoint: Checkpoint::after_page(Some("tok".to_string())),
        };
        let plan = plan_run(
            Some(previous.clone()),
            None,
            None,
            Duration::days(30),
            at("2024-03-01T00:00:00Z"),
        );
        assert_eq!(plan, previous);
    }

    #[test]
    fn test_finished_window_starts_next_one_at_previous_end() {
        let previous = RunState {
            start: at("2024-01-01T00:00:00Z"),
            end: at("2024-02-01T00:00:00Z"),
            checkpoint: Checkpoint::terminal(),
        };
        let now = at("2024-03-01T00:00:00Z");
        let plan = plan_run(Some(previous), None, None, Duration::days(30), now);
        assert_eq!(plan.start, at("2024-02-01T00:00:00Z"));
        assert_eq!(plan.end, now);
        assert!(plan.checkpoint.has_more);
    }

    #[test]
    fn test_explicit_window_discards_pending_token() {
        let previous = RunState {
            start: at("2024-01-01T00:00:00Z"),
            end: at("2024-02-01T00:00:00Z"),
            checkpoint: Checkpoint::after_page(Some("tok".to_string())),
        };
        let plan = plan_run(
            Some(previous),
            Some(at("2023-06-01T00:00:00Z")),
            Some(at("2023-07-01T00:00:00Z")),
            Duration::days(30),
            at("2024-03-01T00:00:00Z"),
        );
        assert_eq!(plan.start, at("2023-06-01T00:00:00Z"));
        assert_eq!(plan.checkpoint.continuation_token, None);
    }

    #[test]
    fn test_state_file_round_trip_and_missing_file() {
        let dir = std::env::temp_dir().join(format!("devops-ingest-{}", std::process::id()));
        let path = dir.join("nested").join("state.json");
        assert_eq!(RunState::load(&path).unwrap(), None);

        let state = RunState {
            start: at("2024-01-01T00:00:00Z"),
            end: at("2024-02-01T00:00:00Z"),
            checkpoint: Checkpoint::terminal(),
        };
        state.save(&path).unwrap();
        assert_eq!(RunState::load(&path).unwrap(), Some(state));

        fs::write(&path, br#"{"start": "nope"}"#).unwrap();
        assert!(RunState::load(&path).is_err());
        let _ = fs::remove_dir_all(dir);
    }
}
