use std::sync::Mutex;

use console::{Term, style};
use devops_ingest::SyncProgress;

/// Live status line on stderr, with one permanent line per finished stream.
///
/// stdout carries the JSON lines, so nothing here ever writes to it.
pub struct InteractiveReporter {
    term: Term,
    state: Mutex<LiveState>,
}

#[derive(Default)]
struct LiveState {
    stream: Option<&'static str>,
    pages: u32,
    ids: usize,
    failures: usize,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            state: Mutex::new(LiveState::default()),
        }
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            SyncProgress::StreamStarted { stream } => {
                *state = LiveState {
                    stream: Some(stream),
                    ..LiveState::default()
                };
                self.status(&format!("{} {stream}", style("→").cyan()));
            }

            SyncProgress::PageFetched { page, count, .. } => {
                state.pages = page;
                state.ids += count;
                self.status(&format!(
                    "{} {}: page {} ({} ids)",
                    style("→").cyan(),
                    state.stream.unwrap_or("work items"),
                    state.pages,
                    state.ids
                ));
            }

            SyncProgress::RateLimited { retry_after_ms, .. } => {
                self.status(&format!(
                    "{} rate limited, waiting {:.1}s",
                    style("…").yellow(),
                    retry_after_ms as f64 / 1000.0
                ));
            }

            SyncProgress::FieldUnavailable { field, .. } => {
                self.line(&format!(
                    "{} {field} is not in this project's schema, skipping it",
                    style("!").yellow()
                ));
            }

            SyncProgress::DocumentFailed { id, error } => {
                state.failures += 1;
                self.line(&format!("{} {id}: {error}", style("✗").red()));
            }

            SyncProgress::AlternateUrlAdopted { base_url } => {
                self.line(&format!("{} using {base_url}", style("!").yellow()));
            }

            SyncProgress::StreamComplete { stream, documents } => {
                let failures = std::mem::take(&mut state.failures);
                let suffix = if failures > 0 {
                    format!(", {}", style(format!("{failures} failed")).red())
                } else {
                    String::new()
                };
                self.line(&format!(
                    "{} {stream}: {documents} documents{suffix}",
                    style("✓").green()
                ));
            }

            SyncProgress::StreamFailed { stream, error } => {
                self.line(&format!("{} {stream}: {error}", style("✗").red().bold()));
            }

            SyncProgress::Warning { message } => {
                self.line(&format!("{} {message}", style("!").yellow()));
            }

            _ => {}
        }
    }

    /// Clear the status line.
    pub fn finish(&self) {
        let _ = self.term.clear_line();
    }

    fn status(&self, text: &str) {
        let _ = self.term.clear_line();
        let _ = self.term.write_str(text);
    }

    fn line(&self, text: &str) {
        let _ = self.term.clear_line();
        let _ = self.term.write_line(text);
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
