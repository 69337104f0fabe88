//! Cooperative Ctrl+C handling for `sync`.
//!
//! The first Ctrl+C only raises a flag. `sync` checks it between steps and,
//! if the run has not reached its checkpoint yet, stops without touching the
//! state file, so the next invocation replays the same window from the last
//! saved checkpoint. A second Ctrl+C exits immediately with status 130.

use std::sync::atomic::{AtomicBool, Ordering};

use console::Term;

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Whether the current run should stop before its next step.
pub(crate) fn is_shutdown_requested() -> bool {
    STOP_REQUESTED.load(Ordering::Acquire)
}

/// Spawn the Ctrl+C listener. Must be called from inside the tokio runtime.
///
/// Documents already written to stdout stay written; only the run state is
/// held back.
pub(crate) fn setup_shutdown_handler() {
    tokio::spawn(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(
                error = %e,
                "Ctrl+C handler unavailable, interrupts will not be graceful"
            );
            return;
        }

        STOP_REQUESTED.store(true, Ordering::Release);
        let interactive = Term::stderr().is_term();
        if interactive {
            eprintln!("\n\nStopping sync; the state file will not be updated for this run.");
            eprintln!("Press Ctrl+C again to quit now.");
        } else {
            tracing::warn!("Interrupted, stopping sync without saving run state");
        }

        if tokio::signal::ctrl_c().await.is_ok() {
            if interactive {
                eprintln!("Aborted.");
            }
            std::process::exit(130);
        }
    });
}
