//! Sync orchestration: the checkpointed loop, its output steps, and progress
//! reporting.
//!
//! # Module Structure
//!
//! - [`engine`] - `CheckpointedSyncLoop`, `Step`, `SyncSettings`
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//!
//! # Example
//!
//! ```ignore
//! use devops_ingest::sync::Step;
//!
//! let mut sync = connector.load_from_checkpoint(start, end, checkpoint)?;
//! while let Some(step) = sync.next_step().await {
//!     match step {
//!         Step::Content(doc) => index(doc),
//!         Step::Failure(failure) => record(failure),
//!         Step::End(checkpoint) => persist(checkpoint),
//!     }
//! }
//! ```

pub mod engine;
mod progress;

pub use engine::{CheckpointedSyncLoop, Step, SyncSettings, WORK_ITEMS_ENTITY};
pub use progress::{ProgressCallback, SyncProgress, emit};
