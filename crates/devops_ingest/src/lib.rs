//! devops_ingest - incremental, checkpointed ingestion from Azure DevOps.
//!
//! Pulls work items (plus commits, releases, test runs and wiki pages) from a
//! rate-limited, continuation-token paginated REST API and emits a single
//! ordered stream of documents, per-record failures, and one final checkpoint
//! the caller persists to resume from.
//!
//! # Example
//!
//! ```ignore
//! use devops_ingest::{ConnectorConfig, Credentials, DevOpsConnector, Step};
//!
//! let mut connector = DevOpsConnector::new(ConnectorConfig::new("contoso", "Fabrikam"))?;
//! connector.load_credentials(Credentials::new(pat))?;
//! connector.validate_connector_settings().await?;
//!
//! let checkpoint = connector.build_dummy_checkpoint();
//! let mut sync = connector.load_from_checkpoint(start, end, checkpoint)?;
//! while let Some(step) = sync.next_step().await {
//!     match step {
//!         Step::Content(doc) => index(doc),
//!         Step::Failure(failure) => report(failure),
//!         Step::End(checkpoint) => save(checkpoint.to_json()?),
//!     }
//! }
//! ```

pub mod assemble;
pub mod checkpoint;
pub mod config;
pub mod connector;
pub mod error;
pub mod fetch;
pub mod fields;
pub mod gateway;
pub mod http;
pub mod multiplex;
pub mod query;
pub mod retry;
pub mod sources;
pub mod sync;
pub mod types;

#[cfg(test)]
mod testing;

pub use checkpoint::Checkpoint;
pub use config::{ConnectorConfig, ContentScope, Credentials, DataType};
pub use connector::DevOpsConnector;
pub use error::{ConnectorError, Result};
pub use gateway::{AlternatePolicy, RemoteRequestError, RequestGateway};
pub use multiplex::{MultiplexError, OutputItem, OutputMultiplexer};
pub use sync::{CheckpointedSyncLoop, ProgressCallback, Step, SyncProgress};
pub use types::{
    ConnectorFailure, Document, FailedItem, Owner, SlimDocument, TextSection, TimeWindow,
};
