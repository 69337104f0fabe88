use std::io;

use chrono::{DateTime, Utc};

use crate::commands::shared::{JsonLines, OutputLine, connect};
use crate::config::Config;

/// Options for the `slim` command.
#[derive(Debug, Clone, clap::Args)]
pub struct SlimArgs {
    /// Only ids changed on or after this time (RFC 3339)
    #[arg(long)]
    since: Option<DateTime<Utc>>,

    /// Ids per output line
    #[arg(short = 'b', long, default_value_t = 500)]
    batch_size: usize,
}

/// Handle the `slim` command: list every work item document id in scope,
/// for pruning documents that no longer exist upstream.
pub async fn handle_slim(
    args: SlimArgs,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let connector = connect(config, None)?;
    let batches = connector
        .retrieve_all_slim_documents(args.since, args.batch_size)
        .await?;

    let total: usize = batches.iter().map(Vec::len).sum();
    let mut out = JsonLines::new(io::stdout());
    for batch in &batches {
        out.write(&OutputLine::SlimDocuments(batch))?;
    }
    out.flush()?;
    tracing::info!(total, batches = batches.len(), "Listed document ids");
    Ok(())
}
