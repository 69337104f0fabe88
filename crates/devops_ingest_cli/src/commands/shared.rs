use std::io::{self, Write};

use devops_ingest::{
    Checkpoint, ConnectorError, ConnectorFailure, DevOpsConnector, Document, ProgressCallback,
    SlimDocument,
};
use serde::Serialize;

use crate::config::Config;

/// Build a connector from the layered config and load its token.
pub(crate) fn connect(
    config: &Config,
    on_progress: Option<ProgressCallback>,
) -> Result<DevOpsConnector, ConnectorError> {
    let mut connector = DevOpsConnector::new(config.connector.clone())?;
    if let Some(cb) = on_progress {
        connector = connector.with_progress(cb);
    }
    connector.load_credentials(config.credentials.clone())?;
    Ok(connector)
}

/// One line of output on stdout.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub(crate) enum OutputLine<'a> {
    Document(&'a Document),
    Failure(&'a ConnectorFailure),
    Checkpoint(&'a Checkpoint),
    SlimDocuments(&'a [SlimDocument]),
}

/// Newline-delimited JSON writer.
pub(crate) struct JsonLines<W: Write> {
    out: W,
}

impl<W: Write> JsonLines<W> {
    pub(crate) fn new(out: W) -> Self {
        Self { out }
    }

    pub(crate) fn write(&mut self, line: &OutputLine<'_>) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, line)?;
        self.out.write_all(b"\n")
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}
