//! Resumption state handed back to the caller after every run.

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};

/// Pagination state for the work item stream.
///
/// `has_more == false` implies `continuation_token == None`; a checkpoint is
/// terminal exactly when `has_more` is false. Persisting it is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    pub has_more: bool,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

impl Checkpoint {
    /// Starting point for a first run.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            has_more: true,
            continuation_token: None,
        }
    }

    /// Nothing left to page through.
    #[must_use]
    pub fn terminal() -> Self {
        Self {
            has_more: false,
            continuation_token: None,
        }
    }

    /// Checkpoint for the token the remote just returned.
    #[must_use]
    pub fn after_page(continuation_token: Option<String>) -> Self {
        Self {
            has_more: continuation_token.is_some(),
            continuation_token,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.has_more
    }

    pub fn validate(&self) -> Result<()> {
        if !self.has_more && self.continuation_token.is_some() {
            return Err(ConnectorError::InvalidCheckpoint(
                "has_more is false but a continuation_token is present".to_string(),
            ));
        }
        if matches!(self.continuation_token.as_deref(), Some("")) {
            return Err(ConnectorError::InvalidCheckpoint(
                "continuation_token is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a persisted checkpoint.
    ///
    /// Unknown keys are rejected so that `from_json(to_json(c)) == c` holds for
    /// everything accepted here.
    pub fn from_json(text: &str) -> Result<Self> {
        let checkpoint: Checkpoint = serde_json::from_str(text)
            .map_err(|e| ConnectorError::InvalidCheckpoint(e.to_string()))?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_is_lossless() {
        for checkpoint in [
            Checkpoint::initial(),
            Checkpoint::terminal(),
            Checkpoint::after_page(Some("abc==".to_string())),
        ] {
            let text = checkpoint.to_json().expect("encode");
            assert_eq!(Checkpoint::from_json(&text).expect("decode"), checkpoint);
        }
    }

    #[test]
    fn test_persisted_shape() {
        let text = Checkpoint::after_page(Some("tok".to_string()))
            .to_json()
            .expect("encode");
        assert_eq!(text, r#"{"has_more":true,"continuation_token":"tok"}"#);
        assert_eq!(
            Checkpoint::terminal().to_json().expect("encode"),
            r#"{"has_more":false,"continuation_token":null}"#
        );
    }

    #[test]
    fn test_after_page_derives_has_more() {
        assert!(Checkpoint::after_page(None).is_terminal());
        assert!(!Checkpoint::after_page(Some("t".to_string())).is_terminal());
    }

    #[test]
    fn test_invariant_violations_are_rejected() {
        let err = Checkpoint::from_json(r#"{"has_more": false, "continuation_token": "t"}"#)
            .expect_err("terminal with token");
        assert!(matches!(err, ConnectorError::InvalidCheckpoint(_)));

        Checkpoint::from_json(r#"{"has_more": true, "continuation_token": ""}"#)
            .expect_err("empty token");
        Checkpoint::from_json(r#"{"has_more": true, "extra": 1}"#).expect_err("unknown key");
        Checkpoint::from_json(r#"{"continuation_token": null}"#).expect_err("missing has_more");
        Checkpoint::from_json("not json").expect_err("garbage");
    }

    #[test]
    fn test_missing_token_defaults_to_none() {
        let checkpoint = Checkpoint::from_json(r#"{"has_more": true}"#).expect("decode");
        assert_eq!(checkpoint, Checkpoint::initial());
    }
}
