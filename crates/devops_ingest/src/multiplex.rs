//! Typed view over a loosely typed output sequence.
//!
//! [`CheckpointedSyncLoop`](crate::sync::CheckpointedSyncLoop) already yields
//! typed [`Step`]s. The multiplexer is for producers that hand over boxed,
//! type-erased items (plugins, adapters) and re-exposes them as the
//! `(document, failure, checkpoint)` triple, rejecting anything else.

use std::any::Any;

use thiserror::Error;

use crate::checkpoint::Checkpoint;
use crate::sync::Step;
use crate::types::{ConnectorFailure, Document};

/// `(document, failure, checkpoint)`; exactly one is `Some`.
pub type Triple = (
    Option<Document>,
    Option<ConnectorFailure>,
    Option<Checkpoint>,
);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultiplexError {
    /// The producer emitted something that is not part of the output contract.
    #[error("unexpected item of type {type_name} in connector output")]
    UnexpectedItem { type_name: &'static str },

    #[error("item after the final checkpoint")]
    ItemAfterCheckpoint,

    #[error("output ended without a checkpoint")]
    MissingCheckpoint,
}

/// A type-erased output item that still knows its type name.
pub trait OutputItem: Any + Send {
    fn type_name(&self) -> &'static str;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send> OutputItem for T {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Classify one item.
pub fn classify(item: Box<dyn OutputItem>) -> Result<Triple, MultiplexError> {
    // Through the trait object, not the blanket impl for `Box<dyn OutputItem>`.
    let type_name = (*item).type_name();
    let any = item.into_any();
    let any = match any.downcast::<Step>() {
        Ok(step) => return Ok(step.into_triple()),
        Err(other) => other,
    };
    let any = match any.downcast::<Document>() {
        Ok(doc) => return Ok((Some(*doc), None, None)),
        Err(other) => other,
    };
    let any = match any.downcast::<ConnectorFailure>() {
        Ok(failure) => return Ok((None, Some(*failure), None)),
        Err(other) => other,
    };
    match any.downcast::<Checkpoint>() {
        Ok(checkpoint) => Ok((None, None, Some(*checkpoint))),
        Err(_) => Err(MultiplexError::UnexpectedItem { type_name }),
    }
}

/// Iterator adapter enforcing the contract: documents and failures in any
/// order, then exactly one checkpoint, then nothing.
pub struct OutputMultiplexer<I> {
    items: I,
    checkpoint_seen: bool,
    done: bool,
}

impl<I> OutputMultiplexer<I>
where
    I: Iterator<Item = Box<dyn OutputItem>>,
{
    pub fn new(items: I) -> Self {
        Self {
            items,
            checkpoint_seen: false,
            done: false,
        }
    }
}

impl<I> Iterator for OutputMultiplexer<I>
where
    I: Iterator<Item = Box<dyn OutputItem>>,
{
    type Item = Result<Triple, MultiplexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(item) = self.items.next() else {
            self.done = true;
            return (!self.checkpoint_seen).then_some(Err(MultiplexError::MissingCheckpoint));
        };
        if self.checkpoint_seen {
            self.done = true;
            return Some(Err(MultiplexError::ItemAfterCheckpoint));
        }
        let classified = classify(item);
        match &classified {
            Ok((_, _, Some(_))) => self.checkpoint_seen = true,
            Ok(_) => {}
            Err(_) => self.done = true,
        }
        Some(classified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            title: "t".to_string(),
            semantic_identifier: "t".to_string(),
            sections: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: None,
            updated_at: None,
            owners: Vec::new(),
            source_link: "https://x".to_string(),
        }
    }

    #[test]
    fn test_routes_each_kind() {
        let items: Vec<Box<dyn OutputItem>> = vec![
            Box::new(doc("a")),
            Box::new(ConnectorFailure::document("b", None, "bad")),
            Box::new(Step::Content(doc("c"))),
            Box::new(Checkpoint::terminal()),
        ];
        let triples: Vec<Triple> = OutputMultiplexer::new(items.into_iter())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(triples.len(), 4);
        assert_eq!(triples[0].0.as_ref().map(|d| d.id.as_str()), Some("a"));
        assert!(triples[1].1.is_some());
        assert_eq!(triples[2].0.as_ref().map(|d| d.id.as_str()), Some("c"));
        assert_eq!(triples[3].2, Some(Checkpoint::terminal()));
    }

    #[test]
    fn test_rejects_tuple_naming_its_type() {
        let err = classify(Box::new((1u32, "x"))).unwrap_err();
        let MultiplexError::UnexpectedItem { type_name } = &err else {
            panic!("wrong error: {err:?}");
        };
        assert!(type_name.contains("u32"));
        assert!(err.to_string().contains("(u32, &str)"));
    }

    #[test]
    fn test_contract_violations_stop_iteration() {
        let items: Vec<Box<dyn OutputItem>> =
            vec![Box::new(Checkpoint::terminal()), Box::new(doc("late"))];
        let results: Vec<_> = OutputMultiplexer::new(items.into_iter()).collect();
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(MultiplexError::ItemAfterCheckpoint));
        assert_eq!(results.len(), 2);

        let empty: Vec<Box<dyn OutputItem>> = vec![Box::new(doc("only"))];
        let results: Vec<_> = OutputMultiplexer::new(empty.into_iter()).collect();
        assert_eq!(results.last(), Some(&Err(MultiplexError::MissingCheckpoint)));
    }
}
