//! Iteration over a collection carried by the message.

use super::instrument::run_children;
use super::{Step, StepEmission, StepList};
use crate::errors::EngineError;
use crate::message::Message;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Lazily obtains the collection to iterate from the message.
pub type CollectionSelector = Arc<dyn Fn(&Message) -> Option<Vec<Value>> + Send + Sync>;

/// Assigns the current item into the message before the body runs.
pub type ItemAssigner = Arc<dyn Fn(&mut Message, Value) + Send + Sync>;

/// Runs its body once per item of a message-carried collection.
///
/// An absent collection is a no-op. A stop raised by any body step aborts the
/// entire iteration, not just the remaining body steps of the current item.
pub struct ForEach {
    name: String,
    collection: CollectionSelector,
    assign: ItemAssigner,
    body: StepList,
}

impl ForEach {
    /// Creates an iteration with explicit selector and assigner.
    pub fn new<C, A>(name: impl Into<String>, collection: C, assign: A) -> Self
    where
        C: Fn(&Message) -> Option<Vec<Value>> + Send + Sync + 'static,
        A: Fn(&mut Message, Value) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            collection: Arc::new(collection),
            assign: Arc::new(assign),
            body: Vec::new(),
        }
    }

    /// Creates an iteration over an array stored under `collection_key`,
    /// assigning each item to `item_key`.
    #[must_use]
    pub fn over_key(
        name: impl Into<String>,
        collection_key: impl Into<String>,
        item_key: impl Into<String>,
    ) -> Self {
        let collection_key = collection_key.into();
        let item_key = item_key.into();
        Self::new(
            name,
            move |msg: &Message| {
                msg.get(&collection_key)
                    .and_then(Value::as_array)
                    .cloned()
            },
            move |msg: &mut Message, item: Value| {
                msg.set(item_key.clone(), item);
            },
        )
    }

    /// Appends a body step.
    #[must_use]
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.body.push(Arc::new(step));
        self
    }

    /// Appends an already-shared body step.
    #[must_use]
    pub fn step_arc(mut self, step: Arc<dyn Step>) -> Self {
        self.body.push(step);
        self
    }
}

#[async_trait]
impl Step for ForEach {
    fn name(&self) -> &str {
        &self.name
    }

    fn emission(&self) -> StepEmission {
        StepEmission::Delegating
    }

    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError> {
        let Some(items) = (self.collection)(msg) else {
            return Ok(());
        };
        for item in items {
            if msg.should_stop() {
                break;
            }
            (self.assign)(msg, item);
            run_children(msg, &self.body).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ForEach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForEach")
            .field("name", &self.name)
            .field("body", &self.body.len())
            .finish()
    }
}
