use super::{FieldValue, Level, Message, MessageFields};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::thread::{self, ThreadId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BuilderError {
    #[error("builder owned by thread {owner:?} was mutated from thread {caller:?}")]
    OwnershipViolation { owner: ThreadId, caller: ThreadId },

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Mutable accumulator that produces immutable [`Message`] values.
///
/// A builder is bound to the thread that created it. Every mutating setter
/// checks the calling thread against that owner and rejects mismatches
/// without applying the mutation. [`MessageBuilder::copy`] is the one
/// sanctioned way to move builder state across a concurrency boundary: it
/// produces a fresh builder whose owner is rebound to the calling thread.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    owner: ThreadId,
    message: Option<String>,
    source: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    level: Option<Level>,
    input: Option<String>,
    outputs: Option<HashSet<String>>,
    fields: MessageFields,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            message: None,
            source: None,
            timestamp: None,
            level: None,
            input: None,
            outputs: None,
            fields: MessageFields::new(),
        }
    }

    fn check_owner(&self) -> Result<(), BuilderError> {
        let caller = thread::current().id();
        if caller != self.owner {
            return Err(BuilderError::OwnershipViolation {
                owner: self.owner,
                caller,
            });
        }
        Ok(())
    }

    pub fn message(&mut self, message: impl Into<String>) -> Result<&mut Self, BuilderError> {
        self.check_owner()?;
        self.message = Some(message.into());
        Ok(self)
    }

    pub fn source(&mut self, source: impl Into<String>) -> Result<&mut Self, BuilderError> {
        self.check_owner()?;
        self.source = Some(source.into());
        Ok(self)
    }

    pub fn timestamp(&mut self, timestamp: DateTime<Utc>) -> Result<&mut Self, BuilderError> {
        self.check_owner()?;
        self.timestamp = Some(timestamp);
        Ok(self)
    }

    pub fn level(&mut self, level: Level) -> Result<&mut Self, BuilderError> {
        self.check_owner()?;
        self.level = Some(level);
        Ok(self)
    }

    pub fn input(&mut self, input: impl Into<String>) -> Result<&mut Self, BuilderError> {
        self.check_owner()?;
        self.input = Some(input.into());
        Ok(self)
    }

    pub fn outputs(&mut self, outputs: HashSet<String>) -> Result<&mut Self, BuilderError> {
        self.check_owner()?;
        self.outputs = Some(outputs);
        Ok(self)
    }

    pub fn fields(&mut self, fields: MessageFields) -> Result<&mut Self, BuilderError> {
        self.check_owner()?;
        self.fields = fields;
        Ok(self)
    }

    pub fn add_field(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<&mut Self, BuilderError> {
        self.check_owner()?;
        self.fields.put(key, value);
        Ok(self)
    }

    /// Returns a new builder with the same field state whose owner is
    /// rebound to the calling thread.
    pub fn copy(&self) -> MessageBuilder {
        let mut copy = self.clone();
        copy.owner = thread::current().id();
        copy
    }

    /// Validates that all required fields are set and returns an immutable
    /// message snapshot. Fails naming the first missing field.
    pub fn build(&self) -> Result<Message, BuilderError> {
        let message = self
            .message
            .clone()
            .ok_or(BuilderError::MissingField("message"))?;
        let source = self
            .source
            .clone()
            .ok_or(BuilderError::MissingField("source"))?;
        let timestamp = self
            .timestamp
            .ok_or(BuilderError::MissingField("timestamp"))?;
        let input = self
            .input
            .clone()
            .ok_or(BuilderError::MissingField("input"))?;
        let outputs = self
            .outputs
            .clone()
            .ok_or(BuilderError::MissingField("outputs"))?;

        Ok(Message::from_parts(
            message,
            source,
            timestamp,
            self.level,
            input,
            outputs,
            self.fields.clone(),
        ))
    }
}
