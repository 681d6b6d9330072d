pub mod builder;

pub use builder::{BuilderError, MessageBuilder};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Severity of a log message, loosely following syslog levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

/// A single structured field value attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Open key-value map of additional message fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageFields(HashMap<String, FieldValue>);

impl MessageFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<String, FieldValue> {
        &self.0
    }
}

/// An immutable log record as it travels from an input to the dispatch stage.
///
/// Built exactly once via [`MessageBuilder::build`]; later mutation of the
/// builder never affects an already built message.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    message: String,
    source: String,
    timestamp: DateTime<Utc>,
    level: Option<Level>,
    input: String,
    outputs: HashSet<String>,
    fields: MessageFields,
}

impl Message {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Option<Level> {
        self.level
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn outputs(&self) -> &HashSet<String> {
        &self.outputs
    }

    pub fn fields(&self) -> &MessageFields {
        &self.fields
    }

    pub(crate) fn from_parts(
        message: String,
        source: String,
        timestamp: DateTime<Utc>,
        level: Option<Level>,
        input: String,
        outputs: HashSet<String>,
        fields: MessageFields,
    ) -> Self {
        Self {
            message,
            source,
            timestamp,
            level,
            input,
            outputs,
            fields,
        }
    }
}
