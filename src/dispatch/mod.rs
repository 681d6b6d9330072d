use crate::buffer::MessageBuffer;
use crate::message::Message;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A named sink for dispatched messages.
#[async_trait]
pub trait Output: Send + Sync {
    fn name(&self) -> &str;

    async fn write(&self, message: &Message) -> Result<(), OutputError>;
}

/// Writes each message as one JSON line to standard output.
pub struct StdoutOutput {
    name: String,
}

impl StdoutOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Output for StdoutOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, message: &Message) -> Result<(), OutputError> {
        let line = serde_json::to_string(message)?;
        println!("{}", line);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    pub unroutable: u64,
}

/// Drains the buffer and routes every message to the outputs it names.
///
/// Runs until the buffer is closed and fully drained. Unknown output names
/// are counted and warned about once per name; write failures are logged
/// and do not stop the dispatcher.
pub async fn run_dispatcher(
    buffer: MessageBuffer,
    outputs: HashMap<String, Arc<dyn Output>>,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    let mut unknown_warned: HashSet<String> = HashSet::new();

    info!(outputs = outputs.len(), "dispatcher started");

    while let Some(message) = buffer.pop().await {
        for name in message.outputs() {
            match outputs.get(name) {
                Some(output) => match output.write(&message).await {
                    Ok(()) => {
                        stats.delivered += 1;
                        debug!(
                            input = %message.input(),
                            output = %name,
                            "message dispatched"
                        );
                    }
                    Err(e) => {
                        stats.failed += 1;
                        error!(output = %name, error = %e, "output write failed");
                    }
                },
                None => {
                    stats.unroutable += 1;
                    if unknown_warned.insert(name.clone()) {
                        warn!(output = %name, "message routed to unknown output");
                    }
                }
            }
        }
    }

    info!(
        delivered = stats.delivered,
        failed = stats.failed,
        unroutable = stats.unroutable,
        "dispatcher drained and stopped"
    );
    stats
}
