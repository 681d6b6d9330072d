use crate::buffer::MessageBuffer;
use crate::config::types::InputConfig;
use crate::file::naming::NumberSuffixStrategy;
use crate::file::reader_service::{
    FileReaderService, ReaderContext, ReaderFinishListener, ReaderHandle, ReaderServiceError,
};
use crate::file::splitters::NewlineChunkSplitter;
use crate::message::BuilderError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("input '{0}' is already running")]
    AlreadyRunning(String),

    #[error("input '{0}' is not running")]
    NotRunning(String),

    #[error("message template invalid: {0}")]
    Builder(#[from] BuilderError),

    #[error("reader service error: {0}")]
    Reader(#[from] ReaderServiceError),
}

/// A named source of log records bound to a set of output names. The
/// reader side keys record production on it; the dispatch side keys
/// routing on it.
#[async_trait]
pub trait Input: Send + Sync {
    /// Stable identity for the process lifetime of the input.
    fn id(&self) -> &str;

    /// Output names this input's messages are routed to.
    fn outputs(&self) -> &HashSet<String>;

    async fn start(self: Arc<Self>) -> Result<(), InputError>;

    async fn stop(&self) -> Result<(), InputError>;
}

/// An input that tails one file with rotation handling. Owns exactly one
/// reader service while running.
pub struct FileInput {
    id: String,
    config: InputConfig,
    outputs: HashSet<String>,
    buffer: MessageBuffer,
    handle: Mutex<Option<ReaderHandle>>,
}

impl FileInput {
    pub fn new(id: impl Into<String>, config: InputConfig, buffer: MessageBuffer) -> Arc<Self> {
        let outputs = config.outputs.iter().cloned().collect();
        Arc::new(Self {
            id: id.into(),
            config,
            outputs,
            buffer,
            handle: Mutex::new(None),
        })
    }

    /// Byte offset the running reader has consumed up to, if running.
    pub async fn current_offset(&self) -> Option<u64> {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|handle| handle.current_offset())
    }
}

#[async_trait]
impl Input for FileInput {
    fn id(&self) -> &str {
        &self.id
    }

    fn outputs(&self) -> &HashSet<String> {
        &self.outputs
    }

    async fn start(self: Arc<Self>) -> Result<(), InputError> {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            return Err(InputError::AlreadyRunning(self.id.clone()));
        }

        let ctx = ReaderContext {
            input_id: self.id.clone(),
            outputs: self.outputs.clone(),
            naming: Arc::new(NumberSuffixStrategy),
            splitter: Arc::new(NewlineChunkSplitter),
            buffer: self.buffer.clone(),
            listener: Some(Arc::clone(&self) as Arc<dyn ReaderFinishListener>),
        };
        // Not awaited here: the reader may legitimately sit in Opening
        // until the file first appears, and start must not block on that.
        let handle = FileReaderService::start(&self.config, ctx)?;
        info!(
            input = %self.id,
            path = %self.config.path.display(),
            "input started"
        );
        *guard = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), InputError> {
        let handle = self
            .handle
            .lock()
            .await
            .take()
            .ok_or_else(|| InputError::NotRunning(self.id.clone()))?;
        handle.stop().await?;
        info!(input = %self.id, "input stopped");
        Ok(())
    }
}

impl ReaderFinishListener for FileInput {
    fn on_reader_finished(&self, path: &Path, final_offset: u64) {
        debug!(
            input = %self.id,
            path = %path.display(),
            final_offset,
            "chunk reader retired"
        );
    }
}
