use crate::buffer::{BufferClosed, MessageBuffer};
use crate::config::types::{InitialReadPosition, InputConfig, RetryConfig};
use crate::file::chunk_reader::{path_file_id, ChunkReader, ReadOutcome};
use crate::file::naming::RotationNamingStrategy;
use crate::file::splitters::ChunkSplitter;
use crate::message::{BuilderError, MessageBuilder};
use chrono::Utc;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ReaderServiceError {
    #[error("i/o error on '{path}' after {attempts} attempts: {source}")]
    Io {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("message construction failed: {0}")]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    BufferClosed(#[from] BufferClosed),

    #[error("reader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Lifecycle states of a [`FileReaderService`], observable through its
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Opening,
    Tailing,
    DrainingRotated,
    Stopping,
    Stopped,
}

/// Counters shared between a running reader service and its observers.
/// Rotation races that lose data are counted here instead of aborting the
/// service.
#[derive(Debug, Default)]
pub struct ReaderStats {
    records_delivered: AtomicU64,
    rotation_race_losses: AtomicU64,
    io_retries: AtomicU64,
}

impl ReaderStats {
    pub fn records_delivered(&self) -> u64 {
        self.records_delivered.load(Ordering::Relaxed)
    }

    pub fn rotation_race_losses(&self) -> u64 {
        self.rotation_race_losses.load(Ordering::Relaxed)
    }

    pub fn io_retries(&self) -> u64 {
        self.io_retries.load(Ordering::Relaxed)
    }
}

/// Invoked when a chunk reader is fully retired, so the owning layer can
/// track resource cleanup.
pub trait ReaderFinishListener: Send + Sync {
    fn on_reader_finished(&self, path: &Path, final_offset: u64);
}

/// Control handle for a spawned [`FileReaderService`].
pub struct ReaderHandle {
    state_rx: watch::Receiver<ServiceState>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<Result<(), ReaderServiceError>>,
    stats: Arc<ReaderStats>,
    offset: Arc<AtomicU64>,
}

impl ReaderHandle {
    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    /// Waits until the service has left `Opening`.
    pub async fn await_running(&mut self) -> ServiceState {
        let _ = self
            .state_rx
            .wait_for(|state| *state != ServiceState::Opening)
            .await;
        *self.state_rx.borrow()
    }

    /// Byte offset of the last complete-record boundary in the current
    /// file. An external checkpointing collaborator can persist this value
    /// and resume from it without losing a partial record.
    pub fn current_offset(&self) -> u64 {
        self.offset.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> Arc<ReaderStats> {
        Arc::clone(&self.stats)
    }

    /// Signals shutdown and waits for the read loop to finish its current
    /// read and exit.
    pub async fn stop(self) -> Result<(), ReaderServiceError> {
        let _ = self.shutdown_tx.send(true);
        self.task.await?
    }
}

/// Collaborators `FileReaderService::start` needs beyond the input config.
pub struct ReaderContext {
    pub input_id: String,
    pub outputs: HashSet<String>,
    pub naming: Arc<dyn RotationNamingStrategy>,
    pub splitter: Arc<dyn ChunkSplitter>,
    pub buffer: MessageBuffer,
    pub listener: Option<Arc<dyn ReaderFinishListener>>,
}

/// Tails one file, detects rotation, drains rotated-away handles in byte
/// order, and feeds records into the shared buffer as messages.
///
/// State machine: `Opening → Tailing ⇄ DrainingRotated → Stopping →
/// Stopped`, driven on its own tokio task and controlled through watch
/// channels.
pub struct FileReaderService {
    path: PathBuf,
    naming: Arc<dyn RotationNamingStrategy>,
    splitter: Arc<dyn ChunkSplitter>,
    include_rotated: bool,
    initial_position: InitialReadPosition,
    poll_interval: Duration,
    retry: RetryConfig,
    buffer: MessageBuffer,
    template: MessageBuilder,
    listener: Option<Arc<dyn ReaderFinishListener>>,
    state_tx: watch::Sender<ServiceState>,
    shutdown_rx: watch::Receiver<bool>,
    stats: Arc<ReaderStats>,
    offset: Arc<AtomicU64>,
}

impl FileReaderService {
    /// Spawns the read loop and returns its control handle.
    pub fn start(config: &InputConfig, ctx: ReaderContext) -> Result<ReaderHandle, BuilderError> {
        // Template carrying the per-input constants. The read loop runs on
        // other threads and takes `copy()`s, which rebind ownership; direct
        // mutation of the template there would be rejected.
        let mut template = MessageBuilder::new();
        template.input(ctx.input_id)?.outputs(ctx.outputs)?;

        let (state_tx, state_rx) = watch::channel(ServiceState::Opening);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ReaderStats::default());
        let offset = Arc::new(AtomicU64::new(0));

        let service = Self {
            path: config.path.clone(),
            naming: ctx.naming,
            splitter: ctx.splitter,
            include_rotated: config.include_rotated,
            initial_position: config.initial_position,
            poll_interval: config.poll_interval,
            retry: config.retry.clone(),
            buffer: ctx.buffer,
            template,
            listener: ctx.listener,
            state_tx,
            shutdown_rx,
            stats: Arc::clone(&stats),
            offset: Arc::clone(&offset),
        };
        let task = tokio::spawn(service.run());

        Ok(ReaderHandle {
            state_rx,
            shutdown_tx,
            task,
            stats,
            offset,
        })
    }

    async fn run(mut self) -> Result<(), ReaderServiceError> {
        let result = self.run_loop().await;
        if let Err(e) = &result {
            error!(path = %self.path.display(), error = %e, "file reader failed");
        }
        self.set_state(ServiceState::Stopped);
        result
    }

    async fn run_loop(&mut self) -> Result<(), ReaderServiceError> {
        self.set_state(ServiceState::Opening);

        // Pre-existing rotated backlog is logically older than the live
        // file, so it goes first when reading from the start.
        if self.include_rotated && self.initial_position == InitialReadPosition::Start {
            if !self.drain_rotated_backlog().await? {
                self.set_state(ServiceState::Stopping);
                return Ok(());
            }
        }

        let Some(mut reader) = self.open_current(self.initial_position).await? else {
            self.set_state(ServiceState::Stopping);
            return Ok(());
        };
        self.set_state(ServiceState::Tailing);

        let mut attempts = 0u32;
        let mut backoff = self.retry.initial_backoff;

        while !self.shutdown_requested() {
            match reader.read_next() {
                Ok(ReadOutcome::Records(records)) => {
                    attempts = 0;
                    backoff = self.retry.initial_backoff;
                    // Checkpointable boundary only: the partial tail is not
                    // delivered yet, so its bytes must stay re-readable.
                    self.offset
                        .store(reader.delivered_offset(), Ordering::Relaxed);
                    let source = reader.path().display().to_string();
                    if !self.deliver(records, &source).await? {
                        break;
                    }
                }
                Ok(ReadOutcome::Eof) => {
                    attempts = 0;
                    backoff = self.retry.initial_backoff;
                    if !self.sleep_poll(self.poll_interval).await {
                        break;
                    }
                }
                Ok(ReadOutcome::RotatedAway) => {
                    info!(path = %self.path.display(), "rotation detected");
                    let old_file_id = reader.file_id();
                    if self.include_rotated {
                        self.set_state(ServiceState::DrainingRotated);
                        if !self.drain_reader(reader).await? {
                            self.set_state(ServiceState::Stopping);
                            return Ok(());
                        }
                        if !self.catch_up_missed_rotations(old_file_id).await? {
                            self.set_state(ServiceState::Stopping);
                            return Ok(());
                        }
                    } else {
                        self.retire(&reader);
                    }

                    let Some(next) = self.open_current(InitialReadPosition::Start).await? else {
                        self.set_state(ServiceState::Stopping);
                        return Ok(());
                    };
                    reader = next;
                    self.set_state(ServiceState::Tailing);
                }
                Err(e) => {
                    // The unsplit tail stays inside the reader, so a retry
                    // against the same handle loses nothing.
                    attempts += 1;
                    self.stats.io_retries.fetch_add(1, Ordering::Relaxed);
                    if attempts >= self.retry.max_attempts {
                        return Err(ReaderServiceError::Io {
                            path: self.path.clone(),
                            attempts,
                            source: e,
                        });
                    }
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "read error, backing off"
                    );
                    if !self.sleep_poll(backoff).await {
                        break;
                    }
                    backoff = (backoff * 2).min(self.retry.max_backoff);
                }
            }
        }

        // Current read has completed; the incomplete trailing tail of the
        // live file is discarded, it never formed a record.
        self.set_state(ServiceState::Stopping);
        if reader.pending_len() > 0 {
            debug!(
                path = %self.path.display(),
                pending_bytes = reader.pending_len(),
                "discarding incomplete trailing record at shutdown"
            );
        }
        self.retire(&reader);
        Ok(())
    }

    fn set_state(&self, state: ServiceState) {
        debug!(path = %self.path.display(), state = ?state, "reader state change");
        let _ = self.state_tx.send(state);
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Sleeps for `duration`, returning false if shutdown was signalled
    /// first.
    async fn sleep_poll(&self, duration: Duration) -> bool {
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = shutdown_rx.wait_for(|stop| *stop) => false,
        }
    }

    /// Opens the live path, retrying while it does not exist and backing
    /// off on other errors within the retry budget. Returns `None` when
    /// shutdown was signalled while waiting.
    async fn open_current(
        &self,
        position: InitialReadPosition,
    ) -> Result<Option<ChunkReader>, ReaderServiceError> {
        let mut attempts = 0u32;
        let mut backoff = self.retry.initial_backoff;
        loop {
            if self.shutdown_requested() {
                return Ok(None);
            }
            match ChunkReader::open(&self.path, Arc::clone(&self.splitter), position) {
                Ok(reader) => {
                    debug!(
                        path = %self.path.display(),
                        offset = reader.offset(),
                        "opened file"
                    );
                    self.offset
                        .store(reader.delivered_offset(), Ordering::Relaxed);
                    return Ok(Some(reader));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // The file may simply not have been created yet.
                    if !self.sleep_poll(self.poll_interval).await {
                        return Ok(None);
                    }
                }
                Err(e) => {
                    attempts += 1;
                    self.stats.io_retries.fetch_add(1, Ordering::Relaxed);
                    if attempts >= self.retry.max_attempts {
                        return Err(ReaderServiceError::Io {
                            path: self.path.clone(),
                            attempts,
                            source: e,
                        });
                    }
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        attempt = attempts,
                        "open failed, backing off"
                    );
                    if !self.sleep_poll(backoff).await {
                        return Ok(None);
                    }
                    backoff = (backoff * 2).min(self.retry.max_backoff);
                }
            }
        }
    }

    /// Builds messages for `records` and pushes them into the buffer.
    /// Returns false if shutdown interrupted a blocked push; records not
    /// yet pushed are dropped at that point.
    async fn deliver(
        &self,
        records: Vec<Vec<u8>>,
        source: &str,
    ) -> Result<bool, ReaderServiceError> {
        for record in records {
            let text = String::from_utf8_lossy(&record).into_owned();
            let mut builder = self.template.copy();
            builder
                .message(text)?
                .source(source)?
                .timestamp(Utc::now())?;
            let message = builder.build()?;

            let mut shutdown_rx = self.shutdown_rx.clone();
            tokio::select! {
                result = self.buffer.push(message) => {
                    result?;
                    self.stats.records_delivered.fetch_add(1, Ordering::Relaxed);
                }
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Drains a detached reader to its final EOF and retires it. Read
    /// errors on the dead file are counted as data loss, not escalated.
    async fn drain_reader(&self, mut reader: ChunkReader) -> Result<bool, ReaderServiceError> {
        reader.detach();
        let source = reader.path().display().to_string();
        loop {
            match reader.read_next() {
                Ok(ReadOutcome::Records(records)) => {
                    if !self.deliver(records, &source).await? {
                        // Shutdown interrupted the drain; the handle is
                        // still done for and must be reported as finished.
                        self.retire(&reader);
                        return Ok(false);
                    }
                }
                Ok(ReadOutcome::Eof) | Ok(ReadOutcome::RotatedAway) => break,
                Err(e) => {
                    self.stats
                        .rotation_race_losses
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        path = %source,
                        error = %e,
                        "rotated file unreadable before fully drained, content lost"
                    );
                    break;
                }
            }
        }
        self.retire(&reader);
        Ok(true)
    }

    /// After draining the rotated-away handle, drains any intermediate
    /// rotations that happened between two poll cycles. Candidates newer
    /// than the drained handle (located by file identity) hold content
    /// that precedes anything in the new live file.
    async fn catch_up_missed_rotations(
        &self,
        old_file_id: u64,
    ) -> Result<bool, ReaderServiceError> {
        let candidates = self.naming.rotated_candidates(&self.path);
        if candidates.is_empty() {
            // Truncate-in-place rotation leaves no siblings behind.
            return Ok(true);
        }

        let mut newer: Vec<PathBuf> = Vec::new();
        let mut matched = false;
        for candidate in candidates {
            if matched {
                newer.push(candidate);
                continue;
            }
            if path_file_id(&candidate).ok() == Some(old_file_id) {
                matched = true;
            }
        }

        if !matched {
            // The drained file is already gone from the rotation window; we
            // cannot tell which intermediates were missed.
            self.stats
                .rotation_race_losses
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                path = %self.path.display(),
                "rotated file vanished from rotation window, possible data loss"
            );
            return Ok(true);
        }

        for candidate in newer {
            info!(path = %candidate.display(), "draining missed intermediate rotation");
            match ChunkReader::open(
                &candidate,
                Arc::clone(&self.splitter),
                InitialReadPosition::Start,
            ) {
                Ok(reader) => {
                    if !self.drain_reader(reader).await? {
                        return Ok(false);
                    }
                }
                Err(e) => {
                    self.stats
                        .rotation_race_losses
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        path = %candidate.display(),
                        error = %e,
                        "intermediate rotated file vanished before it could be drained"
                    );
                }
            }
        }
        Ok(true)
    }

    /// Drains all pre-existing rotated siblings, oldest first, before the
    /// live file is opened.
    async fn drain_rotated_backlog(&self) -> Result<bool, ReaderServiceError> {
        for candidate in self.naming.rotated_candidates(&self.path) {
            info!(path = %candidate.display(), "draining rotated backlog");
            match ChunkReader::open(
                &candidate,
                Arc::clone(&self.splitter),
                InitialReadPosition::Start,
            ) {
                Ok(reader) => {
                    if !self.drain_reader(reader).await? {
                        return Ok(false);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // Cleaned up between listing and opening; absent, not
                    // an error.
                    continue;
                }
                Err(e) => {
                    self.stats
                        .rotation_race_losses
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        path = %candidate.display(),
                        error = %e,
                        "rotated backlog file unreadable, skipping"
                    );
                }
            }
        }
        Ok(true)
    }

    fn retire(&self, reader: &ChunkReader) {
        let final_offset = reader.delivered_offset();
        debug!(
            path = %reader.path().display(),
            final_offset,
            "chunk reader retired"
        );
        if let Some(listener) = &self.listener {
            listener.on_reader_finished(reader.path(), final_offset);
        }
    }
}
