use crate::message::Message;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error, PartialEq)]
#[error("message buffer is closed")]
pub struct BufferClosed;

/// Bounded FIFO queue of messages between inputs and the dispatch stage.
///
/// `push` suspends while the buffer is full and `pop` suspends while it is
/// empty, so a slow consumer throttles all producers sharing the buffer.
/// After [`MessageBuffer::close`], further pushes fail immediately while
/// `pop` keeps draining already-queued messages before returning `None`.
///
/// Clones share the same queue; this is the single approved channel for
/// moving a built [`Message`] across task boundaries.
#[derive(Clone)]
pub struct MessageBuffer {
    shared: Arc<Shared>,
}

struct Shared {
    capacity: usize,
    state: Mutex<State>,
    not_empty: Notify,
    not_full: Notify,
}

struct State {
    queue: VecDeque<Message>,
    closed: bool,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be at least 1");
        Self {
            shared: Arc::new(Shared {
                capacity,
                state: Mutex::new(State {
                    queue: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                not_empty: Notify::new(),
                not_full: Notify::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().expect("buffer lock poisoned").queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues a message, waiting for space if the buffer is full.
    pub async fn push(&self, message: Message) -> Result<(), BufferClosed> {
        let mut message = Some(message);
        loop {
            let notified = self.shared.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.shared.state.lock().expect("buffer lock poisoned");
                if state.closed {
                    return Err(BufferClosed);
                }
                if state.queue.len() < self.shared.capacity {
                    state.queue.push_back(message.take().expect("message consumed"));
                    self.shared.not_empty.notify_one();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Dequeues the oldest message, waiting for one if the buffer is empty.
    /// Returns `None` once the buffer is closed and fully drained.
    pub async fn pop(&self) -> Option<Message> {
        loop {
            let notified = self.shared.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.shared.state.lock().expect("buffer lock poisoned");
                if let Some(message) = state.queue.pop_front() {
                    self.shared.not_full.notify_one();
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Closes the buffer for producers. Queued messages remain poppable.
    pub fn close(&self) {
        let mut state = self.shared.state.lock().expect("buffer lock poisoned");
        state.closed = true;
        drop(state);
        self.shared.not_empty.notify_waiters();
        self.shared.not_full.notify_waiters();
    }
}
