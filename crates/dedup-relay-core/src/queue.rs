//! Handoff queue between listener stages and the forwarding dispatcher
//!
//! An unbounded FIFO shared by any number of producers and a single consumer.
//! Producers never block on forwarding backpressure; the queue grows instead.
//! There is no depth limit, so a stalled dispatcher turns into memory growth.
//!
//! The consumer suspends in [`HandoffQueue::pop`] until a push or
//! [`HandoffQueue::close`] wakes it. `pop` only returns `None` once the queue
//! is closed *and* empty, which gives the dispatcher its drain-then-stop loop.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::errors::QueueError;
use crate::message::Message;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Message>,
    closed: bool,
}

/// FIFO of messages awaiting forwarding
#[derive(Debug, Default)]
pub struct HandoffQueue {
    state: Mutex<QueueState>,
    available: Notify,
}

impl HandoffQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and wake the consumer
    pub fn push(&self, message: Message) -> Result<(), QueueError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::Closed(message));
            }
            state.items.push_back(message);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Wait for the next message. Returns `None` once closed and drained.
    pub async fn pop(&self) -> Option<Message> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking state so a close() in between is not missed
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(message) = state.items.pop_front() {
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Take the next message without waiting
    pub fn try_pop(&self) -> Option<Message> {
        self.lock().items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Refuse further pushes and wake the consumer so it can drain and stop
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
        self.available.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Drop everything still queued, returning how many messages were discarded
    pub fn discard_remaining(&self) -> usize {
        let mut state = self.lock();
        let count = state.items.len();
        state.items.clear();
        count
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
