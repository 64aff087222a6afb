#![forbid(unsafe_code)]

//! Ready-block notifier.
//!
//! A decoder owns one [`ReadyBlocks`] registry. The completion bridge marks
//! blocks as they are reconstructed and every registered queue learns about
//! each block exactly once, including blocks that became ready before the
//! queue subscribed.
//!
//! Queues are bounded tokio channels with an explicit close signal: a receiver
//! whose queue has been closed by [`ReadyBlocks::reset`] yields `None` even if
//! values are still buffered.

use crate::{Error, Result};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Create a ready-block queue holding at most `capacity` undelivered block numbers.
///
/// A capacity of zero is treated as one.
pub fn ready_block_channel(capacity: usize) -> (ReadyBlockSender, ReadyBlockReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let closed = CancellationToken::new();
    (
        ReadyBlockSender { tx, closed: closed.clone() },
        ReadyBlockReceiver { rx, closed },
    )
}

/// Sending half of a ready-block queue. Clones refer to the same queue.
#[derive(Debug, Clone)]
pub struct ReadyBlockSender {
    tx: mpsc::Sender<u8>,
    closed: CancellationToken,
}

impl ReadyBlockSender {
    /// Identity comparison: true when both senders feed the same queue.
    pub fn same_queue(&self, other: &ReadyBlockSender) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Close the queue. Pending and future deliveries are dropped.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// True once closed or once the receiver is gone.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Wait for queue space and send `sbn`, unless the queue closes first.
    async fn deliver(&self, sbn: u8) {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => trace!(sbn, "queue closed, delivery dropped"),
            res = self.tx.send(sbn) => {
                if res.is_err() {
                    trace!(sbn, "receiver gone, delivery dropped");
                }
            }
        }
    }
}

/// Receiving half of a ready-block queue.
#[derive(Debug)]
pub struct ReadyBlockReceiver {
    rx: mpsc::Receiver<u8>,
    closed: CancellationToken,
}

impl ReadyBlockReceiver {
    /// Next ready block number, or `None` once the queue is closed.
    pub async fn recv(&mut self) -> Option<u8> {
        if self.closed.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            sbn = self.rx.recv() => sbn,
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<u8> {
        if self.closed.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// True once the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[derive(Debug)]
struct State {
    ready: Vec<bool>,
    subscribers: Vec<ReadyBlockSender>,
}

/// Registry of ready flags and subscriber queues for one decoder.
#[derive(Debug)]
pub struct ReadyBlocks {
    state: Mutex<State>,
    runtime: Handle,
}

impl ReadyBlocks {
    /// `num_blocks` all-false flags. Deliveries are spawned on `runtime`.
    pub fn new(num_blocks: u8, runtime: Handle) -> Self {
        Self {
            state: Mutex::new(State {
                ready: vec![false; usize::from(num_blocks)],
                subscribers: Vec::new(),
            }),
            runtime,
        }
    }

    /// Close every registered queue and start over with `num_blocks` clear flags.
    pub fn reset(&self, num_blocks: u8) {
        let mut state = self.state.lock();
        for queue in state.subscribers.drain(..) {
            queue.close();
        }
        state.ready = vec![false; usize::from(num_blocks)];
    }

    /// Register `queue` and replay every block that is already ready.
    pub fn add_subscriber(&self, queue: &ReadyBlockSender) -> Result<()> {
        let mut state = self.state.lock();
        if state.subscribers.iter().any(|q| q.same_queue(queue)) {
            return Err(Error::AlreadyRegistered);
        }
        state.subscribers.push(queue.clone());

        let backlog: Vec<u8> = state
            .ready
            .iter()
            .enumerate()
            .filter(|(_, ready)| **ready)
            .map(|(sbn, _)| sbn as u8)
            .collect();
        if !backlog.is_empty() {
            let queue = queue.clone();
            self.runtime.spawn(async move {
                for sbn in backlog {
                    if queue.is_closed() {
                        break;
                    }
                    queue.deliver(sbn).await;
                }
            });
        }
        Ok(())
    }

    /// Unregister `queue` without closing it.
    pub fn remove_subscriber(&self, queue: &ReadyBlockSender) -> Result<()> {
        let mut state = self.state.lock();
        let pos = state
            .subscribers
            .iter()
            .position(|q| q.same_queue(queue))
            .ok_or(Error::NotRegistered)?;
        state.subscribers.swap_remove(pos);
        Ok(())
    }

    /// Flag `sbn` as ready and notify subscribers. Returns `false` if it already was.
    pub fn mark_ready(&self, sbn: u8) -> Result<bool> {
        let mut state = self.state.lock();
        let num_blocks = state.ready.len();
        let flag = state
            .ready
            .get_mut(usize::from(sbn))
            .ok_or(Error::BlockOutOfRange { sbn, num_blocks: num_blocks as u8 })?;
        if *flag {
            return Ok(false);
        }
        *flag = true;
        for queue in &state.subscribers {
            let queue = queue.clone();
            self.runtime.spawn(async move { queue.deliver(sbn).await });
        }
        Ok(true)
    }

    /// Whether `sbn` has been marked; false when out of range.
    pub fn is_ready(&self, sbn: u8) -> bool {
        self.state.lock().ready.get(usize::from(sbn)).copied().unwrap_or(false)
    }

    /// Ready block numbers in ascending order.
    pub fn ready_blocks(&self) -> Vec<u8> {
        let state = self.state.lock();
        state
            .ready
            .iter()
            .enumerate()
            .filter(|(_, ready)| **ready)
            .map(|(sbn, _)| sbn as u8)
            .collect()
    }

    /// Number of blocks tracked.
    pub fn num_blocks(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Number of registered queues.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}
