//! Submission queue and completion signalling
//!
//! Producers push under a mutex and signal one waiter; workers park on the
//! condition variable until an order is available (and the engine is
//! running) or shutdown is requested. Completion handles are single-shot:
//! the worker resolves each exactly once, including drained submissions at
//! shutdown.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::orderbook::Order;

/// A queued order paired with its completion sender.
pub(crate) struct Submission {
    pub order: Order,
    pub completion: CompletionSender,
}

/// Single-shot handle resolved once the submitted order has been processed.
///
/// Resolves to `true` when the book accepted the order, `false` for invalid
/// orders, submissions after `stop`, and orders drained at shutdown.
pub struct CompletionHandle {
    rx: Receiver<bool>,
}

impl CompletionHandle {
    /// Block until the outcome is available, consuming the handle.
    pub fn wait(self) -> bool {
        self.rx.recv().unwrap_or(false)
    }
}

pub(crate) struct CompletionSender {
    tx: Sender<bool>,
}

impl CompletionSender {
    pub fn resolve(self, accepted: bool) {
        let _ = self.tx.send(accepted);
    }
}

pub(crate) fn completion_pair() -> (CompletionSender, CompletionHandle) {
    let (tx, rx) = bounded(1);
    (CompletionSender { tx }, CompletionHandle { rx })
}

/// Unbounded multi-producer FIFO of pending submissions.
pub(crate) struct SubmissionQueue {
    queue: Mutex<VecDeque<Submission>>,
    available: Condvar,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, submission: Submission) {
        self.queue.lock().push_back(submission);
        self.available.notify_one();
    }

    /// Block until a submission can be dequeued. Returns `None` once
    /// `stopped` is observed, which is the worker's exit signal. Orders
    /// enqueued before `start` wait here until `running` flips.
    pub fn pop_wait(&self, running: &AtomicBool, stopped: &AtomicBool) -> Option<Submission> {
        let mut queue = self.queue.lock();
        loop {
            if stopped.load(Ordering::Acquire) {
                return None;
            }
            if running.load(Ordering::Acquire) {
                if let Some(submission) = queue.pop_front() {
                    return Some(submission);
                }
            }
            self.available.wait(&mut queue);
        }
    }

    /// Remove and return everything still pending.
    pub fn drain(&self) -> Vec<Submission> {
        self.queue.lock().drain(..).collect()
    }

    pub fn notify_all(&self) {
        self.available.notify_all();
    }
}
