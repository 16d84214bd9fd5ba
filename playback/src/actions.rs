//! Work handed to the tick thread from elsewhere.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, ThreadId};

use crate::Manager;

pub type MainThreadAction = Box<dyn FnOnce(&mut Manager) + Send>;

/// FIFO of actions that must run on the thread that owns the [`Manager`].
#[derive(Debug)]
pub struct MainThreadActions {
    tx: Sender<MainThreadAction>,
    rx: Receiver<MainThreadAction>,
    owner: ThreadId,
}

impl MainThreadActions {
    /// The calling thread becomes the owner.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        Self {
            tx,
            rx,
            owner: thread::current().id(),
        }
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    pub fn sender(&self) -> ActionSender {
        ActionSender { tx: self.tx.clone() }
    }

    pub fn push(&self, action: MainThreadAction) {
        // The receiver lives in `self`, so this cannot fail.
        let _ = self.tx.send(action);
    }

    /// Everything queued right now, in order.
    pub fn take_pending(&self) -> Vec<MainThreadAction> {
        self.rx.try_iter().collect()
    }
}

impl Default for MainThreadActions {
    fn default() -> Self {
        Self::new()
    }
}

/// A cloneable handle for queueing actions from any thread.
#[derive(Clone, Debug)]
pub struct ActionSender {
    tx: Sender<MainThreadAction>,
}

impl ActionSender {
    /// Queues `action` for the next tick. Returns `false` once the manager is gone.
    pub fn send<F>(&self, action: F) -> bool
    where
        F: FnOnce(&mut Manager) + Send + 'static,
    {
        self.tx.send(Box::new(action)).is_ok()
    }
}
