use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

/// Kinds of AI request a chat can have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Notes,
    Quiz,
    Feedback,
    Performance,
}

/// Pending flags: at most one request per (chat, action) at a time.
#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: Mutex<HashSet<(i64, Action)>>,
}

impl SingleFlight {
    /// `None` while the same request is still running. The flag clears
    /// when the returned guard is dropped.
    pub fn begin(self: &Arc<Self>, chat: i64, action: Action) -> Option<PendingGuard> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((chat, action));
        inserted.then(|| PendingGuard {
            registry: Arc::clone(self),
            key: (chat, action),
        })
    }

    #[cfg(test)]
    pub fn is_pending(&self, chat: i64, action: Action) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(chat, action))
    }
}

#[must_use = "the request counts as pending only while the guard is alive"]
pub struct PendingGuard {
    registry: Arc<SingleFlight>,
    key: (i64, Action),
}

impl PendingGuard {
    /// Runs `work` on its own task, keeping the request pending until it
    /// finishes. Later updates from the chat are handled in the meantime.
    pub fn spawn<F>(self, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            work.await;
            drop(self);
        })
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.registry
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
