//! Building blocks for scripted test doubles.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared, ordered record of calls made against a test double.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Record one call.
    pub fn record(&self, call: impl Into<String>) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.into());
    }

    /// Snapshot of every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls whose label starts with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

/// Per-key queues of scripted replies; the last reply for a key repeats once
/// its queue drains to one element.
#[derive(Debug)]
pub struct ScriptedReplies<T> {
    replies: Mutex<HashMap<String, VecDeque<T>>>,
}

impl<T> Default for ScriptedReplies<T> {
    fn default() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> ScriptedReplies<T> {
    /// Queue `reply` for `key`.
    pub fn push(&self, key: impl Into<String>, reply: T) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.into())
            .or_default()
            .push_back(reply);
    }

    /// Next reply for `key`, or `None` if nothing was scripted.
    #[must_use]
    pub fn next(&self, key: &str) -> Option<T> {
        let mut replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = replies.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}
