// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A global error notification raised by the host.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorNotification {
    Uncaught {
        message: String,
        stack: Option<String>,
    },
    UnhandledRejection {
        reason: String,
        stack: Option<String>,
    },
}

impl ErrorNotification {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            ErrorNotification::Uncaught { message, .. } => message.clone(),
            ErrorNotification::UnhandledRejection { reason, .. } => {
                format!("Unhandled rejection: {reason}")
            }
        }
    }

    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        match self {
            ErrorNotification::Uncaught { stack, .. }
            | ErrorNotification::UnhandledRejection { stack, .. } => stack.as_deref(),
        }
    }
}

pub type ErrorListener = Arc<dyn Fn(&ErrorNotification) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Registry of global error listeners.
#[derive(Default)]
pub struct ErrorHub {
    listeners: Mutex<Vec<(ListenerId, ErrorListener)>>,
    next_id: AtomicU64,
}

impl ErrorHub {
    pub fn add_listener(&self, listener: ErrorListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Returns whether a listener was removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Notifies every listener. Listeners run outside the registry lock so
    /// they may add or remove listeners themselves.
    pub fn dispatch(&self, notification: &ErrorNotification) {
        let listeners: Vec<ErrorListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(notification);
        }
    }
}

impl std::fmt::Debug for ErrorHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_add_dispatch_remove() {
        let hub = ErrorHub::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = hub.add_listener(Arc::new(move |_: &ErrorNotification| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let notification = ErrorNotification::Uncaught {
            message: "boom".to_string(),
            stack: None,
        };
        hub.dispatch(&notification);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(hub.remove_listener(id));
        assert!(!hub.remove_listener(id));
        hub.dispatch(&notification);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_rejection_message() {
        let notification = ErrorNotification::UnhandledRejection {
            reason: "timeout".to_string(),
            stack: Some("at p".to_string()),
        };
        assert_eq!(notification.message(), "Unhandled rejection: timeout");
        assert_eq!(notification.stack(), Some("at p"));
    }
}
