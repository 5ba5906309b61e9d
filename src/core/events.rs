//! Event dispatch for received lines and connection status
//!
//! Line events go to a single observer slot: registering a new observer
//! replaces the previous one. Connection status changes go to every
//! registered listener, in registration order.

use parking_lot::RwLock;
use std::sync::Arc;

type LineObserver = Arc<dyn Fn(&str) + Send + Sync>;
type ConnectionListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Holds the line observer and the connection listeners
#[derive(Default)]
pub struct EventDispatcher {
    line_observer: RwLock<Option<LineObserver>>,
    connection_listeners: RwLock<Vec<ConnectionListener>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the line observer, replacing any previous one
    pub fn on_receive<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.line_observer.write() = Some(Arc::new(callback));
    }

    /// Append a connection listener
    pub fn on_connection_change<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.connection_listeners.write().push(Arc::new(callback));
    }

    /// Deliver one line to the observer, if any
    pub fn dispatch_line(&self, line: &str) {
        // Clone out of the lock so the observer may re-register itself.
        let observer = self.line_observer.read().clone();
        if let Some(observer) = observer {
            observer(line);
        }
    }

    /// Notify every connection listener of the new status
    pub fn dispatch_connection(&self, connected: bool) {
        let listeners = self.connection_listeners.read().clone();
        for listener in &listeners {
            listener(connected);
        }
    }

    /// Whether a line observer is installed
    pub fn has_line_observer(&self) -> bool {
        self.line_observer.read().is_some()
    }

    /// Number of connection listeners
    pub fn listener_count(&self) -> usize {
        self.connection_listeners.read().len()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("line_observer", &self.has_line_observer())
            .field("connection_listeners", &self.listener_count())
            .finish()
    }
}
