//! In-process session event bus.
//!
//! Delivery is synchronous, in registration order, with no buffering: a
//! subscriber only sees events published after it subscribed, so it must read
//! the credential store for its initial state. A panicking handler is logged
//! and skipped; the remaining handlers still run.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

/// Why the stored credential was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// Explicit logout
    Logout,
    /// The renewal endpoint refused the renewal token
    RenewalRejected,
    /// Found locally expired on activation
    Expired,
}

/// Events published on the session bus.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CredentialRenewed { access_token: String },
    CredentialCleared { reason: ClearReason },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::CredentialRenewed { .. } => "credential_renewed",
            SessionEvent::CredentialCleared { .. } => "credential_cleared",
        }
    }
}

// Tokens stay out of logs
impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::CredentialRenewed { .. } => f
                .debug_struct("CredentialRenewed")
                .field("access_token", &"<redacted>")
                .finish(),
            SessionEvent::CredentialCleared { reason } => f
                .debug_struct("CredentialCleared")
                .field("reason", reason)
                .finish(),
        }
    }
}

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    handlers: Mutex<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, id: u64) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }
}

/// Typed publish/subscribe channel for session events.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct SessionEventBus {
    inner: Arc<BusInner>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    #[must_use = "dropping the Subscription unsubscribes the handler"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: Handler = Arc::new(handler);
        self.inner.handlers.lock().push((id, handler));
        debug!(subscription_id = id, "Session event subscriber added");

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every current subscriber. Returns how many handlers
    /// completed without panicking.
    pub fn publish(&self, event: &SessionEvent) -> usize {
        // Snapshot so handlers may subscribe or unsubscribe while we deliver
        let handlers: Vec<(u64, Handler)> = self.inner.handlers.lock().clone();

        debug!(
            event = event.name(),
            subscribers = handlers.len(),
            "Publishing session event"
        );

        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    error!(
                        subscription_id = id,
                        event = event.name(),
                        "Session event handler panicked"
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.lock().len()
    }
}

/// Handle to a registered handler. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the handler now.
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove(self.id) {
                debug!(subscription_id = self.id, "Session event subscriber removed");
            }
        }
    }
}
