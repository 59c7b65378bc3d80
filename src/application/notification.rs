//! Fan-out of domain events to loosely coupled subscribers.
//!
//! The bus keeps only weak references: dropping the last `Arc` of a handler
//! silently unsubscribes it. Every delivery runs on its own tokio task so a
//! slow or failing handler never holds up the publisher or its siblings.

use crate::domain::events::{DomainEvent, EventKind};
use crate::error::NotificationError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &DomainEvent) -> Result<(), NotificationError>;
}

/// Out-of-band destination for handler failures.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: NotificationError);
}

/// Logs handler failures through `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: NotificationError) {
        tracing::error!(handler = %error.handler, reason = %error.reason, "event handler failed");
    }
}

/// Returned by [`NotificationBus::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    kind: EventKind,
}

impl SubscriptionHandle {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct Subscription {
    handle: SubscriptionHandle,
    handler: Weak<dyn EventHandler>,
}

struct Inner {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    idle: Notify,
    sink: Arc<dyn ErrorSink>,
}

/// Cheap to clone; clones share subscribers and in-flight bookkeeping.
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<Inner>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_error_sink(Arc::new(TracingErrorSink))
    }

    pub fn with_error_sink(sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscriptions: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                sink,
            }),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` for one kind of event. The bus does not keep the
    /// handler alive.
    pub fn subscribe(&self, kind: EventKind, handler: &Arc<dyn EventHandler>) -> SubscriptionHandle {
        let handle = SubscriptionHandle {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
        };
        self.subscriptions().push(Subscription {
            handle,
            handler: Arc::downgrade(handler),
        });
        handle
    }

    /// Returns `false` if the handle was already removed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscriptions = self.subscriptions();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.handle != handle);
        subscriptions.len() != before
    }

    /// Live subscribers for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscriptions()
            .iter()
            .filter(|s| s.handle.kind == kind && s.handler.strong_count() > 0)
            .count()
    }

    /// Hands `event` to every live subscriber of its kind, in registration
    /// order, and returns how many deliveries were scheduled. Must be called
    /// from within a tokio runtime.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let mut subscriptions = self.subscriptions();
            subscriptions.retain(|s| s.handler.strong_count() > 0);
            subscriptions
                .iter()
                .filter(|s| s.handle.kind == kind)
                .filter_map(|s| s.handler.upgrade())
                .collect()
        };

        let event = Arc::new(event);
        for handler in &handlers {
            self.deliver(handler.clone(), event.clone());
        }
        tracing::debug!(?kind, deliveries = handlers.len(), "event published");
        handlers.len()
    }

    fn deliver(&self, handler: Arc<dyn EventHandler>, event: Arc<DomainEvent>) {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let name = handler.name().to_string();
            // Inner task so a panicking handler surfaces as a JoinError.
            let outcome = tokio::spawn(async move { handler.handle(&event).await }).await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => inner.sink.report(err),
                Err(join) if join.is_panic() => {
                    inner.sink.report(NotificationError::new(name, "handler panicked"))
                }
                Err(join) => inner.sink.report(NotificationError::new(name, join.to_string())),
            }
            if inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.idle.notify_waiters();
            }
        });
    }

    /// Waits until every delivery scheduled so far has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
