//! Domain events and in-process fan-out dispatch.
//!
//! A [`DomainEvent`] is an immutable fact describing a completed mutation,
//! emitted strictly after the mutation commits and delivered to every handler
//! registered for its kind. Delivery is concurrent and best-effort within one
//! process lifetime: events are not persisted, handlers are not retried, and
//! a handler failure surfaces to the emitter without rolling anything back.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::scheduling::domain::{JobId, TechnicianId, VisitId};

/// Closed set of event kinds, labeled with the dot-namespaced names used for
/// registration and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    #[serde(rename = "visit.scheduled")]
    VisitScheduled,
    #[serde(rename = "visit.completed")]
    VisitCompleted,
    #[serde(rename = "account.created")]
    AccountCreated,
    #[serde(rename = "account.status_changed")]
    AccountStatusChanged,
    #[serde(rename = "diagnostic")]
    Diagnostic,
}

impl EventKind {
    pub const fn label(self) -> &'static str {
        match self {
            EventKind::VisitScheduled => "visit.scheduled",
            EventKind::VisitCompleted => "visit.completed",
            EventKind::AccountCreated => "account.created",
            EventKind::AccountStatusChanged => "account.status_changed",
            EventKind::Diagnostic => "diagnostic",
        }
    }
}

/// Event-specific payloads. Each core event carries a fixed shape; the
/// `Diagnostic` variant is the escape hatch for ad-hoc observability events
/// and must not be used for the enumerated domain events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    VisitScheduled {
        job_id: JobId,
        technician_id: TechnicianId,
        visit_id: VisitId,
    },
    VisitCompleted {
        visit_id: VisitId,
    },
    AccountCreated {
        account_id: String,
    },
    AccountStatusChanged {
        account_id: String,
        status: String,
    },
    Diagnostic {
        name: String,
        data: serde_json::Value,
    },
}

impl EventPayload {
    pub const fn kind(&self) -> EventKind {
        match self {
            EventPayload::VisitScheduled { .. } => EventKind::VisitScheduled,
            EventPayload::VisitCompleted { .. } => EventKind::VisitCompleted,
            EventPayload::AccountCreated { .. } => EventKind::AccountCreated,
            EventPayload::AccountStatusChanged { .. } => EventKind::AccountStatusChanged,
            EventPayload::Diagnostic { .. } => EventKind::Diagnostic,
        }
    }
}

/// Immutable record of a completed state change.
#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub context: RequestContext,
    pub payload: EventPayload,
}

/// Error raised by an individual event handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
}

/// Failure of an `emit` call. The triggering mutation has already committed;
/// this only signals that downstream propagation is incomplete.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("handler for {kind} failed: {message}")]
    HandlerFailed { kind: &'static str, message: String },
}

/// Hook implemented by external modules interested in an event kind.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}

/// Registry of handlers keyed by event kind.
///
/// Constructed explicitly by the service-wiring layer and injected into every
/// service that emits events; there is no process-global registry. Handlers
/// are registered up front, before the dispatcher is shared.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind`. Handlers for the same kind run in no
    /// guaranteed order.
    pub fn on(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Build a [`DomainEvent`] from `payload` and deliver it to every handler
    /// registered for its kind, all started concurrently. Every handler runs
    /// to completion even when a sibling fails; the emit then reports the
    /// first failure. An unregistered kind delivers to zero handlers and
    /// succeeds trivially.
    pub async fn emit(
        &self,
        ctx: &RequestContext,
        payload: EventPayload,
    ) -> Result<(), DispatchError> {
        let kind = payload.kind();
        let event = DomainEvent {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            context: ctx.clone(),
            payload,
        };

        let handlers = match self.handlers.get(&kind) {
            Some(handlers) => handlers,
            None => return Ok(()),
        };

        tracing::debug!(
            request_id = %ctx.request_id,
            event = kind.label(),
            handlers = handlers.len(),
            "dispatching domain event"
        );

        let results = join_all(handlers.iter().map(|handler| handler.handle(&event))).await;
        match results.into_iter().find_map(Result::err) {
            None => Ok(()),
            Some(source) => Err(DispatchError::HandlerFailed {
                kind: kind.label(),
                message: source.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<(&'static str, usize)> = self
            .handlers
            .iter()
            .map(|(kind, handlers)| (kind.label(), handlers.len()))
            .collect();
        counts.sort_unstable();
        f.debug_struct("EventDispatcher")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::authz::Role;
    use crate::context::Source;

    fn ctx() -> RequestContext {
        RequestContext::new("user-1", Role::Admin, Source::Api, None)
    }

    fn completed_payload() -> EventPayload {
        EventPayload::VisitCompleted {
            visit_id: VisitId::new(),
        }
    }

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &DomainEvent) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait::async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &DomainEvent) -> Result<(), HandlerError> {
            Err(HandlerError::Failed("webhook endpoint unreachable".into()))
        }
    }

    #[derive(Default)]
    struct SlowCountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EventHandler for SlowCountingHandler {
        async fn handle(&self, _event: &DomainEvent) -> Result<(), HandlerError> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn emit_invokes_every_registered_handler_exactly_once() {
        let mut dispatcher = EventDispatcher::new();
        let handlers: Vec<Arc<CountingHandler>> = (0..3)
            .map(|_| Arc::new(CountingHandler::default()))
            .collect();
        for handler in &handlers {
            dispatcher.on(EventKind::VisitCompleted, handler.clone());
        }

        dispatcher
            .emit(&ctx(), completed_payload())
            .await
            .expect("dispatch succeeds");

        for handler in &handlers {
            assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn unregistered_kind_delivers_to_zero_handlers_and_succeeds() {
        let dispatcher = EventDispatcher::new();
        dispatcher
            .emit(&ctx(), completed_payload())
            .await
            .expect("empty dispatch succeeds");
    }

    #[tokio::test]
    async fn handler_failure_fails_the_emit() {
        let mut dispatcher = EventDispatcher::new();
        let counting = Arc::new(CountingHandler::default());
        dispatcher.on(EventKind::VisitCompleted, counting.clone());
        dispatcher.on(EventKind::VisitCompleted, Arc::new(FailingHandler));

        let err = dispatcher
            .emit(&ctx(), completed_payload())
            .await
            .expect_err("failing handler must fail the emit");

        match err {
            DispatchError::HandlerFailed { kind, message } => {
                assert_eq!(kind, "visit.completed");
                assert!(message.contains("webhook endpoint unreachable"));
            }
        }
    }

    #[tokio::test]
    async fn failing_handler_does_not_cancel_slower_siblings() {
        let mut dispatcher = EventDispatcher::new();
        let slow = Arc::new(SlowCountingHandler::default());
        dispatcher.on(EventKind::VisitCompleted, slow.clone());
        dispatcher.on(EventKind::VisitCompleted, Arc::new(FailingHandler));

        let err = dispatcher
            .emit(&ctx(), completed_payload())
            .await
            .expect_err("failing handler must fail the emit");
        assert!(matches!(err, DispatchError::HandlerFailed { .. }));

        // Emit waits for every handler, so the slow one has already run.
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handlers_are_scoped_to_their_kind() {
        let mut dispatcher = EventDispatcher::new();
        let scheduled = Arc::new(CountingHandler::default());
        let completed = Arc::new(CountingHandler::default());
        dispatcher.on(EventKind::VisitScheduled, scheduled.clone());
        dispatcher.on(EventKind::VisitCompleted, completed.clone());

        dispatcher
            .emit(&ctx(), completed_payload())
            .await
            .expect("dispatch succeeds");

        assert_eq!(scheduled.calls.load(Ordering::SeqCst), 0);
        assert_eq!(completed.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn payload_kinds_map_to_dot_namespaced_labels() {
        assert_eq!(EventKind::VisitScheduled.label(), "visit.scheduled");
        assert_eq!(EventKind::AccountStatusChanged.label(), "account.status_changed");
        assert_eq!(completed_payload().kind(), EventKind::VisitCompleted);
    }
}
