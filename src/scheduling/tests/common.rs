use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::authz::Role;
use crate::config::SchedulingConfig;
use crate::context::{RequestContext, Source};
use crate::events::{
    DomainEvent, EventDispatcher, EventHandler, EventKind, HandlerError,
};
use crate::scheduling::domain::{JobId, NewVisit, TechnicianId, TimeWindow, Visit, VisitId};
use crate::scheduling::repository::{
    InMemoryVisitRepository, RepositoryError, VisitRepository,
};
use crate::scheduling::service::SchedulingService;

// Fixture day kept far in the future so `upcoming` queries anchored at the
// wall clock still see these visits.
pub(super) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2099, 6, 2, hour, minute, 0)
        .single()
        .expect("valid fixture instant")
}

pub(super) fn window(start: (u32, u32), end: (u32, u32)) -> TimeWindow {
    TimeWindow::new(at(start.0, start.1), at(end.0, end.1)).expect("valid fixture window")
}

pub(super) fn dispatcher_ctx() -> RequestContext {
    RequestContext::new("dispatcher-1", Role::Dispatcher, Source::Api, None)
}

pub(super) fn technician_ctx() -> RequestContext {
    RequestContext::new("tech-7", Role::Technician, Source::Api, None)
}

pub(super) fn csr_ctx() -> RequestContext {
    RequestContext::new("csr-3", Role::Csr, Source::Api, None)
}

pub(super) fn new_visit(technician: &str, start: (u32, u32), end: (u32, u32)) -> NewVisit {
    NewVisit {
        job_id: JobId("job-1".to_string()),
        technician_id: TechnicianId(technician.to_string()),
        window: window(start, end),
    }
}

pub(super) fn test_config() -> SchedulingConfig {
    SchedulingConfig {
        persistence_timeout: Duration::from_millis(250),
        dispatch_timeout: Duration::from_millis(250),
    }
}

/// Handler capturing every event it receives.
#[derive(Default)]
pub(super) struct RecordingHandler {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingHandler {
    pub(super) fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("handler mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        self.events
            .lock()
            .expect("handler mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Handler that always fails, for dispatch-failure scenarios.
pub(super) struct FailingHandler;

#[async_trait::async_trait]
impl EventHandler for FailingHandler {
    async fn handle(&self, _event: &DomainEvent) -> Result<(), HandlerError> {
        Err(HandlerError::Failed("notification channel down".to_string()))
    }
}

/// Service wired to an in-memory store with a recording handler on both
/// visit event kinds.
pub(super) fn build_service() -> (
    Arc<SchedulingService<InMemoryVisitRepository>>,
    Arc<InMemoryVisitRepository>,
    Arc<RecordingHandler>,
) {
    let repository = Arc::new(InMemoryVisitRepository::new());
    let handler = Arc::new(RecordingHandler::default());

    let mut dispatcher = EventDispatcher::new();
    dispatcher.on(EventKind::VisitScheduled, handler.clone());
    dispatcher.on(EventKind::VisitCompleted, handler.clone());

    let service = Arc::new(SchedulingService::new(
        repository.clone(),
        Arc::new(dispatcher),
        test_config(),
    ));
    (service, repository, handler)
}

pub(super) fn build_service_with_failing_handler() -> (
    Arc<SchedulingService<InMemoryVisitRepository>>,
    Arc<InMemoryVisitRepository>,
) {
    let repository = Arc::new(InMemoryVisitRepository::new());

    let mut dispatcher = EventDispatcher::new();
    dispatcher.on(EventKind::VisitScheduled, Arc::new(FailingHandler));
    dispatcher.on(EventKind::VisitCompleted, Arc::new(FailingHandler));

    let service = Arc::new(SchedulingService::new(
        repository.clone(),
        Arc::new(dispatcher),
        test_config(),
    ));
    (service, repository)
}

/// Wrapper that delays the overlap query so concurrent bookings genuinely
/// interleave at the check-then-insert boundary.
pub(super) struct DelayedOverlapRepository {
    inner: InMemoryVisitRepository,
    delay: Duration,
}

impl DelayedOverlapRepository {
    pub(super) fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryVisitRepository::new(),
            delay,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait::async_trait]
impl VisitRepository for DelayedOverlapRepository {
    async fn has_overlap(
        &self,
        technician_id: &TechnicianId,
        window: &TimeWindow,
    ) -> Result<bool, RepositoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.has_overlap(technician_id, window).await
    }

    async fn insert(
        &self,
        visit: Visit,
    ) -> Result<Visit, RepositoryError> {
        self.inner.insert(visit).await
    }

    async fn set_summary(
        &self,
        id: &VisitId,
        summary: &str,
    ) -> Result<Visit, RepositoryError> {
        self.inner.set_summary(id, summary).await
    }

    async fn upcoming(
        &self,
        technician_id: Option<&TechnicianId>,
        after: DateTime<Utc>,
    ) -> Result<Vec<Visit>, RepositoryError> {
        self.inner.upcoming(technician_id, after).await
    }
}

/// Repository whose insert hangs past any test timeout.
pub(super) struct StalledRepository;

#[async_trait::async_trait]
impl VisitRepository for StalledRepository {
    async fn has_overlap(
        &self,
        _technician_id: &TechnicianId,
        _window: &TimeWindow,
    ) -> Result<bool, RepositoryError> {
        Ok(false)
    }

    async fn insert(
        &self,
        visit: Visit,
    ) -> Result<Visit, RepositoryError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(visit)
    }

    async fn set_summary(
        &self,
        _id: &VisitId,
        _summary: &str,
    ) -> Result<Visit, RepositoryError> {
        Err(RepositoryError::NotFound)
    }

    async fn upcoming(
        &self,
        _technician_id: Option<&TechnicianId>,
        _after: DateTime<Utc>,
    ) -> Result<Vec<Visit>, RepositoryError> {
        Ok(Vec::new())
    }
}

/// Repository that reports the backing store as offline.
pub(super) struct UnavailableRepository;

#[async_trait::async_trait]
impl VisitRepository for UnavailableRepository {
    async fn has_overlap(
        &self,
        _technician_id: &TechnicianId,
        _window: &TimeWindow,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn insert(
        &self,
        _visit: Visit,
    ) -> Result<Visit, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn set_summary(
        &self,
        _id: &VisitId,
        _summary: &str,
    ) -> Result<Visit, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn upcoming(
        &self,
        _technician_id: Option<&TechnicianId>,
        _after: DateTime<Utc>,
    ) -> Result<Vec<Visit>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}
