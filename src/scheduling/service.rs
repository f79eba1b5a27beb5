use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;

use crate::authz::{self, AuthorizationError, Capability};
use crate::config::SchedulingConfig;
use crate::context::RequestContext;
use crate::events::{EventDispatcher, EventPayload};

use super::domain::{NewVisit, TechnicianId, TimeWindow, Visit, VisitId};
use super::repository::{RepositoryError, VisitRepository};

/// The requested visit interval overlaps an existing booking for the
/// technician. Carries the requested bounds so the caller can pick a
/// different slot or technician.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "technician {technician_id} already booked between {} and {}",
    .window.start(),
    .window.end()
)]
pub struct ConflictError {
    pub technician_id: TechnicianId,
    pub window: TimeWindow,
}

/// Error raised by the scheduling service.
///
/// `Authorization` and `Conflict` occur before persistence and are safe to
/// propagate with no compensating action. `Dispatch` occurs after the write
/// committed: the visit exists, downstream propagation is incomplete, and
/// nothing is rolled back.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("persistence timed out after {timeout_ms}ms; the request may be retried")]
    PersistenceTimeout { timeout_ms: u64 },
    #[error("visit {visit_id} committed but event dispatch failed: {message}")]
    Dispatch { visit_id: VisitId, message: String },
}

/// Orchestrates visit creation and completion with conflict safety and event
/// emission.
///
/// Creation walks authorization → conflict check → insert → emit; the
/// check-then-insert sequence holds a per-technician lock so two concurrent
/// bookings for the same technician cannot both pass the conflict check.
pub struct SchedulingService<R> {
    repository: Arc<R>,
    dispatcher: Arc<EventDispatcher>,
    config: SchedulingConfig,
    technician_locks: Mutex<HashMap<TechnicianId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<R> SchedulingService<R>
where
    R: VisitRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        dispatcher: Arc<EventDispatcher>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            config,
            technician_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule a visit after the authorization and conflict checks pass.
    ///
    /// Nothing is persisted before both checks succeed. A dispatch failure
    /// after the insert surfaces as [`SchedulingError::Dispatch`] carrying
    /// the committed visit id.
    pub async fn create_visit(
        &self,
        ctx: &RequestContext,
        request: NewVisit,
    ) -> Result<Visit, SchedulingError> {
        authz::require_capability(ctx, Capability::ScheduleVisits)?;

        let lock = self.technician_lock(&request.technician_id);
        let visit = {
            // Held across check-and-insert so no concurrent booking for this
            // technician can interleave between the two.
            let _guard = lock.lock().await;

            if self
                .repository
                .has_overlap(&request.technician_id, &request.window)
                .await?
            {
                return Err(SchedulingError::Conflict(ConflictError {
                    technician_id: request.technician_id,
                    window: request.window,
                }));
            }

            let visit = Visit {
                id: VisitId::new(),
                job_id: request.job_id,
                technician_id: request.technician_id,
                window: request.window,
                summary: None,
            };
            self.persist(self.repository.insert(visit)).await?
        };

        tracing::info!(
            request_id = %ctx.request_id,
            actor_role = ctx.actor.role.label(),
            source = ctx.source.label(),
            visit_id = %visit.id,
            technician_id = %visit.technician_id,
            "visit scheduled"
        );

        self.dispatch(
            ctx,
            EventPayload::VisitScheduled {
                job_id: visit.job_id.clone(),
                technician_id: visit.technician_id.clone(),
                visit_id: visit.id.clone(),
            },
            &visit.id,
        )
        .await?;

        Ok(visit)
    }

    /// Record the visit summary and emit `visit.completed`. Completion does
    /// not alter the time interval, so no conflict check applies.
    pub async fn complete_visit(
        &self,
        ctx: &RequestContext,
        visit_id: VisitId,
        summary: &str,
    ) -> Result<Visit, SchedulingError> {
        authz::require_capability(ctx, Capability::CompleteVisits)?;

        let visit = self
            .persist(self.repository.set_summary(&visit_id, summary))
            .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            actor_role = ctx.actor.role.label(),
            source = ctx.source.label(),
            visit_id = %visit.id,
            "visit completed"
        );

        self.dispatch(
            ctx,
            EventPayload::VisitCompleted {
                visit_id: visit.id.clone(),
            },
            &visit.id,
        )
        .await?;

        Ok(visit)
    }

    /// Visits starting at or after now, optionally narrowed to one
    /// technician, ordered by start time.
    pub async fn upcoming_visits(
        &self,
        ctx: &RequestContext,
        technician_id: Option<&TechnicianId>,
    ) -> Result<Vec<Visit>, SchedulingError> {
        authz::require_capability(ctx, Capability::ViewSchedule)?;

        let visits = self.repository.upcoming(technician_id, Utc::now()).await?;
        Ok(visits)
    }

    fn technician_lock(&self, technician_id: &TechnicianId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .technician_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Drop locks no booking currently holds; the table stays bounded by
        // the number of in-flight creations.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(technician_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn technician_lock_count(&self) -> usize {
        self.technician_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Bound a repository call with the configured persistence timeout. An
    /// elapsed timeout is a retryable failure, never implicit success.
    async fn persist<T>(
        &self,
        operation: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, SchedulingError> {
        match tokio::time::timeout(self.config.persistence_timeout, operation).await {
            Ok(result) => result.map_err(SchedulingError::from),
            Err(_) => Err(SchedulingError::PersistenceTimeout {
                timeout_ms: self.config.persistence_timeout.as_millis() as u64,
            }),
        }
    }

    /// Emit after a committed mutation. Failures and timeouts here never roll
    /// back the write; they report "committed but incompletely propagated".
    async fn dispatch(
        &self,
        ctx: &RequestContext,
        payload: EventPayload,
        visit_id: &VisitId,
    ) -> Result<(), SchedulingError> {
        match tokio::time::timeout(self.config.dispatch_timeout, self.dispatcher.emit(ctx, payload))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(SchedulingError::Dispatch {
                visit_id: visit_id.clone(),
                message: source.to_string(),
            }),
            Err(_) => Err(SchedulingError::Dispatch {
                visit_id: visit_id.clone(),
                message: format!(
                    "dispatch timed out after {}ms",
                    self.config.dispatch_timeout.as_millis()
                ),
            }),
        }
    }
}

impl<R> std::fmt::Debug for SchedulingService<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
