use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::domain::{TechnicianId, TimeWindow, Visit, VisitId};

/// Storage abstraction for the visit store.
///
/// Implementations must support the technician-scoped overlap existence
/// query, visit insertion, and summary update that the scheduling service
/// orchestrates. The service serializes check-then-insert per technician, so
/// implementations only need per-call consistency; a store with a native
/// exclusion constraint may additionally report `Conflict` from `insert`.
#[async_trait::async_trait]
pub trait VisitRepository: Send + Sync {
    /// Whether any visit for `technician_id` overlaps `window` under
    /// half-open semantics.
    async fn has_overlap(
        &self,
        technician_id: &TechnicianId,
        window: &TimeWindow,
    ) -> Result<bool, RepositoryError>;

    async fn insert(&self, visit: Visit) -> Result<Visit, RepositoryError>;

    async fn set_summary(&self, id: &VisitId, summary: &str) -> Result<Visit, RepositoryError>;

    /// Visits starting at or after `after`, optionally narrowed to one
    /// technician, ordered by start time ascending.
    async fn upcoming(
        &self,
        technician_id: Option<&TechnicianId>,
        after: DateTime<Utc>,
    ) -> Result<Vec<Visit>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Map-backed store used by the demo server wiring and the test suites.
#[derive(Debug, Default)]
pub struct InMemoryVisitRepository {
    visits: Mutex<HashMap<VisitId, Visit>>,
}

impl InMemoryVisitRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored visits, for wiring diagnostics and test assertions.
    pub fn len(&self) -> usize {
        self.visits.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<VisitId, Visit>>, RepositoryError> {
        self.visits
            .lock()
            .map_err(|_| RepositoryError::Unavailable("visit store poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl VisitRepository for InMemoryVisitRepository {
    async fn has_overlap(
        &self,
        technician_id: &TechnicianId,
        window: &TimeWindow,
    ) -> Result<bool, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .values()
            .filter(|visit| &visit.technician_id == technician_id)
            .any(|visit| visit.window.overlaps(window)))
    }

    async fn insert(&self, visit: Visit) -> Result<Visit, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&visit.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(visit.id.clone(), visit.clone());
        Ok(visit)
    }

    async fn set_summary(&self, id: &VisitId, summary: &str) -> Result<Visit, RepositoryError> {
        let mut guard = self.lock()?;
        let visit = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        visit.summary = Some(summary.to_string());
        Ok(visit.clone())
    }

    async fn upcoming(
        &self,
        technician_id: Option<&TechnicianId>,
        after: DateTime<Utc>,
    ) -> Result<Vec<Visit>, RepositoryError> {
        let guard = self.lock()?;
        let mut visits: Vec<Visit> = guard
            .values()
            .filter(|visit| visit.window.start() >= after)
            .filter(|visit| technician_id.map_or(true, |id| &visit.technician_id == id))
            .cloned()
            .collect();
        visits.sort_by_key(|visit| visit.window.start());
        Ok(visits)
    }
}
