//! Visit scheduling with conflict detection.
//!
//! Visit creation walks a fixed pipeline: authorization gate, technician
//! interval-overlap check, persistence, event emission. The single
//! correctness invariant is that no visit is persisted whose interval
//! overlaps an existing visit for the same technician.

pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{InvalidWindow, JobId, NewVisit, TechnicianId, TimeWindow, Visit, VisitId};
pub use repository::{InMemoryVisitRepository, RepositoryError, VisitRepository};
pub use router::scheduling_router;
pub use service::{ConflictError, SchedulingError, SchedulingService};
