use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for persisted visits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitId(pub String);

impl VisitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for VisitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VisitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the job a visit fulfils.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

/// Identifier of the technician performing a visit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TechnicianId(pub String);

impl std::fmt::Display for TechnicianId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raised when a window's start does not precede its end.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("window start {start} is not before end {end}")]
pub struct InvalidWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Half-open time range `[start, end)`.
///
/// A visit occupies its start instant but not its end instant, so a visit
/// ending exactly when another starts does not overlap it. Construction goes
/// through [`TimeWindow::new`] so `start < end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, InvalidWindow> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(InvalidWindow { start, end })
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Interval-overlap test for half-open ranges: `[s1,e1)` and `[s2,e2)`
    /// overlap iff `s1 < e2 && s2 < e1`. Covers containment, partial
    /// overlap, and identity; boundary-touching windows do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Persisted technician visit. Created only after the conflict check passes;
/// the summary is set on completion; visits are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visit {
    pub id: VisitId,
    pub job_id: JobId,
    pub technician_id: TechnicianId,
    pub window: TimeWindow,
    pub summary: Option<String>,
}

/// Validated creation request handed in by the inbound boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVisit {
    pub job_id: JobId,
    pub technician_id: TechnicianId,
    pub window: TimeWindow,
}
