//! Request context threaded through every operation.
//!
//! A [`RequestContext`] is an immutable snapshot of who is acting, through
//! which channel, and when. It is constructed once at the start of an inbound
//! operation, cloned into domain events for traceability, and discarded when
//! the operation completes. It is never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::Role;

/// Origin channel of an inbound operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Interactive HTTP API traffic.
    Api,
    /// Background worker processes.
    Worker,
    /// Scheduled jobs.
    Cron,
    /// The Betty AI assistant.
    Betty,
}

impl Source {
    pub const fn label(self) -> &'static str {
        match self {
            Source::Api => "api",
            Source::Worker => "worker",
            Source::Cron => "cron",
            Source::Betty => "betty",
        }
    }
}

/// Classification of the acting identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Human,
    System,
    Ai,
}

impl ActorType {
    pub const fn label(self) -> &'static str {
        match self {
            ActorType::Human => "human",
            ActorType::System => "system",
            ActorType::Ai => "ai",
        }
    }
}

/// The identity an operation executes on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub actor_type: ActorType,
}

/// Immutable per-operation context. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_id: String,
    pub actor: Actor,
    pub source: Source,
    /// Creation time, for observability only. Business logic never branches
    /// on it.
    pub timestamp: DateTime<Utc>,
}

impl RequestContext {
    /// Build a context for an inbound operation.
    ///
    /// Actor type derivation is deterministic and ordered: a Betty origin is
    /// always an AI actor regardless of the actor id; otherwise a cron origin
    /// or the reserved `system` actor id marks a system actor; everything
    /// else is human. A missing request id gets a fresh UUID.
    pub fn new(
        actor_id: impl Into<String>,
        role: Role,
        source: Source,
        request_id: Option<String>,
    ) -> Self {
        let actor_id = actor_id.into();

        let actor_type = if source == Source::Betty {
            ActorType::Ai
        } else if source == Source::Cron || actor_id == "system" {
            ActorType::System
        } else {
            ActorType::Human
        };

        Self {
            request_id: request_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            actor: Actor {
                id: actor_id,
                role,
                actor_type,
            },
            source,
            timestamp: Utc::now(),
        }
    }

    /// Context for operations initiated by the Betty assistant. Betty acts
    /// with elevated permissions; the conversation id doubles as the request
    /// id when present.
    pub fn betty(conversation_id: Option<String>) -> Self {
        Self::new("betty-ai", Role::Admin, Source::Betty, conversation_id)
    }

    /// Context for scheduled background jobs. The request id embeds the job
    /// name and a millisecond timestamp so repeated runs stay distinguishable
    /// in traces.
    pub fn system(job_name: &str) -> Self {
        let request_id = format!("cron-{job_name}-{}", Utc::now().timestamp_millis());
        Self::new("system", Role::Admin, Source::Cron, Some(request_id))
    }
}
