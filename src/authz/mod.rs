//! Capability-gated authorization.
//!
//! Every mutating operation checks the acting role's capability set before
//! touching state. The role→capability mapping is static; evaluation is a
//! pure read of the mapping plus the request context.

use serde::{Deserialize, Serialize};

use crate::context::RequestContext;

/// Roles an actor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Csr,
    Dispatcher,
    Technician,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Csr => "CSR",
            Role::Dispatcher => "DISPATCHER",
            Role::Technician => "TECHNICIAN",
        }
    }

    /// Parse the wire representation used by the API boundary. Unknown
    /// values map to `None` so callers can fall back to the least-privileged
    /// default.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "CSR" => Some(Role::Csr),
            "DISPATCHER" => Some(Role::Dispatcher),
            "TECHNICIAN" => Some(Role::Technician),
            _ => None,
        }
    }
}

/// Closed set of named permissions. Checking against an enum rather than
/// free-form strings makes an unknown capability a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    ScheduleVisits,
    CompleteVisits,
    ViewSchedule,
    ViewAccounts,
    CreateAccounts,
    ManageAccounts,
    ViewJobs,
    ManageJobs,
    AccessBetty,
}

impl Capability {
    pub const fn label(self) -> &'static str {
        match self {
            Capability::ScheduleVisits => "canScheduleVisits",
            Capability::CompleteVisits => "canCompleteVisits",
            Capability::ViewSchedule => "canViewSchedule",
            Capability::ViewAccounts => "canViewAccounts",
            Capability::CreateAccounts => "canCreateAccounts",
            Capability::ManageAccounts => "canManageAccounts",
            Capability::ViewJobs => "canViewJobs",
            Capability::ManageJobs => "canManageJobs",
            Capability::AccessBetty => "canAccessBetty",
        }
    }
}

const ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::ScheduleVisits,
    Capability::CompleteVisits,
    Capability::ViewSchedule,
    Capability::ViewAccounts,
    Capability::CreateAccounts,
    Capability::ManageAccounts,
    Capability::ViewJobs,
    Capability::ManageJobs,
    Capability::AccessBetty,
];

const CSR_CAPABILITIES: &[Capability] = &[
    Capability::ViewSchedule,
    Capability::ViewAccounts,
    Capability::CreateAccounts,
    Capability::ViewJobs,
];

const DISPATCHER_CAPABILITIES: &[Capability] = &[
    Capability::ScheduleVisits,
    Capability::ViewSchedule,
    Capability::ViewAccounts,
    Capability::ViewJobs,
    Capability::ManageJobs,
];

const TECHNICIAN_CAPABILITIES: &[Capability] = &[
    Capability::CompleteVisits,
    Capability::ViewSchedule,
    Capability::ViewJobs,
];

/// Capability set granted by a role.
pub const fn capabilities_for(role: Role) -> &'static [Capability] {
    match role {
        Role::Admin => ADMIN_CAPABILITIES,
        Role::Csr => CSR_CAPABILITIES,
        Role::Dispatcher => DISPATCHER_CAPABILITIES,
        Role::Technician => TECHNICIAN_CAPABILITIES,
    }
}

/// Denial of an operation or a specific resource instance.
///
/// One error kind, two evidence payloads: `MissingCapability` when the role
/// does not grant the capability at all, `ResourceAccess` when the actor
/// holds the capability but is denied a particular resource instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("missing required capability {}", .required.label())]
    MissingCapability { required: Capability, actor: String },
    #[error("cannot access resource {resource}")]
    ResourceAccess { resource: String },
}

impl AuthorizationError {
    pub fn missing_capability(capability: Capability, actor_id: &str) -> Self {
        Self::MissingCapability {
            required: capability,
            actor: actor_id.to_string(),
        }
    }

    pub fn resource_access(resource_type: &str, resource_id: &str) -> Self {
        Self::ResourceAccess {
            resource: format!("{resource_type}:{resource_id}"),
        }
    }
}

/// Fail unless the acting role grants `capability`.
///
/// Must run before any state-mutating work so a denial leaves no partial
/// side effects.
pub fn require_capability(
    ctx: &RequestContext,
    capability: Capability,
) -> Result<(), AuthorizationError> {
    if capabilities_for(ctx.actor.role).contains(&capability) {
        Ok(())
    } else {
        Err(AuthorizationError::missing_capability(
            capability,
            &ctx.actor.id,
        ))
    }
}
