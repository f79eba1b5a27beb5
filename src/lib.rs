//! Field-service operations backend.
//!
//! The interesting core is visit scheduling: capability-gated operations over
//! a [`scheduling::SchedulingService`] that guards technician double-booking
//! with a half-open interval-overlap check and publishes domain events
//! through an injected [`events::EventDispatcher`] after each committed
//! mutation.

pub mod authz;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod scheduling;
pub mod telemetry;
