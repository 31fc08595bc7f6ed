//! Core types for Autoflow
//!
//! This crate provides the fundamental types used throughout the Autoflow
//! automation engine: EntityId, State, and the StateChanged event payload.

mod entity_id;
mod event;
mod state;

pub use entity_id::{EntityId, EntityIdError};
pub use event::StateChanged;
pub use state::State;

/// State value reported for entities whose integration is offline
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State value reported for entities with no known state
pub const STATE_UNKNOWN: &str = "unknown";
