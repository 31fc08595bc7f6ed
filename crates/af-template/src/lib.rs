//! Jinja2-compatible template engine for Autoflow conditions
//!
//! This crate provides a template engine built on minijinja with
//! state-aware extensions:
//!
//! - `states('entity_id')` - Get entity state as string
//! - `states.light.living_room` - Access state object
//! - `is_state('entity_id', 'on')` - Check if entity is in state
//! - `state_attr('entity_id', 'brightness')` - Get attribute value
//! - `has_value('entity_id')` - Check if entity has valid value
//! - `now()` / `utcnow()` - Current time
//! - `| float` / `| int` / `| round(2)` - Numeric filters

mod engine;
mod error;
mod states;

pub use engine::TemplateEngine;
pub use error::{TemplateError, TemplateResult};
pub use states::StatesObject;
