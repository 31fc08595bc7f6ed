//! Template engine for Autoflow
//!
//! Provides Jinja2-compatible template rendering with state-aware
//! functions, used to evaluate template conditions.

use crate::error::TemplateResult;
use crate::states::{self, StatesObject};
use af_state_store::StateStore;
use minijinja::{Environment, Value};
use std::sync::Arc;
use tracing::debug;

/// Template engine with state-aware extensions
///
/// The engine provides:
/// - Access to entity states via the `states` object
/// - State functions like `is_state()`, `state_attr()`, `has_value()`
/// - Time functions `now()` and `utcnow()`
/// - Numeric filters `float`, `int`, `round`, `abs`
pub struct TemplateEngine {
    env: Environment<'static>,
    states: Arc<StatesObject>,
}

impl TemplateEngine {
    /// Create a new template engine with access to the state store
    pub fn new(store: Arc<StateStore>) -> Self {
        let states = Arc::new(StatesObject::new(store));
        let mut env = Environment::new();

        env.set_debug(true);

        Self::register_filters(&mut env);
        Self::register_globals(&mut env, states.clone());

        Self { env, states }
    }

    fn register_filters(env: &mut Environment<'static>) {
        env.add_filter("float", |value: Value| -> Value {
            match states::to_f64(&value).or_else(|| value.as_str().and_then(|s| s.parse().ok())) {
                Some(f) => Value::from(f),
                None => Value::from(0.0),
            }
        });

        env.add_filter("int", |value: Value| -> Value {
            let as_float = states::to_f64(&value)
                .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()));
            match as_float {
                Some(f) => Value::from(f as i64),
                None => Value::from(0),
            }
        });

        env.add_filter("round", |value: Value, digits: Option<u32>| -> Value {
            match states::to_f64(&value) {
                Some(f) => {
                    let factor = 10f64.powi(digits.unwrap_or(0) as i32);
                    Value::from((f * factor).round() / factor)
                }
                None => value,
            }
        });

        env.add_filter("abs", |value: Value| -> Value {
            match states::to_f64(&value) {
                Some(f) => Value::from(f.abs()),
                None => value,
            }
        });
    }

    fn register_globals(env: &mut Environment<'static>, states: Arc<StatesObject>) {
        // States object, also callable as states('entity_id')
        env.add_global("states", Value::from_object((*states).clone()));

        env.add_function("now", || -> String {
            chrono::Local::now().to_rfc3339()
        });
        env.add_function("utcnow", || -> String {
            chrono::Utc::now().to_rfc3339()
        });

        let states_for_is_state = states.clone();
        env.add_function("is_state", move |entity_id: &str, state: Value| {
            states::is_state_fn(states_for_is_state.clone(), entity_id, state)
        });

        let states_for_state_attr = states.clone();
        env.add_function("state_attr", move |entity_id: &str, attribute: &str| {
            states::state_attr_fn(states_for_state_attr.clone(), entity_id, attribute)
        });

        let states_for_has_value = states;
        env.add_function("has_value", move |entity_id: &str| {
            states::has_value_fn(states_for_has_value.clone(), entity_id)
        });
    }

    /// Render a template string
    pub fn render(&self, template: &str) -> TemplateResult<String> {
        debug!("Rendering template: {}", template);

        let tmpl = self.env.template_from_str(template)?;
        let result = tmpl.render(())?;

        Ok(result)
    }

    /// Evaluate a template expression and return the value
    pub fn evaluate(&self, template: &str) -> TemplateResult<Value> {
        let expr = self.env.compile_expression(template)?;
        let result = expr.eval(())?;
        Ok(result)
    }

    /// Check if a string contains template syntax
    pub fn is_template(template: &str) -> bool {
        template.contains("{{") || template.contains("{%") || template.contains("{#")
    }

    /// Get a reference to the states object
    pub fn states(&self) -> &StatesObject {
        &self.states
    }
}
