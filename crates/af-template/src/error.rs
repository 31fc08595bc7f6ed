//! Template engine errors

use thiserror::Error;

/// Errors raised while rendering or evaluating templates
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template error: {0}")]
    Render(#[from] minijinja::Error),
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;
