//! Agora Templates - Condition templates for every orderable service type
//!
//! A template is JSON text with `{placeholder}` tokens. Expansion binds the
//! runtime parameters and the reward schedule, then parses the result into
//! the ordered condition list of one agreement:
//!
//! ```text
//! lock (consumer)  →  service (provider)  →  reward (escrow release), optional
//! ```
//!
//! Templates are bundled at compile time and never change after the engine
//! is built.

pub mod params;
pub mod engine;

pub use params::*;
pub use engine::*;

use agora_types::ServiceType;
use thiserror::Error;

/// Template errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// No template is registered for the service type
    #[error("No condition template for service type {0}")]
    NotFound(ServiceType),

    /// Expansion failed; no conditions were produced
    #[error("Failed to initialize conditions: {0}")]
    InitializeConditions(String),
}

pub type TemplateResult<T> = Result<T, TemplateError>;
