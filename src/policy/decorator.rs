//! Per-route tracing span decoration.

use crate::config::schema::DecoratorConfig;

/// A tracing span owned by the tracing subsystem.
pub trait Span {
    fn set_operation(&mut self, operation: &str);
}

/// Overrides the operation name of the request's span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decorator {
    operation: String,
}

impl Decorator {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn from_config(config: &DecoratorConfig) -> Self {
        Self::new(config.operation.clone())
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn apply(&self, span: &mut dyn Span) {
        span.set_operation(&self.operation);
    }
}
