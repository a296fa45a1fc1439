//! Route decorators applied to `tracing` spans.
//!
//! The span must declare an `operation` field (for example
//! `info_span!("request", operation = tracing::field::Empty)`); recording an
//! undeclared field is silently ignored by `tracing`.

use crate::policy::Span;

impl Span for tracing::Span {
    fn set_operation(&mut self, operation: &str) {
        self.record("operation", operation);
    }
}
