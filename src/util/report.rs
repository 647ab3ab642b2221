//! Error-reporting sink for failures raised by task bodies.

use tracing::error;

/// Receives failures from task bodies that panicked on a worker thread.
///
/// Never called for expired tasks; expiry is a normal outcome.
pub trait ErrorReporter: Send + Sync + 'static {
    /// Report a failure. `context` identifies where it happened (pool and
    /// worker), `error` is the rendered panic message.
    fn report(&self, context: &str, error: &str);
}

/// Default reporter: emits an `error!` event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &str, error: &str) {
        error!(context = context, error = error, "task failed");
    }
}

impl<F> ErrorReporter for F
where
    F: Fn(&str, &str) + Send + Sync + 'static,
{
    fn report(&self, context: &str, error: &str) {
        self(context, error);
    }
}
