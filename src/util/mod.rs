//! Clocks, error reporting and telemetry.

pub mod clock;
pub mod report;
pub mod telemetry;

pub use clock::{now_monotonic, Clock, ManualClock, MonotonicClock, SystemClock, Timestamp};
pub use report::{ErrorReporter, TracingReporter};
pub use telemetry::{init_tracing, init_tracing_with_default};
