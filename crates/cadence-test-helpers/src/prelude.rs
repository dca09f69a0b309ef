//! Convenience re-exports for test code.

pub use crate::mock::{FailingWorker, RecordingWorker, ScriptedWorker, SlowWorker};
pub use crate::must::must_some;
pub use crate::sink::CapturingSink;
pub use crate::wait::{init_tracing, wait_until};
