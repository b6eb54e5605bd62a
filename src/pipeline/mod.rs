//! The asynchronous meeting-processing pipeline: retry policy, the durable
//! task queue, and the orchestrator state machine that drives a meeting
//! record from uploaded audio to a finished summary.

pub mod orchestrator;
pub mod queue;
pub mod retry;

pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use queue::{Dispatcher, Task, TaskQueue};
pub use retry::{with_retry, RetryPolicy};
