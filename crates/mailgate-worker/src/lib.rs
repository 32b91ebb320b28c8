/// Mailgate Worker - dispatch runtime
///
/// Pulls jobs from the queue, runs the per-job pipeline state machine
/// (claim → validate → admission re-check → dispatch → classify), and
/// hosts the DLQ replay tool and the outbox sweeper.
pub mod context;
pub mod pipeline;
pub mod replay;
pub mod scheduler;
pub mod sweeper;

pub use context::WorkerContext;
