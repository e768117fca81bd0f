//! Error taxonomy.
//!
//! `loom` treats a broken runtime invariant as a bug in `loom` itself and
//! panics (`assert!(..., "[loom internal bug] ...")`). This core makes the
//! same call for invariant breaks -- [`InvariantViolation`] below is raised,
//! not returned as data -- but unlike `loom`, which *is* the thing under
//! test, this crate is a pure search driver handing results back to a
//! caller, so the four reportable outcomes of a single run are a proper
//! `Failure` value threaded through every trace instead of a panic.

use thiserror::Error;

/// The terminal outcome of one execution, carried inside a trace's result.
/// All four variants are normal, expected trace outcomes -- none of them
/// abort the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Failure {
    /// No thread is runnable and the main thread has not completed.
    #[error("deadlock: no thread is runnable")]
    Deadlock,

    /// An STM transaction cannot be retried because nothing can unblock it.
    #[error("STM deadlock: transaction cannot be unblocked")]
    StmDeadlock,

    /// An exception propagated out of the main thread.
    #[error("uncaught exception in main thread")]
    UncaughtException,

    /// The scheduler returned `None` -- a step budget was exhausted, or the
    /// branching step's `will_block_safely` filter eliminated every choice.
    /// This core emits `Abort` explicitly from that branch rather than
    /// silently falling back to the first candidate.
    #[error("execution aborted by the scheduler")]
    Abort,
}

/// A broken core invariant (a DPOR tree node whose bookkeeping no longer
/// makes sense, or a malformed decision sequence). Fatal: raised via
/// `panic!`, never folded into a trace result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("internal invariant violation: {0}")]
pub struct InvariantViolation(pub String);

impl InvariantViolation {
    pub fn new(msg: impl Into<String>) -> Self {
        InvariantViolation(msg.into())
    }
}
