//! The execution engine contract.
//!
//! The core never simulates concurrency primitives itself -- thread, STM,
//! and m-var semantics live entirely behind the caller's own types: it only
//! ever calls back into an [`ExecutionEngine`] supplied by the caller, the
//! same separation `loom::model::Builder::check` draws between the driver
//! loop and the user-supplied closure it runs under `loom::rt::execute`.

use crate::decision::{ActionStream, Decision, ThreadId};
use crate::error::Failure;
use crate::memory::MemoryModel;
use crate::scheduler::{ReplayScheduler, SchedState};
use crate::trace::{Trace, TraceStep};

/// What the scheduler is handed at each step, and what it must return.
pub trait Scheduler<M: MemoryModel> {
    /// `(prior-step?, runnable-with-lookahead, sched-state) -> (Some tid,
    /// new-state) | (None, new-state)`.
    fn schedule(
        &self,
        state: &mut SchedState<M>,
        prior_step: Option<&TraceStep>,
        runnable: &[(ThreadId, ActionStream)],
    ) -> Option<Decision>;
}

/// Drives one computation end-to-end under a scheduler, producing a result,
/// the final scheduler state, and the full trace.
///
/// Implementors own the concurrency-primitive semantics entirely; the core
/// only ever sees the three things this trait hands back. A given engine is
/// generic over one [`MemoryModel`]: the memory model is a parameter to the
/// engine, opaque to the core.
pub trait ExecutionEngine<M: MemoryModel> {
    /// The computation's own result type, on a clean run.
    type Value;

    /// Run `computation` to completion, invoking `scheduler` once per step.
    /// The returned `trace`'s first step must carry `Decision::Start`.
    fn run<S: Scheduler<M>>(
        &mut self,
        scheduler: &S,
        initial_state: SchedState<M>,
        computation: &dyn Fn(&mut Self) -> Result<Self::Value, Failure>,
    ) -> (Result<Self::Value, Failure>, SchedState<M>, Trace);
}

impl<'a, M: MemoryModel> Scheduler<M> for ReplayScheduler<'a> {
    fn schedule(
        &self,
        state: &mut SchedState<M>,
        prior_step: Option<&TraceStep>,
        runnable: &[(ThreadId, ActionStream)],
    ) -> Option<Decision> {
        self.step(state, prior_step, runnable)
    }
}
