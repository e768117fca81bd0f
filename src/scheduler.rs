//! The deterministic replay scheduler.
//!
//! One [`SchedState`] is threaded through a single execution: it carries the
//! decisions the scheduler must still replay verbatim, the per-step
//! bookkeeping [`crate::backtrack::find_backtrack`] will later scan, and the
//! engine-supplied memory model. [`ReplayScheduler::step`] is the scheduler
//! function an [`crate::engine::ExecutionEngine`] drives once per thread
//! switch, mirroring how `loom::rt::Scheduler` is invoked by
//! `loom::rt::Execution::schedule` on every branch point.

use std::collections::VecDeque;

use tracing::trace;

use crate::decision::{ActionStream, Decision, ThreadAction, ThreadId};
use crate::memory::MemoryModel;
use crate::trace::TraceStep;

/// The per-step scratch [`crate::backtrack::find_backtrack`] consumes: the
/// runnable threads with their prospective actions, and which of them were
/// offered as alternatives by the bound's `initialise` at a branching step.
/// Empty `alternatives` at a replayed step, since nothing was chosen there.
#[derive(Debug, Clone, Default)]
pub struct BacktrackStep {
    pub runnable: Vec<(ThreadId, ThreadAction)>,
    pub alternatives: Vec<ThreadId>,
}

/// Per-execution scheduler state: threaded through one run from start to
/// finish, then discarded.
pub struct SchedState<M> {
    prefix: VecDeque<Decision>,
    pub bpoints: Vec<BacktrackStep>,
    pub memory: M,
    /// The tid active before the next step, if any.
    prior_tid: Option<ThreadId>,
}

impl<M: MemoryModel + Default> SchedState<M> {
    /// A fresh scheduler state that will replay `prefix` verbatim before
    /// branching on its own.
    pub fn initial(prefix: Vec<Decision>) -> Self {
        SchedState {
            prefix: prefix.into_iter().collect(),
            bpoints: Vec::new(),
            memory: M::default(),
            prior_tid: None,
        }
    }
}

/// The replay scheduler: deterministic given `prefix` and `memory`.
///
/// `initialise` is the bound's post-prefix thread-choice function; it is
/// passed in rather than baked into `ReplayScheduler` itself, keeping the
/// bound a pure, swappable parameter rather than something wired into the
/// scheduler's own type.
pub struct ReplayScheduler<'a> {
    initialise: &'a dyn Fn(Option<ThreadId>, &[(ThreadId, ActionStream)]) -> Vec<ThreadId>,
}

impl<'a> ReplayScheduler<'a> {
    pub fn new(
        initialise: &'a dyn Fn(Option<ThreadId>, &[(ThreadId, ActionStream)]) -> Vec<ThreadId>,
    ) -> Self {
        ReplayScheduler { initialise }
    }

    /// One invocation of the scheduler. `prior_step` is the previously
    /// committed trace step, if this is not the first call. `runnable` is the
    /// non-empty list of currently-runnable threads with their lookahead
    /// action streams.
    ///
    /// Returns `Some(decision)` to proceed, or `None` to abort the run,
    /// returning an explicit abort instead of silently falling back to the
    /// first candidate when every live choice would deadlock.
    pub fn step<M: MemoryModel>(
        &self,
        state: &mut SchedState<M>,
        prior_step: Option<&TraceStep>,
        runnable: &[(ThreadId, ActionStream)],
    ) -> Option<Decision> {
        debug_assert!(!runnable.is_empty(), "scheduler invoked with no runnable threads");

        // 1. Memory update.
        if let Some(step) = prior_step {
            let prior_tid = state.prior_tid.unwrap_or_else(|| {
                crate::decision::tid_of(ThreadId(0), &step.decision)
            });
            let acting = crate::decision::tid_of(prior_tid, &step.decision);
            state.memory.memory_step(acting, &step.action);
            state.prior_tid = Some(acting);
        }

        // 2. Replay branch.
        if let Some(decision) = state.prefix.pop_front() {
            trace!(?decision, "replay step");
            state.bpoints.push(BacktrackStep {
                runnable: runnable
                    .iter()
                    .filter_map(|(t, stream)| stream.first().map(|a| (*t, a.clone())))
                    .collect(),
                alternatives: Vec::new(),
            });
            return Some(decision);
        }

        // 3. Branching branch. `initialise` only ever gets to see each
        // thread's immediate next action, not its full lookahead stream --
        // the memory model's blocking checks below are the only consumer
        // that needs to peek further than one step.
        let restricted: Vec<(ThreadId, ActionStream)> = runnable
            .iter()
            .map(|(t, stream)| (*t, stream.first().cloned().into_iter().collect()))
            .collect();
        let choices = (self.initialise)(state.prior_tid, &restricted);
        debug_assert!(!choices.is_empty(), "bound initialise returned no candidates");

        let lookahead_of = |t: ThreadId| -> &ActionStream {
            runnable
                .iter()
                .find(|(id, _)| *id == t)
                .map(|(_, stream)| stream)
                .expect("initialise returned a tid that is not runnable")
        };

        let live: Vec<ThreadId> = choices
            .iter()
            .copied()
            .filter(|t| !state.memory.will_block_safely(lookahead_of(*t)))
            .collect();

        let runnable_entry = runnable
            .iter()
            .filter_map(|(t, stream)| stream.first().map(|a| (*t, a.clone())))
            .collect::<Vec<_>>();

        if live.is_empty() {
            trace!("every live choice would deadlock permanently; aborting");
            state.bpoints.push(BacktrackStep {
                runnable: runnable_entry,
                alternatives: Vec::new(),
            });
            return None;
        }

        let chosen = live[0];
        let alternatives = live[1..].to_vec();

        let decision = crate::decision::decision_of(
            state.prior_tid,
            &runnable.iter().map(|(t, _)| *t).collect::<Vec<_>>(),
            chosen,
        );

        trace!(?decision, ?alternatives, "branch step");

        state.bpoints.push(BacktrackStep {
            runnable: runnable_entry,
            alternatives,
        });

        Some(decision)
    }
}
