//! The completed-execution trace model.
//!
//! A [`Trace`] is the authoritative record of one run: every step's
//! [`Decision`], the alternatives that were available at that point, and the
//! [`ThreadAction`] that was actually executed. [`crate::backtrack`] scans it
//! backwards; [`crate::tree`] grafts it onto the DPOR tree; [`user_trace`]
//! strips the internal bookkeeping the driver needs down to what a caller
//! gets back.

use crate::decision::{Decision, ThreadAction, ThreadId};

/// One step of a completed trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub decision: Decision,
    /// The other runnable `(tid, prospective-action)` pairs at this point.
    pub alternatives: Vec<(ThreadId, ThreadAction)>,
    pub action: ThreadAction,
}

/// A completed execution trace: `[(decision, alternatives, action)]`.
pub type Trace = Vec<TraceStep>;

/// The caller-facing view of a trace, with internal bookkeeping stripped.
pub type UserTrace = Vec<(Decision, Vec<(ThreadId, ThreadAction)>, ThreadAction)>;

/// Flattens a trace into the plain tuples a caller gets back, dropping
/// nothing but the distinction between "internal `TraceStep`" and "public
/// record" -- the three fields carry over unchanged.
pub fn user_trace(trace: &Trace) -> UserTrace {
    trace
        .iter()
        .map(|step| {
            (
                step.decision.clone(),
                step.alternatives.clone(),
                step.action.clone(),
            )
        })
        .collect()
}

/// The tid that acted at a given trace step, given the tid active before it.
pub fn tid_at(prior: ThreadId, step: &TraceStep) -> ThreadId {
    crate::decision::tid_of(prior, &step.decision)
}
