//! The bound plug-in interface and the bundled pre-emption bound.

use crate::backtrack::BacktrackFn;
use crate::decision::{ActionStream, Decision, ThreadId};
use crate::scheduler::BacktrackStep;

pub type BoundOk = dyn Fn(&[Decision]) -> bool;
pub type Initialise = dyn Fn(Option<ThreadId>, &[(ThreadId, ActionStream)]) -> Vec<ThreadId>;

/// A bound: three pure functions passed by value, kept separate from the
/// scheduler so a search strategy can be swapped out without touching how
/// the replay machinery itself runs.
pub struct Bound {
    pub bound_ok: Box<BoundOk>,
    pub backtrack_fn: Box<BacktrackFn>,
    pub initialise: Box<Initialise>,
}

/// The canonical post-prefix thread-choice initialiser: prefer to continue
/// the previously-running thread, otherwise offer every runnable thread.
pub fn default_initialise(
    prior: Option<ThreadId>,
    runnable: &[(ThreadId, ActionStream)],
) -> Vec<ThreadId> {
    if let Some(p) = prior {
        if runnable.iter().any(|(t, _)| *t == p) {
            return vec![p];
        }
    }
    runnable.iter().map(|(t, _)| *t).collect()
}

/// The pre-emption bound with budget `k`.
///
/// `bound_ok(ds) = pre_empt_count(ds) <= k`. `backtrack_fn` performs two
/// insertions per raw finding: a precise one at the requested index, and a
/// conservative one at the most recent prior index where the executing
/// thread changed -- the over-approximation `loom::rt::path::Path::
/// backtrack` also performs by walking `Schedule.prev` looking for
/// `active_a != active_b`, compensating for re-orderings the bound itself
/// may have made illegal.
pub fn preemption_bound(k: usize) -> Bound {
    let bound_ok = move |decisions: &[Decision]| crate::decision::preempt_count(decisions) <= k;

    let backtrack_fn = move |_bpoints: &[BacktrackStep], tids: &[ThreadId], index: usize, tid: ThreadId| {
        let mut out = vec![(index, tid, false)];

        let mut k_idx = index;
        while k_idx > 0 {
            if tids[k_idx] != tids[k_idx - 1] {
                out.push((k_idx, tid, true));
                break;
            }
            k_idx -= 1;
        }

        out
    };

    Bound {
        bound_ok: Box::new(bound_ok),
        backtrack_fn: Box::new(backtrack_fn),
        initialise: Box::new(default_initialise),
    }
}
