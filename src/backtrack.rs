//! The backtrack-point finder.
//!
//! Scans a completed [`Trace`] for dependent pairs of actions and, for each
//! one found, locates the tree position a re-ordering has to be registered
//! at. The bound's `backtrack_fn` then gets a chance to amplify each raw
//! finding -- the bundled pre-emption bound uses this to also register a
//! conservative branch, the same over-approximation `loom::rt::path::Path::
//! backtrack`'s `preemption_bound.is_some()` branch performs when walking
//! back through `Schedule.prev` links looking for the most recent point the
//! active thread changed.

use crate::decision::{Decision, ThreadId};
use crate::memory::MemoryModel;
use crate::scheduler::BacktrackStep;
use crate::trace::Trace;

/// A request to insert (or upgrade) a todo entry at a tree node, identified
/// by the decision path that reaches it.
#[derive(Debug, Clone)]
pub struct BacktrackRequest {
    pub path: Vec<Decision>,
    pub tid: ThreadId,
    pub conservative: bool,
}

/// The bound's amplification function: given the raw (index, tid) finding
/// from the dependency scan, plus the executing-thread-per-step sequence the
/// scan itself used (needed to locate "the most recent point the executing
/// thread changed" -- not reconstructible from `bpoints` alone, since that
/// only carries runnable/alternatives, not which tid actually ran), produce
/// the final set of `(index, tid, conservative)` insertions.
pub type BacktrackFn =
    dyn Fn(&[BacktrackStep], &[ThreadId], usize, ThreadId) -> Vec<(usize, ThreadId, bool)>;

/// Scans a completed trace backward from each step, applying the dependency
/// relation to locate points where a different interleaving needs to be
/// scheduled, and returns the resulting backtrack requests.
pub fn find_backtrack<M: MemoryModel>(
    backtrack_fn: &BacktrackFn,
    bpoints: &[BacktrackStep],
    trace: &Trace,
    memory: &M,
) -> Vec<BacktrackRequest> {
    if trace.is_empty() {
        return Vec::new();
    }

    let tids = executing_tids(trace);

    let mut raw: Vec<(usize, ThreadId)> = Vec::new();

    for i in 0..trace.len() {
        let t_i = tids[i];
        let a_i = &trace[i].action;

        for j in (0..i).rev() {
            let t_j = tids[j];
            let a_j = &trace[j].action;

            if crate::dependency::dependent(t_i, a_i, t_j, a_j, memory) {
                if let Some(k) = locate_backtrack_point(j, t_i, &tids, bpoints) {
                    raw.push((k, t_i));
                }
            }
        }
    }

    let mut requests = Vec::new();
    for (index, tid) in raw {
        for (idx, t, conservative) in backtrack_fn(bpoints, &tids, index, tid) {
            requests.push(BacktrackRequest {
                path: decision_prefix(trace, idx),
                tid: t,
                conservative,
            });
        }
    }
    requests
}

fn executing_tids(trace: &Trace) -> Vec<ThreadId> {
    let mut tids = Vec::with_capacity(trace.len());
    let mut prior: Option<ThreadId> = None;
    for step in trace {
        let default = match &step.decision {
            Decision::Start(t) => *t,
            _ => prior.expect("non-Start decision with no prior tid"),
        };
        let t = crate::decision::tid_of(default, &step.decision);
        tids.push(t);
        prior = Some(t);
    }
    tids
}

/// Find the largest `k <= j` such that `t_i` was either runnable or offered
/// as an alternative at step `k`, with no intervening step by `t_i` between
/// `k` and `j` (exclusive of `k`, inclusive up to but not past `j`).
fn locate_backtrack_point(
    j: usize,
    t_i: ThreadId,
    tids: &[ThreadId],
    bpoints: &[BacktrackStep],
) -> Option<usize> {
    for k in (0..=j).rev() {
        let offered = bpoints
            .get(k)
            .map(|bp| {
                bp.runnable.iter().any(|(t, _)| *t == t_i) || bp.alternatives.contains(&t_i)
            })
            .unwrap_or(false);

        if offered {
            let no_intervening = tids[(k + 1)..=j].iter().all(|t| *t != t_i);
            if no_intervening {
                return Some(k);
            }
        }
    }
    None
}

fn decision_prefix(trace: &Trace, index: usize) -> Vec<Decision> {
    trace[..index].iter().map(|s| s.decision.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ThreadAction;
    use crate::memory::SequentialConsistency;
    use crate::trace::TraceStep;

    const T0: ThreadId = ThreadId(0);
    const T1: ThreadId = ThreadId(1);

    fn precise_only(
        _bpoints: &[BacktrackStep],
        _tids: &[ThreadId],
        index: usize,
        tid: ThreadId,
    ) -> Vec<(usize, ThreadId, bool)> {
        vec![(index, tid, false)]
    }

    #[test]
    fn finds_backtrack_point_for_racing_writes() {
        let r = crate::decision::RefId(0);

        // T0 writes r, then T0 stops; T1 reads r after. They race.
        let trace: Trace = vec![
            TraceStep {
                decision: Decision::Start(T0),
                alternatives: vec![(T1, ThreadAction::ReadRef(r))],
                action: ThreadAction::WriteRef(r),
            },
            TraceStep {
                decision: Decision::Continue,
                alternatives: vec![],
                action: ThreadAction::Stop,
            },
            TraceStep {
                decision: Decision::Start(T1),
                alternatives: vec![],
                action: ThreadAction::ReadRef(r),
            },
        ];

        let bpoints = vec![
            BacktrackStep {
                runnable: vec![
                    (T0, ThreadAction::WriteRef(r)),
                    (T1, ThreadAction::ReadRef(r)),
                ],
                alternatives: vec![T1],
            },
            BacktrackStep {
                runnable: vec![(T0, ThreadAction::Stop)],
                alternatives: vec![],
            },
            BacktrackStep {
                runnable: vec![(T1, ThreadAction::ReadRef(r))],
                alternatives: vec![],
            },
        ];

        let memory = SequentialConsistency::default();
        let requests = find_backtrack(&precise_only, &bpoints, &trace, &memory);

        assert!(!requests.is_empty());
        assert!(requests
            .iter()
            .any(|r| r.tid == T1 && r.path.is_empty() && !r.conservative));
    }

    #[test]
    fn independent_actions_produce_no_requests() {
        let r1 = crate::decision::RefId(0);
        let r2 = crate::decision::RefId(1);

        let trace: Trace = vec![
            TraceStep {
                decision: Decision::Start(T0),
                alternatives: vec![(T1, ThreadAction::WriteRef(r2))],
                action: ThreadAction::WriteRef(r1),
            },
            TraceStep {
                decision: Decision::SwitchTo(T1),
                alternatives: vec![],
                action: ThreadAction::WriteRef(r2),
            },
        ];
        let bpoints = vec![
            BacktrackStep {
                runnable: vec![
                    (T0, ThreadAction::WriteRef(r1)),
                    (T1, ThreadAction::WriteRef(r2)),
                ],
                alternatives: vec![T1],
            },
            BacktrackStep {
                runnable: vec![(T1, ThreadAction::WriteRef(r2))],
                alternatives: vec![],
            },
        ];

        let memory = SequentialConsistency::default();
        let requests = find_backtrack(&precise_only, &bpoints, &trace, &memory);
        assert!(requests.is_empty());
    }
}
