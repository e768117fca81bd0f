//! The grower & frontier driver loop, and the crate's public entry points:
//! `sct_bounded`, `sct_bounded_effectful`, `sct_pre_bound`, plus a handful of
//! convenience entry points built on top of them.
//!
//! Mirrors the shape of `loom::model::Builder::check`'s driver loop: a
//! `tracing::info_span!("iter", ...)` wrapping one run, with the loop's exit
//! conditions (tree exhausted, or one of the ambient caps from
//! [`crate::config::Builder`] tripped) checked at the top of each iteration.

use std::time::Instant;

use tracing::{debug, info, info_span};

use crate::backtrack::find_backtrack;
use crate::bound::Bound;
use crate::config::Builder as Config;
use crate::decision::ThreadId;
use crate::engine::ExecutionEngine;
use crate::error::Failure;
use crate::memory::MemoryModel;
use crate::scheduler::{ReplayScheduler, SchedState};
use crate::trace::{user_trace, UserTrace};
use crate::tree::Tree;

/// The tid the first-ever step of a search is always associated with.
///
/// The core never mints tids itself, but *something* has to seed the root of
/// the tree before any thread has been observed; every engine in this corpus
/// (and the toy test engine) numbers its first thread 0, matching
/// `loom::rt::thread::Id`'s own numbering, so the root is seeded with
/// `ThreadId(0)` rather than exposed as a configurable parameter.
const ROOT_THREAD: ThreadId = ThreadId(0);

/// Installs an `SCT_LOG`-gated `tracing` subscriber around a driver run, the
/// same role `tracing_subscriber::fmt::Subscriber` plays around
/// `loom::model::model`'s call to `Builder::check` (`LOOM_LOG` there,
/// `SCT_LOG` here) -- without it, the `trace!`/`debug!`/`info!` calls
/// threaded through the driver loop and tree mutators have no subscriber to
/// report to and are silently dropped.
fn with_logging<R>(f: impl FnOnce() -> R) -> R {
    use tracing_subscriber::{fmt, EnvFilter};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_env("SCT_LOG"))
        .with_test_writer()
        .without_time()
        .finish();

    tracing::subscriber::with_default(subscriber, f)
}

/// Run a bounded search to exhaustion (or until a configured cap trips),
/// exploring every interleaving the bound permits and returning one
/// `(result, trace)` pair per iteration.
///
/// `make_engine` is called once per iteration to produce a fresh engine
/// instance -- an engine's state belongs to a single run and is discarded
/// afterwards, so the driver never reuses one across iterations.
pub fn sct_bounded<M, E>(
    bound: &Bound,
    config: &Config,
    make_engine: impl FnMut() -> E,
    computation: &dyn Fn(&mut E) -> Result<E::Value, Failure>,
) -> Vec<(Result<E::Value, Failure>, UserTrace)>
where
    M: MemoryModel + Default,
    E: ExecutionEngine<M>,
{
    let tree = Tree::initial(ROOT_THREAD);
    drive(tree, bound, config, make_engine, computation).0
}

/// Run the driver loop starting from an existing tree, returning both the
/// results produced this run and the tree as it stood when the loop
/// stopped -- shared by [`sct_bounded`] (which always starts from a fresh
/// tree) and the `checkpoint`-gated resume entry points below (which start
/// from a tree restored from an earlier snapshot).
fn drive<M, E>(
    mut tree: Tree,
    bound: &Bound,
    config: &Config,
    mut make_engine: impl FnMut() -> E,
    computation: &dyn Fn(&mut E) -> Result<E::Value, Failure>,
) -> (Vec<(Result<E::Value, Failure>, UserTrace)>, Tree)
where
    M: MemoryModel + Default,
    E: ExecutionEngine<M>,
{
    with_logging(|| drive_inner(tree, bound, config, make_engine, computation))
}

fn drive_inner<M, E>(
    mut tree: Tree,
    bound: &Bound,
    config: &Config,
    mut make_engine: impl FnMut() -> E,
    computation: &dyn Fn(&mut E) -> Result<E::Value, Failure>,
) -> (Vec<(Result<E::Value, Failure>, UserTrace)>, Tree)
where
    M: MemoryModel + Default,
    E: ExecutionEngine<M>,
{
    let mut results = Vec::new();
    let start = Instant::now();
    let mut iteration = 0usize;

    loop {
        if let Some(max) = config.max_iterations {
            if iteration >= max {
                info!(iteration, "max_iterations reached; stopping search");
                break;
            }
        }
        if let Some(max_duration) = config.max_duration {
            if start.elapsed() >= max_duration {
                info!(iteration, "max_duration elapsed; stopping search");
                break;
            }
        }
        if tree.node_count() >= config.max_branches {
            info!(iteration, "max_branches reached; stopping search");
            break;
        }

        let span = info_span!("iter", iteration);
        let _entered = span.enter();

        // 1. Claim the next entry to explore, or stop if the tree is spent.
        let claim = match tree.next() {
            Some(c) => c,
            None => {
                info!("tree exhausted; search complete");
                break;
            }
        };

        // 2. Run the computation under the replay scheduler.
        let claimed_prefix_len = claim.decisions.len();
        let mut engine = make_engine();
        let scheduler = ReplayScheduler::new(&*bound.initialise);
        let initial_state: SchedState<M> = SchedState::initial(claim.decisions);
        let (result, sched_state, trace) = engine.run(&scheduler, initial_state, computation);

        // `next` claimed this entry on the promise to reinstate it if the
        // replay did not actually end up scheduling `claim.tid` at its final
        // step -- the tree computed that step's `Decision` from the
        // tid/runnable set it had on record, but a `Continue` decision
        // resolves against whatever the engine's actual prior tid turns out
        // to be, which can diverge from the tree's expectation under a
        // non-deterministic engine. Detect the mismatch by folding the
        // actual decisions the trace recorded up to that point and comparing
        // the resulting tid. A trace too short to cover the claimed prefix
        // yet simply has nothing to check; an `Err` here is not that -- it's
        // `active_tid` reporting a malformed decision sequence, which is a
        // core bug, not a reinstate-worthy mismatch.
        let actual_claimed_tid = (trace.len() >= claimed_prefix_len).then(|| {
            let decisions: Vec<_> = trace[..claimed_prefix_len]
                .iter()
                .map(|step| step.decision.clone())
                .collect();
            crate::decision::active_tid(&decisions)
                .expect("active_tid: internal invariant violation")
        });
        if actual_claimed_tid != Some(claim.tid) {
            tree.reinstate(claim.node, claim.tid, claim.conservative);
        }

        // 3. requests = find-backtrack(...).
        let requests = find_backtrack(
            &*bound.backtrack_fn,
            &sched_state.bpoints,
            &trace,
            &sched_state.memory,
        );
        debug!(count = requests.len(), "backtrack requests found");

        // 4. tree = graft(conservative, trace, tree).
        let memory = &sched_state.memory;
        tree.graft(claim.conservative, &trace, &|t1, a1, t2, a2| {
            crate::dependency::dependent(t1, a1, t2, a2, memory)
        });

        // 5. tree = todo(bound-ok, requests, tree).
        tree.insert_todo(&*bound.bound_ok, &requests);

        // 6. Emit (result, user-trace(trace)); loop.
        results.push((result, user_trace(&trace)));
        iteration += 1;
    }

    (results, tree)
}

/// Run a bounded search, returning a JSON checkpoint of the DPOR tree
/// alongside the results so a later call to [`sct_resume`] can continue the
/// same search without re-exploring any node this run already grafted.
/// Useful for searches too large to finish in one process lifetime -- the
/// `max_iterations`/`max_duration` caps are the other half of that story;
/// this is what lets a caller actually pick the search back up afterwards.
#[cfg(feature = "checkpoint")]
pub fn sct_bounded_checkpointed<M, E>(
    bound: &Bound,
    config: &Config,
    make_engine: impl FnMut() -> E,
    computation: &dyn Fn(&mut E) -> Result<E::Value, Failure>,
) -> (Vec<(Result<E::Value, Failure>, UserTrace)>, serde_json::Result<String>)
where
    M: MemoryModel + Default,
    E: ExecutionEngine<M>,
{
    let tree = Tree::initial(ROOT_THREAD);
    let (results, tree) = drive(tree, bound, config, make_engine, computation);
    (results, tree.checkpoint())
}

/// Resume a search from a JSON checkpoint produced by
/// [`sct_bounded_checkpointed`], continuing to explore the same bound's
/// remaining todo entries.
#[cfg(feature = "checkpoint")]
pub fn sct_resume<M, E>(
    checkpoint: &str,
    bound: &Bound,
    config: &Config,
    make_engine: impl FnMut() -> E,
    computation: &dyn Fn(&mut E) -> Result<E::Value, Failure>,
) -> Result<(Vec<(Result<E::Value, Failure>, UserTrace)>, serde_json::Result<String>), serde_json::Error>
where
    M: MemoryModel + Default,
    E: ExecutionEngine<M>,
{
    let tree = Tree::restore(checkpoint)?;
    let (results, tree) = drive(tree, bound, config, make_engine, computation);
    Ok((results, tree.checkpoint()))
}

/// Same algorithm as [`sct_bounded`], but the caller's engine runs the
/// computation under its own effect context (e.g. polling a future to
/// completion); the core still drives iterations one at a time, serialised,
/// so that no two runs of the computation overlap. Since the core itself
/// performs no I/O and is already synchronous top-to-bottom, the effectful
/// variant is this same function: the asynchronous completion is entirely an
/// internal detail of the caller's [`ExecutionEngine::run`] implementation.
pub fn sct_bounded_effectful<M, E>(
    bound: &Bound,
    config: &Config,
    make_engine: impl FnMut() -> E,
    computation: &dyn Fn(&mut E) -> Result<E::Value, Failure>,
) -> Vec<(Result<E::Value, Failure>, UserTrace)>
where
    M: MemoryModel + Default,
    E: ExecutionEngine<M>,
{
    sct_bounded(bound, config, make_engine, computation)
}

/// Convenience wrapper instantiating the pre-emption bound with budget `k`,
/// using a default [`Config`].
pub fn sct_pre_bound<M, E>(
    k: usize,
    make_engine: impl FnMut() -> E,
    computation: &dyn Fn(&mut E) -> Result<E::Value, Failure>,
) -> Vec<(Result<E::Value, Failure>, UserTrace)>
where
    M: MemoryModel + Default,
    E: ExecutionEngine<M>,
{
    let bound = crate::bound::preemption_bound(k);
    let config = Config::new();
    sct_bounded(&bound, &config, make_engine, computation)
}

/// Bounded-random schedule sampling: shares the decision and replay-scheduler
/// machinery with [`sct_bounded`] but bypasses the DPOR tree entirely -- each
/// iteration draws one schedule from a seeded PRNG instead of growing and
/// re-visiting a frontier. Explicitly unsound: two iterations may replay the
/// same schedule, and there is no guarantee of covering every schedule within
/// any bound.
pub fn sct_random<M, E>(
    seed: u64,
    iterations: usize,
    mut make_engine: impl FnMut() -> E,
    computation: &dyn Fn(&mut E) -> Result<E::Value, Failure>,
) -> Vec<(Result<E::Value, Failure>, UserTrace)>
where
    M: MemoryModel + Default,
    E: ExecutionEngine<M>,
{
    use rand::SeedableRng;
    use rand_pcg::Pcg32;
    use std::cell::RefCell;

    let rng = RefCell::new(Pcg32::seed_from_u64(seed));
    let mut results = Vec::with_capacity(iterations);

    // The PRNG picks among the canonical `initialise`'s candidates by
    // Fisher-Yates-shuffling `runnable` before the deterministic replay
    // machinery sees it: `ReplayScheduler::step` always takes `choices[0]` as
    // the chosen thread and offers the rest as alternatives it will never
    // revisit, since there is no tree here to register them in.
    let initialise = |prior: Option<ThreadId>,
                       runnable: &[(ThreadId, crate::decision::ActionStream)]| {
        let mut choices: Vec<ThreadId> = if let Some(p) = prior {
            if runnable.iter().any(|(t, _)| *t == p) {
                vec![p]
            } else {
                runnable.iter().map(|(t, _)| *t).collect()
            }
        } else {
            runnable.iter().map(|(t, _)| *t).collect()
        };
        fisher_yates(&mut choices, &mut *rng.borrow_mut());
        choices
    };
    let scheduler = ReplayScheduler::new(&initialise);

    with_logging(|| {
        for i in 0..iterations {
            let span = info_span!("iter", iteration = i, mode = "random");
            let _entered = span.enter();

            let mut engine = make_engine();
            let initial_state: SchedState<M> = SchedState::initial(Vec::new());
            let (result, _sched_state, trace) =
                engine.run(&scheduler, initial_state, computation);
            results.push((result, user_trace(&trace)));
        }
    });

    results
}

fn fisher_yates(choices: &mut [ThreadId], rng: &mut impl rand::RngCore) {
    for i in (1..choices.len()).rev() {
        let j = (rng.next_u32() as usize) % (i + 1);
        choices.swap(i, j);
    }
}

/// Groups a bounded search's output by observable result, discarding the
/// traces -- the secondary view `dejafu`'s runner offers callers who only
/// care about distinct outcomes. Distinct traces and distinct results are
/// different notions of "the same run" -- sleep-set correctness is stated
/// over the former -- so this is a post-hoc projection, not a different
/// search.
pub fn distinct_results<V: PartialEq + Clone>(
    outcomes: &[(Result<V, Failure>, UserTrace)],
) -> Vec<Result<V, Failure>> {
    let mut distinct: Vec<Result<V, Failure>> = Vec::new();
    for (result, _trace) in outcomes {
        let already_seen = distinct.iter().any(|seen| match (seen, result) {
            (Ok(a), Ok(b)) => a == b,
            (Err(a), Err(b)) => a == b,
            _ => false,
        });
        if !already_seen {
            distinct.push(result.clone());
        }
    }
    distinct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_results_dedupes_by_outcome_not_trace() {
        let a: Vec<(Result<u32, Failure>, UserTrace)> = vec![
            (Ok(1), vec![]),
            (Ok(1), vec![]),
            (Ok(2), vec![]),
            (Err(Failure::Deadlock), vec![]),
            (Err(Failure::Deadlock), vec![]),
        ];
        let distinct = distinct_results(&a);
        assert_eq!(distinct.len(), 3);
    }
}
