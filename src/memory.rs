//! The memory-model interface and the three supported reference
//! implementations.
//!
//! The memory model is a parameter to the execution engine and opaque to the
//! core -- the core only ever calls `memory_step`,
//! `will_block`, and `will_block_safely` through the [`MemoryModel`] trait
//! object, the same way `loom::rt::Execution` treats its causality tracking
//! (`VersionVec`, `rt::causal`) as an implementation detail behind a narrow
//! set of methods called from the scheduling hot path (`rt::execution::
//! Execution::schedule`).
//!
//! Three models ship as reference implementations so the core's test suite
//! (and any caller without its own memory model) has something concrete to
//! drive: sequential consistency, total store order (a single FIFO write
//! buffer per thread), and partial store order (one write buffer per ref).

use std::collections::{HashMap, VecDeque};

use crate::decision::{ActionStream, MVarId, RefId, ThreadAction, ThreadId};

/// The engine-side memory model contract.
pub trait MemoryModel {
    /// Fold a committed action into the model's state.
    fn memory_step(&mut self, thread: ThreadId, action: &ThreadAction);

    /// Would the lookahead's first blocking operation block given the
    /// current state, under *any* possible future (the permissive variant,
    /// used by the dependency relation's m-var special case)?
    fn will_block(&self, lookahead: &ActionStream) -> bool;

    /// Would the lookahead's first blocking operation block *indefinitely*
    /// -- i.e. no other thread can ever unblock it -- given the current
    /// state? This is the scheduler's branch-elimination filter: a choice
    /// whose lookahead would block forever is dropped before it is ever
    /// scheduled.
    fn will_block_safely(&self, lookahead: &ActionStream) -> bool;

    /// Is `take(v)` dependent with `action`, given that only one of the two
    /// m-var sides may currently be observable in this model's state?
    fn mvar_take_depends(&self, v: MVarId, action: &ThreadAction) -> bool {
        matches!(action, ThreadAction::PutMVar(v2) if *v2 == v)
    }

    /// Symmetric counterpart of [`MemoryModel::mvar_take_depends`].
    fn mvar_put_depends(&self, v: MVarId, action: &ThreadAction) -> bool {
        matches!(action, ThreadAction::TakeMVar(v2) if *v2 == v)
    }
}

#[derive(Debug, Clone, Default)]
struct MVarState {
    /// `true` once some `put` has been observed without a matching `take`.
    full: bool,
    /// `true` once *any* `put` has ever been observed -- used by
    /// `will_block_safely` to distinguish "empty, but will eventually be
    /// filled" from "empty, and nothing in this run will ever fill it".
    ever_put: bool,
}

fn blocks_on_mvar(mvars: &HashMap<MVarId, MVarState>, action: &ThreadAction) -> Option<(MVarId, bool)> {
    match action {
        ThreadAction::TakeMVar(v) => {
            let state = mvars.get(v).cloned().unwrap_or_default();
            Some((*v, !state.full))
        }
        ThreadAction::PutMVar(v) => {
            let state = mvars.get(v).cloned().unwrap_or_default();
            Some((*v, state.full))
        }
        _ => None,
    }
}

/// Sequential consistency: every thread observes every write in the same
/// total program order; there is no reordering to model, so `memory_step`
/// only needs to track m-var fullness for the blocking checks.
#[derive(Debug, Clone, Default)]
pub struct SequentialConsistency {
    mvars: HashMap<MVarId, MVarState>,
}

impl MemoryModel for SequentialConsistency {
    fn memory_step(&mut self, _thread: ThreadId, action: &ThreadAction) {
        match action {
            ThreadAction::TakeMVar(v) => {
                self.mvars.entry(*v).or_default().full = false;
            }
            ThreadAction::PutMVar(v) => {
                let state = self.mvars.entry(*v).or_default();
                state.full = true;
                state.ever_put = true;
            }
            _ => {}
        }
    }

    fn will_block(&self, lookahead: &ActionStream) -> bool {
        match lookahead.first() {
            Some(action) => blocks_on_mvar(&self.mvars, action)
                .map(|(_, blocks)| blocks)
                .unwrap_or(false),
            None => false,
        }
    }

    fn will_block_safely(&self, lookahead: &ActionStream) -> bool {
        match lookahead.first() {
            Some(ThreadAction::TakeMVar(v)) => {
                let state = self.mvars.get(v).cloned().unwrap_or_default();
                // Blocks, and no `put` has ever been observed: it never will
                // be within this run, since puts are only ever introduced by
                // the same fixed set of threads the trace already covers.
                !state.full && !state.ever_put
            }
            Some(ThreadAction::PutMVar(v)) => {
                let state = self.mvars.get(v).cloned().unwrap_or_default();
                // A full mvar with nobody left to take it blocks forever;
                // we can't see the future schedule, so treat a currently-full
                // slot as only *possibly* safe to rule out -- conservatively
                // report `false` (a future take might still be scheduled).
                let _ = state;
                false
            }
            _ => false,
        }
    }
}

/// Total store order: each thread has a single FIFO write buffer; a thread
/// always sees its own writes immediately but other threads only see them
/// once the buffer commits, in order.
#[derive(Debug, Clone, Default)]
pub struct TotalStoreOrder {
    mvars: HashMap<MVarId, MVarState>,
    buffers: HashMap<ThreadId, VecDeque<(RefId, u64)>>,
    committed: HashMap<RefId, u64>,
}

impl TotalStoreOrder {
    /// Commit the oldest buffered write for `thread`, if any.
    pub fn drain_one(&mut self, thread: ThreadId) {
        if let Some(buf) = self.buffers.get_mut(&thread) {
            if let Some((r, val)) = buf.pop_front() {
                self.committed.insert(r, val);
            }
        }
    }
}

impl MemoryModel for TotalStoreOrder {
    fn memory_step(&mut self, thread: ThreadId, action: &ThreadAction) {
        match action {
            ThreadAction::WriteRef(r) => {
                let seq = self.committed.len() as u64;
                self.buffers.entry(thread).or_default().push_back((*r, seq));
            }
            ThreadAction::TakeMVar(v) => {
                self.mvars.entry(*v).or_default().full = false;
            }
            ThreadAction::PutMVar(v) => {
                let state = self.mvars.entry(*v).or_default();
                state.full = true;
                state.ever_put = true;
            }
            _ => {}
        }
    }

    fn will_block(&self, lookahead: &ActionStream) -> bool {
        matches!(
            lookahead.first(),
            Some(ThreadAction::TakeMVar(v)) if !self.mvars.get(v).map(|s| s.full).unwrap_or(false)
        )
    }

    fn will_block_safely(&self, lookahead: &ActionStream) -> bool {
        matches!(
            lookahead.first(),
            Some(ThreadAction::TakeMVar(v))
                if !self.mvars.get(v).map(|s| s.full).unwrap_or(false)
                    && !self.mvars.get(v).map(|s| s.ever_put).unwrap_or(false)
        )
    }
}

/// Partial store order: like [`TotalStoreOrder`], but buffered per
/// `(thread, ref)` pair rather than per thread, so writes to different refs
/// from the same thread may commit out of the order they were issued.
#[derive(Debug, Clone, Default)]
pub struct PartialStoreOrder {
    mvars: HashMap<MVarId, MVarState>,
    buffers: HashMap<(ThreadId, RefId), VecDeque<u64>>,
}

impl PartialStoreOrder {
    pub fn drain_one(&mut self, thread: ThreadId, r: RefId) {
        if let Some(buf) = self.buffers.get_mut(&(thread, r)) {
            buf.pop_front();
        }
    }
}

impl MemoryModel for PartialStoreOrder {
    fn memory_step(&mut self, thread: ThreadId, action: &ThreadAction) {
        match action {
            ThreadAction::WriteRef(r) => {
                self.buffers.entry((thread, *r)).or_default().push_back(0);
            }
            ThreadAction::TakeMVar(v) => {
                self.mvars.entry(*v).or_default().full = false;
            }
            ThreadAction::PutMVar(v) => {
                let state = self.mvars.entry(*v).or_default();
                state.full = true;
                state.ever_put = true;
            }
            _ => {}
        }
    }

    fn will_block(&self, lookahead: &ActionStream) -> bool {
        matches!(
            lookahead.first(),
            Some(ThreadAction::TakeMVar(v)) if !self.mvars.get(v).map(|s| s.full).unwrap_or(false)
        )
    }

    fn will_block_safely(&self, lookahead: &ActionStream) -> bool {
        matches!(
            lookahead.first(),
            Some(ThreadAction::TakeMVar(v))
                if !self.mvars.get(v).map(|s| s.full).unwrap_or(false)
                    && !self.mvars.get(v).map(|s| s.ever_put).unwrap_or(false)
        )
    }
}
