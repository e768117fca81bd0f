//! A toy [`sct::ExecutionEngine`] driving a fixed, per-thread script of
//! [`sct::ThreadAction`]s -- just enough of a concurrency substrate (shared
//! refs that never block, m-vars that do) to exercise the driver end to end,
//! grounded in how `loom`'s own `tests/smoke.rs`/`tests/mutex.rs` exercise
//! the runtime through small closures passed to `loom::model`. Not part of
//! the library's public surface.

use std::collections::{BTreeMap, BTreeSet};

use sct::{
    tid_of, ActionStream, ExecutionEngine, Failure, MVarId, MemoryModel, RefId, SchedState,
    Scheduler, ThreadAction, ThreadId, Trace, TraceStep,
};

/// The fixed sequence of actions one simulated thread performs, in order.
pub type Script = Vec<ThreadAction>;

/// A toy execution engine: every thread's behaviour is a static script fed
/// in up front by the test, plus a `finish` closure that reads back the
/// simulated refs/m-vars once the run completes -- the toy analogue of the
/// value a real computation would return from its main thread.
pub struct ToyEngine<V> {
    scripts: BTreeMap<ThreadId, Script>,
    cursors: BTreeMap<ThreadId, usize>,
    /// Values written by a `WriteRef`/`PutMVar` step, keyed by the step's
    /// position in its thread's script (actions themselves carry no payload,
    /// per the closed `ThreadAction` alphabet -- the toy engine stores the
    /// data alongside, out of band).
    write_values: BTreeMap<(ThreadId, usize), i64>,
    ref_values: BTreeMap<RefId, i64>,
    mvar_values: BTreeMap<MVarId, i64>,
    mvar_full: BTreeMap<MVarId, bool>,
    /// What a `ReadRef`/`TakeMVar` step actually observed, keyed by its
    /// position in its thread's script -- captured at the moment the step
    /// executes, since `ref_value`/`mvar_value` alone only ever reflect the
    /// *final* state once the whole run has completed.
    reads: BTreeMap<(ThreadId, usize), i64>,
    /// `WriteRef` steps marked as "write back what the immediately
    /// preceding `ReadRef` in this script observed, plus one" -- models a
    /// non-atomic read-modify-write increment without needing `ThreadAction`
    /// to carry a closure.
    increments: BTreeSet<(ThreadId, usize)>,
    /// Threads the run has actually observed a `Spawn` for (plus the root),
    /// gating [`ToyEngine::pending`] -- matches `Tree::initial`'s own
    /// invariant that only the root tid is runnable before anything executes.
    activated: BTreeSet<ThreadId>,
    finish: Box<dyn Fn(&ToyEngine<V>) -> V>,
}

impl<V> ToyEngine<V> {
    pub fn new(root: ThreadId, finish: impl Fn(&ToyEngine<V>) -> V + 'static) -> Self {
        let mut activated = BTreeSet::new();
        activated.insert(root);
        ToyEngine {
            scripts: BTreeMap::new(),
            cursors: BTreeMap::new(),
            write_values: BTreeMap::new(),
            ref_values: BTreeMap::new(),
            mvar_values: BTreeMap::new(),
            mvar_full: BTreeMap::new(),
            reads: BTreeMap::new(),
            increments: BTreeSet::new(),
            activated,
            finish: Box::new(finish),
        }
    }

    /// Register a thread's script, to run once it has been spawned (the
    /// root thread is always already spawned). Every script must end with
    /// `ThreadAction::Stop`.
    pub fn spawn(&mut self, tid: ThreadId, script: Script) {
        debug_assert_eq!(
            script.last(),
            Some(&ThreadAction::Stop),
            "toy engine scripts must end with Stop"
        );
        self.cursors.insert(tid, 0);
        self.scripts.insert(tid, script);
    }

    /// Attach a value to a `WriteRef`/`PutMVar` step at `index` in `tid`'s
    /// script, observed via [`ToyEngine::ref_value`]/[`ToyEngine::mvar_value`]
    /// once that step has executed.
    pub fn set_write_value(&mut self, tid: ThreadId, index: usize, value: i64) {
        self.write_values.insert((tid, index), value);
    }

    /// Mark the `WriteRef` step at `index` as a non-atomic increment of
    /// whatever the immediately preceding step in the same script read.
    pub fn set_increment(&mut self, tid: ThreadId, index: usize) {
        self.increments.insert((tid, index));
    }

    /// Seed an m-var as already full before the run starts (e.g. a fork
    /// that is initially on the table in a dining-philosophers setup).
    pub fn prefill_mvar(&mut self, v: MVarId, value: i64) {
        self.mvar_full.insert(v, true);
        self.mvar_values.insert(v, value);
    }

    /// The current value of a shared ref (0 if never written).
    pub fn ref_value(&self, r: RefId) -> i64 {
        self.ref_values.get(&r).copied().unwrap_or(0)
    }

    /// The current value of an m-var (0 if never put).
    pub fn mvar_value(&self, v: MVarId) -> i64 {
        self.mvar_values.get(&v).copied().unwrap_or(0)
    }

    /// What `tid`'s `ReadRef`/`TakeMVar` step at `index` actually observed.
    pub fn observed_at(&self, tid: ThreadId, index: usize) -> i64 {
        self.reads.get(&(tid, index)).copied().unwrap_or(0)
    }

    fn pending(&self) -> Vec<(ThreadId, ActionStream)> {
        self.scripts
            .iter()
            .filter_map(|(tid, script)| {
                if !self.activated.contains(tid) {
                    return None;
                }
                let cursor = self.cursors[tid];
                if cursor < script.len() {
                    Some((*tid, script[cursor..].to_vec()))
                } else {
                    None
                }
            })
            .collect()
    }

    fn currently_blocked(&self, stream: &ActionStream) -> bool {
        match stream.first() {
            Some(ThreadAction::TakeMVar(v)) => !self.mvar_full.get(v).copied().unwrap_or(false),
            Some(ThreadAction::PutMVar(v)) => self.mvar_full.get(v).copied().unwrap_or(false),
            _ => false,
        }
    }

    fn take_next_action(&mut self, tid: ThreadId) -> ThreadAction {
        let cursor = self.cursors.get_mut(&tid).expect("unknown thread");
        let index = *cursor;
        let action = self.scripts[&tid][index].clone();
        *cursor += 1;

        match &action {
            ThreadAction::ReadRef(r) => {
                self.reads.insert((tid, index), self.ref_value(*r));
            }
            ThreadAction::WriteRef(r) => {
                if self.increments.contains(&(tid, index)) {
                    let prior = self.reads.get(&(tid, index.wrapping_sub(1))).copied().unwrap_or(0);
                    self.ref_values.insert(*r, prior + 1);
                } else if let Some(v) = self.write_values.get(&(tid, index)).copied() {
                    self.ref_values.insert(*r, v);
                }
            }
            ThreadAction::TakeMVar(v) => {
                self.reads.insert((tid, index), self.mvar_value(*v));
                self.mvar_full.insert(*v, false);
            }
            ThreadAction::PutMVar(v) => {
                if let Some(val) = self.write_values.get(&(tid, index)).copied() {
                    self.mvar_values.insert(*v, val);
                }
                self.mvar_full.insert(*v, true);
            }
            ThreadAction::Spawn(child) => {
                self.activated.insert(*child);
            }
            _ => {}
        }

        action
    }
}

impl<M: MemoryModel, V> ExecutionEngine<M> for ToyEngine<V> {
    type Value = V;

    fn run<S: Scheduler<M>>(
        &mut self,
        scheduler: &S,
        mut state: SchedState<M>,
        computation: &dyn Fn(&mut Self) -> Result<Self::Value, Failure>,
    ) -> (Result<Self::Value, Failure>, SchedState<M>, Trace) {
        // `computation` here only performs setup (registering scripts); its
        // returned value is discarded since the toy engine computes the
        // actual result from final ref/m-var state via `finish` once the
        // schedule has run to completion.
        if let Err(f) = computation(self) {
            return (Err(f), state, Vec::new());
        }

        let mut trace: Trace = Vec::new();
        let mut prior_step: Option<TraceStep> = None;
        let mut active: Option<ThreadId> = None;

        loop {
            let pending = self.pending();
            let runnable: Vec<(ThreadId, ActionStream)> = pending
                .iter()
                .filter(|(_, stream)| !self.currently_blocked(stream))
                .cloned()
                .collect();

            if runnable.is_empty() {
                return if pending.is_empty() {
                    (Ok((self.finish)(self)), state, trace)
                } else {
                    (Err(Failure::Deadlock), state, trace)
                };
            }

            let decision = match scheduler.schedule(&mut state, prior_step.as_ref(), &runnable) {
                Some(d) => d,
                None => return (Err(Failure::Abort), state, trace),
            };

            let default = active.unwrap_or(ThreadId(0));
            let tid = tid_of(default, &decision);

            let alternatives: Vec<(ThreadId, ThreadAction)> = runnable
                .iter()
                .filter(|(t, _)| *t != tid)
                .map(|(t, stream)| (*t, stream[0].clone()))
                .collect();

            let action = self.take_next_action(tid);

            let step = TraceStep {
                decision,
                alternatives,
                action,
            };
            trace.push(step.clone());
            prior_step = Some(step);
            active = Some(tid);
        }
    }
}
