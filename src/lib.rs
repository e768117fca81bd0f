//! `sct`: a bounded dynamic partial-order reduction (DPOR) search core for
//! systematic concurrency testing.
//!
//! This crate is the search driver at the heart of a systematic concurrency
//! tester, in the tradition of `dejafu`: given a computation that performs a
//! closed set of concurrency actions (shared references, m-vars, STM,
//! thread spawn/stop), it explores every schedule a bound predicate permits
//! exactly once up to sleep-set equivalence, replaying each one
//! deterministically and discovering new interleavings to try from the
//! dependencies it observes between actions.
//!
//! The crate does not itself simulate threads, references, or m-vars --
//! that is the caller's [`ExecutionEngine`] and [`MemoryModel`], the same
//! separation `loom::model::Builder::check` draws between its driver loop
//! and the user's closure run under `loom::rt`. What lives here is the
//! search machinery: the DPOR tree, the replay scheduler, the
//! backtrack-point finder, and the bound plug-in interface, plus the
//! driver loop that ties them together.
//!
//! ## Example shape
//!
//! ```ignore
//! use sct::{sct_pre_bound, ExecutionEngine};
//!
//! let results = sct_pre_bound(2, make_engine, &|engine| my_computation(engine));
//! for (result, trace) in results {
//!     // inspect result / trace
//! }
//! ```

mod backtrack;
mod bound;
mod config;
mod decision;
mod dependency;
mod driver;
mod engine;
mod error;
mod memory;
mod scheduler;
mod trace;
mod tree;

pub use backtrack::{find_backtrack, BacktrackFn, BacktrackRequest};
pub use bound::{default_initialise, preemption_bound, Bound, BoundOk, Initialise};
pub use config::Builder;
pub use decision::{
    active_tid, decision_of, preempt_count, tid_of, ActionStream, Decision, MVarId, RefId,
    ThreadAction, ThreadId,
};
pub use dependency::dependent;
pub use driver::{distinct_results, sct_bounded, sct_bounded_effectful, sct_pre_bound, sct_random};
#[cfg(feature = "checkpoint")]
pub use driver::{sct_bounded_checkpointed, sct_resume};
pub use engine::{ExecutionEngine, Scheduler};
pub use error::{Failure, InvariantViolation};
pub use memory::{MemoryModel, PartialStoreOrder, SequentialConsistency, TotalStoreOrder};
pub use scheduler::{BacktrackStep, ReplayScheduler, SchedState};
pub use trace::{tid_at, user_trace, Trace, TraceStep, UserTrace};
