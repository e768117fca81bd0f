//! Decisions and thread actions.
//!
//! A [`Decision`] is the classification of one scheduling step: the very
//! first step of an execution, a continuation of the previously running
//! thread, or a pre-emptive switch to another runnable thread. [`ThreadAction`]
//! classifies what the scheduled thread actually did (or, in lookahead form,
//! what it is about to do) so that [`crate::backtrack`] can apply the
//! dependency relation to it.

use std::fmt;

use crate::error::InvariantViolation;

/// An opaque, ordered, hashable thread identifier.
///
/// The core never mints these itself -- an execution engine hands them out
/// as threads are spawned, the same way `loom::rt::thread::Id` is minted by
/// `Execution::new_thread`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
pub struct ThreadId(pub u32);

impl ThreadId {
    pub const fn new(id: u32) -> Self {
        ThreadId(id)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// An opaque identifier for a plain shared reference cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
pub struct RefId(pub u32);

/// An opaque identifier for a synchronising m-var (a single-slot blocking
/// mailbox, as in the original `MVar` this action set was distilled from).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
pub struct MVarId(pub u32);

/// The closed set of actions a thread may perform in one step.
///
/// This is deliberately a flat, closed enum rather than an open trait object:
/// the dependency relation is a total function over pairs of this set, and a
/// table-driven classifier over a closed set is far easier to keep exhaustive
/// than pattern-matching over a trait.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
pub enum ThreadAction {
    /// Read a plain shared reference.
    ReadRef(RefId),
    /// Write a plain shared reference.
    WriteRef(RefId),
    /// Take (empty) an m-var, blocking if it is empty.
    TakeMVar(MVarId),
    /// Put a value into an m-var, blocking if it is full.
    PutMVar(MVarId),
    /// Spawn a new thread.
    Spawn(ThreadId),
    /// The thread terminated.
    Stop,
    /// A software-transactional-memory transaction touching this set of refs.
    Stm(Vec<RefId>),
    /// An opaque side effect run through the effect runner; never dependent
    /// on anything save another `LiftExternal` from the same thread (handled
    /// naturally since `dependent` requires `t1 != t2`).
    LiftExternal,
}

impl ThreadAction {
    /// The refs an STM transaction touches, for any other action `&[]`.
    pub fn stm_refs(&self) -> &[RefId] {
        match self {
            ThreadAction::Stm(refs) => refs,
            _ => &[],
        }
    }
}

/// A lazily-consumed sequence of prospective actions, as reported by the
/// execution engine's lookahead before a step is committed: what a thread
/// would do next, and what it would do after that, and so on.
///
/// The replay scheduler only ever inspects the head; later entries matter
/// only to the memory model's `will_block`/`will_block_safely` checks, which
/// may need to peek further to tell whether a blocking operation could ever
/// be satisfied.
pub type ActionStream = Vec<ThreadAction>;

/// One scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
pub enum Decision {
    /// First step, or resume after the previously running thread became
    /// non-runnable.
    Start(ThreadId),
    /// Run the same thread as the previous step.
    Continue,
    /// Pre-empt the running thread for another runnable one.
    SwitchTo(ThreadId),
}

/// Recovers the actual tid a decision refers to, given the tid that was
/// active before it.
pub fn tid_of(default: ThreadId, decision: &Decision) -> ThreadId {
    match decision {
        Decision::Start(t) | Decision::SwitchTo(t) => *t,
        Decision::Continue => default,
    }
}

/// Classifies a transition from `prior` to `chosen`, given which tids were
/// runnable at the time.
pub fn decision_of(
    prior: Option<ThreadId>,
    runnable: &[ThreadId],
    chosen: ThreadId,
) -> Decision {
    match prior {
        None => Decision::Start(chosen),
        Some(p) if p == chosen => Decision::Continue,
        Some(p) if runnable.contains(&p) => Decision::SwitchTo(chosen),
        Some(_) => Decision::Start(chosen),
    }
}

/// Folds [`tid_of`] over a sequence to recover the tid active after the last
/// decision in it.
///
/// The sequence must begin with a `Start`; anything else is an internal
/// invariant violation, not a reportable [`crate::error::Failure`].
pub fn active_tid(decisions: &[Decision]) -> Result<ThreadId, InvariantViolation> {
    let mut iter = decisions.iter();
    let first = match iter.next() {
        Some(d) => d,
        None => return Err(InvariantViolation::new("active_tid: empty decision sequence")),
    };

    let mut current = match first {
        Decision::Start(t) => *t,
        _ => {
            return Err(InvariantViolation::new(
                "active_tid: decision sequence does not begin with Start",
            ))
        }
    };

    for decision in iter {
        current = tid_of(current, decision);
    }

    Ok(current)
}

/// Counts the pre-emptive context switches in a decision sequence.
///
/// Counts `SwitchTo` occurrences. By construction of [`decision_of`], a step
/// only classifies as `SwitchTo` when the previously active thread was still
/// in the `runnable` set passed to it; a thread that voluntarily ceded
/// control by becoming non-runnable (the `loom::rt::thread::State::Yield`
/// idiom of marking a thread specially rather than leaving it `Runnable`) is
/// excluded from `runnable` by the caller and therefore surfaces as `Start`,
/// not `SwitchTo`. So "the pre-empted thread was not itself about to yield"
/// is enforced upstream, at the point the caller builds the `runnable` slice
/// handed to `decision_of`, rather than re-derived here from the decisions
/// alone.
pub fn preempt_count(decisions: &[Decision]) -> usize {
    decisions
        .iter()
        .filter(|d| matches!(d, Decision::SwitchTo(_)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: ThreadId = ThreadId(0);
    const T1: ThreadId = ThreadId(1);
    const T2: ThreadId = ThreadId(2);

    #[test]
    fn tid_of_laws() {
        assert_eq!(tid_of(T0, &Decision::Continue), T0);
        assert_eq!(tid_of(T0, &Decision::Start(T1)), T1);
        assert_eq!(tid_of(T0, &Decision::SwitchTo(T1)), T1);
    }

    #[test]
    fn decision_of_idempotent_on_normalisation() {
        let runnable = [T0, T1];
        for &t in &[T0, T1] {
            let d = decision_of(Some(T0), &runnable, t);
            let recovered = tid_of(T0, &d);
            assert_eq!(decision_of(Some(T0), &runnable, recovered), d);
        }
    }

    #[test]
    fn decision_of_classifies() {
        assert_eq!(decision_of(None, &[], T0), Decision::Start(T0));
        assert_eq!(decision_of(Some(T0), &[T0, T1], T0), Decision::Continue);
        assert_eq!(
            decision_of(Some(T0), &[T0, T1], T1),
            Decision::SwitchTo(T1)
        );
        // prior not runnable (became blocked/terminated) => Start, not SwitchTo
        assert_eq!(decision_of(Some(T0), &[T1], T1), Decision::Start(T1));
    }

    #[test]
    fn active_tid_requires_leading_start() {
        assert!(active_tid(&[Decision::Continue]).is_err());
        assert!(active_tid(&[]).is_err());

        let seq = vec![
            Decision::Start(T0),
            Decision::Continue,
            Decision::SwitchTo(T1),
            Decision::Continue,
        ];
        assert_eq!(active_tid(&seq).unwrap(), T1);
    }

    #[test]
    fn preempt_count_counts_switches() {
        let seq = vec![
            Decision::Start(T0),
            Decision::SwitchTo(T1),
            Decision::Continue,
            Decision::SwitchTo(T2),
        ];
        assert_eq!(preempt_count(&seq), 2);
    }
}
