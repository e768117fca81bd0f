//! The dependency relation.
//!
//! Kept as its own module, separate from [`crate::backtrack`]'s scanning
//! algorithm: a table-driven classifier here means a new [`ThreadAction`]
//! variant (a new transaction primitive, say) only needs a new arm added to
//! one `match`, not a change to the backtrack-point search itself.

use crate::decision::{ThreadAction, ThreadId};
use crate::memory::MemoryModel;

/// Are `(t1, a1)` and `(t2, a2)` dependent -- i.e. can they not be commuted
/// without changing the observable result?
///
/// `memory` supplies the one case the static action pair alone cannot
/// resolve: "synchronising-variable actions from the same m-var where only
/// one side is present in memory state also count as dependent when the
/// missing side would unblock the other" -- e.g. thread A about to `take`
/// an m-var that is currently empty is dependent on a `put` that hasn't
/// happened yet, because scheduling the put first changes whether the take
/// blocks.
pub fn dependent(
    t1: ThreadId,
    a1: &ThreadAction,
    t2: ThreadId,
    a2: &ThreadAction,
    memory: &dyn MemoryModel,
) -> bool {
    if t1 == t2 {
        return false;
    }

    use ThreadAction::*;
    match (a1, a2) {
        (ReadRef(r1), WriteRef(r2)) | (WriteRef(r1), ReadRef(r2)) => r1 == r2,
        (WriteRef(r1), WriteRef(r2)) => r1 == r2,

        (TakeMVar(v1), PutMVar(v2)) | (PutMVar(v1), TakeMVar(v2)) => v1 == v2,
        (PutMVar(v1), PutMVar(v2)) => v1 == v2,
        (TakeMVar(v1), TakeMVar(v2)) => v1 == v2,

        // `Spawn(t)` is dependent with any action performed by `t` itself --
        // the spawn decides whether `t` exists to act at all.
        (Spawn(spawned), _) => *spawned == t2,
        (_, Spawn(spawned)) => *spawned == t1,

        // `Stop` carries no `ThreadId` payload to name which *other* thread
        // it would be dependent with (contrast `Spawn(ThreadId)`, which
        // does). With no join/wait primitive in this action alphabet for one
        // thread to observe another's termination, two different threads'
        // `Stop`s have nothing in common to race on, so they commute freely
        // and fall through to the `_ => false` arm below.
        (Stm(refs1), Stm(refs2)) => refs1.iter().any(|r| refs2.contains(r)),

        (TakeMVar(v), action) | (action, TakeMVar(v)) => memory.mvar_take_depends(*v, action),
        (PutMVar(v), action) | (action, PutMVar(v)) => memory.mvar_put_depends(*v, action),

        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SequentialConsistency;

    const T0: ThreadId = ThreadId(0);
    const T1: ThreadId = ThreadId(1);

    #[test]
    fn read_write_same_ref_dependent() {
        let mem = SequentialConsistency::default();
        let r = crate::decision::RefId(0);
        assert!(dependent(T0, &ThreadAction::ReadRef(r), T1, &ThreadAction::WriteRef(r), &mem));
    }

    #[test]
    fn read_read_independent() {
        let mem = SequentialConsistency::default();
        let r = crate::decision::RefId(0);
        assert!(!dependent(T0, &ThreadAction::ReadRef(r), T1, &ThreadAction::ReadRef(r), &mem));
    }

    #[test]
    fn different_refs_independent() {
        let mem = SequentialConsistency::default();
        let r1 = crate::decision::RefId(0);
        let r2 = crate::decision::RefId(1);
        assert!(!dependent(T0, &ThreadAction::WriteRef(r1), T1, &ThreadAction::WriteRef(r2), &mem));
    }

    #[test]
    fn stm_overlapping_refs_dependent() {
        let mem = SequentialConsistency::default();
        let r1 = crate::decision::RefId(0);
        let r2 = crate::decision::RefId(1);
        assert!(dependent(
            T0,
            &ThreadAction::Stm(vec![r1]),
            T1,
            &ThreadAction::Stm(vec![r1, r2]),
            &mem
        ));
        assert!(!dependent(
            T0,
            &ThreadAction::Stm(vec![r1]),
            T1,
            &ThreadAction::Stm(vec![r2]),
            &mem
        ));
    }

    #[test]
    fn same_thread_never_dependent() {
        let mem = SequentialConsistency::default();
        let r = crate::decision::RefId(0);
        assert!(!dependent(T0, &ThreadAction::WriteRef(r), T0, &ThreadAction::WriteRef(r), &mem));
    }
}
