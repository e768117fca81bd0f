//! The DPOR exploration tree.
//!
//! A [`Tree`] is a pure prefix tree: nodes are stored in a flat arena (no
//! back-edges, no sharing) -- the same choice `loom::rt::object::Store` makes
//! for its own branch arena in `rt::path::Path`. Every mutator here keeps the
//! tree's structural invariants (done/todo disjoint, every tracked tid a
//! member of runnable, and so on); in debug builds they are double-checked
//! after every [`Tree::graft`] and [`Tree::insert_todo`], mirroring the
//! `assert_path_len!`/`debug_assert!` style `loom::rt::path` uses to guard its
//! own branch bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::backtrack::BacktrackRequest;
use crate::decision::{Decision, ThreadAction, ThreadId};
use crate::trace::Trace;

/// An arena index into a [`Tree`]. Not exposed outside the crate; callers
/// only ever see the decision sequences [`Tree::next`] hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct NodeId(usize);

#[derive(Debug)]
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
struct Node {
    #[allow(dead_code)]
    parent: Option<NodeId>,
    /// The decision that reaches this node from its parent; `None` only at
    /// the root (invariant 3).
    incoming_decision: Option<Decision>,
    /// The tid that acted to reach this node (`None` only at the root);
    /// doubles as the "prior" tid for classifying the next decision out of
    /// this node.
    reached_by_tid: Option<ThreadId>,

    runnable: BTreeSet<ThreadId>,
    todo: BTreeMap<ThreadId, bool>,
    done: BTreeMap<ThreadId, NodeId>,
    sleep: BTreeMap<ThreadId, ThreadAction>,
    taken: BTreeMap<ThreadId, ThreadAction>,
}

impl Node {
    fn check_invariants(&self) {
        debug_assert!(
            self.done.keys().all(|t| !self.todo.contains_key(t)),
            "invariant 1: done and todo must be disjoint"
        );
        for t in self.done.keys().chain(self.todo.keys()).chain(self.sleep.keys()).chain(self.taken.keys()) {
            debug_assert!(
                self.runnable.contains(t),
                "invariant 2: {:?} not a member of runnable",
                t
            );
        }
    }
}

/// A claimed exploration point: the full decision sequence the replay
/// scheduler must follow (including the decision for the newly-claimed todo
/// entry), and whether that entry was conservative.
#[derive(Debug, Clone)]
pub struct Claim {
    pub decisions: Vec<Decision>,
    pub conservative: bool,
    pub(crate) node: NodeId,
    pub(crate) tid: ThreadId,
}

/// The DPOR exploration tree: every node reached so far, plus the pending
/// todo/sleep/done bookkeeping the search uses to decide what to explore
/// next.
#[cfg_attr(feature = "checkpoint", derive(serde::Serialize, serde::Deserialize))]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// A fresh tree with just a root node, carrying `root_tid` as its one
    /// pending todo entry.
    pub fn initial(root_tid: ThreadId) -> Tree {
        let mut runnable = BTreeSet::new();
        runnable.insert(root_tid);
        let mut todo = BTreeMap::new();
        todo.insert(root_tid, false);

        Tree {
            nodes: vec![Node {
                parent: None,
                incoming_decision: None,
                reached_by_tid: None,
                runnable,
                todo,
                done: BTreeMap::new(),
                sleep: BTreeMap::new(),
                taken: BTreeMap::new(),
            }],
        }
    }

    /// Follows the tree along `trace`'s decisions, creating any missing
    /// children and updating existing ones.
    ///
    /// `dependent` computes a newly-created child's sleep set; the driver
    /// supplies it bound to the memory model state at the end of the run
    /// that produced `trace`.
    pub fn graft(
        &mut self,
        conservative: bool,
        trace: &Trace,
        dependent: &dyn Fn(ThreadId, &ThreadAction, ThreadId, &ThreadAction) -> bool,
    ) {
        let mut current = NodeId(0);
        let mut prior: Option<ThreadId> = None;

        for step in trace {
            let default = match &step.decision {
                Decision::Start(t) => *t,
                _ => prior.expect("non-Start decision with no prior tid"),
            };
            let t = crate::decision::tid_of(default, &step.decision);

            let mut runnable_here: BTreeSet<ThreadId> =
                step.alternatives.iter().map(|(id, _)| *id).collect();
            runnable_here.insert(t);

            let child_id = match self.nodes[current.0].done.get(&t).copied() {
                Some(existing) => existing,
                None => {
                    let parent = &self.nodes[current.0];
                    let mut sleep_child = BTreeMap::new();
                    for (tp, ap) in parent.sleep.iter().chain(parent.taken.iter()) {
                        if *tp == t {
                            continue;
                        }
                        if !dependent(t, &step.action, *tp, ap) {
                            sleep_child.insert(*tp, ap.clone());
                        }
                    }

                    let new_node = Node {
                        parent: Some(current),
                        incoming_decision: Some(step.decision.clone()),
                        reached_by_tid: Some(t),
                        runnable: runnable_here,
                        todo: BTreeMap::new(),
                        done: BTreeMap::new(),
                        sleep: sleep_child,
                        taken: BTreeMap::new(),
                    };

                    let id = NodeId(self.nodes.len());
                    self.nodes.push(new_node);
                    self.nodes[current.0].done.insert(t, id);
                    trace!(thread = ?t, node = id.0, "grafted new node");
                    id
                }
            };

            if !conservative {
                self.nodes[current.0].taken.insert(t, step.action.clone());
            }
            self.nodes[current.0].todo.remove(&t);
            self.nodes[current.0].check_invariants();

            current = child_id;
            prior = Some(t);
        }
    }

    /// Admits a batch of backtrack requests as new or upgraded todo entries,
    /// subject to the bound predicate. A request whose tid is not runnable at
    /// the target node wakes every runnable tid there instead, since there is
    /// no way to pinpoint which one the caller actually meant to wake.
    ///
    /// `bound_ok` is checked against the full decision sequence a claim of
    /// this entry would eventually replay -- `request.path` plus the very
    /// decision scheduling the candidate tid at this node -- not just
    /// `request.path` alone. Checking the bare path would let an entry whose
    /// *own* decision pushes the sequence over budget (e.g. the `SwitchTo`
    /// that schedules a still-runnable sibling) slip past the filter here,
    /// only to violate the bound once [`Tree::next`] claims it.
    pub fn insert_todo(
        &mut self,
        bound_ok: &dyn Fn(&[Decision]) -> bool,
        requests: &[BacktrackRequest],
    ) {
        for request in requests {
            let node_id = match self.resolve_path(&request.path) {
                Some(n) => n,
                None => continue,
            };

            let prior = self.nodes[node_id.0].reached_by_tid;
            let runnable_here = self.nodes[node_id.0].runnable.clone();
            let runnable_vec: Vec<ThreadId> = runnable_here.iter().copied().collect();

            let candidate_ok = |tid: ThreadId| {
                let mut seq = request.path.clone();
                seq.push(crate::decision::decision_of(prior, &runnable_vec, tid));
                bound_ok(&seq)
            };

            if runnable_here.contains(&request.tid) {
                if candidate_ok(request.tid) {
                    self.try_insert_one(node_id, request.tid, request.conservative);
                }
            } else {
                debug!(tid = ?request.tid, node = node_id.0, "backtrack tid not runnable; waking all");
                for &t in &runnable_here {
                    if candidate_ok(t) {
                        self.try_insert_one(node_id, t, request.conservative);
                    }
                }
            }

            self.nodes[node_id.0].check_invariants();
        }
    }

    fn try_insert_one(&mut self, node_id: NodeId, tid: ThreadId, conservative: bool) {
        let node = &mut self.nodes[node_id.0];
        if node.done.contains_key(&tid) || node.sleep.contains_key(&tid) {
            return;
        }
        upgrade_todo(&mut node.todo, tid, conservative);
    }

    /// Reinstate a claimed entry the replay did not end up scheduling. Every
    /// claim made by [`Tree::next`] is a promise to put the entry back if the
    /// resulting run doesn't actually end up scheduling that tid.
    pub(crate) fn reinstate(&mut self, node: NodeId, tid: ThreadId, conservative: bool) {
        self.try_insert_one(node, tid, conservative);
    }

    /// Selects the deepest available todo entry, left-biased by tid order,
    /// and claims it.
    pub fn next(&mut self) -> Option<Claim> {
        let (mut path, node_id, tid, conservative) = self.search(NodeId(0))?;

        let prior = self.nodes[node_id.0].reached_by_tid;
        let runnable_vec: Vec<ThreadId> = self.nodes[node_id.0].runnable.iter().copied().collect();
        let final_decision = crate::decision::decision_of(prior, &runnable_vec, tid);
        path.push(final_decision);

        self.nodes[node_id.0].todo.remove(&tid);

        Some(Claim {
            decisions: path,
            conservative,
            node: node_id,
            tid,
        })
    }

    fn search(&self, node_id: NodeId) -> Option<(Vec<Decision>, NodeId, ThreadId, bool)> {
        let node = &self.nodes[node_id.0];

        for (_, &child_id) in node.done.iter() {
            if let Some((mut path, found, tid, conservative)) = self.search(child_id) {
                let incoming = self.nodes[child_id.0]
                    .incoming_decision
                    .clone()
                    .expect("non-root node missing incoming decision");
                path.insert(0, incoming);
                return Some((path, found, tid, conservative));
            }
        }

        if let Some((&tid, &conservative)) = node.todo.iter().next() {
            return Some((Vec::new(), node_id, tid, conservative));
        }

        None
    }

    fn resolve_path(&self, path: &[Decision]) -> Option<NodeId> {
        let mut current = NodeId(0);
        let mut prior: Option<ThreadId> = None;

        for decision in path {
            let default = match decision {
                Decision::Start(t) => *t,
                _ => prior?,
            };
            let t = crate::decision::tid_of(default, decision);
            current = *self.nodes[current.0].done.get(&t)?;
            prior = Some(t);
        }

        Some(current)
    }

    /// `true` once the root (and so the whole tree) has no remaining todo
    /// anywhere -- the search has terminated.
    pub fn is_exhausted(&self) -> bool {
        self.search(NodeId(0)).is_none()
    }

    /// Current arena size, for the driver's `max_branches` cap.
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Serialise the tree to JSON, so a long-running search can be
    /// checkpointed and resumed later without re-exploring already-grafted
    /// nodes -- `self.nodes` is a flat, back-edge-free arena, so a snapshot of
    /// it is the whole of the tree's state.
    #[cfg(feature = "checkpoint")]
    pub fn checkpoint(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Restore a tree previously written by [`Tree::checkpoint`]. The
    /// driver loop can resume exactly where it left off: every still-pending
    /// `todo` entry the snapshot carries is claimable by [`Tree::next`] as
    /// usual.
    #[cfg(feature = "checkpoint")]
    pub fn restore(json: &str) -> serde_json::Result<Tree> {
        serde_json::from_str(json)
    }
}

fn upgrade_todo(todo: &mut BTreeMap<ThreadId, bool>, tid: ThreadId, conservative: bool) {
    match todo.get(&tid).copied() {
        Some(false) if conservative => {
            // a precise entry dominates a conservative one; no-op.
        }
        Some(true) if !conservative => {
            todo.insert(tid, false);
        }
        None => {
            todo.insert(tid, conservative);
        }
        Some(_) => {
            // same flag already recorded; nothing to do.
        }
    }
}
