//! Loop nesting trees.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::{ControlFlowGraph, DepthFirstSearch, DominatorTree, VertexId};

/// A natural loop: a header, the tails of its back edges, the loop body and
/// the edges leaving it. The root pseudo-loop has the entry as its header,
/// no tails and level 0.
#[derive(Clone, Debug)]
pub struct Loop {
    pub header: VertexId,
    pub tails: FxHashSet<VertexId>,
    pub body: FxHashSet<VertexId>,
    pub exit_edges: FxHashSet<(VertexId, VertexId)>,
    pub level: usize,
    pub parent: Option<VertexId>,
}

/// The loop structure of a control flow graph.
///
/// Headers are found by the dominance test on depth-first back edges: an
/// edge (t, h) closes a loop when h dominates t. Back edges failing the
/// test belong to irreducible regions and are ignored with a warning.
#[derive(Clone, Debug)]
pub struct LoopNestingTree {
    root: VertexId,
    loops: FxHashMap<VertexId, Loop>,
    innermost: FxHashMap<VertexId, VertexId>,
    back_edges: FxHashSet<(VertexId, VertexId)>,
}

impl LoopNestingTree {
    pub fn new(cfg: &ControlFlowGraph) -> Self {
        let entry = cfg.entry();
        let dfs = DepthFirstSearch::new(cfg.graph(), entry);
        let dominators = DominatorTree::new(cfg.graph(), entry);

        let mut back_edges = FxHashSet::default();
        let mut tails_by_header: FxHashMap<VertexId, FxHashSet<VertexId>> =
            FxHashMap::default();
        for (tail, header) in &dfs.back_edges {
            if dominators.dominates(*header, *tail) {
                back_edges.insert((*tail, *header));
                tails_by_header.entry(*header).or_default().insert(*tail);
            } else {
                warn!(
                    "ignoring irreducible edge ({tail}, {header}) in '{}'",
                    cfg.name()
                );
            }
        }

        let mut loops: FxHashMap<VertexId, Loop> = FxHashMap::default();
        for (header, tails) in tails_by_header {
            let body = Self::natural_loop(cfg, header, &tails);
            loops.insert(
                header,
                Loop {
                    header,
                    tails,
                    body,
                    exit_edges: FxHashSet::default(),
                    level: 0,
                    parent: None,
                },
            );
        }

        // The root pseudo-loop spans the whole function.
        let whole: FxHashSet<VertexId> = cfg.vertex_ids().collect();
        loops.insert(
            entry,
            Loop {
                header: entry,
                tails: FxHashSet::default(),
                body: whole,
                exit_edges: FxHashSet::default(),
                level: 0,
                parent: None,
            },
        );

        Self::link_parents(&mut loops, entry);
        Self::compute_levels(&mut loops, entry);
        Self::compute_exit_edges(cfg, &mut loops, entry);

        let mut innermost = FxHashMap::default();
        for id in cfg.vertex_ids() {
            let header = loops
                .values()
                .filter(|l| l.body.contains(&id))
                .min_by_key(|l| (l.body.len(), l.header))
                .map_or(entry, |l| l.header);
            innermost.insert(id, header);
        }

        Self {
            root: entry,
            loops,
            innermost,
            back_edges,
        }
    }

    /// The natural loop of a header: the header, its tails and every vertex
    /// that reaches a tail without passing through the header.
    fn natural_loop(
        cfg: &ControlFlowGraph,
        header: VertexId,
        tails: &FxHashSet<VertexId>,
    ) -> FxHashSet<VertexId> {
        let mut body: FxHashSet<VertexId> = FxHashSet::default();
        body.insert(header);
        let mut stack: Vec<VertexId> = tails.iter().copied().collect();
        while let Some(v) = stack.pop() {
            if body.insert(v) {
                stack.extend(cfg.predecessors(v));
            }
        }
        body
    }

    fn link_parents(loops: &mut FxHashMap<VertexId, Loop>, root: VertexId) {
        let snapshot: Vec<(VertexId, FxHashSet<VertexId>)> = loops
            .iter()
            .map(|(h, l)| (*h, l.body.clone()))
            .collect();
        for (header, this) in loops.iter_mut() {
            if *header == root {
                continue;
            }
            this.parent = snapshot
                .iter()
                .filter(|(h, body)| *h != *header && body.contains(header))
                .min_by_key(|(h, body)| (body.len(), *h))
                .map(|(h, _)| *h);
        }
    }

    fn compute_levels(loops: &mut FxHashMap<VertexId, Loop>, root: VertexId) {
        let parents: FxHashMap<VertexId, Option<VertexId>> =
            loops.iter().map(|(h, l)| (*h, l.parent)).collect();
        for (header, l) in loops.iter_mut() {
            let mut level = 0;
            let mut walk = *header;
            while walk != root {
                level += 1;
                match parents.get(&walk).copied().flatten() {
                    Some(p) => walk = p,
                    None => break,
                }
            }
            l.level = level;
        }
    }

    fn compute_exit_edges(
        cfg: &ControlFlowGraph,
        loops: &mut FxHashMap<VertexId, Loop>,
        root: VertexId,
    ) {
        for (header, l) in loops.iter_mut() {
            if *header == root {
                continue;
            }
            for v in &l.body {
                for succ in cfg.successors(*v) {
                    if !l.body.contains(&succ) {
                        l.exit_edges.insert((*v, succ));
                    }
                }
            }
        }
    }

    /// The header of the root pseudo-loop, which is the function entry.
    pub const fn root(&self) -> VertexId {
        self.root
    }

    pub fn is_header(&self, v: VertexId) -> bool {
        self.loops.contains_key(&v)
    }

    pub fn is_tail(&self, v: VertexId) -> bool {
        self.loops.values().any(|l| l.tails.contains(&v))
    }

    pub fn is_back_edge(&self, pred: VertexId, succ: VertexId) -> bool {
        self.back_edges.contains(&(pred, succ))
    }

    pub fn back_edges(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.back_edges.iter().copied()
    }

    pub fn loop_of(&self, header: VertexId) -> Option<&Loop> {
        self.loops.get(&header)
    }

    pub fn tails(&self, header: VertexId) -> Option<&FxHashSet<VertexId>> {
        self.loops.get(&header).map(|l| &l.tails)
    }

    pub fn body(&self, header: VertexId) -> Option<&FxHashSet<VertexId>> {
        self.loops.get(&header).map(|l| &l.body)
    }

    pub fn exit_edges(&self, header: VertexId) -> Option<&FxHashSet<(VertexId, VertexId)>> {
        self.loops.get(&header).map(|l| &l.exit_edges)
    }

    pub fn is_loop_exit_edge(&self, header: VertexId, pred: VertexId, succ: VertexId) -> bool {
        self.loops
            .get(&header)
            .is_some_and(|l| l.exit_edges.contains(&(pred, succ)))
    }

    pub fn level(&self, header: VertexId) -> Option<usize> {
        self.loops.get(&header).map(|l| l.level)
    }

    pub fn parent_loop(&self, header: VertexId) -> Option<VertexId> {
        self.loops.get(&header).and_then(|l| l.parent)
    }

    /// Headers of the loops immediately nested inside the given loop.
    pub fn inner_loops(&self, header: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.loops
            .values()
            .filter(move |l| l.parent == Some(header))
            .map(|l| l.header)
    }

    /// The header of the innermost loop containing a vertex; the root for
    /// vertices outside every real loop.
    pub fn innermost_loop(&self, v: VertexId) -> VertexId {
        self.innermost.get(&v).copied().unwrap_or(self.root)
    }

    /// Vertices whose innermost enclosing loop is the given one. Inner-loop
    /// bodies are excluded, their headers are not.
    pub fn vertices_in(&self, header: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.innermost
            .iter()
            .filter(move |(_, h)| **h == header)
            .map(|(v, _)| *v)
    }

    /// All headers, innermost loops first, root pseudo-loop last. Ties are
    /// broken by header id so the order is deterministic.
    pub fn headers_bottom_up(&self) -> Vec<VertexId> {
        let mut headers: Vec<VertexId> = self.loops.keys().copied().collect();
        headers.sort_by_key(|h| {
            let level = self.loops[h].level;
            (std::cmp::Reverse(level), *h)
        });
        headers
    }

    pub fn number_of_loops(&self) -> usize {
        self.loops.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ControlFlowGraph;

    /// 1 -> 2 -> 3 -> 4, 4 -> 3 (inner), 4 -> 5, 5 -> 2 (outer), 5 -> 6.
    fn nested() -> ControlFlowGraph {
        ControlFlowGraph::from_edges(
            "nested",
            &[1, 2, 3, 4, 5, 6],
            &[(1, 2), (2, 3), (3, 4), (4, 3), (4, 5), (5, 2), (5, 6)],
        )
        .unwrap()
    }

    #[test]
    fn test_headers_and_tails() {
        let lnt = LoopNestingTree::new(&nested());
        assert!(lnt.is_header(2));
        assert!(lnt.is_header(3));
        assert!(!lnt.is_header(4));
        assert_eq!(lnt.tails(2).unwrap().len(), 1);
        assert!(lnt.tails(2).unwrap().contains(&5));
        assert!(lnt.tails(3).unwrap().contains(&4));
    }

    #[test]
    fn test_nesting_levels_strictly_increase() {
        let lnt = LoopNestingTree::new(&nested());
        assert_eq!(lnt.level(1), Some(0));
        assert_eq!(lnt.level(2), Some(1));
        assert_eq!(lnt.level(3), Some(2));
        assert_eq!(lnt.parent_loop(3), Some(2));
        assert_eq!(lnt.parent_loop(2), Some(1));
    }

    #[test]
    fn test_innermost_assignment() {
        let lnt = LoopNestingTree::new(&nested());
        assert_eq!(lnt.innermost_loop(4), 3);
        assert_eq!(lnt.innermost_loop(5), 2);
        assert_eq!(lnt.innermost_loop(6), 1);
        assert_eq!(lnt.innermost_loop(3), 3);
    }

    #[test]
    fn test_exit_edges() {
        let lnt = LoopNestingTree::new(&nested());
        let inner = lnt.exit_edges(3).unwrap();
        assert_eq!(inner.len(), 1);
        assert!(inner.contains(&(4, 5)));
        let outer = lnt.exit_edges(2).unwrap();
        assert!(outer.contains(&(5, 6)));
        assert!(lnt.is_loop_exit_edge(2, 5, 6));
        assert!(!lnt.is_loop_exit_edge(2, 4, 5));
    }

    #[test]
    fn test_headers_bottom_up_is_innermost_first() {
        let lnt = LoopNestingTree::new(&nested());
        assert_eq!(lnt.headers_bottom_up(), vec![3, 2, 1]);
    }

    #[test]
    fn test_self_loop() {
        let cfg = ControlFlowGraph::from_edges(
            "selfloop",
            &[1, 2, 3],
            &[(1, 2), (2, 2), (2, 3)],
        )
        .unwrap();
        let lnt = LoopNestingTree::new(&cfg);
        assert!(lnt.is_header(2));
        assert!(lnt.is_tail(2));
        assert!(lnt.is_back_edge(2, 2));
        assert_eq!(lnt.body(2).unwrap().len(), 1);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let cfg = nested();
        let a = LoopNestingTree::new(&cfg);
        let b = LoopNestingTree::new(&cfg);
        assert_eq!(a.headers_bottom_up(), b.headers_bottom_up());
        for h in a.headers_bottom_up() {
            assert_eq!(a.body(h).unwrap(), b.body(h).unwrap());
            assert_eq!(a.level(h), b.level(h));
        }
    }
}
