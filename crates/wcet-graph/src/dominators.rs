//! Dominator trees.
//!
//! Iterative reverse-postorder fixpoint (Cooper, Harvey and Kennedy).
//! Post-dominators are the dominators of the reversed graph rooted at the
//! exit, so there is no separate implementation.

use rustc_hash::FxHashMap;

use crate::{DepthFirstSearch, DirectedGraph, VertexId};

/// Immediate-dominator relation over the vertices reachable from a root.
#[derive(Clone, Debug)]
pub struct DominatorTree {
    root: VertexId,
    /// Maps each reachable vertex to its immediate dominator; the root maps
    /// to itself.
    idom: FxHashMap<VertexId, VertexId>,
    children: FxHashMap<VertexId, Vec<VertexId>>,
}

impl DominatorTree {
    pub fn new(graph: &DirectedGraph, root: VertexId) -> Self {
        let dfs = DepthFirstSearch::new(graph, root);
        let rpo: Vec<VertexId> = dfs.reverse_postorder().collect();
        let index: FxHashMap<VertexId, usize> =
            rpo.iter().enumerate().map(|(i, v)| (*v, i)).collect();

        let mut idom: FxHashMap<VertexId, VertexId> = FxHashMap::default();
        idom.insert(root, root);

        let mut changed = true;
        while changed {
            changed = false;
            for v in rpo.iter().skip(1) {
                let mut new_idom = None;
                for pred in graph.predecessors(*v) {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(other) => Self::intersect(&idom, &index, pred, other),
                    });
                }
                if let Some(new_idom) = new_idom
                    && idom.get(v) != Some(&new_idom)
                {
                    idom.insert(*v, new_idom);
                    changed = true;
                }
            }
        }

        let mut children: FxHashMap<VertexId, Vec<VertexId>> = FxHashMap::default();
        for v in &rpo {
            if *v != root
                && let Some(parent) = idom.get(v)
            {
                children.entry(*parent).or_default().push(*v);
            }
        }

        Self {
            root,
            idom,
            children,
        }
    }

    fn intersect(
        idom: &FxHashMap<VertexId, VertexId>,
        index: &FxHashMap<VertexId, usize>,
        mut a: VertexId,
        mut b: VertexId,
    ) -> VertexId {
        while a != b {
            while index[&a] > index[&b] {
                a = idom[&a];
            }
            while index[&b] > index[&a] {
                b = idom[&b];
            }
        }
        a
    }

    pub const fn root(&self) -> VertexId {
        self.root
    }

    /// The immediate dominator, or `None` for the root and for vertices
    /// unreachable from the root.
    pub fn immediate_dominator(&self, v: VertexId) -> Option<VertexId> {
        if v == self.root {
            return None;
        }
        self.idom.get(&v).copied()
    }

    /// Whether `a` dominates `b`. Reflexive; false when either vertex is
    /// unreachable from the root.
    pub fn dominates(&self, a: VertexId, b: VertexId) -> bool {
        if !self.idom.contains_key(&b) {
            return false;
        }
        let mut walk = b;
        loop {
            if walk == a {
                return true;
            }
            if walk == self.root {
                return false;
            }
            match self.idom.get(&walk) {
                Some(parent) => walk = *parent,
                None => return false,
            }
        }
    }

    /// Vertices whose immediate dominator is `v`, in reverse postorder.
    pub fn children(&self, v: VertexId) -> &[VertexId] {
        self.children.get(&v).map_or(&[], Vec::as_slice)
    }

    /// (parent, child) pairs of the tree.
    pub fn tree_edges(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.children
            .iter()
            .flat_map(|(parent, kids)| kids.iter().map(|k| (*parent, *k)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgramPoint;

    fn build(edges: &[(VertexId, VertexId)]) -> DirectedGraph {
        let mut g = DirectedGraph::new("test");
        let mut seen = rustc_hash::FxHashSet::default();
        for (p, s) in edges {
            for id in [p, s] {
                if seen.insert(*id) {
                    g.insert_vertex(*id, ProgramPoint::BasicBlock(*id)).unwrap();
                }
            }
        }
        for (p, s) in edges {
            g.add_edge(*p, *s).unwrap();
        }
        g
    }

    #[test]
    fn test_diamond_join_dominated_by_fork() {
        let g = build(&[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let dom = DominatorTree::new(&g, 1);
        assert_eq!(dom.immediate_dominator(4), Some(1));
        assert_eq!(dom.immediate_dominator(2), Some(1));
        assert!(dom.dominates(1, 4));
        assert!(!dom.dominates(2, 4));
    }

    #[test]
    fn test_loop_header_dominates_body() {
        let g = build(&[(1, 2), (2, 3), (3, 2), (3, 4)]);
        let dom = DominatorTree::new(&g, 1);
        assert!(dom.dominates(2, 3));
        assert!(dom.dominates(2, 4));
        assert_eq!(dom.immediate_dominator(4), Some(3));
    }

    #[test]
    fn test_post_dominators_via_reverse() {
        let g = build(&[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let pdom = DominatorTree::new(&g.reverse(), 4);
        assert_eq!(pdom.immediate_dominator(1), Some(4));
        assert!(pdom.dominates(4, 2));
    }

    #[test]
    fn test_root_has_no_immediate_dominator() {
        let g = build(&[(1, 2)]);
        let dom = DominatorTree::new(&g, 1);
        assert_eq!(dom.immediate_dominator(1), None);
        assert!(dom.dominates(1, 1));
    }
}
