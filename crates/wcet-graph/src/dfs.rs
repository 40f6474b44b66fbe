//! Depth-first search with explicit stacks.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{DirectedGraph, VertexId};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Pre/post orderings and back edges of a depth-first traversal from a root.
///
/// Only vertices reachable from the root appear in the orderings.
pub struct DepthFirstSearch {
    pub preorder: Vec<VertexId>,
    pub postorder: Vec<VertexId>,
    pub back_edges: FxHashSet<(VertexId, VertexId)>,
}

impl DepthFirstSearch {
    pub fn new(graph: &DirectedGraph, root: VertexId) -> Self {
        let mut colour: FxHashMap<VertexId, Colour> = graph
            .vertex_ids()
            .map(|id| (id, Colour::White))
            .collect();
        let mut preorder = Vec::new();
        let mut postorder = Vec::new();
        let mut back_edges = FxHashSet::default();

        let mut stack = vec![root];
        while let Some(v) = stack.pop() {
            match colour.get(&v).copied() {
                Some(Colour::White) => {
                    colour.insert(v, Colour::Grey);
                    preorder.push(v);
                    stack.push(v);
                    // Reverse so the first successor is explored first.
                    let succs: Vec<VertexId> = graph.successors(v).collect();
                    for succ in succs.iter().rev() {
                        match colour.get(succ).copied() {
                            Some(Colour::White) => stack.push(*succ),
                            Some(Colour::Grey) => {
                                back_edges.insert((v, *succ));
                            }
                            _ => {}
                        }
                    }
                }
                Some(Colour::Grey) => {
                    colour.insert(v, Colour::Black);
                    postorder.push(v);
                }
                _ => {}
            }
        }

        Self {
            preorder,
            postorder,
            back_edges,
        }
    }

    /// Postorder reversed: the processing order for forward dataflow.
    pub fn reverse_postorder(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.postorder.iter().rev().copied()
    }

    pub fn is_reachable(&self, id: VertexId) -> bool {
        self.postorder.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgramPoint;

    fn looped() -> DirectedGraph {
        // 1 -> 2 -> 3 -> 2 (back), 3 -> 4
        let mut g = DirectedGraph::new("looped");
        for id in 1..=4 {
            g.insert_vertex(id, ProgramPoint::BasicBlock(id)).unwrap();
        }
        g.add_edge(1, 2).unwrap();
        g.add_edge(2, 3).unwrap();
        g.add_edge(3, 2).unwrap();
        g.add_edge(3, 4).unwrap();
        g
    }

    #[test]
    fn test_reverse_postorder_is_topological_without_back_edges() {
        let g = looped();
        let dfs = DepthFirstSearch::new(&g, 1);
        let rpo: Vec<VertexId> = dfs.reverse_postorder().collect();
        let pos = |v: VertexId| rpo.iter().position(|x| *x == v).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(2) < pos(3));
        assert!(pos(3) < pos(4));
    }

    #[test]
    fn test_back_edge_detected() {
        let g = looped();
        let dfs = DepthFirstSearch::new(&g, 1);
        assert!(dfs.back_edges.contains(&(3, 2)));
        assert_eq!(dfs.back_edges.len(), 1);
    }

    #[test]
    fn test_unreachable_vertices_excluded() {
        let mut g = looped();
        g.insert_vertex(9, ProgramPoint::BasicBlock(9)).unwrap();
        let dfs = DepthFirstSearch::new(&g, 1);
        assert!(!dfs.is_reachable(9));
        assert_eq!(dfs.postorder.len(), 4);
    }
}
