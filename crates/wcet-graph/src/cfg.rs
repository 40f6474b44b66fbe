//! Control flow graphs.

use rustc_hash::FxHashSet;
use tracing::warn;

use crate::{DepthFirstSearch, DirectedGraph, GraphError, ProgramPoint, Result, VertexId};

/// A directed graph of basic blocks with a unique entry and a unique exit.
///
/// Every vertex lies on some entry-to-exit path: vertices unreachable from
/// the entry, or from which the exit is unreachable, are pruned during
/// construction.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    graph: DirectedGraph,
    entry: VertexId,
    exit: VertexId,
    call_sites: FxHashSet<VertexId>,
}

impl ControlFlowGraph {
    /// Build a control flow graph from explicit basic block ids and edges.
    pub fn from_edges(
        name: impl Into<String>,
        blocks: &[VertexId],
        edges: &[(VertexId, VertexId)],
    ) -> Result<Self> {
        let mut graph = DirectedGraph::new(name);
        for id in blocks {
            graph.insert_vertex(*id, ProgramPoint::BasicBlock(*id))?;
        }
        for (pred, succ) in edges {
            graph.add_edge(*pred, *succ)?;
        }
        let entry = Self::find_entry(&graph)?;
        let exit = Self::find_exit(&graph)?;
        let mut cfg = Self {
            graph,
            entry,
            exit,
            call_sites: FxHashSet::default(),
        };
        cfg.prune_unreachable();
        Ok(cfg)
    }

    fn find_entry(graph: &DirectedGraph) -> Result<VertexId> {
        let mut entry = None;
        for v in graph.vertices() {
            if v.number_of_predecessors() == 0 {
                match entry {
                    None => entry = Some(v.id),
                    Some(first) => {
                        return Err(GraphError::MultipleEntries {
                            graph: graph.name().to_owned(),
                            first,
                            second: v.id,
                        });
                    }
                }
            }
        }
        entry.ok_or_else(|| GraphError::NoEntry {
            graph: graph.name().to_owned(),
        })
    }

    fn find_exit(graph: &DirectedGraph) -> Result<VertexId> {
        let mut exit = None;
        for v in graph.vertices() {
            if v.number_of_successors() == 0 {
                match exit {
                    None => exit = Some(v.id),
                    Some(first) => {
                        return Err(GraphError::MultipleExits {
                            graph: graph.name().to_owned(),
                            first,
                            second: v.id,
                        });
                    }
                }
            }
        }
        exit.ok_or_else(|| GraphError::NoExit {
            graph: graph.name().to_owned(),
        })
    }

    /// Drop vertices that are not on any entry-to-exit path.
    fn prune_unreachable(&mut self) {
        let forward = DepthFirstSearch::new(&self.graph, self.entry);
        let backward = DepthFirstSearch::new(&self.graph.reverse(), self.exit);
        let doomed: Vec<VertexId> = self
            .graph
            .vertex_ids()
            .filter(|id| !forward.is_reachable(*id) || !backward.is_reachable(*id))
            .collect();
        for id in doomed {
            warn!(
                "pruning vertex {id} from '{}': not on an entry-to-exit path",
                self.graph.name()
            );
            // Incident edges go with the vertex. The id is known to exist.
            let _ = self.graph.remove_vertex(id);
            self.call_sites.remove(&id);
        }
    }

    pub fn name(&self) -> &str {
        self.graph.name()
    }

    pub const fn entry(&self) -> VertexId {
        self.entry
    }

    pub const fn exit(&self) -> VertexId {
        self.exit
    }

    /// Mark a basic block as containing a call.
    pub fn set_call_site(&mut self, id: VertexId) -> Result<()> {
        if !self.graph.has_vertex(id) {
            return Err(GraphError::MissingVertex {
                graph: self.graph.name().to_owned(),
                id,
            });
        }
        self.call_sites.insert(id);
        Ok(())
    }

    pub fn is_call_site(&self, id: VertexId) -> bool {
        self.call_sites.contains(&id)
    }

    pub fn call_sites(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.call_sites.iter().copied()
    }

    pub const fn graph(&self) -> &DirectedGraph {
        &self.graph
    }
}

impl std::ops::Deref for ControlFlowGraph {
    type Target = DirectedGraph;

    fn deref(&self) -> &Self::Target {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_and_exit_detected() {
        let cfg = ControlFlowGraph::from_edges(
            "f",
            &[1, 2, 3, 4],
            &[(1, 2), (1, 3), (2, 4), (3, 4)],
        )
        .unwrap();
        assert_eq!(cfg.entry(), 1);
        assert_eq!(cfg.exit(), 4);
    }

    #[test]
    fn test_isolated_cycle_pruned() {
        // 9 <-> 10 is a cycle off to the side: both vertices have
        // predecessors and successors, yet neither lies on an
        // entry-to-exit path.
        let cfg = ControlFlowGraph::from_edges(
            "f",
            &[1, 2, 3, 4, 9, 10],
            &[(1, 2), (1, 3), (2, 4), (3, 4), (9, 10), (10, 9)],
        )
        .unwrap();
        assert!(!cfg.has_vertex(9));
        assert!(!cfg.has_vertex(10));
        assert_eq!(cfg.number_of_vertices(), 4);
    }

    #[test]
    fn test_dangling_branch_is_ambiguous_exit() {
        let cfg = ControlFlowGraph::from_edges(
            "f",
            &[1, 2, 3, 9],
            &[(1, 2), (2, 3), (2, 9)],
        );
        // 9 has no successors, so exit detection is ambiguous.
        assert!(matches!(cfg, Err(GraphError::MultipleExits { .. })));
    }

    #[test]
    fn test_no_entry_is_an_error() {
        // 1 <-> 2: every vertex has a predecessor.
        let cfg = ControlFlowGraph::from_edges("f", &[1, 2], &[(1, 2), (2, 1)]);
        assert!(matches!(cfg, Err(GraphError::NoEntry { .. })));
    }

    #[test]
    fn test_multiple_entries_is_an_error() {
        let cfg = ControlFlowGraph::from_edges("f", &[1, 2, 3], &[(1, 3), (2, 3)]);
        assert!(matches!(
            cfg,
            Err(GraphError::MultipleEntries { first: 1, second: 2, .. })
        ));
    }

    #[test]
    fn test_call_site_requires_existing_vertex() {
        let mut cfg =
            ControlFlowGraph::from_edges("f", &[1, 2], &[(1, 2)]).unwrap();
        cfg.set_call_site(1).unwrap();
        assert!(cfg.is_call_site(1));
        assert!(cfg.set_call_site(7).is_err());
    }
}
