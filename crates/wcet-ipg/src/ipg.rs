//! Acyclic IPG construction.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};
use wcet_graph::{
    ControlFlowGraph, DepthFirstSearch, DirectedGraph, LoopNestingTree, VertexId,
};

use crate::{IpgError, Result};

type EdgeSet = FxHashSet<(VertexId, VertexId)>;

/// The instrumentation point graph of one function.
///
/// Vertex ids are the ids of the instrumented basic blocks; the entry and
/// exit of the control flow graph are always instrumented. Edges carry the
/// subsumed uninstrumented vertices and an iteration flag; iteration,
/// loop-entry and loop-exit edges are recorded per loop header.
#[derive(Clone, Debug)]
pub struct Ipg {
    pub(crate) graph: DirectedGraph,
    entry: VertexId,
    exit: VertexId,
    ipoints: FxHashSet<VertexId>,
    pub(crate) iteration_edges: FxHashMap<VertexId, EdgeSet>,
    loop_entry_edges: FxHashMap<VertexId, EdgeSet>,
    loop_exit_edges: FxHashMap<VertexId, EdgeSet>,
}

impl Ipg {
    /// Build the IPG of a control flow graph over a chosen set of
    /// instrumentation points. The entry and exit are forced into the set
    /// when absent.
    pub fn build(
        cfg: &ControlFlowGraph,
        lnt: &LoopNestingTree,
        chosen: &FxHashSet<VertexId>,
    ) -> Result<Self> {
        let mut ipoints = chosen.clone();
        for forced in [cfg.entry(), cfg.exit()] {
            if ipoints.insert(forced) {
                warn!(
                    "forcing vertex {forced} of '{}' to be an instrumentation point",
                    cfg.name()
                );
            }
        }

        let mut graph = DirectedGraph::new(cfg.name());
        for v in cfg.vertices() {
            if ipoints.contains(&v.id) {
                graph.insert_vertex(v.id, v.point)?;
            }
        }

        // Acyclic view of the CFG: back edges are handled by the loop pass.
        let mut forward = cfg.graph().clone();
        for (tail, header) in lnt.back_edges() {
            forward.remove_edge(tail, header)?;
        }

        // Dataflow over the acyclic view, in reverse postorder. Each state
        // maps a nearest instrumentation point to the uninstrumented
        // vertices seen since it; on reaching an instrumentation point the
        // state becomes an edge and resets.
        let dfs = DepthFirstSearch::new(&forward, cfg.entry());
        let mut states: FxHashMap<VertexId, FxHashMap<VertexId, FxHashSet<VertexId>>> =
            FxHashMap::default();
        for v in dfs.reverse_postorder() {
            let mut incoming: FxHashMap<VertexId, FxHashSet<VertexId>> =
                FxHashMap::default();
            for pred in forward.predecessors(v) {
                let Some(state) = states.get(&pred) else {
                    continue;
                };
                for (ipoint, subsumed) in state {
                    match incoming.get(ipoint) {
                        None => {
                            incoming.insert(*ipoint, subsumed.clone());
                        }
                        Some(existing) if existing == subsumed => {}
                        Some(_) => {
                            return Err(IpgError::AmbiguousEdgeLabel {
                                graph: cfg.name().to_owned(),
                                pred: *ipoint,
                                succ: v,
                            });
                        }
                    }
                }
            }
            if ipoints.contains(&v) {
                for (ipoint, subsumed) in incoming {
                    debug!(
                        "ipg edge ({ipoint}, {v}) in '{}' subsumes {subsumed:?}",
                        cfg.name()
                    );
                    graph.add_labelled_edge(ipoint, v, subsumed, false)?;
                }
                states.insert(v, std::iter::once((v, FxHashSet::default())).collect());
            } else {
                let mut state = incoming;
                for subsumed in state.values_mut() {
                    subsumed.insert(v);
                }
                states.insert(v, state);
            }
        }

        let mut ipg = Self {
            graph,
            entry: cfg.entry(),
            exit: cfg.exit(),
            ipoints,
            iteration_edges: FxHashMap::default(),
            loop_entry_edges: FxHashMap::default(),
            loop_exit_edges: FxHashMap::default(),
        };
        crate::loops::annotate(&mut ipg, cfg, lnt)?;
        ipg.classify_loop_edges(lnt);
        Ok(ipg)
    }

    fn classify_loop_edges(&mut self, lnt: &LoopNestingTree) {
        let edges: Vec<(VertexId, VertexId, bool)> = self
            .graph
            .edges()
            .map(|e| (e.pred, e.succ, e.iteration))
            .collect();
        for header in lnt.headers_bottom_up() {
            if header == lnt.root() {
                continue;
            }
            let Some(body) = lnt.body(header) else {
                continue;
            };
            let mut entries = EdgeSet::default();
            let mut exits = EdgeSet::default();
            for (pred, succ, iteration) in &edges {
                if *iteration {
                    continue;
                }
                match (body.contains(pred), body.contains(succ)) {
                    (false, true) => {
                        entries.insert((*pred, *succ));
                    }
                    (true, false) => {
                        exits.insert((*pred, *succ));
                    }
                    _ => {}
                }
            }
            self.loop_entry_edges.insert(header, entries);
            self.loop_exit_edges.insert(header, exits);
        }
    }

    pub const fn entry(&self) -> VertexId {
        self.entry
    }

    pub const fn exit(&self) -> VertexId {
        self.exit
    }

    pub fn is_ipoint(&self, v: VertexId) -> bool {
        self.ipoints.contains(&v)
    }

    pub fn ipoints(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.ipoints.iter().copied()
    }

    /// Iteration edges of a loop, representing back-edge traversals.
    pub fn iteration_edges(&self, header: VertexId) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.iteration_edges
            .get(&header)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Non-iteration edges entering a loop from outside it.
    pub fn loop_entry_edges(&self, header: VertexId) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.loop_entry_edges
            .get(&header)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Non-iteration edges leaving a loop.
    pub fn loop_exit_edges(&self, header: VertexId) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.loop_exit_edges
            .get(&header)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub const fn graph(&self) -> &DirectedGraph {
        &self.graph
    }
}

impl std::ops::Deref for Ipg {
    type Target = DirectedGraph;

    fn deref(&self) -> &Self::Target {
        &self.graph
    }
}
