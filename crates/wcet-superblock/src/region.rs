//! Enhanced region graphs.
//!
//! For each loop the region graph contains the basic blocks assigned to
//! the loop, an abstract header vertex for every inner loop, and an
//! edge-as-vertex program point for every region edge. Loop back edges are
//! excluded; loop exit edges become sink vertices. A dummy exit vertex is
//! appended when the region has several sinks, so post-dominators are
//! always rooted at a single vertex.

use rustc_hash::FxHashMap;
use wcet_graph::{
    ControlFlowGraph, DepthFirstSearch, DirectedGraph, LoopNestingTree, ProgramPoint,
    VertexId,
};

use crate::Result;

pub(crate) struct Region {
    pub graph: DirectedGraph,
    pub entry: VertexId,
    pub exit: VertexId,
}

impl Region {
    pub fn reversed(&self) -> Self {
        Self {
            graph: self.graph.reverse(),
            entry: self.exit,
            exit: self.entry,
        }
    }
}

/// The program point standing for a CFG vertex inside the region of
/// `header`: the vertex itself when directly assigned, the abstract header
/// of the inner loop containing it otherwise.
fn region_point(
    lnt: &LoopNestingTree,
    header: VertexId,
    v: VertexId,
) -> Option<ProgramPoint> {
    let mut walk = lnt.innermost_loop(v);
    if walk == header {
        return Some(ProgramPoint::BasicBlock(v));
    }
    loop {
        match lnt.parent_loop(walk) {
            Some(parent) if parent == header => {
                return Some(ProgramPoint::Header(walk));
            }
            Some(parent) => walk = parent,
            None => return None,
        }
    }
}

pub(crate) fn build_region(
    cfg: &ControlFlowGraph,
    lnt: &LoopNestingTree,
    header: VertexId,
) -> Result<Region> {
    let mut graph = DirectedGraph::new(cfg.name());
    let mut ids: FxHashMap<ProgramPoint, VertexId> = FxHashMap::default();

    let mut blocks: Vec<VertexId> = lnt.vertices_in(header).collect();
    blocks.sort_unstable();
    for b in blocks {
        let point = ProgramPoint::BasicBlock(b);
        ids.insert(point, graph.add_vertex(point));
    }
    let mut inner: Vec<VertexId> = lnt.inner_loops(header).collect();
    inner.sort_unstable();
    for h in inner {
        let point = ProgramPoint::Header(h);
        ids.insert(point, graph.add_vertex(point));
    }

    // Any depth-first back edge breaks a cycle, so skipping them all keeps
    // the region acyclic even when the CFG has irreducible edges.
    let dfs = DepthFirstSearch::new(cfg.graph(), cfg.entry());

    let mut body: Vec<VertexId> = lnt
        .body(header)
        .into_iter()
        .flat_map(|s| s.iter().copied())
        .collect();
    body.sort_unstable();
    let in_body: rustc_hash::FxHashSet<VertexId> = body.iter().copied().collect();

    for u in body {
        let Some(rep_u) = region_point(lnt, header, u) else {
            continue;
        };
        let source = ids[&rep_u];
        for v in cfg.successors(u).collect::<Vec<_>>() {
            if v == header || dfs.back_edges.contains(&(u, v)) {
                continue;
            }
            let edge_point = ProgramPoint::Edge(u, v);
            if in_body.contains(&v) {
                let Some(rep_v) = region_point(lnt, header, v) else {
                    continue;
                };
                if rep_v == rep_u {
                    // Internal to an abstracted inner loop.
                    continue;
                }
                let middle = ids.entry(edge_point).or_insert_with(|| graph.add_vertex(edge_point));
                let middle = *middle;
                graph.add_edge(source, middle)?;
                graph.add_edge(middle, ids[&rep_v])?;
            } else {
                // Loop exit edge: a sink of the region.
                let middle = *ids
                    .entry(edge_point)
                    .or_insert_with(|| graph.add_vertex(edge_point));
                graph.add_edge(source, middle)?;
            }
        }
    }

    let entry = ids[&ProgramPoint::BasicBlock(header)];
    let sinks: Vec<VertexId> = graph
        .vertices()
        .filter(|v| v.number_of_successors() == 0)
        .map(|v| v.id)
        .collect();
    let exit = match sinks.as_slice() {
        [] => entry,
        [only] => *only,
        many => {
            let dummy = graph.add_vertex(ProgramPoint::Header(header));
            for sink in many {
                graph.add_edge(*sink, dummy)?;
            }
            dummy
        }
    };

    Ok(Region { graph, entry, exit })
}
