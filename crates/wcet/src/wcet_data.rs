//! Per-function timing data export.
//!
//! Collects everything an external calculation consumes into one plain
//! structure: described costs and loop bounds, the loop edge classification
//! of the instrumentation point graph, and the observed iteration bounds
//! surviving conjecture falsification.

use rustc_hash::FxHashMap;
use wcet_graph::{ProgramPoint, VertexId};
use wcet_trace::{BlockKey, ConjectureState};

use crate::{FunctionAnalysis, FunctionDescription};

type EdgeList = Vec<(VertexId, VertexId)>;

#[derive(Clone, Debug, Default)]
pub struct WcetData {
    wcets: FxHashMap<ProgramPoint, u64>,
    loop_bounds: FxHashMap<VertexId, Vec<u64>>,
    observed_bounds: FxHashMap<VertexId, u64>,
    iteration_edges: FxHashMap<VertexId, EdgeList>,
    loop_entry_edges: FxHashMap<VertexId, EdgeList>,
    loop_exit_edges: FxHashMap<VertexId, EdgeList>,
}

impl WcetData {
    /// Assemble the export of one function. `conjectures` carries the
    /// surviving minimum counts of a falsification batch, when traces were
    /// replayed; the observed bound of a loop is the minimum count of its
    /// header super block.
    pub fn export(
        desc: &FunctionDescription,
        analysis: &FunctionAnalysis,
        conjectures: Option<&ConjectureState>,
    ) -> Self {
        let mut data = Self {
            wcets: desc.wcets.clone(),
            loop_bounds: desc.loop_bounds.clone(),
            ..Self::default()
        };
        if let Some(ipg) = &analysis.ipg {
            for header in analysis.lnt.headers_bottom_up() {
                if header == analysis.lnt.root() {
                    continue;
                }
                data.iteration_edges
                    .insert(header, sorted(ipg.iteration_edges(header)));
                data.loop_entry_edges
                    .insert(header, sorted(ipg.loop_entry_edges(header)));
                data.loop_exit_edges
                    .insert(header, sorted(ipg.loop_exit_edges(header)));
            }
        }
        if let Some(conjectures) = conjectures {
            for subgraph in analysis.superblocks.forward_subgraphs() {
                let key = BlockKey {
                    header: subgraph.header(),
                    block: subgraph.root(),
                };
                if let Some(Some(minimum)) = conjectures.minimum(key) {
                    data.observed_bounds.insert(subgraph.header(), minimum);
                }
            }
        }
        data
    }

    pub fn wcet_of(&self, point: ProgramPoint) -> Option<u64> {
        self.wcets.get(&point).copied()
    }

    /// Described per-nesting-level iteration bounds of a loop.
    pub fn loop_bound(&self, header: VertexId) -> Option<&[u64]> {
        self.loop_bounds.get(&header).map(Vec::as_slice)
    }

    /// The smallest per-run execution count of the region's header super
    /// block seen across the replayed traces.
    pub fn observed_bound(&self, header: VertexId) -> Option<u64> {
        self.observed_bounds.get(&header).copied()
    }

    pub fn iteration_edges(&self, header: VertexId) -> &[(VertexId, VertexId)] {
        self.iteration_edges.get(&header).map_or(&[], Vec::as_slice)
    }

    pub fn loop_entry_edges(&self, header: VertexId) -> &[(VertexId, VertexId)] {
        self.loop_entry_edges
            .get(&header)
            .map_or(&[], Vec::as_slice)
    }

    pub fn loop_exit_edges(&self, header: VertexId) -> &[(VertexId, VertexId)] {
        self.loop_exit_edges.get(&header).map_or(&[], Vec::as_slice)
    }
}

fn sorted(edges: impl Iterator<Item = (VertexId, VertexId)>) -> EdgeList {
    let mut edges: EdgeList = edges.collect();
    edges.sort_unstable();
    edges
}
