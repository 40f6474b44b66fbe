//! Super block graph construction.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use wcet_graph::{
    ControlFlowGraph, DepthFirstSearch, DirectedGraph, DominatorTree, LoopNestingTree,
    ProgramPoint, VertexId,
};

use crate::region::{Region, build_region};
use crate::scc::strong_components;
use crate::Result;

pub type SuperBlockId = u32;

/// A maximal set of control-equivalent program points of one loop region.
#[derive(Clone, Debug)]
pub struct SuperBlock {
    pub id: SuperBlockId,
    /// Constituent program points, in reverse postorder of the region.
    pub program_points: Vec<ProgramPoint>,
    /// The first basic block program point, or the first point when the
    /// super block holds none. Counting any constituent counts them all.
    pub representative: ProgramPoint,
    /// Index into the subgraph's partitions, when this super block is an
    /// alternative of some branch.
    pub partition_id: Option<usize>,
    /// A loop exit edge contained in this super block, if any.
    pub exit_edge: Option<(VertexId, VertexId)>,
}

impl SuperBlock {
    /// Basic block ids among the constituent program points.
    pub fn basic_blocks(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.program_points.iter().filter_map(|p| p.basic_block())
    }
}

/// The alternative successor super blocks of one branching program point.
/// Exactly one member executes per execution of the branch, so member
/// counts sum to the branch count and members are pairwise execution
/// exclusive until observed otherwise.
#[derive(Clone, Debug)]
pub struct Partition {
    pub branch: ProgramPoint,
    pub members: Vec<SuperBlockId>,
}

/// The super blocks of one loop region, with the edges and branch
/// partitions between them.
#[derive(Clone, Debug)]
pub struct SuperBlockSubgraph {
    header: VertexId,
    cyclic: bool,
    root: SuperBlockId,
    blocks: Vec<SuperBlock>,
    succ: FxHashMap<SuperBlockId, FxHashSet<SuperBlockId>>,
    pred: FxHashMap<SuperBlockId, FxHashSet<SuperBlockId>>,
    partitions: Vec<Partition>,
    point_to_block: FxHashMap<ProgramPoint, SuperBlockId>,
}

impl SuperBlockSubgraph {
    fn from_region(
        header: VertexId,
        cyclic: bool,
        region: &Region,
        exit_edges: &FxHashSet<(VertexId, VertexId)>,
    ) -> Self {
        let dfs = DepthFirstSearch::new(&region.graph, region.entry);
        let position: FxHashMap<VertexId, usize> = dfs
            .reverse_postorder()
            .enumerate()
            .map(|(i, v)| (v, i))
            .collect();
        let rank = |v: &VertexId| position.get(v).copied().unwrap_or(usize::MAX);

        let dominators = dominator_graph(region);
        let mut components = strong_components(&dominators);
        for component in &mut components {
            component.sort_by_key(rank);
        }
        components.sort_by_key(|c| c.first().map_or(usize::MAX, |v| rank(v)));

        let mut blocks = Vec::new();
        let mut point_to_block = FxHashMap::default();
        let mut membership: FxHashMap<VertexId, SuperBlockId> = FxHashMap::default();
        for (index, component) in components.iter().enumerate() {
            let id = SuperBlockId::try_from(index).unwrap_or(SuperBlockId::MAX);
            let program_points: Vec<ProgramPoint> = component
                .iter()
                .filter_map(|v| region.graph.vertex(*v).ok().map(|v| v.point))
                .collect();
            let representative = program_points
                .iter()
                .find(|p| p.basic_block().is_some())
                .or_else(|| program_points.first())
                .copied()
                .unwrap_or(ProgramPoint::Header(header));
            let exit_edge = program_points
                .iter()
                .filter_map(|p| p.edge())
                .find(|e| exit_edges.contains(e));
            for point in &program_points {
                point_to_block.insert(*point, id);
            }
            for v in component {
                membership.insert(*v, id);
            }
            blocks.push(SuperBlock {
                id,
                program_points,
                representative,
                partition_id: None,
                exit_edge,
            });
        }

        let mut succ: FxHashMap<SuperBlockId, FxHashSet<SuperBlockId>> =
            FxHashMap::default();
        let mut pred: FxHashMap<SuperBlockId, FxHashSet<SuperBlockId>> =
            FxHashMap::default();
        for edge in region.graph.edges() {
            let (a, b) = (membership[&edge.pred], membership[&edge.succ]);
            if a != b {
                succ.entry(a).or_default().insert(b);
                pred.entry(b).or_default().insert(a);
            }
        }

        // Branch partitions: the successors of a basic block or abstract
        // header that fall outside its own super block. Edge program
        // points never branch, a merge target would miscount.
        let mut partitions = Vec::new();
        let mut ordered: Vec<VertexId> = region.graph.vertex_ids().collect();
        ordered.sort_by_key(|v| rank(v));
        for v in ordered {
            let Ok(vertex) = region.graph.vertex(v) else {
                continue;
            };
            if vertex.point.edge().is_some() {
                continue;
            }
            let own = membership[&v];
            let mut members: Vec<SuperBlockId> = region
                .graph
                .successors(v)
                .map(|s| membership[&s])
                .filter(|b| *b != own)
                .collect();
            members.sort_unstable();
            members.dedup();
            if !members.is_empty() {
                partitions.push(Partition {
                    branch: vertex.point,
                    members,
                });
            }
        }
        for (index, partition) in partitions.iter().enumerate() {
            for member in &partition.members {
                let block = &mut blocks[*member as usize];
                if block.partition_id.is_none() {
                    block.partition_id = Some(index);
                }
            }
        }

        let root = membership[&region.entry];
        debug!(
            "loop {header}: {} super blocks, {} partitions",
            blocks.len(),
            partitions.len()
        );
        Self {
            header,
            cyclic,
            root,
            blocks,
            succ,
            pred,
            partitions,
            point_to_block,
        }
    }

    pub const fn header(&self) -> VertexId {
        self.header
    }

    /// Whether the region is a real loop, so its super blocks can execute
    /// an unbounded number of times per run.
    pub const fn is_cyclic(&self) -> bool {
        self.cyclic
    }

    /// The super block containing the loop header.
    pub const fn root(&self) -> SuperBlockId {
        self.root
    }

    pub fn blocks(&self) -> impl Iterator<Item = &SuperBlock> {
        self.blocks.iter()
    }

    pub fn block(&self, id: SuperBlockId) -> Option<&SuperBlock> {
        self.blocks.get(id as usize)
    }

    pub fn block_of_point(&self, point: ProgramPoint) -> Option<&SuperBlock> {
        self.point_to_block
            .get(&point)
            .and_then(|id| self.blocks.get(*id as usize))
    }

    pub fn successors(&self, id: SuperBlockId) -> impl Iterator<Item = SuperBlockId> + '_ {
        self.succ
            .get(&id)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub fn predecessors(&self, id: SuperBlockId) -> impl Iterator<Item = SuperBlockId> + '_ {
        self.pred
            .get(&id)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter()
    }

    /// Partitions whose branching point belongs to the given super block.
    pub fn successor_partitions(
        &self,
        id: SuperBlockId,
    ) -> impl Iterator<Item = &Partition> {
        self.partitions.iter().filter(move |p| {
            self.point_to_block.get(&p.branch).copied() == Some(id)
        })
    }

    pub fn number_of_blocks(&self) -> usize {
        self.blocks.len()
    }
}

/// The union of the dominator and post-dominator tree edges of a region,
/// both oriented parent to child. Its strongly connected components are
/// exactly the control-equivalence classes.
fn dominator_graph(region: &Region) -> DirectedGraph {
    let dom = DominatorTree::new(&region.graph, region.entry);
    let pdom = DominatorTree::new(&region.graph.reverse(), region.exit);
    let mut graph = DirectedGraph::new(region.graph.name());
    for v in region.graph.vertices() {
        // Ids are unique in the source region.
        let _ = graph.insert_vertex(v.id, v.point);
    }
    for v in region.graph.vertex_ids() {
        for parent in [dom.immediate_dominator(v), pdom.immediate_dominator(v)] {
            if let Some(parent) = parent
                && !graph.has_edge(parent, v)
            {
                let _ = graph.add_edge(parent, v);
            }
        }
    }
    graph
}

/// Forward and reverse super block subgraphs of every loop of a function,
/// paired one to one by program point.
#[derive(Clone, Debug)]
pub struct SuperBlockGraph {
    forward: Vec<SuperBlockSubgraph>,
    reverse: Vec<SuperBlockSubgraph>,
}

impl SuperBlockGraph {
    pub fn build(cfg: &ControlFlowGraph, lnt: &LoopNestingTree) -> Result<Self> {
        let mut forward = Vec::new();
        let mut reverse = Vec::new();
        for header in lnt.headers_bottom_up() {
            let cyclic = header != lnt.root();
            let exit_edges = lnt
                .exit_edges(header)
                .cloned()
                .unwrap_or_default();
            let region = build_region(cfg, lnt, header)?;
            forward.push(SuperBlockSubgraph::from_region(
                header, cyclic, &region, &exit_edges,
            ));
            reverse.push(SuperBlockSubgraph::from_region(
                header,
                cyclic,
                &region.reversed(),
                &exit_edges,
            ));
        }
        Ok(Self { forward, reverse })
    }

    /// Forward subgraphs, innermost loops first, root region last.
    pub fn forward_subgraphs(&self) -> impl Iterator<Item = &SuperBlockSubgraph> {
        self.forward.iter()
    }

    pub fn reverse_subgraphs(&self) -> impl Iterator<Item = &SuperBlockSubgraph> {
        self.reverse.iter()
    }

    pub fn forward(&self, header: VertexId) -> Option<&SuperBlockSubgraph> {
        self.forward.iter().find(|s| s.header == header)
    }

    pub fn reverse(&self, header: VertexId) -> Option<&SuperBlockSubgraph> {
        self.reverse.iter().find(|s| s.header == header)
    }

    /// The reverse super block paired with a forward one, through any of
    /// its program points.
    pub fn paired(&self, header: VertexId, forward: &SuperBlock) -> Option<&SuperBlock> {
        self.reverse(header)?
            .block_of_point(forward.representative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyses(
        blocks: &[VertexId],
        edges: &[(VertexId, VertexId)],
    ) -> (ControlFlowGraph, LoopNestingTree) {
        let cfg = ControlFlowGraph::from_edges("f", blocks, edges).unwrap();
        let lnt = LoopNestingTree::new(&cfg);
        (cfg, lnt)
    }

    #[test]
    fn test_diamond_arms_share_a_partition() {
        let (cfg, lnt) = analyses(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let sbg = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        let root = sbg.forward(1).unwrap();
        assert!(!root.is_cyclic());

        let b2 = root.block_of_point(ProgramPoint::BasicBlock(2)).unwrap();
        let b3 = root.block_of_point(ProgramPoint::BasicBlock(3)).unwrap();
        assert_ne!(b2.id, b3.id);
        assert_eq!(b2.partition_id, b3.partition_id);
        assert!(b2.partition_id.is_some());

        // The fork and the join are control equivalent.
        let b1 = root.block_of_point(ProgramPoint::BasicBlock(1)).unwrap();
        let b4 = root.block_of_point(ProgramPoint::BasicBlock(4)).unwrap();
        assert_eq!(b1.id, b4.id);
        assert_eq!(root.root(), b1.id);
    }

    #[test]
    fn test_branch_partition_members() {
        let (cfg, lnt) = analyses(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let sbg = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        let root = sbg.forward(1).unwrap();
        let partition = root
            .partitions()
            .find(|p| p.branch == ProgramPoint::BasicBlock(1))
            .unwrap();
        assert_eq!(partition.members.len(), 2);
    }

    #[test]
    fn test_loop_region_is_cyclic_and_records_exit_edge() {
        let (cfg, lnt) = analyses(&[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 2), (3, 4)]);
        let sbg = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        let body = sbg.forward(2).unwrap();
        assert!(body.is_cyclic());
        // The straight-line loop body collapses into one super block
        // carrying the exit edge.
        assert_eq!(body.number_of_blocks(), 1);
        let only = body.blocks().next().unwrap();
        assert_eq!(only.exit_edge, Some((3, 4)));
        assert_eq!(only.representative, ProgramPoint::BasicBlock(2));
    }

    #[test]
    fn test_inner_loop_abstracted_in_outer_region() {
        let (cfg, lnt) = analyses(&[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 2), (3, 4)]);
        let sbg = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        let root = sbg.forward(1).unwrap();
        assert!(root.block_of_point(ProgramPoint::Header(2)).is_some());
        assert!(root.block_of_point(ProgramPoint::BasicBlock(3)).is_none());
    }

    #[test]
    fn test_forward_and_reverse_pair_by_program_point() {
        let (cfg, lnt) = analyses(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let sbg = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        let root = sbg.forward(1).unwrap();
        for block in root.blocks() {
            let paired = sbg.paired(1, block).unwrap();
            let mut fwd = block.program_points.clone();
            let mut rev = paired.program_points.clone();
            fwd.sort_unstable();
            rev.sort_unstable();
            assert_eq!(fwd, rev);
        }
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let (cfg, lnt) = analyses(
            &[1, 2, 3, 4, 5, 6],
            &[(1, 2), (2, 3), (3, 4), (4, 3), (4, 5), (5, 2), (5, 6)],
        );
        let a = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        let b = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        for (x, y) in a.forward_subgraphs().zip(b.forward_subgraphs()) {
            assert_eq!(x.header(), y.header());
            assert_eq!(x.number_of_blocks(), y.number_of_blocks());
            for (bx, by) in x.blocks().zip(y.blocks()) {
                assert_eq!(bx.program_points, by.program_points);
                assert_eq!(bx.representative, by.representative);
            }
        }
    }
}
