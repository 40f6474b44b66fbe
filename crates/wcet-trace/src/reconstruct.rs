//! Execution count reconstruction.
//!
//! Two strategies rebuild per-block execution counts from one run:
//! replaying the observed instrumentation points over the IPG, whose edge
//! labels carry the subsumed vertices, or counting the instrumented points
//! directly and propagating flow conservation over the super block graphs.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;
use wcet_graph::VertexId;
use wcet_ipg::Ipg;
use wcet_superblock::{SuperBlockGraph, SuperBlockId, SuperBlockSubgraph};

use crate::ReconstructionError;

/// Replay a run over the IPG, incrementing each observed instrumentation
/// point and every vertex subsumed by the edges traversed.
pub fn reconstruct_ipg_run(
    ipg: &Ipg,
    run: &[VertexId],
) -> Result<FxHashMap<VertexId, u64>, ReconstructionError> {
    let observed: Vec<VertexId> = run
        .iter()
        .copied()
        .filter(|v| ipg.is_ipoint(*v))
        .collect();
    let function = ipg.name().to_owned();
    let Some(first) = observed.first() else {
        return Err(ReconstructionError::EmptyRun { function });
    };
    if *first != ipg.entry() {
        return Err(ReconstructionError::BadStart {
            function,
            found: *first,
        });
    }

    let mut counts: FxHashMap<VertexId, u64> = FxHashMap::default();
    *counts.entry(*first).or_insert(0) += 1;
    for pair in observed.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let Some(edge) = ipg.edge_between(from, to) else {
            return Err(ReconstructionError::NoMatchingEdge { function, from, to });
        };
        *counts.entry(to).or_insert(0) += 1;
        for subsumed in &edge.label {
            *counts.entry(*subsumed).or_insert(0) += 1;
        }
    }
    let last = observed
        .last()
        .copied()
        .unwrap_or(*first);
    if last != ipg.exit() {
        return Err(ReconstructionError::BadEnd {
            function,
            found: last,
        });
    }
    Ok(counts)
}

/// Counts reconstructed from one run. Super blocks flow conservation
/// could not resolve are listed as (loop header, block id) pairs; their
/// counts default to zero.
#[derive(Clone, Debug, Default)]
pub struct RunReconstruction {
    pub counts: FxHashMap<VertexId, u64>,
    pub underdetermined: bool,
    pub unresolved: Vec<(VertexId, SuperBlockId)>,
}

/// Count the instrumented points of a run directly, then propagate flow
/// conservation over each super block subgraph, innermost loops first.
/// Blocks the propagation cannot determine default to zero.
pub fn reconstruct_superblock_run(
    sbg: &SuperBlockGraph,
    instrumented: &FxHashSet<VertexId>,
    run: &[VertexId],
) -> RunReconstruction {
    let mut counts: FxHashMap<VertexId, u64> = FxHashMap::default();
    for v in run {
        if instrumented.contains(v) {
            *counts.entry(*v).or_insert(0) += 1;
        }
    }

    let mut unresolved: Vec<(VertexId, SuperBlockId)> = Vec::new();
    for subgraph in sbg.forward_subgraphs() {
        let resolved = resolve_subgraph(subgraph, instrumented, &counts);
        for block in subgraph.blocks() {
            let count = resolved[block.id as usize].unwrap_or(0);
            for b in block.basic_blocks() {
                counts.entry(b).or_insert(count);
            }
        }
        let blocked: Vec<SuperBlockId> = subgraph
            .blocks()
            .filter(|block| {
                resolved[block.id as usize].is_none()
                    && block.basic_blocks().next().is_some()
            })
            .map(|block| block.id)
            .collect();
        if !blocked.is_empty() {
            warn!(
                "underdetermined reconstruction: flow conservation cannot \
                 resolve super blocks {blocked:?} of loop {}",
                subgraph.header()
            );
            unresolved.extend(blocked.into_iter().map(|id| (subgraph.header(), id)));
        }
    }
    RunReconstruction {
        counts,
        underdetermined: !unresolved.is_empty(),
        unresolved,
    }
}

/// One pass of flow conservation over a subgraph. Known counts come from
/// instrumented basic blocks; unknown blocks are inferred from branch
/// partitions (the members of a partition sum to the count of the
/// branching block) and from merges whose predecessors all flow into them.
fn resolve_subgraph(
    subgraph: &SuperBlockSubgraph,
    instrumented: &FxHashSet<VertexId>,
    counts: &FxHashMap<VertexId, u64>,
) -> Vec<Option<u64>> {
    let n = subgraph.number_of_blocks();
    let mut known: Vec<Option<u64>> = vec![None; n];
    for block in subgraph.blocks() {
        if let Some(b) = block.basic_blocks().find(|b| instrumented.contains(b)) {
            known[block.id as usize] = Some(counts.get(&b).copied().unwrap_or(0));
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for block in subgraph.blocks() {
            let id = block.id as usize;

            // Partition rules around this block's own branches.
            for partition in subgraph.successor_partitions(block.id) {
                let values: Vec<Option<u64>> = partition
                    .members
                    .iter()
                    .map(|m| known[*m as usize])
                    .collect();
                let unknown: Vec<SuperBlockId> = partition
                    .members
                    .iter()
                    .copied()
                    .filter(|m| known[*m as usize].is_none())
                    .collect();
                let partial: u64 = values.iter().flatten().sum();
                match (known[id], unknown.as_slice()) {
                    // All members known: the branch count is their sum.
                    (None, []) => {
                        known[id] = Some(partial);
                        changed = true;
                    }
                    // Branch known, a single member missing.
                    (Some(total), [missing]) => {
                        known[*missing as usize] = Some(total.saturating_sub(partial));
                        changed = true;
                    }
                    _ => {}
                }
            }

            // Merge rules: when every predecessor flows only into this
            // block, its count is their sum.
            let preds: Vec<SuperBlockId> = subgraph.predecessors(block.id).collect();
            if !preds.is_empty()
                && preds.iter().all(|p| {
                    let succs: Vec<SuperBlockId> = subgraph.successors(*p).collect();
                    succs == [block.id]
                })
            {
                let unknown: Vec<SuperBlockId> = preds
                    .iter()
                    .copied()
                    .filter(|p| known[*p as usize].is_none())
                    .collect();
                let partial: u64 = preds.iter().filter_map(|p| known[*p as usize]).sum();
                match (known[id], unknown.as_slice()) {
                    (None, []) => {
                        known[id] = Some(partial);
                        changed = true;
                    }
                    (Some(total), [missing]) => {
                        known[*missing as usize] = Some(total.saturating_sub(partial));
                        changed = true;
                    }
                    _ => {}
                }
            }
        }
    }
    known
}

#[cfg(test)]
mod tests {
    use super::*;
    use wcet_graph::{ControlFlowGraph, LoopNestingTree, ProgramPoint};

    fn analyses(
        blocks: &[VertexId],
        edges: &[(VertexId, VertexId)],
    ) -> (ControlFlowGraph, LoopNestingTree) {
        let cfg = ControlFlowGraph::from_edges("f", blocks, edges).unwrap();
        let lnt = LoopNestingTree::new(&cfg);
        (cfg, lnt)
    }

    fn ipg_of(cfg: &ControlFlowGraph, lnt: &LoopNestingTree, chosen: &[VertexId]) -> Ipg {
        let chosen: FxHashSet<VertexId> = chosen.iter().copied().collect();
        Ipg::build(cfg, lnt, &chosen).unwrap()
    }

    /// The chosen points plus the forced entry and exit, without going
    /// through IPG construction.
    fn instrumented_of(cfg: &ControlFlowGraph, chosen: &[VertexId]) -> FxHashSet<VertexId> {
        let mut set: FxHashSet<VertexId> = chosen.iter().copied().collect();
        set.insert(cfg.entry());
        set.insert(cfg.exit());
        set
    }

    #[test]
    fn test_ipg_walk_counts_subsumed_vertices() {
        let (cfg, lnt) = analyses(&[1, 2, 3], &[(1, 2), (2, 3)]);
        let ipg = ipg_of(&cfg, &lnt, &[1, 3]);
        let counts = reconstruct_ipg_run(&ipg, &[1, 3]).unwrap();
        assert_eq!(counts.get(&1), Some(&1));
        assert_eq!(counts.get(&2), Some(&1));
        assert_eq!(counts.get(&3), Some(&1));
    }

    #[test]
    fn test_ipg_walk_follows_iteration_edges() {
        let (cfg, lnt) = analyses(&[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 2), (3, 4)]);
        let ipg = ipg_of(&cfg, &lnt, &[1, 2, 3, 4]);
        let counts = reconstruct_ipg_run(&ipg, &[1, 2, 3, 2, 3, 4]).unwrap();
        assert_eq!(counts.get(&2), Some(&2));
        assert_eq!(counts.get(&3), Some(&2));
        assert_eq!(counts.get(&4), Some(&1));
    }

    #[test]
    fn test_ipg_walk_rejects_impossible_transition() {
        let (cfg, lnt) = analyses(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let ipg = ipg_of(&cfg, &lnt, &[1, 2, 3, 4]);
        let err = reconstruct_ipg_run(&ipg, &[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(
            err,
            ReconstructionError::NoMatchingEdge { from: 2, to: 3, .. }
        ));
    }

    #[test]
    fn test_ipg_walk_requires_entry_and_exit() {
        let (cfg, lnt) = analyses(&[1, 2, 3], &[(1, 2), (2, 3)]);
        let ipg = ipg_of(&cfg, &lnt, &[1, 2, 3]);
        assert!(matches!(
            reconstruct_ipg_run(&ipg, &[2, 3]),
            Err(ReconstructionError::BadStart { found: 2, .. })
        ));
        assert!(matches!(
            reconstruct_ipg_run(&ipg, &[1, 2]),
            Err(ReconstructionError::BadEnd { found: 2, .. })
        ));
    }

    #[test]
    fn test_ipg_walk_over_lifted_iteration_edge_is_exact() {
        // Outer loop 2 carries the only instrumentation point (5); the
        // lifted iteration edge (5, 5) subsumes {2, 3, 4} exactly once
        // per outer iteration, so the outer body is never overcounted.
        let (cfg, lnt) = analyses(
            &[1, 2, 3, 4, 5, 6],
            &[(1, 2), (2, 3), (3, 4), (4, 3), (4, 5), (5, 2), (5, 6)],
        );
        let ipg = ipg_of(&cfg, &lnt, &[1, 5, 6]);
        // Execution 1,2,3,4,3,4,5,2,3,4,5,6 observed at {1, 5, 6}.
        let counts = reconstruct_ipg_run(&ipg, &[1, 5, 5, 6]).unwrap();
        assert_eq!(counts.get(&2), Some(&2));
        assert_eq!(counts.get(&5), Some(&2));
        assert_eq!(counts.get(&6), Some(&1));
    }

    #[test]
    fn test_superblock_run_infers_missing_branch_arm() {
        // 2 is uninstrumented; its count follows from the branch at 1 and
        // the instrumented sibling 3.
        let (cfg, lnt) = analyses(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let sbg = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        let instrumented = instrumented_of(&cfg, &[1, 3, 4]);
        let run = reconstruct_superblock_run(&sbg, &instrumented, &[1, 2, 4]);
        assert!(!run.underdetermined);
        assert_eq!(run.counts.get(&2).copied(), Some(1));
        assert_eq!(run.counts.get(&3).copied().unwrap_or(0), 0);
    }

    #[test]
    fn test_superblock_run_with_two_unknown_arms_is_underdetermined() {
        let (cfg, lnt) = analyses(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let sbg = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        let instrumented = instrumented_of(&cfg, &[1, 4]);
        let run = reconstruct_superblock_run(&sbg, &instrumented, &[1, 2, 4]);
        assert!(run.underdetermined);
        assert_eq!(run.counts.get(&2).copied().unwrap_or(0), 0);
        assert_eq!(run.counts.get(&3).copied().unwrap_or(0), 0);

        // The report names both unresolved arm super blocks.
        let root = sbg.forward(1).unwrap();
        let arm = |b: VertexId| root.block_of_point(ProgramPoint::BasicBlock(b)).unwrap().id;
        let mut blocked = run.unresolved.clone();
        blocked.sort_unstable();
        let mut expected = vec![(1, arm(2)), (1, arm(3))];
        expected.sort_unstable();
        assert_eq!(blocked, expected);
    }

    #[test]
    fn test_superblock_run_counts_loop_iterations() {
        let (cfg, lnt) = analyses(&[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 2), (3, 4)]);
        let sbg = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        let instrumented = instrumented_of(&cfg, &[1, 2, 3, 4]);
        let run = reconstruct_superblock_run(&sbg, &instrumented, &[1, 2, 3, 2, 3, 4]);
        assert_eq!(run.counts.get(&2).copied(), Some(2));
        assert_eq!(run.counts.get(&3).copied(), Some(2));
    }
}
