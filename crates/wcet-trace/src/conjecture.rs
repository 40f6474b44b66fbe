//! Conjecture falsification.
//!
//! Conjectures start maximally strong and only weaken as runs contradict
//! them: every super block of an acyclic region executes at least once per
//! run (unbounded for loop regions), and super blocks of one branch
//! partition are pairwise execution exclusive. Runs can be processed in
//! parallel because merging two states is a pairwise minimum of counts and
//! an intersection of surviving exclusions, which is commutative and
//! associative.

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;
use wcet_graph::VertexId;
use wcet_ipg::Ipg;
use wcet_superblock::{SuperBlockGraph, SuperBlockId};

use crate::{reconstruct_ipg_run, reconstruct_superblock_run};

/// A super block, identified by its loop header and id within that loop's
/// subgraph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub header: VertexId,
    pub block: SuperBlockId,
}

fn ordered(a: BlockKey, b: BlockKey) -> (BlockKey, BlockKey) {
    if a <= b { (a, b) } else { (b, a) }
}

/// The surviving conjectures after some set of runs. `None` as a minimum
/// count means the conjecture is still unbounded: no run has executed the
/// block yet, and the block sits in a loop.
#[derive(Clone, Debug)]
pub struct ConjectureState {
    minimums: FxHashMap<BlockKey, Option<u64>>,
    exclusions: FxHashSet<(BlockKey, BlockKey)>,
    observed: FxHashSet<BlockKey>,
}

impl ConjectureState {
    /// The initial conjectures of a super block graph: only blocks that
    /// contain at least one basic block are tracked, since only those are
    /// observable in a reconstruction.
    pub fn new(sbg: &SuperBlockGraph) -> Self {
        let mut minimums = FxHashMap::default();
        let mut exclusions = FxHashSet::default();
        for subgraph in sbg.forward_subgraphs() {
            let observable = |id: SuperBlockId| {
                subgraph
                    .block(id)
                    .is_some_and(|b| b.basic_blocks().next().is_some())
            };
            for block in subgraph.blocks() {
                if observable(block.id) {
                    let key = BlockKey {
                        header: subgraph.header(),
                        block: block.id,
                    };
                    let initial = if subgraph.is_cyclic() { None } else { Some(1) };
                    minimums.insert(key, initial);
                }
            }
            for partition in subgraph.partitions() {
                let members: Vec<SuperBlockId> = partition
                    .members
                    .iter()
                    .copied()
                    .filter(|m| observable(*m))
                    .collect();
                for (i, a) in members.iter().enumerate() {
                    for b in &members[i + 1..] {
                        let ka = BlockKey {
                            header: subgraph.header(),
                            block: *a,
                        };
                        let kb = BlockKey {
                            header: subgraph.header(),
                            block: *b,
                        };
                        exclusions.insert(ordered(ka, kb));
                    }
                }
            }
        }
        Self {
            minimums,
            exclusions,
            observed: FxHashSet::default(),
        }
    }

    /// Weaken the conjectures against the reconstructed counts of one run.
    /// Minimum counts only ever decrease; a falsified exclusion never
    /// returns.
    pub fn observe_run(
        &mut self,
        sbg: &SuperBlockGraph,
        counts: &FxHashMap<VertexId, u64>,
    ) {
        let mut executed: FxHashMap<BlockKey, u64> = FxHashMap::default();
        for subgraph in sbg.forward_subgraphs() {
            for block in subgraph.blocks() {
                let Some(b) = block.basic_blocks().next() else {
                    continue;
                };
                let key = BlockKey {
                    header: subgraph.header(),
                    block: block.id,
                };
                executed.insert(key, counts.get(&b).copied().unwrap_or(0));
            }
        }
        for (key, count) in &executed {
            if *count == 0 {
                continue;
            }
            self.observed.insert(*key);
            if let Some(minimum) = self.minimums.get_mut(key) {
                *minimum = Some(minimum.map_or(*count, |m| m.min(*count)));
            }
        }
        self.exclusions.retain(|(a, b)| {
            !(executed.get(a).copied().unwrap_or(0) > 0
                && executed.get(b).copied().unwrap_or(0) > 0)
        });
    }

    /// Combine two states built from disjoint run sets.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for (key, theirs) in other.minimums {
            let slot = self.minimums.entry(key).or_insert(None);
            *slot = match (*slot, theirs) {
                (None, m) | (m, None) => m,
                (Some(a), Some(b)) => Some(a.min(b)),
            };
        }
        self.observed.extend(other.observed);
        self.exclusions
            .retain(|pair| other.exclusions.contains(pair));
        self
    }

    /// Force the minimum of every never-observed block to zero. Called
    /// once, after the whole batch of runs.
    pub fn finalise(&mut self) {
        for (key, minimum) in &mut self.minimums {
            if !self.observed.contains(key) {
                warn!(
                    "super block {} of loop {} never observed, forcing its \
                     minimum count to zero",
                    key.block, key.header
                );
                *minimum = Some(0);
            }
        }
    }

    /// The surviving minimum count conjecture of a block: `Some(None)` is
    /// still unbounded, outer `None` an unknown key.
    pub fn minimum(&self, key: BlockKey) -> Option<Option<u64>> {
        self.minimums.get(&key).copied()
    }

    pub fn is_excluded(&self, a: BlockKey, b: BlockKey) -> bool {
        self.exclusions.contains(&ordered(a, b))
    }

    pub fn exclusions(&self) -> impl Iterator<Item = (BlockKey, BlockKey)> + '_ {
        self.exclusions.iter().copied()
    }

    pub fn number_of_exclusions(&self) -> usize {
        self.exclusions.len()
    }
}

/// Reconstruct every run with the super block strategy, in parallel, and
/// fold the per-run states into one.
pub fn falsify_runs(
    sbg: &SuperBlockGraph,
    instrumented: &FxHashSet<VertexId>,
    runs: &[Vec<VertexId>],
) -> ConjectureState {
    let mut state = runs
        .par_iter()
        .map(|run| {
            let reconstruction = reconstruct_superblock_run(sbg, instrumented, run);
            let mut state = ConjectureState::new(sbg);
            state.observe_run(sbg, &reconstruction.counts);
            state
        })
        .reduce(|| ConjectureState::new(sbg), ConjectureState::merge);
    state.finalise();
    state
}

/// As [`falsify_runs`], but replaying runs over the IPG. Runs the IPG
/// cannot replay are discarded with a warning; the batch continues.
pub fn falsify_runs_with_ipg(
    ipg: &Ipg,
    sbg: &SuperBlockGraph,
    runs: &[Vec<VertexId>],
) -> ConjectureState {
    let mut state = runs
        .par_iter()
        .map(|run| {
            let mut state = ConjectureState::new(sbg);
            match reconstruct_ipg_run(ipg, run) {
                Ok(counts) => state.observe_run(sbg, &counts),
                Err(error) => warn!("discarding run: {error}"),
            }
            state
        })
        .reduce(|| ConjectureState::new(sbg), ConjectureState::merge);
    state.finalise();
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use wcet_graph::{ControlFlowGraph, LoopNestingTree, ProgramPoint};

    fn setup(
        blocks: &[VertexId],
        edges: &[(VertexId, VertexId)],
    ) -> (Ipg, SuperBlockGraph, FxHashSet<VertexId>) {
        let cfg = ControlFlowGraph::from_edges("f", blocks, edges).unwrap();
        let lnt = LoopNestingTree::new(&cfg);
        let instrumented: FxHashSet<VertexId> = blocks.iter().copied().collect();
        let ipg = Ipg::build(&cfg, &lnt, &instrumented).unwrap();
        let sbg = SuperBlockGraph::build(&cfg, &lnt).unwrap();
        (ipg, sbg, instrumented)
    }

    fn key_of(sbg: &SuperBlockGraph, header: VertexId, block: VertexId) -> BlockKey {
        let subgraph = sbg.forward(header).unwrap();
        let block = subgraph
            .block_of_point(ProgramPoint::BasicBlock(block))
            .unwrap();
        BlockKey {
            header,
            block: block.id,
        }
    }

    #[test]
    fn test_loop_minimum_falls_from_unbounded_then_only_decreases() {
        let (_, sbg, instrumented) =
            setup(&[1, 2, 3], &[(1, 2), (2, 2), (2, 3)]);
        let key = key_of(&sbg, 2, 2);

        let mut state = ConjectureState::new(&sbg);
        assert_eq!(state.minimum(key), Some(None));

        let run = reconstruct_superblock_run(&sbg, &instrumented, &[1, 2, 2, 2, 3]);
        state.observe_run(&sbg, &run.counts);
        assert_eq!(state.minimum(key), Some(Some(3)));

        let run = reconstruct_superblock_run(&sbg, &instrumented, &[1, 2, 2, 2, 2, 2, 3]);
        state.observe_run(&sbg, &run.counts);
        assert_eq!(state.minimum(key), Some(Some(3)));

        let run = reconstruct_superblock_run(&sbg, &instrumented, &[1, 2, 2, 3]);
        state.observe_run(&sbg, &run.counts);
        assert_eq!(state.minimum(key), Some(Some(2)));
    }

    #[test]
    fn test_exclusive_branch_arms_stay_excluded() {
        let (_, sbg, instrumented) =
            setup(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let a = key_of(&sbg, 1, 2);
        let b = key_of(&sbg, 1, 3);

        let runs = vec![vec![1, 2, 4], vec![1, 3, 4], vec![1, 2, 4]];
        let state = falsify_runs(&sbg, &instrumented, &runs);
        // No single run executed both arms.
        assert!(state.is_excluded(a, b));
        assert_eq!(state.minimum(a), Some(Some(1)));
        assert_eq!(state.minimum(b), Some(Some(1)));
    }

    #[test]
    fn test_exclusion_falsified_inside_a_loop() {
        // A loop whose branch can take both arms across iterations of one
        // run.
        let (_, sbg, instrumented) = setup(
            &[1, 2, 3, 4, 5, 6],
            &[(1, 2), (2, 3), (2, 4), (3, 5), (4, 5), (5, 2), (5, 6)],
        );
        let a = key_of(&sbg, 2, 3);
        let b = key_of(&sbg, 2, 4);
        let mut state = ConjectureState::new(&sbg);
        assert!(state.is_excluded(a, b));

        let run =
            reconstruct_superblock_run(&sbg, &instrumented, &[1, 2, 3, 5, 2, 4, 5, 6]);
        state.observe_run(&sbg, &run.counts);
        assert!(!state.is_excluded(a, b));
    }

    #[test]
    fn test_parallel_merge_matches_sequential_observation() {
        let (_, sbg, instrumented) =
            setup(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let runs = vec![vec![1, 2, 4], vec![1, 3, 4]];

        let parallel = falsify_runs(&sbg, &instrumented, &runs);

        let mut sequential = ConjectureState::new(&sbg);
        for run in &runs {
            let reconstruction = reconstruct_superblock_run(&sbg, &instrumented, run);
            sequential.observe_run(&sbg, &reconstruction.counts);
        }
        sequential.finalise();

        for subgraph in sbg.forward_subgraphs() {
            for block in subgraph.blocks() {
                let key = BlockKey {
                    header: subgraph.header(),
                    block: block.id,
                };
                assert_eq!(parallel.minimum(key), sequential.minimum(key));
            }
        }
        assert_eq!(
            parallel.number_of_exclusions(),
            sequential.number_of_exclusions()
        );
    }

    #[test]
    fn test_unobserved_blocks_forced_to_zero() {
        let (_, sbg, instrumented) =
            setup(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let b = key_of(&sbg, 1, 3);
        let runs = vec![vec![1, 2, 4]];
        let state = falsify_runs(&sbg, &instrumented, &runs);
        assert_eq!(state.minimum(b), Some(Some(0)));
    }

    #[test]
    fn test_discarded_run_does_not_poison_the_batch() {
        let (ipg, sbg, _) = setup(&[1, 2, 3, 4], &[(1, 2), (1, 3), (2, 4), (3, 4)]);
        let a = key_of(&sbg, 1, 2);
        // The second run has an impossible transition and is dropped.
        let runs = vec![vec![1, 2, 4], vec![1, 2, 3, 4]];
        let state = falsify_runs_with_ipg(&ipg, &sbg, &runs);
        assert_eq!(state.minimum(a), Some(Some(1)));
    }
}
