//! Loop-aware IPG extension.
//!
//! Processes loops innermost first. For each loop the pass finds the
//! instrumentation points that can reach a tail without crossing another
//! instrumentation point (sources) and the instrumentation points first
//! observed after the header (destinations); every source-destination pair
//! becomes an iteration edge. Inner loops are abstracted behind the facts
//! already computed for them, so an instrumentation-free traversal of an
//! inner loop lifts its sources and destinations into the enclosing loop.

use std::collections::hash_map::Entry;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use wcet_graph::{ControlFlowGraph, LoopNestingTree, VertexId};

use crate::{Ipg, IpgError, Result};

type SubsumedMap = FxHashMap<VertexId, FxHashSet<VertexId>>;

/// Per-loop reachability facts, keyed by header once computed.
struct LoopFacts {
    /// Instrumentation points first observed after the header, with the
    /// uninstrumented vertices subsumed on the way.
    destinations: SubsumedMap,
    /// Instrumentation points that reach a tail of the loop without
    /// crossing another instrumentation point.
    sources: SubsumedMap,
    /// Instrumentation points that reach an exit of the loop without
    /// crossing another instrumentation point.
    exit_sources: SubsumedMap,
    /// Subsumed vertices of an instrumentation-free traversal from the
    /// header to an exit, when one exists.
    thru: Option<FxHashSet<VertexId>>,
}

pub(crate) fn annotate(
    ipg: &mut Ipg,
    cfg: &ControlFlowGraph,
    lnt: &LoopNestingTree,
) -> Result<()> {
    let mut facts: FxHashMap<VertexId, LoopFacts> = FxHashMap::default();
    for header in lnt.headers_bottom_up() {
        if header == lnt.root() {
            continue;
        }
        let f = analyse_loop(ipg, cfg, lnt, &facts, header);
        let mut edges = FxHashSet::default();
        for (source, subsumed_back) in &f.sources {
            for (destination, subsumed_fwd) in &f.destinations {
                let label: FxHashSet<VertexId> =
                    subsumed_back.union(subsumed_fwd).copied().collect();
                debug!(
                    "iteration edge ({source}, {destination}) for loop {header} \
                     in '{}' subsumes {label:?}",
                    cfg.name()
                );
                if let Some(edge) = ipg.graph.edge_between_mut(*source, *destination) {
                    // An edge between this pair already exists, from the
                    // acyclic pass or an inner loop. A traversal of the
                    // pair cannot be attributed to one path or the other,
                    // so differing labels make every count wrong.
                    if edge.label != label {
                        return Err(IpgError::AmbiguousEdgeLabel {
                            graph: cfg.name().to_owned(),
                            pred: *source,
                            succ: *destination,
                        });
                    }
                    edge.iteration = true;
                } else {
                    ipg.graph
                        .add_labelled_edge(*source, *destination, label, true)?;
                }
                edges.insert((*source, *destination));
            }
        }
        ipg.iteration_edges.insert(header, edges);
        facts.insert(header, f);
    }
    Ok(())
}

fn analyse_loop(
    ipg: &Ipg,
    cfg: &ControlFlowGraph,
    lnt: &LoopNestingTree,
    facts: &FxHashMap<VertexId, LoopFacts>,
    header: VertexId,
) -> LoopFacts {
    let (destinations, thru) = forward_walk(ipg, cfg, lnt, facts, header);
    let tails: Vec<VertexId> = lnt
        .tails(header)
        .into_iter()
        .flat_map(|s| s.iter().copied())
        .collect();
    let sources = backward_walk(ipg, cfg, lnt, facts, header, &tails);
    let exits: FxHashSet<VertexId> = lnt
        .exit_edges(header)
        .into_iter()
        .flat_map(|s| s.iter().map(|(pred, _)| *pred))
        .collect();
    let exits: Vec<VertexId> = exits.into_iter().collect();
    let exit_sources = backward_walk(ipg, cfg, lnt, facts, header, &exits);
    LoopFacts {
        destinations,
        sources,
        exit_sources,
        thru,
    }
}

/// The innermost loop of `v` that is an immediate child of `header`, or
/// `None` when `v` belongs directly to `header`'s region.
fn enclosing_child(
    lnt: &LoopNestingTree,
    header: VertexId,
    v: VertexId,
) -> Option<VertexId> {
    let mut walk = lnt.innermost_loop(v);
    if walk == header {
        return None;
    }
    loop {
        match lnt.parent_loop(walk) {
            Some(parent) if parent == header => return Some(walk),
            Some(parent) => walk = parent,
            None => return None,
        }
    }
}

fn grow(
    reach: &mut SubsumedMap,
    key: VertexId,
    add: &FxHashSet<VertexId>,
) -> bool {
    match reach.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(add.clone());
            true
        }
        Entry::Occupied(mut slot) => {
            let before = slot.get().len();
            slot.get_mut().extend(add.iter().copied());
            slot.get().len() > before
        }
    }
}

/// Walk forward from the header along instrumentation-free paths inside
/// the loop. Returns the destinations and, when the loop can be traversed
/// without touching an instrumentation point, the subsumed vertices of
/// such a traversal.
fn forward_walk(
    ipg: &Ipg,
    cfg: &ControlFlowGraph,
    lnt: &LoopNestingTree,
    facts: &FxHashMap<VertexId, LoopFacts>,
    header: VertexId,
) -> (SubsumedMap, Option<FxHashSet<VertexId>>) {
    let mut destinations = SubsumedMap::default();
    if ipg.is_ipoint(header) {
        // The header itself is the first observation after a back edge.
        destinations.insert(header, FxHashSet::default());
        return (destinations, None);
    }
    let Some(body) = lnt.body(header) else {
        return (destinations, None);
    };

    let mut thru: Option<FxHashSet<VertexId>> = None;
    let mut reach = SubsumedMap::default();
    reach.insert(header, std::iter::once(header).collect());
    let mut work = vec![header];

    while let Some(u) = work.pop() {
        let acc = reach[&u].clone();
        let targets: Vec<VertexId> = if u != header && lnt.is_header(u) {
            // Past an abstracted inner loop: continue from its exits.
            lnt.exit_edges(u)
                .into_iter()
                .flat_map(|s| s.iter().map(|(_, succ)| *succ))
                .collect()
        } else {
            cfg.successors(u).collect()
        };
        for v in targets {
            if v == header {
                continue;
            }
            if !body.contains(&v) {
                thru.get_or_insert_with(FxHashSet::default)
                    .extend(acc.iter().copied());
                continue;
            }
            if let Some(child) = enclosing_child(lnt, header, v) {
                if let Some(inner) = facts.get(&child) {
                    for (destination, subsumed) in &inner.destinations {
                        let slot = destinations.entry(*destination).or_default();
                        slot.extend(acc.iter().copied());
                        slot.extend(subsumed.iter().copied());
                    }
                    if let Some(inner_thru) = &inner.thru {
                        let mut add = acc.clone();
                        add.extend(inner_thru.iter().copied());
                        if grow(&mut reach, child, &add) {
                            work.push(child);
                        }
                    }
                }
            } else if ipg.is_ipoint(v) {
                destinations
                    .entry(v)
                    .or_default()
                    .extend(acc.iter().copied());
            } else {
                let mut add = acc.clone();
                add.insert(v);
                if grow(&mut reach, v, &add) {
                    work.push(v);
                }
            }
        }
    }
    (destinations, thru)
}

/// Walk backward from the seed vertices along instrumentation-free paths
/// inside the loop, stopping at the header. Returns the instrumentation
/// points found, with the uninstrumented vertices subsumed between each
/// point and a seed.
fn backward_walk(
    ipg: &Ipg,
    cfg: &ControlFlowGraph,
    lnt: &LoopNestingTree,
    facts: &FxHashMap<VertexId, LoopFacts>,
    header: VertexId,
    seeds: &[VertexId],
) -> SubsumedMap {
    let mut out = SubsumedMap::default();
    let Some(body) = lnt.body(header) else {
        return out;
    };
    let mut reach = SubsumedMap::default();
    let mut work: Vec<VertexId> = Vec::new();

    let visit = |v: VertexId,
                 acc: &FxHashSet<VertexId>,
                 out: &mut SubsumedMap,
                 reach: &mut SubsumedMap,
                 work: &mut Vec<VertexId>| {
        if v == header {
            if ipg.is_ipoint(v) {
                out.entry(v).or_default().extend(acc.iter().copied());
            }
            return;
        }
        if !body.contains(&v) {
            return;
        }
        if let Some(child) = enclosing_child(lnt, header, v) {
            if let Some(inner) = facts.get(&child) {
                for (source, subsumed) in &inner.exit_sources {
                    let slot = out.entry(*source).or_default();
                    slot.extend(subsumed.iter().copied());
                    slot.extend(acc.iter().copied());
                }
                if let Some(inner_thru) = &inner.thru {
                    let mut add = acc.clone();
                    add.extend(inner_thru.iter().copied());
                    if grow(reach, child, &add) {
                        work.push(child);
                    }
                }
            }
        } else if ipg.is_ipoint(v) {
            out.entry(v).or_default().extend(acc.iter().copied());
        } else {
            let mut add = acc.clone();
            add.insert(v);
            if grow(reach, v, &add) {
                work.push(v);
            }
        }
    };

    let empty = FxHashSet::default();
    for seed in seeds {
        visit(*seed, &empty, &mut out, &mut reach, &mut work);
    }
    while let Some(u) = work.pop() {
        let acc = reach[&u].clone();
        let preds: Vec<VertexId> = if u != header && lnt.is_header(u) {
            // Before an abstracted inner loop: continue from its entries.
            cfg.predecessors(u)
                .filter(|p| !lnt.is_back_edge(*p, u))
                .collect()
        } else {
            cfg.predecessors(u).collect()
        };
        for p in preds {
            visit(p, &acc, &mut out, &mut reach, &mut work);
        }
    }
    out
}
