//! Kosaraju's strongly-connected-component algorithm, with explicit
//! stacks.

use rustc_hash::FxHashMap;
use wcet_graph::{DirectedGraph, VertexId};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

pub(crate) fn strong_components(graph: &DirectedGraph) -> Vec<Vec<VertexId>> {
    // First pass: finish order over the graph itself.
    let mut colour: FxHashMap<VertexId, Colour> = graph
        .vertex_ids()
        .map(|id| (id, Colour::White))
        .collect();
    let mut finish: Vec<VertexId> = Vec::new();
    for root in graph.vertex_ids() {
        if colour.get(&root) != Some(&Colour::White) {
            continue;
        }
        let mut stack = vec![root];
        while let Some(v) = stack.pop() {
            match colour.get(&v).copied() {
                Some(Colour::White) => {
                    colour.insert(v, Colour::Grey);
                    stack.push(v);
                    for succ in graph.successors(v) {
                        if colour.get(&succ) == Some(&Colour::White) {
                            stack.push(succ);
                        }
                    }
                }
                Some(Colour::Grey) => {
                    colour.insert(v, Colour::Black);
                    finish.push(v);
                }
                _ => {}
            }
        }
    }

    // Second pass: collect components over the reversed graph, in
    // decreasing finish order.
    let reversed = graph.reverse();
    let mut assigned: FxHashMap<VertexId, bool> =
        graph.vertex_ids().map(|id| (id, false)).collect();
    let mut components = Vec::new();
    for root in finish.iter().rev() {
        if assigned.get(root) == Some(&true) {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![*root];
        while let Some(v) = stack.pop() {
            if assigned.get(&v) == Some(&true) {
                continue;
            }
            assigned.insert(v, true);
            component.push(v);
            for succ in reversed.successors(v) {
                if assigned.get(&succ) == Some(&false) {
                    stack.push(succ);
                }
            }
        }
        components.push(component);
    }
    components
}
