//! The directed multigraph arena underlying every derived graph.
//!
//! Vertices and edges are owned by the graph and addressed by stable integer
//! ids; a vertex only holds the ids of its incident edges, never the edges
//! themselves, so mutually-referencing adjacency never forms ownership cycles.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

/// Identifier of a vertex, unique within its owning graph.
pub type VertexId = u32;
/// Identifier of an edge, unique within its owning graph.
pub type EdgeId = u32;

/// Structural graph errors. Always fatal: they signal a construction bug,
/// never a recoverable condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("vertex {id} is not in graph '{graph}'")]
    MissingVertex { graph: String, id: VertexId },
    #[error("edge ({pred}, {succ}) is not in graph '{graph}'")]
    MissingEdge {
        graph: String,
        pred: VertexId,
        succ: VertexId,
    },
    #[error("vertex {id} already exists in graph '{graph}'")]
    DuplicateVertex { graph: String, id: VertexId },
    #[error("edge ({pred}, {succ}) already exists in graph '{graph}'")]
    DuplicateEdge {
        graph: String,
        pred: VertexId,
        succ: VertexId,
    },
    #[error("no entry vertex found in control flow graph '{graph}'")]
    NoEntry { graph: String },
    #[error("no exit vertex found in control flow graph '{graph}'")]
    NoExit { graph: String },
    #[error("multiple entry candidates in control flow graph '{graph}': {first} and {second}")]
    MultipleEntries {
        graph: String,
        first: VertexId,
        second: VertexId,
    },
    #[error("multiple exit candidates in control flow graph '{graph}': {first} and {second}")]
    MultipleExits {
        graph: String,
        first: VertexId,
        second: VertexId,
    },
    #[error("function '{name}' is not in the call graph")]
    UnknownFunction { name: String },
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// A program point carried by a vertex: a basic block, a control flow edge
/// modelled as a vertex, or an abstract reference to a loop header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramPoint {
    BasicBlock(VertexId),
    Edge(VertexId, VertexId),
    Header(VertexId),
}

impl ProgramPoint {
    /// The basic block id, if this point is a basic block.
    pub const fn basic_block(self) -> Option<VertexId> {
        match self {
            Self::BasicBlock(id) => Some(id),
            Self::Edge(..) | Self::Header(_) => None,
        }
    }

    /// The (pred, succ) pair, if this point is a control flow edge.
    pub const fn edge(self) -> Option<(VertexId, VertexId)> {
        match self {
            Self::Edge(p, s) => Some((p, s)),
            Self::BasicBlock(_) | Self::Header(_) => None,
        }
    }
}

impl std::fmt::Display for ProgramPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BasicBlock(id) => write!(f, "{id}"),
            Self::Edge(p, s) => write!(f, "({p}, {s})"),
            Self::Header(id) => write!(f, "header({id})"),
        }
    }
}

/// A vertex in the arena. Adjacency is stored as edge ids only.
#[derive(Clone, Debug)]
pub struct Vertex {
    pub id: VertexId,
    pub point: ProgramPoint,
    pred_edges: Vec<EdgeId>,
    succ_edges: Vec<EdgeId>,
}

impl Vertex {
    const fn new(id: VertexId, point: ProgramPoint) -> Self {
        Self {
            id,
            point,
            pred_edges: Vec::new(),
            succ_edges: Vec::new(),
        }
    }

    pub fn number_of_predecessors(&self) -> usize {
        self.pred_edges.len()
    }

    pub fn number_of_successors(&self) -> usize {
        self.succ_edges.len()
    }
}

/// An edge in the arena. The label records the CFG vertices subsumed along
/// the edge (used by instrumentation point graphs); the iteration flag marks
/// edges that represent looping control flow.
#[derive(Clone, Debug)]
pub struct Edge {
    pub id: EdgeId,
    pub pred: VertexId,
    pub succ: VertexId,
    pub label: FxHashSet<VertexId>,
    pub iteration: bool,
}

/// Directed multigraph over integer-identified vertices and edges.
///
/// Iteration follows vertex insertion order. Ids are never recycled, so
/// removal during an algorithm cannot alias a later insertion.
#[derive(Clone, Debug, Default)]
pub struct DirectedGraph {
    name: String,
    vertices: FxHashMap<VertexId, Vertex>,
    edges: FxHashMap<EdgeId, Edge>,
    order: Vec<VertexId>,
    next_vertex_id: VertexId,
    next_edge_id: EdgeId,
}

impl DirectedGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a vertex with an explicit id (as given by a program file).
    pub fn insert_vertex(&mut self, id: VertexId, point: ProgramPoint) -> Result<()> {
        if self.vertices.contains_key(&id) {
            return Err(GraphError::DuplicateVertex {
                graph: self.name.clone(),
                id,
            });
        }
        self.vertices.insert(id, Vertex::new(id, point));
        self.order.push(id);
        self.next_vertex_id = self.next_vertex_id.max(id + 1);
        Ok(())
    }

    /// Add a vertex with a fresh id owned by this graph.
    pub fn add_vertex(&mut self, point: ProgramPoint) -> VertexId {
        let id = self.next_vertex_id;
        self.next_vertex_id += 1;
        self.vertices.insert(id, Vertex::new(id, point));
        self.order.push(id);
        id
    }

    pub fn has_vertex(&self, id: VertexId) -> bool {
        self.vertices.contains_key(&id)
    }

    pub fn vertex(&self, id: VertexId) -> Result<&Vertex> {
        self.vertices.get(&id).ok_or_else(|| GraphError::MissingVertex {
            graph: self.name.clone(),
            id,
        })
    }

    /// Add an edge between two existing vertices. Self loops are legal but
    /// never implicit; parallel edges between the same pair are rejected.
    pub fn add_edge(&mut self, pred: VertexId, succ: VertexId) -> Result<EdgeId> {
        self.add_labelled_edge(pred, succ, FxHashSet::default(), false)
    }

    /// Add an edge carrying a subsumed-vertex label and an iteration flag.
    pub fn add_labelled_edge(
        &mut self,
        pred: VertexId,
        succ: VertexId,
        label: FxHashSet<VertexId>,
        iteration: bool,
    ) -> Result<EdgeId> {
        if !self.has_vertex(pred) {
            return Err(GraphError::MissingVertex {
                graph: self.name.clone(),
                id: pred,
            });
        }
        if !self.has_vertex(succ) {
            return Err(GraphError::MissingVertex {
                graph: self.name.clone(),
                id: succ,
            });
        }
        if self.edge_between(pred, succ).is_some() {
            return Err(GraphError::DuplicateEdge {
                graph: self.name.clone(),
                pred,
                succ,
            });
        }
        let id = self.next_edge_id;
        self.next_edge_id += 1;
        self.edges.insert(
            id,
            Edge {
                id,
                pred,
                succ,
                label,
                iteration,
            },
        );
        if let Some(v) = self.vertices.get_mut(&pred) {
            v.succ_edges.push(id);
        }
        if let Some(v) = self.vertices.get_mut(&succ) {
            v.pred_edges.push(id);
        }
        Ok(id)
    }

    pub fn has_edge(&self, pred: VertexId, succ: VertexId) -> bool {
        self.edge_between(pred, succ).is_some()
    }

    pub fn edge_between(&self, pred: VertexId, succ: VertexId) -> Option<&Edge> {
        let v = self.vertices.get(&pred)?;
        v.succ_edges
            .iter()
            .filter_map(|id| self.edges.get(id))
            .find(|e| e.succ == succ)
    }

    pub fn edge_between_mut(&mut self, pred: VertexId, succ: VertexId) -> Option<&mut Edge> {
        let id = self.edge_between(pred, succ)?.id;
        self.edges.get_mut(&id)
    }

    pub fn remove_edge(&mut self, pred: VertexId, succ: VertexId) -> Result<()> {
        let Some(edge) = self.edge_between(pred, succ) else {
            return Err(GraphError::MissingEdge {
                graph: self.name.clone(),
                pred,
                succ,
            });
        };
        let id = edge.id;
        self.edges.remove(&id);
        if let Some(v) = self.vertices.get_mut(&pred) {
            v.succ_edges.retain(|e| *e != id);
        }
        if let Some(v) = self.vertices.get_mut(&succ) {
            v.pred_edges.retain(|e| *e != id);
        }
        Ok(())
    }

    /// Remove a vertex together with all incident edges.
    pub fn remove_vertex(&mut self, id: VertexId) -> Result<()> {
        let Some(vertex) = self.vertices.get(&id) else {
            return Err(GraphError::MissingVertex {
                graph: self.name.clone(),
                id,
            });
        };
        let incident: Vec<EdgeId> = vertex
            .pred_edges
            .iter()
            .chain(vertex.succ_edges.iter())
            .copied()
            .collect();
        for edge_id in incident {
            if let Some(edge) = self.edges.remove(&edge_id) {
                if let Some(p) = self.vertices.get_mut(&edge.pred) {
                    p.succ_edges.retain(|e| *e != edge_id);
                }
                if let Some(s) = self.vertices.get_mut(&edge.succ) {
                    s.pred_edges.retain(|e| *e != edge_id);
                }
            }
        }
        self.vertices.remove(&id);
        self.order.retain(|v| *v != id);
        Ok(())
    }

    /// Vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.order.iter().filter_map(|id| self.vertices.get(id))
    }

    /// Vertex ids in insertion order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.order.iter().copied()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.vertices().flat_map(|v| {
            v.succ_edges.iter().filter_map(|id| self.edges.get(id))
        })
    }

    /// Successor edges of a vertex, in edge insertion order.
    pub fn successor_edges(&self, id: VertexId) -> impl Iterator<Item = &Edge> {
        self.vertices
            .get(&id)
            .into_iter()
            .flat_map(|v| v.succ_edges.iter().filter_map(|e| self.edges.get(e)))
    }

    pub fn predecessor_edges(&self, id: VertexId) -> impl Iterator<Item = &Edge> {
        self.vertices
            .get(&id)
            .into_iter()
            .flat_map(|v| v.pred_edges.iter().filter_map(|e| self.edges.get(e)))
    }

    pub fn successors(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.successor_edges(id).map(|e| e.succ)
    }

    pub fn predecessors(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.predecessor_edges(id).map(|e| e.pred)
    }

    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn number_of_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// A new graph with every edge flipped. Labels and iteration flags are
    /// preserved; vertex ids and insertion order carry over.
    pub fn reverse(&self) -> Self {
        let mut reversed = Self::new(self.name.clone());
        for v in self.vertices() {
            reversed
                .insert_vertex(v.id, v.point)
                .unwrap_or_else(|_| unreachable!("ids are unique in the source graph"));
        }
        for e in self.edges() {
            reversed
                .add_labelled_edge(e.succ, e.pred, e.label.clone(), e.iteration)
                .unwrap_or_else(|_| unreachable!("endpoints exist in the source graph"));
        }
        reversed
    }
}
