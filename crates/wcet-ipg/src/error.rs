use thiserror::Error;
use wcet_graph::{GraphError, VertexId};

#[derive(Error, Debug)]
pub enum IpgError {
    /// Two control flow paths between the same pair of consecutive
    /// instrumentation points subsume different vertex sets, so the edge
    /// label is not well defined and reconstruction would miscount.
    #[error(
        "ambiguous edge label in '{graph}': paths from instrumentation point \
         {pred} to vertex {succ} subsume different vertex sets"
    )]
    AmbiguousEdgeLabel {
        graph: String,
        pred: VertexId,
        succ: VertexId,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, IpgError>;
