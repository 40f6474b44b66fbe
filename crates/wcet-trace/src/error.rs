use thiserror::Error;
use wcet_graph::VertexId;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error(
        "trace file magic number {found} does not match {expected} \
         for program '{program}'"
    )]
    MagicMismatch {
        program: String,
        expected: String,
        found: String,
    },
    #[error("trace file has no magic number line")]
    MissingMagic,
    #[error("malformed vertex id '{token}' in trace file")]
    MalformedId { token: String },
    #[error("malformed trace record '{line}': {reason}")]
    MalformedRecord { line: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TraceError>;

/// A run could not be replayed against the IPG. The run is discarded; the
/// rest of the batch is still processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconstructionError {
    #[error(
        "no edge from instrumentation point {from} matches observed \
         point {to} in '{function}'"
    )]
    NoMatchingEdge {
        function: String,
        from: VertexId,
        to: VertexId,
    },
    #[error("run starts at {found}, not at the entry point of '{function}'")]
    BadStart { function: String, found: VertexId },
    #[error("run ends at {found}, not at the exit point of '{function}'")]
    BadEnd { function: String, found: VertexId },
    #[error("run contains no instrumentation points of '{function}'")]
    EmptyRun { function: String },
}
