//! WCET analysis toolkit.
//!
//! Parses a program description into control flow graphs and a call graph,
//! builds the per-function analysis structures (loop nesting trees,
//! instrumentation point graphs, super block graphs) and exports the data
//! an external ILP generator consumes. Timing traces feed the execution
//! count reconstruction and conjecture falsification in [`wcet_trace`].

mod error;
mod pipeline;
mod program;
mod wcet_data;

pub use error::*;
pub use pipeline::*;
pub use program::*;
pub use wcet_data::*;
