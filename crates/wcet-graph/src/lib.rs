//! Directed graph substrate for WCET analysis.
//!
//! Provides the program point graph used as the base representation for
//! control flow graphs and call graphs, plus the structural analyses built
//! on top of it: depth-first search, dominator trees and loop nesting trees.

mod callgraph;
mod cfg;
mod dfs;
mod dominators;
mod graph;
mod loops;

pub use callgraph::*;
pub use cfg::*;
pub use dfs::*;
pub use dominators::*;
pub use graph::*;
pub use loops::*;
