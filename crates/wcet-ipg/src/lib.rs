//! Instrumentation point graphs.
//!
//! An instrumentation point graph (IPG) contains only the instrumented
//! basic blocks of a control flow graph. Each edge carries the set of
//! uninstrumented vertices it subsumes, so a timing trace that observes
//! only instrumentation points still determines the execution counts of
//! every basic block. Iteration edges capture looping control flow that
//! the acyclic construction cannot see.

mod error;
mod ipg;
mod loops;

pub use error::*;
pub use ipg::*;
