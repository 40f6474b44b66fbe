//! Timing trace processing.
//!
//! Parses program traces and hardware address traces, reconstructs basic
//! block execution counts from the instrumentation points observed in each
//! run, and falsifies execution conjectures (minimum execution counts and
//! mutual exclusion of super blocks) across a batch of runs.

mod conjecture;
mod error;
mod format;
mod hardware;
mod reconstruct;

pub use conjecture::*;
pub use error::*;
pub use format::*;
pub use hardware::*;
pub use reconstruct::*;
