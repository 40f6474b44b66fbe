//! Super block graphs.
//!
//! A super block groups the program points of a loop region that are
//! control equivalent: whenever one executes, all execute, the same number
//! of times. Control equivalence is the strongly-connected-component
//! relation of the union of the region's dominator and post-dominator
//! trees. Super blocks in the same branch partition are alternatives of
//! one branch, so their counts sum to the count of the branching block.

mod error;
mod region;
mod scc;
mod superblock;

pub use error::*;
pub use superblock::*;
