use thiserror::Error;

use crate::ProgramFormatError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] wcet_graph::GraphError),
    #[error(transparent)]
    Ipg(#[from] wcet_ipg::IpgError),
    #[error(transparent)]
    SuperBlock(#[from] wcet_superblock::SuperBlockError),
    #[error(transparent)]
    Trace(#[from] wcet_trace::TraceError),
    #[error(transparent)]
    Reconstruction(#[from] wcet_trace::ReconstructionError),
    #[error(transparent)]
    Format(#[from] ProgramFormatError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
