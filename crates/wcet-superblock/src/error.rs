use thiserror::Error;
use wcet_graph::GraphError;

#[derive(Error, Debug)]
pub enum SuperBlockError {
    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, SuperBlockError>;
