use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("index build failed: {0}")]
    Index(#[from] scout_indexer::IndexerError),

    #[error("controller already ran to completion; build a new session")]
    ControllerReuse,
}
