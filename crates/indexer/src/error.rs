use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("invalid root path: {0}")]
    InvalidRoot(String),

    #[error("path not indexed: {0}")]
    NotIndexed(String),

    #[error("refusing to read binary content: {0}")]
    BinaryContent(String),
}
