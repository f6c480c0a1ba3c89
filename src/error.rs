use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("label too long")]
    LabelTooLong,
    #[error("empty label")]
    EmptyLabel,
    #[error("name too long")]
    NameTooLong,
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("I/O operation error: {0}")]
    IO(#[from] std::io::Error),
    /// Disk read failure reported by a getter worker. The source is shared
    /// because one failed read may answer several coalesced requests.
    #[error("can't read {path:?}: {source}")]
    DiskRead {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("getter for {0:?} has been stopped")]
    GetterStopped(PathBuf),
    #[error("run of width {0} overflow")]
    RunOverflow(usize),
    #[error("Invalid Configuration: {0}")]
    Config(String),
    #[error("storage directory {0:?} is locked by another table")]
    Locked(PathBuf),
}

pub type IResult<T> = std::result::Result<T, Error>;
