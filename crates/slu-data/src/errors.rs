use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataError>;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to retrieve {url}: {reason}")]
    Retrieval { url: String, reason: String },

    #[error("checksum mismatch for {}: expected sha1 {expected}, got {actual}", path.display())]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("corrupt archive {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("required file not found at {}: {source}", path.display())]
    MissingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid vocabulary {}: {reason}", path.display())]
    Vocabulary { path: PathBuf, reason: String },

    #[error("token '{0}' is not in the vocabulary and no unknown token is configured")]
    UnknownToken(String),

    #[error("misaligned segment '{segment}': {reason}")]
    Misaligned { segment: String, reason: String },

    #[error("invalid segment '{0}' (expected one of train, dev, test)")]
    InvalidSegment(String),

    #[error("no dataset registered under '{0}'")]
    UnknownDataset(String),
}

impl DataError {
    pub(crate) fn retrieval(url: &str, reason: impl ToString) -> Self {
        Self::Retrieval {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
