use std::io;
use std::path::PathBuf;

use postfetch_core::FormatError;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::persist::PersistError;

#[derive(Debug, Error)]
pub enum PostprocessorError {
    #[error("invalid options for {plugin}: {source}")]
    InvalidOptions {
        plugin: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid template for {plugin}: {source}")]
    InvalidTemplate {
        plugin: &'static str,
        #[source]
        source: FormatError,
    },
    #[error("{plugin} failed to serialize metadata: {source}")]
    Serialize {
        plugin: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{plugin}: missing required option '{option}'")]
    MissingOption {
        plugin: &'static str,
        option: &'static str,
    },
    #[error("failed to write sidecar {path:?}: {source}")]
    Sidecar {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
    #[error("failed to open archive {path:?}: {source}")]
    ArchiveOpen {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },
    #[error("failed to read {path:?} for archiving: {source}")]
    ArchiveSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {entry:?} into archive {path:?}: {source}")]
    ArchiveWrite {
        path: PathBuf,
        entry: String,
        #[source]
        source: ArchiveError,
    },
    #[error("failed to close archive {path:?}: {source}")]
    ArchiveClose {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },
    #[error("failed to create directory {path:?}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{plugin} is disabled after an earlier failure")]
    Broken { plugin: &'static str },
}

impl PostprocessorError {
    /// Whether the current item must not be materialized after this failure.
    pub fn is_item_fatal(&self) -> bool {
        matches!(self, PostprocessorError::DirectoryCreate { .. })
    }
}
