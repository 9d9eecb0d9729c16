//! Typed error hierarchy for the source registry.
//!
//! `RegistryError` covers everything the registry can reject: bad input on
//! source creation, missing files during reads, and I/O failures while
//! persisting the registry itself. The HTTP layer maps these onto status
//! codes in `api.rs`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the source registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Source not found")]
    SourceNotFound { id: String },

    #[error("Source name is required")]
    EmptyName,

    #[error("Source name already exists")]
    DuplicateName { name: String },

    #[error("Either file upload or file path is required")]
    MissingInput,

    #[error("File must be a JSON file")]
    NotJson { path: PathBuf },

    #[error("Invalid JSON file")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("Specified file path does not exist")]
    PathMissing { path: PathBuf },

    #[error("Invalid JSON file or unable to read file")]
    Unreadable { path: PathBuf },

    #[error("Source file not found")]
    FileMissing { id: String },

    #[error("Source file not accessible")]
    NotAccessible { id: String },

    #[error("Source file not accessible and no backup available")]
    BackupMissing { id: String },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RegistryError {
    /// Whether this error should surface as a client error (HTTP 400)
    /// rather than a lookup failure or server fault.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            RegistryError::EmptyName
                | RegistryError::DuplicateName { .. }
                | RegistryError::MissingInput
                | RegistryError::NotJson { .. }
                | RegistryError::InvalidJson { .. }
                | RegistryError::PathMissing { .. }
                | RegistryError::Unreadable { .. }
        )
    }

    /// Whether this error should surface as HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::SourceNotFound { .. }
                | RegistryError::FileMissing { .. }
                | RegistryError::NotAccessible { .. }
                | RegistryError::BackupMissing { .. }
        )
    }
}
