//! Error types for engine operations

use super::files::FileId;
use super::instance::InstanceId;

/// Result alias for registry and actor operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the instance registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// No instance with this id is registered
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// No file with this id exists in the instance's store
    #[error("file not found: {0}")]
    FileNotFound(FileId),

    /// A file, directory or project was given an empty name
    #[error("name must not be empty")]
    EmptyName,

    /// Unzip was requested for something that is not a `.zip` file
    #[error("not an archive: {0}")]
    NotAnArchive(String),

    /// The instance's actor has shut down (instance deleted mid-request)
    #[error("instance {0} is no longer available")]
    Unavailable(InstanceId),
}
