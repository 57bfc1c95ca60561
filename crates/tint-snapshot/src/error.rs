//! Error types for snapshot building

use std::path::PathBuf;

/// Errors raised while building or writing a snapshot
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Reading members or writing the artifact failed
    #[error("io error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Members export could not be decoded
    #[error("invalid members export: {0}")]
    Members(#[source] serde_json::Error),

    /// Snapshot could not be encoded
    #[error("snapshot encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Temporary file could not replace the artifact
    #[error("failed to replace {path}: {source}")]
    Persist {
        /// Artifact path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Blocking write task died
    #[error("write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl BuildError {
    /// Create IO error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for build operations
pub type BuildResult<T> = Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_path() {
        let err = BuildError::io(
            "/tmp/user-cache.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/user-cache.json"));
    }
}
