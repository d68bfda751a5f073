//! Error types for the replication library.

use thiserror::Error;

/// Process exit code for a session that finished but left objects behind after retry.
pub const EXIT_UNRECOVERED_OBJECTS: u8 = 5;

/// Main error type for replication sessions.
///
/// Only configuration, connection and listing failures stop a session.
/// Per-object problems travel as [`crate::transfer::TransferFailure`] values
/// and never surface here.
#[derive(Error, Debug)]
pub enum ReplicateError {
    /// Configuration error (missing section, missing option, unreadable file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object store client could not be constructed
    #[error("Connection error for {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    /// A page fetch failed or returned no records before the end of the listing
    #[error("Listing failed at marker '{cursor}': {message}")]
    Listing { cursor: String, message: String },

    /// Object transfer failed
    #[error("Transfer failed for {key}: {message}")]
    Transfer { key: String, message: String },

    /// Worker pool or aggregator failure with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Checkpoint file error
    #[error("Checkpoint error: {0}")]
    State(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReplicateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        ReplicateError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Listing error
    pub fn listing(cursor: impl Into<String>, message: impl Into<String>) -> Self {
        ReplicateError::Listing {
            cursor: cursor.into(),
            message: message.into(),
        }
    }

    /// Create a Connection error
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        ReplicateError::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error class.
    ///
    /// | code | class |
    /// |------|-------|
    /// | 2 | configuration |
    /// | 3 | connection |
    /// | 4 | listing |
    /// | 1 | everything else |
    pub fn exit_code(&self) -> u8 {
        match self {
            ReplicateError::Config(_) | ReplicateError::Yaml(_) => 2,
            ReplicateError::Connection { .. } => 3,
            ReplicateError::Listing { .. } => 4,
            ReplicateError::Transfer { .. }
            | ReplicateError::Pool { .. }
            | ReplicateError::State(_)
            | ReplicateError::Io(_)
            | ReplicateError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicateError>;
