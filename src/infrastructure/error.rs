use serde::{Deserialize, Serialize};
use std::fmt;

use super::item::ImportState;

/// Why a single item failed. Recorded on the item, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemError {
    /// The external import call reported a failure
    Import {
        message: String,
        exit_code: Option<i32>,
    },

    /// A pre/post-import hook returned an error or panicked
    Hook { message: String },

    /// The run was cancelled before the external call could start
    Cancelled,

    /// Imported, but its entry is no longer in the workspace state
    StateLost { reason: String },
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemError::Import { message, exit_code } => {
                write!(f, "import failed")?;

                if let Some(code) = exit_code {
                    write!(f, " (exit code {})", code)?;
                }

                write!(f, ": {}", message)
            }
            ItemError::Hook { message } => write!(f, "hook error: {}", message),
            ItemError::Cancelled => write!(f, "cancelled before import started"),
            ItemError::StateLost { reason } => write!(f, "not in workspace state: {}", reason),
        }
    }
}

/// Failure of the import phase as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The cancellation token fired; items keep whatever outcome they reached
    Cancelled { completed: usize, total: usize },

    /// Concurrency must be at least 1
    InvalidConcurrency(usize),

    /// The workspace handle does not point at a usable workspace
    WorkspaceUnusable(String),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Cancelled { completed, total } => {
                write!(
                    f,
                    "Run cancelled after {} of {} resources completed",
                    completed, total
                )
            }
            RunError::InvalidConcurrency(value) => {
                write!(f, "Concurrency must be at least 1 (got {})", value)
            }
            RunError::WorkspaceUnusable(msg) => {
                write!(f, "Workspace is unusable: {}", msg)
            }
        }
    }
}

impl std::error::Error for RunError {}

/// Error types for export operations
#[derive(Debug)]
pub enum ExportError {
    /// The discovery capability failed; nothing was listed
    Discovery(String),

    /// No valid target address could be produced
    Naming(String),

    /// Workspace lifecycle operation failed
    Workspace(String),

    /// The import phase failed as a whole
    Run(RunError),

    /// An operation was called in a state that does not allow it
    Usage {
        operation: &'static str,
        state: String,
    },

    /// An item was asked to move backwards or sideways in its lifecycle
    InvalidTransition {
        source_id: String,
        from: ImportState,
        to: ImportState,
    },

    /// External tool command failed
    ExecutorFailed {
        command: String,
        message: String,
        exit_code: Option<i32>,
    },

    /// Configuration file parsing or validation error
    ConfigParse(String),

    /// General I/O error
    Io(std::io::Error),

    /// Serialization error
    Serialization(String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Discovery(msg) => {
                write!(f, "Resource discovery failed: {}", msg)
            }
            ExportError::Naming(msg) => {
                write!(f, "Failed to resolve resource names: {}", msg)
            }
            ExportError::Workspace(msg) => {
                write!(f, "Workspace error: {}", msg)
            }
            ExportError::Run(err) => write!(f, "{}", err),
            ExportError::Usage { operation, state } => {
                write!(
                    f,
                    "Operation '{}' is not allowed in state '{}'",
                    operation, state
                )
            }
            ExportError::InvalidTransition {
                source_id,
                from,
                to,
            } => {
                write!(
                    f,
                    "Resource '{}' cannot move from {} to {}",
                    source_id, from, to
                )
            }
            ExportError::ExecutorFailed {
                command,
                message,
                exit_code,
            } => {
                write!(f, "Executor command '{}' failed", command)?;

                if let Some(code) = exit_code {
                    write!(f, " (exit code {})", code)?;
                }

                write!(f, ": {}", message)
            }
            ExportError::ConfigParse(msg) => {
                write!(f, "Failed to parse configuration: {}", msg)
            }
            ExportError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            ExportError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(err) => Some(err),
            ExportError::Run(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<RunError> for ExportError {
    fn from(err: RunError) -> Self {
        ExportError::Run(err)
    }
}

impl From<serde_yaml::Error> for ExportError {
    fn from(err: serde_yaml::Error) -> Self {
        ExportError::ConfigParse(err.to_string())
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Serialization(err.to_string())
    }
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_failed_display() {
        let err = ExportError::ExecutorFailed {
            command: "terraform import".to_string(),
            message: "boom".to_string(),
            exit_code: Some(1),
        };
        assert_eq!(
            err.to_string(),
            "Executor command 'terraform import' failed (exit code 1): boom"
        );
    }

    #[test]
    fn test_item_error_display() {
        let err = ItemError::Import {
            message: "not found".to_string(),
            exit_code: None,
        };
        assert_eq!(err.to_string(), "import failed: not found");
        assert_eq!(
            ItemError::Cancelled.to_string(),
            "cancelled before import started"
        );
    }

    #[test]
    fn test_run_error_converts() {
        let err: ExportError = RunError::InvalidConcurrency(0).into();
        assert!(matches!(err, ExportError::Run(RunError::InvalidConcurrency(0))));
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_item_error_serializes_with_kind_tag() {
        let json = serde_json::to_string(&ItemError::Hook {
            message: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"hook","message":"x"}"#);
    }
}
