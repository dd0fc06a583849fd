//! Domain-specific error types for ansible-bootstrap.
//!
//! This module defines `BootstrapError`, a `thiserror`-based enum that
//! provides typed error variants for the failure modes of payload assembly.
//! The pure payload API returns `Result<T, BootstrapError>`, while the
//! orchestration layer and trait boundaries use `anyhow::Result`.
//!
//! `BootstrapError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically at boundaries that return `anyhow::Result`.

use std::io;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). Unrecognized kinds
/// fall back to the OS-level error message.
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Domain-specific error type for ansible-bootstrap.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BootstrapError {
    /// A validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// A profile could not be parsed or is missing required settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested operating-system family has no lookup table entry.
    #[error("unknown AMI family: {0} (expected one of: al2023, debian, ubuntu)")]
    UnknownAmiFamily(String),

    /// An image search returned no candidates.
    #[error("no AMI matched query: {query}")]
    NoMatchingImage {
        /// Human-readable rendering of the filters that were applied.
        query: String,
    },

    /// A playbook, manifest or policy document could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A command execution failed (non-zero exit, spawn failure, etc.).
    #[error("command execution failed: {command}: {status}")]
    Execution {
        /// The command that was executed.
        command: String,
        /// Exit status or a description of the internal error.
        status: String,
    },

    /// A command could not be found in PATH.
    #[error("command not found in PATH: {command}")]
    CommandNotFound {
        /// The command that was looked up.
        command: String,
    },

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// A file path or an operation description with a path.
        context: String,
        /// Derived from [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl BootstrapError {
    /// Creates an `Io` variant with the `message` field derived from `source`.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = BootstrapError::Validation("remote_path must be absolute".to_string());
        assert_eq!(err.to_string(), "validation error: remote_path must be absolute");
    }

    #[test]
    fn test_unknown_family_display() {
        let err = BootstrapError::UnknownAmiFamily("centos".to_string());
        let display = err.to_string();
        assert!(display.starts_with("unknown AMI family: centos"));
        assert!(display.contains("debian"));
    }

    #[test]
    fn test_no_matching_image_display() {
        let err = BootstrapError::NoMatchingImage {
            query: "name=debian-12-amd64-*".to_string(),
        };
        assert_eq!(err.to_string(), "no AMI matched query: name=debian-12-amd64-*");
    }

    #[test]
    fn test_execution_display() {
        let err = BootstrapError::Execution {
            command: "ssh".to_string(),
            status: "exit status: 255".to_string(),
        };
        assert_eq!(err.to_string(), "command execution failed: ssh: exit status: 255");
    }

    #[test]
    fn test_io_constructor_derives_message() {
        let source = io::Error::new(io::ErrorKind::NotFound, "entity not found");
        let err = BootstrapError::io("/roles/web/tasks/main.yml", source);
        assert_eq!(err.to_string(), "/roles/web/tasks/main.yml: I/O error: not found");
        match &err {
            BootstrapError::Io { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_io_error_kind_message_other() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        assert!(io_error_kind_message(&err).starts_with("I/O error: "));
    }

    #[test]
    fn test_into_anyhow_error() {
        let err = BootstrapError::Config("test".to_string());
        let anyhow_err: anyhow::Error = err.into();
        let downcast = anyhow_err.downcast_ref::<BootstrapError>();
        assert!(matches!(downcast, Some(BootstrapError::Config(_))));
    }
}
