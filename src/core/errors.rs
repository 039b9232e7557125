//! CLM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ClmError>;

/// Top-level error type for the log monitor.
#[derive(Debug, Error)]
pub enum ClmError {
    #[error("[CLM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[CLM-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[CLM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[CLM-2001] log file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("[CLM-2002] read failure on {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[CLM-2102] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[CLM-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[CLM-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[CLM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ClmError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "CLM-1001",
            Self::MissingConfig { .. } => "CLM-1002",
            Self::ConfigParse { .. } => "CLM-1003",
            Self::FileNotFound { .. } => "CLM-2001",
            Self::Read { .. } => "CLM-2002",
            Self::Serialization { .. } => "CLM-2102",
            Self::Io { .. } => "CLM-3002",
            Self::ChannelClosed { .. } => "CLM-3003",
            Self::Runtime { .. } => "CLM-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// A missing or unreadable log file is expected to recover on a later poll
    /// (the farmer may not have started yet, or the share may be reconnecting).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound { .. } | Self::Read { .. } | Self::Io { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Map an IO error hit while reading the monitored log.
    ///
    /// `NotFound` becomes [`ClmError::FileNotFound`] so callers can render
    /// "waiting for log" instead of a generic read failure.
    #[must_use]
    pub fn read(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound { path }
        } else {
            Self::Read { path, source }
        }
    }
}

impl From<serde_json::Error> for ClmError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ClmError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<ClmError> {
        vec![
            ClmError::InvalidConfig {
                details: String::new(),
            },
            ClmError::MissingConfig {
                path: PathBuf::new(),
            },
            ClmError::ConfigParse {
                context: "",
                details: String::new(),
            },
            ClmError::FileNotFound {
                path: PathBuf::new(),
            },
            ClmError::Read {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            ClmError::Serialization {
                context: "",
                details: String::new(),
            },
            ClmError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            ClmError::ChannelClosed { component: "" },
            ClmError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(ClmError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_clm_prefix_and_appear_in_display() {
        for err in all_variants() {
            assert!(err.code().starts_with("CLM-"), "bad code {}", err.code());
            assert!(
                err.to_string().contains(err.code()),
                "display should contain code: {err}"
            );
        }
    }

    #[test]
    fn only_log_input_errors_are_retryable() {
        assert!(
            ClmError::FileNotFound {
                path: PathBuf::new()
            }
            .is_retryable()
        );
        assert!(
            ClmError::Read {
                path: PathBuf::new(),
                source: std::io::Error::other("flaky share"),
            }
            .is_retryable()
        );
        assert!(ClmError::io("/tmp/x", std::io::Error::other("busy")).is_retryable());

        assert!(!ClmError::ChannelClosed { component: "test" }.is_retryable());
        assert!(
            !ClmError::Runtime {
                details: "pattern failed to compile".to_string()
            }
            .is_retryable()
        );
        assert!(
            !ClmError::InvalidConfig {
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn read_maps_not_found_to_file_not_found() {
        let err = ClmError::read(
            "/tmp/debug.log",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "CLM-2001");
        assert!(err.to_string().contains("/tmp/debug.log"));

        let err = ClmError::read(
            "/tmp/debug.log",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(err.code(), "CLM-2002");
    }

    #[test]
    fn io_convenience_constructor() {
        let err = ClmError::io(
            "/tmp/test.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "CLM-3002");
        assert!(err.to_string().contains("/tmp/test.txt"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ClmError = json_err.into();
        assert_eq!(err.code(), "CLM-2102");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: ClmError = toml_err.into();
        assert_eq!(err.code(), "CLM-1003");
    }
}
