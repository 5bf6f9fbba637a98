//! Error taxonomy for a single build
//!
//! Every variant is fatal to the build that produced it. Variants carry enough
//! context (module path, specifier, hook and plugin name, file path) to be
//! diagnosed from the message alone.

use std::path::PathBuf;

use thiserror::Error;

use crate::transform::TransformError;

/// Result alias used throughout the crate
pub type Result<T, E = BundleError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BundleError {
    /// Malformed rule, loader or plugin configuration
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// A module's source could not be transformed
    #[error("failed to parse module `{path}`")]
    Parse {
        path: String,
        #[source]
        source: TransformError,
    },

    /// A specifier could not be mapped to a canonical module id
    #[error("cannot resolve `{specifier}` imported from `{importer}`: {reason}")]
    Resolution {
        importer: String,
        specifier: String,
        reason: String,
    },

    /// A plugin callback failed or signalled failure
    #[error("plugin `{plugin}` failed during `{hook}` hook")]
    Hook {
        hook: &'static str,
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    /// A loader failed while transforming a file
    #[error("loader `{loader}` failed on `{path}`")]
    Loader {
        loader: String,
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// Filesystem read, write or directory creation failure
    #[error("I/O error on `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BundleError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-friendly name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "ConfigurationError",
            Self::Parse { .. } => "ParseError",
            Self::Resolution { .. } => "ResolutionError",
            Self::Hook { .. } => "HookError",
            Self::Loader { .. } => "LoaderError",
            Self::Io { .. } => "IOError",
        }
    }
}
