//! Errors raised while loading, saving and instantiating pipeline files.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while turning a pipeline file into a running store, or back.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The pipeline file could not be opened or read.
    #[error("cannot read pipeline file '{path}': {source}")]
    ReadFile {
        /// Pipeline file path as given by the caller.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Saving a pipeline failed after its TOML was rendered.
    #[error("cannot write pipeline file '{path}': {source}")]
    WriteFile {
        /// Destination of the saved pipeline.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the pipeline layout.
    #[error("invalid pipeline file: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A pipeline holds a parameter value TOML cannot represent.
    #[error("cannot encode pipeline as TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The parent directory of a saved pipeline could not be created.
    #[error("cannot create pipeline directory '{path}': {source}")]
    CreateDir {
        /// Directory that was missing.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An instance names an unknown type, parameter or level.
    #[error("invalid pipeline: {0}")]
    Validation(#[from] crate::validation::ValidationError),

    /// The store rejected an instance while the pipeline was being built.
    #[error("cannot build pipeline: {0}")]
    Build(#[from] sigflow_core::FlowError),
}

impl ConfigError {
    /// Wrap an I/O error raised while reading `path`.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Wrap an I/O error raised while writing `path`.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Wrap an I/O error raised while creating `path`.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }
}
