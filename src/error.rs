use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors caused by declarations that do not fit together.
///
/// A compile or template call that returns one of these produces no output at all.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigError {
    #[error("intent {intent} references undeclared service '{service}'")]
    UnknownService { intent: String, service: String },

    #[error("service id '{0}' has no alphanumeric characters")]
    InvalidServiceId(String),

    #[error("service '{0}' is declared more than once")]
    DuplicateService(String),

    #[error("services '{first}' and '{second}' both map to access group '{group}'")]
    GroupNameCollision {
        first: String,
        second: String,
        group: String,
    },

    #[error("invalid port 0 in {0}")]
    InvalidPort(String),

    #[error("resource '{resource}' references missing resource '{missing}'")]
    DanglingReference { resource: String, missing: String },

    #[error("policy document has no resource named '{0}'")]
    MissingResource(String),
}

/// Non-fatal problems with an optional input. The input is treated as absent.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DegradedInputWarning {
    #[error("{path} does not exist or could not be read")]
    Missing { path: PathBuf },

    #[error("{path} is not in the expected format: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("{path} contains invalid CIDR '{entry}'")]
    InvalidCidr { path: PathBuf, entry: String },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("placeholder '{{{{ {0} }}}}' has no binding")]
    UnboundPlaceholder(String),

    #[error("cannot embed at '{path}': segment '{segment}' is not a mapping")]
    NotAMapping { path: String, segment: String },

    #[error("failed to convert value for '{path}': {reason}")]
    Conversion { path: String, reason: String },
}

/// Crate-level error for everything that aborts a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("failed to read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
