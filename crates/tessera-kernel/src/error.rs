//! Kernel error types.

use tessera_blocks::SchemaError;
use tessera_types::{IdError, ModelLabel};
use thiserror::Error;

pub type Result<T, E = KernelError> = std::result::Result<T, E>;

/// Kernel error type.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Database failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored or configured JSON could not be read.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A generated or configured pattern did not compile.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Configuration file is not valid TOML for [`TesseraConfig`](crate::config::TesseraConfig).
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stream field's block declaration is invalid.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Malformed model label or primary key.
    #[error(transparent)]
    Id(#[from] IdError),

    /// Model is not in the registry.
    #[error("unknown model: {0}")]
    UnknownModel(ModelLabel),

    /// Model declared twice, or with a parent that is not registered yet.
    #[error("invalid model declaration {model}: {reason}")]
    InvalidModel { model: ModelLabel, reason: String },

    /// Object data is not a JSON object.
    #[error("invalid object data for {0}: expected a JSON object")]
    InvalidObject(ModelLabel),

    /// Abstract models have no rows.
    #[error("model {0} is abstract")]
    AbstractModel(ModelLabel),
}
