//! Model labels and primary keys.
//!
//! A [`ModelLabel`] names a model type as `"app_label.model_name"` (always
//! lowercase). A [`Pk`] is a primary key value, which is either an integer or an
//! opaque string. Both are cheap to clone and hash, and both serialize the way
//! they appear inside stored JSON content.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when parsing a model label or primary key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Label is not of the form `app.model`.
    #[error("invalid model label {0:?}: expected \"app_label.model_name\"")]
    InvalidLabel(String),

    /// Value cannot be used as a primary key.
    #[error("invalid primary key: {0}")]
    InvalidPk(String),
}

/// Identifier for a model type, e.g. `core.page` or `tests.eventpage`.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelLabel(String);

impl ModelLabel {
    /// Parse a label, normalising case.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let mut parts = s.splitn(2, '.');
        match (parts.next(), parts.next()) {
            (Some(app), Some(model))
                if !app.is_empty() && !model.is_empty() && !model.contains('.') =>
            {
                Ok(Self(s.to_ascii_lowercase()))
            }
            _ => Err(IdError::InvalidLabel(s.to_string())),
        }
    }

    /// Build from separate app label and model name.
    pub fn new(app_label: &str, model_name: &str) -> Self {
        Self(format!(
            "{}.{}",
            app_label.to_ascii_lowercase(),
            model_name.to_ascii_lowercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn app_label(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    pub fn model_name(&self) -> &str {
        self.0.split('.').nth(1).unwrap_or_default()
    }
}

impl TryFrom<String> for ModelLabel {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ModelLabel> for String {
    fn from(label: ModelLabel) -> Self {
        label.0
    }
}

impl std::str::FromStr for ModelLabel {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ModelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ModelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelLabel({})", self.0)
    }
}

/// A primary key value.
///
/// Serializes untagged: integers as JSON numbers, strings as JSON strings. This
/// is the form a key takes when a chooser block stores it inside stream data.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pk {
    Int(i64),
    Str(String),
}

impl Pk {
    /// Interpret an attribute or form value. Digit strings become integers.
    pub fn from_attr(s: &str) -> Self {
        let trimmed = s.trim();
        match trimmed.parse::<i64>() {
            Ok(n) => Pk::Int(n),
            Err(_) => Pk::Str(trimmed.to_string()),
        }
    }

    /// Interpret a stored JSON value as a key. `null`, arrays and objects are
    /// rejected; numeric strings are kept as strings.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, IdError> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Pk::Int)
                .ok_or_else(|| IdError::InvalidPk(n.to_string())),
            serde_json::Value::String(s) if !s.is_empty() => Ok(Pk::Str(s.clone())),
            other => Err(IdError::InvalidPk(other.to_string())),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Pk::Int(n) => serde_json::Value::from(*n),
            Pk::Str(s) => serde_json::Value::from(s.as_str()),
        }
    }

    /// The key exactly as it appears in JSON text (`4`, `"abc"`).
    pub fn json_text(&self) -> String {
        self.to_json().to_string()
    }
}

impl From<i64> for Pk {
    fn from(n: i64) -> Self {
        Pk::Int(n)
    }
}

impl From<i32> for Pk {
    fn from(n: i32) -> Self {
        Pk::Int(n.into())
    }
}

impl From<&str> for Pk {
    fn from(s: &str) -> Self {
        Pk::Str(s.to_string())
    }
}

impl fmt::Display for Pk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pk::Int(n) => write!(f, "{n}"),
            Pk::Str(s) => f.write_str(s),
        }
    }
}

impl fmt::Debug for Pk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pk::Int(n) => write!(f, "{n}"),
            Pk::Str(s) => write!(f, "{s:?}"),
        }
    }
}
