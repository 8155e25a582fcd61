//! Error types for the block engine.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

/// Result alias for schema construction.
pub type Result<T, E = SchemaError> = std::result::Result<T, E>;

/// Problems building a block tree from a declaration.
///
/// These are programming or configuration errors, distinct from
/// [`ValidationError`] (bad content) and from
/// [`CheckMessage`](crate::check::CheckMessage) (lint findings).
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Class hierarchy has no consistent method resolution order.
    #[error("cannot create a consistent method resolution order for {0}")]
    InconsistentMro(String),

    /// No class in the hierarchy supplies a concrete block variant.
    #[error("block class {0} does not derive from any block type")]
    NoBaseBlock(String),

    /// Children were declared on a variant that does not take them.
    #[error("block {0} cannot have named children")]
    UnexpectedChildren(String),

    /// A regex field or option failed to compile.
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A model label in a chooser declaration is malformed.
    #[error(transparent)]
    InvalidModel(#[from] tessera_types::IdError),

    /// Declaration could not be parsed.
    #[error("invalid block declaration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Address of an error inside a container value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKey {
    /// Position in a list or stream.
    Index(usize),
    /// Child name in a struct.
    Name(String),
    /// Errors about the value as a whole (`__all__`).
    All,
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKey::Index(i) => write!(f, "{i}"),
            ErrorKey::Name(n) => f.write_str(n),
            ErrorKey::All => f.write_str("__all__"),
        }
    }
}

impl From<usize> for ErrorKey {
    fn from(i: usize) -> Self {
        ErrorKey::Index(i)
    }
}

impl From<&str> for ErrorKey {
    fn from(s: &str) -> Self {
        if s == "__all__" {
            ErrorKey::All
        } else {
            ErrorKey::Name(s.to_string())
        }
    }
}

/// Content failed `clean`.
///
/// Container errors nest: a struct maps child names to their errors, a list
/// or stream maps positions to item errors and carries errors about the
/// sequence as a whole separately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// A leaf value is invalid.
    Field { messages: Vec<String> },

    /// One or more struct children are invalid.
    Struct {
        block_errors: IndexMap<String, ValidationError>,
    },

    /// Items of a list or stream are invalid, or the sequence as a whole is.
    Sequence {
        block_errors: BTreeMap<usize, ValidationError>,
        non_block_errors: Vec<String>,
    },
}

impl ValidationError {
    pub fn field(message: impl Into<String>) -> Self {
        ValidationError::Field {
            messages: vec![message.into()],
        }
    }

    /// Sequence-level error with no per-item errors.
    pub fn non_block(message: impl Into<String>) -> Self {
        ValidationError::Sequence {
            block_errors: BTreeMap::new(),
            non_block_errors: vec![message.into()],
        }
    }

    /// Every message in this error and any nested ones, depth first.
    pub fn messages(&self) -> Vec<String> {
        match self {
            ValidationError::Field { messages } => messages.clone(),
            ValidationError::Struct { block_errors } => {
                block_errors.values().flat_map(|e| e.messages()).collect()
            }
            ValidationError::Sequence {
                block_errors,
                non_block_errors,
            } => block_errors
                .values()
                .flat_map(|e| e.messages())
                .chain(non_block_errors.iter().cloned())
                .collect(),
        }
    }

    /// Messages keyed by where they apply.
    ///
    /// Field errors have no address and produce an empty map.
    pub fn params(&self) -> BTreeMap<ErrorKey, Vec<String>> {
        let mut params = BTreeMap::new();
        match self {
            ValidationError::Field { .. } => {}
            ValidationError::Struct { block_errors } => {
                for (name, err) in block_errors {
                    params.insert(ErrorKey::Name(name.clone()), err.messages());
                }
            }
            ValidationError::Sequence {
                block_errors,
                non_block_errors,
            } => {
                for (index, err) in block_errors {
                    params.insert(ErrorKey::Index(*index), err.messages());
                }
                if !non_block_errors.is_empty() {
                    params.insert(ErrorKey::All, non_block_errors.clone());
                }
            }
        }
        params
    }

    /// Errors about the sequence as a whole, if this is a sequence error.
    pub fn non_block_errors(&self) -> &[String] {
        match self {
            ValidationError::Sequence {
                non_block_errors, ..
            } => non_block_errors,
            _ => &[],
        }
    }

    /// Nested error for one struct child.
    pub fn for_child(&self, name: &str) -> Option<&ValidationError> {
        match self {
            ValidationError::Struct { block_errors } => block_errors.get(name),
            _ => None,
        }
    }

    /// Nested error for one list or stream item.
    pub fn for_index(&self, index: usize) -> Option<&ValidationError> {
        match self {
            ValidationError::Sequence { block_errors, .. } => block_errors.get(&index),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Field { messages } => f.write_str(&messages.join(" ")),
            ValidationError::Struct { .. } => f.write_str("Validation error in StructBlock"),
            ValidationError::Sequence { .. } => f.write_str("Validation error in sequence block"),
        }
    }
}

impl std::error::Error for ValidationError {}
