//! Object references and deletion behaviour.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{ModelLabel, Pk};

/// A reference to one stored object: its model type and primary key.
///
/// The model may be any class in an inheritance chain. Two references to the
/// same row through different subclasses are distinct `ObjectRef`s; collapse
/// them through the model registry's base-model lookup before comparing.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ObjectRef {
    pub model: ModelLabel,
    pub pk: Pk,
}

impl ObjectRef {
    pub fn new(model: ModelLabel, pk: impl Into<Pk>) -> Self {
        Self {
            model,
            pk: pk.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pk={}", self.model, self.pk)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({}, {:?})", self.model, self.pk)
    }
}

/// What a lookup knows about a live object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Reference using the object's concrete (most specific) model.
    pub object: ObjectRef,
    /// Human-readable title, used wherever the object is displayed.
    pub title: String,
    /// Public URL, if the object has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Resolves references to live objects.
///
/// Implemented by the persistence layer. Returning `None` means the object no
/// longer exists (or the model is unknown); callers treat that as "skip",
/// never as an error.
pub trait ObjectLookup: Send + Sync {
    fn lookup(&self, model: &ModelLabel, pk: &Pk) -> Option<ObjectSummary>;
}

/// What happens to a referencing object when its target is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum OnDelete {
    /// Referencing object is deleted too.
    #[default]
    #[strum(serialize = "cascade")]
    Cascade,
    /// Referencing object blocks the deletion.
    #[strum(serialize = "protect")]
    Protect,
    /// Referencing field is emptied.
    #[strum(serialize = "set_null")]
    SetNull,
    /// Referencing field falls back to its default.
    #[strum(serialize = "set_default")]
    SetDefault,
    /// Nothing is done; the reference dangles.
    #[strum(serialize = "do_nothing")]
    DoNothing,
    /// Another object is assigned by a callback.
    #[strum(serialize = "set")]
    Set,
}

impl OnDelete {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "cascade",
            OnDelete::Protect => "protect",
            OnDelete::SetNull => "set_null",
            OnDelete::SetDefault => "set_default",
            OnDelete::DoNothing => "do_nothing",
            OnDelete::Set => "set",
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_delete_roundtrip_str() {
        for kind in [
            OnDelete::Cascade,
            OnDelete::Protect,
            OnDelete::SetNull,
            OnDelete::SetDefault,
            OnDelete::DoNothing,
            OnDelete::Set,
        ] {
            assert_eq!(OnDelete::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(OnDelete::from_str("PROTECT"), Some(OnDelete::Protect));
        assert_eq!(OnDelete::from_str("explode"), None);
    }

    #[test]
    fn test_object_ref_serde() {
        let obj = ObjectRef::new(ModelLabel::new("core", "Page"), 4);
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json, serde_json::json!({"model": "core.page", "pk": 4}));
        let back: ObjectRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, obj);
    }
}
