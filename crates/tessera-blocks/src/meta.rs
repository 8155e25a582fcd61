//! Block options and their inheritance rules.
//!
//! Every option is optional so that layers can be merged: a class's own
//! options, then each class in its resolution order, then the variant's
//! built-in defaults. The first layer to set an option wins. Constructor
//! overrides are applied last and beat everything.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Produces a default in serialized form.
pub type DefaultFn = Arc<dyn Fn() -> JsonValue + Send + Sync>;

/// A block's default value, in serialized form.
///
/// Converted through the block's `to_python` on every `get_default` call, so
/// container defaults come back as proper struct/stream values.
#[derive(Clone)]
pub enum DefaultValue {
    Json(JsonValue),
    Callable(DefaultFn),
}

impl DefaultValue {
    pub fn produce(&self) -> JsonValue {
        match self {
            DefaultValue::Json(v) => v.clone(),
            DefaultValue::Callable(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Json(v) => write!(f, "DefaultValue::Json({v})"),
            DefaultValue::Callable(_) => f.write_str("DefaultValue::Callable(..)"),
        }
    }
}

impl From<JsonValue> for DefaultValue {
    fn from(v: JsonValue) -> Self {
        DefaultValue::Json(v)
    }
}

/// Per-type item count limits inside a stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_num: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_num: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct MetaOptions {
    pub label: Option<String>,
    pub icon: Option<String>,
    pub template: Option<String>,
    pub group: Option<String>,
    pub classname: Option<String>,
    pub help_text: Option<String>,
    /// Shown in place of a form by static blocks. Trusted HTML.
    pub admin_text: Option<String>,
    pub default: Option<DefaultValue>,
    pub required: Option<bool>,
    pub min_num: Option<usize>,
    pub max_num: Option<usize>,
    pub block_counts: Option<IndexMap<String, BlockCount>>,
    pub form_template: Option<String>,
    /// Options this crate does not interpret.
    pub extra: IndexMap<String, JsonValue>,
}

macro_rules! fill {
    ($self:ident, $lower:ident, $($field:ident),+) => {
        $(
            if $self.$field.is_none() {
                $self.$field = $lower.$field.clone();
            }
        )+
    };
}

impl MetaOptions {
    /// Fill every unset option from `lower`. Options already set are kept.
    pub fn merge_missing(&mut self, lower: &MetaOptions) {
        fill!(
            self,
            lower,
            label,
            icon,
            template,
            group,
            classname,
            help_text,
            admin_text,
            default,
            required,
            min_num,
            max_num,
            block_counts,
            form_template
        );
        for (k, v) in &lower.extra {
            if !self.extra.contains_key(k) {
                self.extra.insert(k.clone(), v.clone());
            }
        }
    }

    /// A copy with every option set in `overrides` replaced.
    pub fn overridden_by(&self, overrides: &MetaOptions) -> MetaOptions {
        let mut merged = overrides.clone();
        merged.merge_missing(self);
        merged
    }
}

/// `"rich_text_block"` → `"Rich text block"`.
pub fn label_from_name(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
