//! Native block values.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use tessera_richtext::RichText;
use tessera_types::ObjectRef;

use crate::stream_block::StreamValue;
use crate::struct_block::StructValue;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A chosen image plus the alt text given where it is used.
///
/// Stored as `{"id": pk, "alt": text}`. Without contextual alt text the
/// image's own title stands in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageValue {
    pub image: ObjectRef,
    pub alt: Option<String>,
}

impl ImageValue {
    pub fn new(image: ObjectRef, alt: Option<String>) -> Self {
        Self {
            image,
            alt: alt.filter(|a| !a.is_empty()),
        }
    }

    /// Contextual alt text, falling back to `default`.
    pub fn alt_text<'a>(&'a self, default: &'a str) -> &'a str {
        self.alt.as_deref().unwrap_or(default)
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::json!({"id": self.image.pk.to_json(), "alt": self.alt})
    }
}

/// The in-memory form of a block's content.
///
/// Each variant corresponds to what some block's `to_python` produces.
/// [`Value::Raw`] holds serialized data that no block has interpreted: unknown
/// struct keys, unknown stream item types, or leaf input that did not parse.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Decimal kept in its exact textual form.
    Decimal(String),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    RichText(RichText),
    /// Reference to a stored object (chooser blocks). Resolved at render time.
    Object(ObjectRef),
    /// An image with alt text for this particular use.
    Image(ImageValue),
    Struct(StructValue),
    List(Vec<Value>),
    Stream(StreamValue),
    Raw(JsonValue),
}

impl Value {
    /// Empty in the sense of a required-field check.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) | Value::Decimal(s) => s.is_empty(),
            Value::RichText(rt) => rt.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Stream(stream) => stream.is_empty(),
            Value::Raw(JsonValue::Null) => true,
            Value::Raw(JsonValue::String(s)) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Raw(JsonValue::Null))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            Value::Raw(JsonValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamValue> {
        match self {
            Value::Stream(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// The referenced object, for plain choosers and images alike.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(v) => Some(v),
            Value::Image(v) => Some(&v.image),
            _ => None,
        }
    }

    pub fn as_rich_text(&self) -> Option<&RichText> {
        match self {
            Value::RichText(v) => Some(v),
            _ => None,
        }
    }

    /// Serialize without reference to a particular block.
    ///
    /// Struct and stream values still serialize through their own block.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(n) => JsonValue::from(*n),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Decimal(s) | Value::Text(s) => JsonValue::String(s.clone()),
            Value::Date(d) => JsonValue::String(d.format(DATE_FORMAT).to_string()),
            Value::Time(t) => JsonValue::String(t.format(TIME_FORMAT).to_string()),
            Value::DateTime(dt) => JsonValue::String(dt.format(DATETIME_FORMAT).to_string()),
            Value::RichText(rt) => JsonValue::String(rt.source().to_string()),
            Value::Object(obj) => obj.pk.to_json(),
            Value::Image(image) => image.to_json(),
            Value::Struct(sv) => sv.block().get_prep_value(self),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Stream(stream) => stream.get_prep_value(),
            Value::Raw(v) => v.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (RichText(a), RichText(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            (Image(a), Image(b)) => a == b,
            (Struct(a), Struct(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Stream(a), Stream(b)) => a == b,
            (Raw(a), Raw(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(s) | Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::RichText(rt) => f.write_str(rt.source()),
            Value::Object(obj) => write!(f, "{obj}"),
            Value::Image(image) => write!(f, "{}", image.image),
            Value::Struct(sv) => write!(f, "{sv}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Stream(stream) => write!(f, "{stream:?}"),
            Value::Raw(JsonValue::String(s)) => f.write_str(s),
            Value::Raw(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<RichText> for Value {
    fn from(rt: RichText) -> Self {
        Value::RichText(rt)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<ImageValue> for Value {
    fn from(image: ImageValue) -> Self {
        Value::Image(image)
    }
}

impl From<StructValue> for Value {
    fn from(sv: StructValue) -> Self {
        Value::Struct(sv)
    }
}

impl From<StreamValue> for Value {
    fn from(stream: StreamValue) -> Self {
        Value::Stream(stream)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
