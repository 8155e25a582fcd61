//! Struct blocks: a fixed set of named children.

use std::fmt;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tessera_richtext::{Markup, escape};

use crate::block::{Block, ChildBlocks};
use crate::context::Context;
use crate::error::ValidationError;
use crate::form::{FormData, child_prefix, help_html};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct StructBlock {
    pub children: ChildBlocks,
}

impl StructBlock {
    pub fn new(children: ChildBlocks) -> Self {
        Self { children }
    }

    pub fn default_value(&self, block: &Block) -> Value {
        let values = self
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.get_default()))
            .collect();
        Value::Struct(StructValue::new(block.clone(), values))
    }

    /// Missing children take their defaults. Unknown keys are kept as
    /// [`Value::Raw`] after the declared children.
    pub fn to_python(&self, block: &Block, value: &JsonValue) -> Value {
        let Some(object) = value.as_object() else {
            return self.default_value(block);
        };
        let mut values: IndexMap<String, Value> = self
            .children
            .iter()
            .map(|(name, child)| {
                let v = match object.get(name) {
                    Some(raw) => child.to_python(raw),
                    None => child.get_default(),
                };
                (name.clone(), v)
            })
            .collect();
        for (key, raw) in object {
            if !self.children.contains_key(key) {
                values.insert(key.clone(), Value::Raw(raw.clone()));
            }
        }
        Value::Struct(StructValue::new(block.clone(), values))
    }

    pub fn get_prep_value(&self, value: &Value) -> JsonValue {
        let Value::Struct(sv) = value else {
            return value.to_json();
        };
        let object: JsonMap<String, JsonValue> = sv
            .iter()
            .map(|(name, v)| {
                let prepped = match self.children.get(name) {
                    Some(child) => child.get_prep_value(v),
                    None => v.to_json(),
                };
                (name.clone(), prepped)
            })
            .collect();
        JsonValue::Object(object)
    }

    pub fn api_representation(&self, value: &Value, context: &Context) -> JsonValue {
        let Value::Struct(sv) = value else {
            return value.to_json();
        };
        let object: JsonMap<String, JsonValue> = sv
            .iter()
            .filter_map(|(name, v)| {
                let child = self.children.get(name)?;
                Some((name.clone(), child.get_api_representation(v, context)))
            })
            .collect();
        JsonValue::Object(object)
    }

    pub fn clean(&self, block: &Block, value: &Value) -> Result<Value, ValidationError> {
        let empty = IndexMap::new();
        let current = value.as_struct().map(|sv| &sv.values).unwrap_or(&empty);

        let mut cleaned = IndexMap::new();
        let mut errors = IndexMap::new();
        for (name, child) in &self.children {
            let v = current.get(name).cloned().unwrap_or_default();
            match child.clean(&v) {
                Ok(c) => {
                    cleaned.insert(name.clone(), c);
                }
                Err(e) => {
                    errors.insert(name.clone(), e);
                }
            }
        }
        if !errors.is_empty() {
            return Err(ValidationError::Struct {
                block_errors: errors,
            });
        }
        for (key, v) in current {
            if !self.children.contains_key(key) {
                cleaned.insert(key.clone(), v.clone());
            }
        }
        Ok(Value::Struct(StructValue::new(block.clone(), cleaned)))
    }

    pub fn render_basic(&self, value: &Value, context: &Context) -> Markup {
        let Value::Struct(sv) = value else {
            return Markup::text(&value.to_string());
        };
        let mut html = Markup::safe("<dl>\n");
        for (name, v) in sv.iter() {
            let rendered = match self.children.get(name) {
                Some(child) => child.render(v, context),
                None => Markup::text(&v.to_string()),
            };
            html.push_safe(&format!("<dt>{}</dt>\n<dd>{}</dd>\n", escape(name), rendered));
        }
        html.push_safe("</dl>");
        html
    }

    pub fn render_form(
        &self,
        block: &Block,
        value: &Value,
        prefix: &str,
        errors: Option<&ValidationError>,
    ) -> Markup {
        let current = value.as_struct();
        let mut classes = String::from("struct-block");
        if let Some(extra) = block.meta().classname.as_deref() {
            classes.push(' ');
            classes.push_str(extra);
        }

        let mut html = format!("<div class=\"{}\">", escape(&classes));
        html.push_str(&help_html(block.meta().help_text.as_deref()));
        html.push_str("<ul class=\"fields\">");
        for (name, child) in &self.children {
            let child_value = current
                .and_then(|sv| sv.get(name))
                .cloned()
                .unwrap_or_else(|| child.get_default());
            let child_prefix = child_prefix(prefix, name);
            let required = if child.is_required() { " class=\"required\"" } else { "" };
            html.push_str(&format!(
                "<li{required}><label for=\"{}\">{}</label>{}</li>",
                escape(&child_prefix),
                escape(&child.label()),
                child.render_form(
                    &child_value,
                    &child_prefix,
                    errors.and_then(|e| e.for_child(name))
                )
            ));
        }
        html.push_str("</ul></div>");
        Markup::safe(html)
    }

    pub fn value_from_datadict(&self, block: &Block, data: &FormData, prefix: &str) -> Value {
        let values = self
            .children
            .iter()
            .map(|(name, child)| {
                (
                    name.clone(),
                    child.value_from_datadict(data, &child_prefix(prefix, name)),
                )
            })
            .collect();
        Value::Struct(StructValue::new(block.clone(), values))
    }

    pub fn searchable_content(&self, value: &Value) -> Vec<String> {
        let Value::Struct(sv) = value else {
            return Vec::new();
        };
        self.children
            .iter()
            .filter_map(|(name, child)| sv.get(name).map(|v| child.get_searchable_content(v)))
            .flatten()
            .collect()
    }
}

/// Value of a struct block: child name → child value, in declaration order.
#[derive(Clone, Debug)]
pub struct StructValue {
    block: Block,
    values: IndexMap<String, Value>,
}

impl StructValue {
    pub fn new(block: Block, values: IndexMap<String, Value>) -> Self {
        Self { block, values }
    }

    /// The struct block this value belongs to.
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values paired with their child blocks, for templates that render
    /// children individually. Keys with no declared child are skipped.
    pub fn bound_blocks(&self) -> Vec<BoundBlock<'_>> {
        self.values
            .iter()
            .filter_map(|(name, value)| {
                let block = self.block.child_block(name)?;
                Some(BoundBlock { name, block, value })
            })
            .collect()
    }

    pub fn bound_block(&self, name: &str) -> Option<BoundBlock<'_>> {
        let (name, value) = self.values.get_key_value(name)?;
        let block = self.block.child_block(name)?;
        Some(BoundBlock { name, block, value })
    }

    /// Render the whole value through its block, template included.
    pub fn render_as_block(&self, context: &Context) -> Markup {
        self.block.render(&Value::Struct(self.clone()), context)
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl fmt::Display for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StructValue([")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "({name:?}, {value:?})")?;
        }
        f.write_str("])")
    }
}

/// A child value together with the block that renders it.
#[derive(Clone, Copy, Debug)]
pub struct BoundBlock<'a> {
    pub name: &'a str,
    pub block: &'a Block,
    pub value: &'a Value,
}

impl BoundBlock<'_> {
    pub fn render(&self, context: &Context) -> Markup {
        self.block.render(self.value, context)
    }
}

impl fmt::Display for BoundBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(&Context::new()))
    }
}
