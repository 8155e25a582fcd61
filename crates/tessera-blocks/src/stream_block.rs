//! Stream blocks: an ordered sequence of children of any declared type.
//!
//! Stored form is a JSON array of `{"type", "value", "id"}` records. A
//! [`StreamValue`] loaded from storage keeps each record raw and converts it
//! the first time that item's value is read. Ids are kept from storage or
//! generated once, on first serialization, and never change afterwards.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

use serde_json::{Value as JsonValue, json};
use tessera_richtext::{Markup, escape};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::block::{Block, ChildBlocks};
use crate::context::Context;
use crate::error::ValidationError;
use crate::form::{FormData, child_prefix, hidden_input, sequence_members};
use crate::list_block::{count_errors, member_open, sequence_open};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct StreamBlock {
    pub children: ChildBlocks,
}

impl StreamBlock {
    pub fn new(children: ChildBlocks) -> Self {
        Self { children }
    }

    /// Accepts `{type, value, id}` records or `[type, value, id?]` tuples.
    pub fn to_python(block: &Block, value: &JsonValue) -> Value {
        match value {
            JsonValue::Array(records) => Value::Stream(StreamValue::lazy(block.clone(), records)),
            JsonValue::Null => Value::Stream(StreamValue::empty(block.clone())),
            other => {
                warn!(value = %other, "stream block expected an array");
                Value::Stream(StreamValue::empty(block.clone()))
            }
        }
    }

    pub fn get_prep_value(_block: &Block, value: &Value) -> JsonValue {
        match value {
            Value::Stream(stream) => stream.get_prep_value(),
            Value::Raw(raw) => raw.clone(),
            _ => JsonValue::Array(Vec::new()),
        }
    }

    pub fn api_representation(value: &Value, context: &Context) -> JsonValue {
        let Value::Stream(stream) = value else {
            return JsonValue::Array(Vec::new());
        };
        JsonValue::Array(
            stream
                .iter()
                .filter_map(|child| {
                    let block = child.block()?;
                    Some(json!({
                        "type": child.block_type(),
                        "value": block.get_api_representation(child.value(), context),
                        "id": child.id(),
                    }))
                })
                .collect(),
        )
    }

    /// Per-item errors, then count limits: required / `min_num` / `max_num`,
    /// then per-type `block_counts`.
    pub fn clean(&self, block: &Block, value: &Value) -> Result<Value, ValidationError> {
        let empty;
        let stream = match value {
            Value::Stream(stream) => stream,
            _ => {
                empty = StreamValue::empty(block.clone());
                &empty
            }
        };

        let mut cleaned = Vec::with_capacity(stream.len());
        let mut block_errors = BTreeMap::new();
        for (index, child) in stream.iter().enumerate() {
            let id = child.id().map(str::to_string);
            match child.block() {
                Some(child_block) => match child_block.clean(child.value()) {
                    Ok(c) => cleaned.push((child.block_type().to_string(), c, id)),
                    Err(e) => {
                        block_errors.insert(index, e);
                    }
                },
                // unknown types pass through untouched
                None => cleaned.push((child.block_type().to_string(), child.value().clone(), id)),
            }
        }

        let mut non_block_errors = count_errors(block, stream.len());
        if let Some(block_counts) = &block.meta().block_counts {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for child in stream.iter() {
                *counts.entry(child.block_type()).or_default() += 1;
            }
            for (block_type, limits) in block_counts {
                let label = self
                    .children
                    .get(block_type)
                    .map(Block::label)
                    .unwrap_or_else(|| block_type.clone());
                let count = counts.get(block_type.as_str()).copied().unwrap_or(0);
                if let Some(min) = limits.min_num.filter(|min| count < *min) {
                    non_block_errors.push(format!("{label}: The minimum number of items is {min}"));
                }
                if let Some(max) = limits.max_num.filter(|max| count > *max) {
                    non_block_errors.push(format!("{label}: The maximum number of items is {max}"));
                }
            }
        }

        if !block_errors.is_empty() || !non_block_errors.is_empty() {
            return Err(ValidationError::Sequence {
                block_errors,
                non_block_errors,
            });
        }
        Ok(Value::Stream(StreamValue::from_tuples(block.clone(), cleaned)))
    }

    /// Each known child wrapped in `<div class="block-{type}">`.
    pub fn render_basic(value: &Value, context: &Context) -> Markup {
        let Value::Stream(stream) = value else {
            return Markup::new();
        };
        let rendered: Vec<Markup> = stream
            .iter()
            .filter_map(|child| {
                let Some(block) = child.block() else {
                    debug!(block_type = child.block_type(), "skipping unknown stream child");
                    return None;
                };
                Some(Markup::safe(format!(
                    "<div class=\"block-{}\">{}</div>",
                    escape(child.block_type()),
                    block.render(child.value(), context)
                )))
            })
            .collect();
        Markup::join(&rendered, "\n")
    }

    pub fn render_form(
        &self,
        block: &Block,
        value: &Value,
        prefix: &str,
        errors: Option<&ValidationError>,
    ) -> Markup {
        let empty;
        let stream = match value {
            Value::Stream(stream) => stream,
            _ => {
                empty = StreamValue::empty(block.clone());
                &empty
            }
        };
        // errors are keyed by position in the stream, unknown items included
        let members: Vec<(usize, StreamChild<'_>)> = stream
            .iter()
            .enumerate()
            .filter(|(_, c)| c.block().is_some())
            .collect();
        let mut html = sequence_open("stream-block", block, prefix, members.len(), errors);

        for (index, (position, child)) in members.iter().enumerate() {
            let item_prefix = child_prefix(prefix, &index.to_string());
            html.push_str(&member_open(&item_prefix, index));
            html.push_str(&hidden_input(&format!("{item_prefix}-type"), child.block_type()));
            html.push_str(&hidden_input(
                &format!("{item_prefix}-id"),
                child.id().unwrap_or_default(),
            ));
            if let Some(child_block) = child.block() {
                html.push_str(
                    child_block
                        .render_form(
                            child.value(),
                            &format!("{item_prefix}-value"),
                            errors.and_then(|e| e.for_index(*position)),
                        )
                        .as_str(),
                );
            }
            html.push_str("</li>");
        }
        html.push_str("</ul>");
        html.push_str(&self.menu_html(prefix));
        html.push_str("</div>");
        Markup::safe(html)
    }

    /// Add-block buttons, grouped, plus one new-member template per type.
    fn menu_html(&self, prefix: &str) -> String {
        let mut groups: Vec<(Option<&str>, Vec<(&String, &Block)>)> = Vec::new();
        for (name, child) in &self.children {
            let group = child.meta().group.as_deref();
            match groups.iter_mut().find(|(g, _)| *g == group) {
                Some((_, members)) => members.push((name, child)),
                None => groups.push((group, vec![(name, child)])),
            }
        }

        let mut html = String::from("<div class=\"stream-menu\">");
        for (group, members) in &groups {
            if let Some(group) = group {
                html.push_str(&format!("<h4 class=\"c-sf-add-panel__group-title\">{}</h4>", escape(group)));
            }
            for (name, child) in members {
                html.push_str(&format!(
                    "<button type=\"button\" class=\"c-sf-button action-add-block-{0}\" data-type=\"{0}\">{1}</button>",
                    escape(name),
                    escape(&child.label())
                ));
            }
        }
        html.push_str("</div>");

        let template_prefix = child_prefix(prefix, "__PREFIX__");
        for (name, child) in &self.children {
            html.push_str(&format!(
                "<script type=\"text/template\" id=\"{}\">{}{}{}{}</li></script>",
                escape(&child_prefix(prefix, &format!("newmember-{name}"))),
                member_open(&template_prefix, 0),
                hidden_input(&format!("{template_prefix}-type"), name),
                hidden_input(&format!("{template_prefix}-id"), ""),
                child.render_form(&child.get_default(), &format!("{template_prefix}-value"), None),
            ));
        }
        html
    }

    /// Members of unknown type are dropped.
    pub fn value_from_datadict(&self, block: &Block, data: &FormData, prefix: &str) -> Value {
        let items = sequence_members(data, prefix)
            .into_iter()
            .filter_map(|m| {
                let block_type = data.get(&format!("{}-type", m.prefix))?;
                let Some(child) = self.children.get(block_type) else {
                    debug!(block_type, "dropping posted stream member of unknown type");
                    return None;
                };
                let value = child.value_from_datadict(data, &format!("{}-value", m.prefix));
                let id = data
                    .get(&format!("{}-id", m.prefix))
                    .filter(|id| !id.is_empty())
                    .map(str::to_string);
                Some((block_type.to_string(), value, id))
            })
            .collect::<Vec<_>>();
        Value::Stream(StreamValue::from_tuples(block.clone(), items))
    }

    pub fn searchable_content(value: &Value) -> Vec<String> {
        let Value::Stream(stream) = value else {
            return Vec::new();
        };
        stream
            .iter()
            .filter_map(|child| Some(child.block()?.get_searchable_content(child.value())))
            .flatten()
            .collect()
    }
}

#[derive(Clone, Debug)]
struct StreamItem {
    block_type: String,
    /// Stored value, present until (and after) lazy conversion.
    raw: Option<JsonValue>,
    value: OnceLock<Value>,
    /// Id read from storage or supplied by the caller.
    declared_id: Option<String>,
    /// Id generated on first serialization.
    assigned_id: OnceLock<String>,
}

impl StreamItem {
    fn from_record(record: &JsonValue) -> Option<Self> {
        let (block_type, raw, id) = match record {
            JsonValue::Object(map) => (
                map.get("type")?.as_str()?,
                map.get("value").cloned().unwrap_or(JsonValue::Null),
                map.get("id"),
            ),
            JsonValue::Array(parts) => (
                parts.first()?.as_str()?,
                parts.get(1).cloned().unwrap_or(JsonValue::Null),
                parts.get(2),
            ),
            _ => return None,
        };
        Some(Self {
            block_type: block_type.to_string(),
            raw: Some(raw),
            value: OnceLock::new(),
            declared_id: id.and_then(id_text),
            assigned_id: OnceLock::new(),
        })
    }

    fn converted(block_type: String, value: Value, id: Option<String>) -> Self {
        Self {
            block_type,
            raw: None,
            value: OnceLock::from(value),
            declared_id: id.filter(|id| !id.is_empty()),
            assigned_id: OnceLock::new(),
        }
    }

    fn value(&self, stream_block: &Block) -> &Value {
        self.value.get_or_init(|| {
            let raw = self.raw.as_ref().unwrap_or(&JsonValue::Null);
            match stream_block.child_block(&self.block_type) {
                Some(child) => child.to_python(raw),
                None => Value::Raw(raw.clone()),
            }
        })
    }

    fn id(&self) -> Option<&str> {
        self.declared_id
            .as_deref()
            .or_else(|| self.assigned_id.get().map(String::as_str))
    }

    fn ensure_id(&self) -> &str {
        match &self.declared_id {
            Some(id) => id,
            None => self.assigned_id.get_or_init(|| Uuid::new_v4().to_string()),
        }
    }
}

fn id_text(id: &JsonValue) -> Option<String> {
    match id {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Value of a stream block.
#[derive(Clone)]
pub struct StreamValue {
    block: Block,
    items: Vec<StreamItem>,
}

impl StreamValue {
    pub fn empty(block: Block) -> Self {
        Self {
            block,
            items: Vec::new(),
        }
    }

    /// From stored records; each item converts on first access. Records that
    /// are neither objects nor arrays with a type name are dropped.
    pub fn lazy(block: Block, records: &[JsonValue]) -> Self {
        let items = records
            .iter()
            .filter_map(|record| {
                let item = StreamItem::from_record(record);
                if item.is_none() {
                    warn!(record = %record, "dropping malformed stream record");
                }
                item
            })
            .collect();
        Self { block, items }
    }

    /// From already-converted `(type, value, id)` tuples.
    pub fn from_tuples<S: Into<String>>(
        block: Block,
        items: impl IntoIterator<Item = (S, Value, Option<String>)>,
    ) -> Self {
        let items = items
            .into_iter()
            .map(|(block_type, value, id)| StreamItem::converted(block_type.into(), value, id))
            .collect();
        Self { block, items }
    }

    pub fn push(&mut self, block_type: impl Into<String>, value: Value) {
        self.items
            .push(StreamItem::converted(block_type.into(), value, None));
    }

    /// The stream block this value belongs to.
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<StreamChild<'_>> {
        let item = self.items.get(index)?;
        Some(StreamChild { stream: self, item })
    }

    pub fn iter(&self) -> impl Iterator<Item = StreamChild<'_>> {
        self.items.iter().map(|item| StreamChild { stream: self, item })
    }

    /// Serialize, generating ids for items that lack one. Items never read
    /// are written back from their stored form without conversion.
    pub fn get_prep_value(&self) -> JsonValue {
        JsonValue::Array(
            self.items
                .iter()
                .map(|item| {
                    let value = match (item.value.get(), &item.raw) {
                        (None, Some(raw)) => raw.clone(),
                        _ => {
                            let v = item.value(&self.block);
                            match self.block.child_block(&item.block_type) {
                                Some(child) => child.get_prep_value(v),
                                None => v.to_json(),
                            }
                        }
                    };
                    json!({
                        "type": item.block_type,
                        "value": value,
                        "id": item.ensure_id(),
                    })
                })
                .collect(),
        )
    }

    /// Render the whole stream through its block, template included.
    pub fn render_as_block(&self, context: &Context) -> Markup {
        self.block.render(&Value::Stream(self.clone()), context)
    }
}

/// Positional comparison of `(type, value)`; ids are ignored.
impl PartialEq for StreamValue {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.block_type() == b.block_type() && a.value() == b.value())
    }
}

impl fmt::Debug for StreamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamValue[")?;
        for (i, child) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "({:?}, {:?})", child.block_type(), child.value())?;
        }
        f.write_str("]")
    }
}

/// One item of a [`StreamValue`].
#[derive(Clone, Copy)]
pub struct StreamChild<'a> {
    stream: &'a StreamValue,
    item: &'a StreamItem,
}

impl<'a> StreamChild<'a> {
    pub fn block_type(&self) -> &'a str {
        &self.item.block_type
    }

    /// The native value, converting it on first access.
    pub fn value(&self) -> &'a Value {
        self.item.value(&self.stream.block)
    }

    /// `None` until the stream has been serialized, for new items.
    pub fn id(&self) -> Option<&'a str> {
        self.item.id()
    }

    /// The child block for this item's type, if declared.
    pub fn block(&self) -> Option<&'a Block> {
        self.stream.block.child_block(&self.item.block_type)
    }

    /// Render through the child block. Unknown types render as nothing.
    pub fn render(&self, context: &Context) -> Markup {
        match self.block() {
            Some(block) => block.render(self.value(), context),
            None => Markup::new(),
        }
    }
}

impl fmt::Debug for StreamChild<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamChild")
            .field("block_type", &self.block_type())
            .field("value", self.value())
            .field("id", &self.id())
            .finish()
    }
}

impl fmt::Display for StreamChild<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(&Context::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::BlockCount;

    fn article_block() -> Block {
        Block::stream([
            ("heading", Block::char()),
            ("paragraph", Block::char()),
        ])
    }

    #[test]
    fn test_render_wraps_children_and_skips_unknown() {
        let block = article_block();
        let value = block.to_python(&json!([
            {"type": "heading", "value": "My title"},
            {"type": "rubbish", "value": "nope"},
            {"type": "paragraph", "value": "My first paragraph"},
        ]));
        assert_eq!(
            block.render(&value, &Context::new()).as_str(),
            "<div class=\"block-heading\">My title</div>\n<div class=\"block-paragraph\">My first paragraph</div>"
        );
        assert_eq!(value.as_stream().unwrap().len(), 3);
    }

    #[test]
    fn test_accepts_tuples() {
        let block = article_block();
        let value = block.to_python(&json!([["heading", "Title", "0000"], ["paragraph", "Body"]]));
        let stream = value.as_stream().unwrap();
        assert_eq!(stream.get(0).unwrap().id(), Some("0000"));
        assert_eq!(stream.get(1).unwrap().value(), &Value::from("Body"));
    }

    #[test]
    fn test_ids_are_kept_and_assigned_once() {
        let block = article_block();
        let value = block.to_python(&json!([
            {"type": "heading", "value": "My title", "id": "0000"},
            {"type": "paragraph", "value": "Body", "id": ""},
        ]));
        let stream = value.as_stream().unwrap();
        assert!(stream.get(1).unwrap().id().is_none());

        let first = stream.get_prep_value();
        let second = stream.get_prep_value();
        assert_eq!(first, second);
        assert_eq!(first[0]["id"], json!("0000"));
        let assigned = first[1]["id"].as_str().unwrap();
        assert!(!assigned.is_empty());
        assert_eq!(stream.get(1).unwrap().id(), Some(assigned));
    }

    #[test]
    fn test_round_trip_keeps_type_value_and_id() {
        let block = article_block();
        let stream = StreamValue::from_tuples(
            block.clone(),
            [
                ("heading", Value::from("Title"), None),
                ("paragraph", Value::from("Body"), Some("abc".to_string())),
            ],
        );
        let prepped = stream.get_prep_value();
        let reloaded = block.to_python(&prepped);
        let reloaded = reloaded.as_stream().unwrap();
        assert_eq!(reloaded, &stream);
        for (a, b) in stream.iter().zip(reloaded.iter()) {
            assert_eq!(a.id(), b.id());
        }
    }

    #[test]
    fn test_lazy_items_convert_on_access() {
        let block = Block::stream([("date", Block::date())]);
        let value = block.to_python(&json!([{"type": "date", "value": "2015-08-13"}]));
        let stream = value.as_stream().unwrap();
        assert!(stream.items[0].value.get().is_none());
        // unread items serialize from storage
        assert_eq!(stream.get_prep_value()[0]["value"], json!("2015-08-13"));
        assert!(stream.items[0].value.get().is_none());
        assert!(matches!(stream.get(0).unwrap().value(), Value::Date(_)));
        assert!(stream.items[0].value.get().is_some());
    }

    #[test]
    fn test_required_stream() {
        let block = article_block();
        let empty = block.to_python(&json!([]));
        assert_eq!(
            block.clean(&empty).unwrap_err().non_block_errors(),
            ["This field is required."]
        );
        let one = block.to_python(&json!([{"type": "paragraph", "value": "x"}]));
        assert!(block.clean(&one).is_ok());
        let optional = article_block().required(false);
        assert!(optional.clean(&empty).is_ok());
    }

    #[test]
    fn test_min_max_counts() {
        let block = article_block().min_num(2).max_num(2);
        let one = block.to_python(&json!([{"type": "heading", "value": "x"}]));
        assert_eq!(
            block.clean(&one).unwrap_err().non_block_errors(),
            ["The minimum number of items is 2"]
        );
        let three = block.to_python(&json!([
            {"type": "heading", "value": "x"},
            {"type": "heading", "value": "y"},
            {"type": "heading", "value": "z"},
        ]));
        assert_eq!(
            block.clean(&three).unwrap_err().non_block_errors(),
            ["The maximum number of items is 2"]
        );
    }

    #[test]
    fn test_block_counts() {
        let block = Block::stream([("char", Block::char()), ("text", Block::text())])
            .block_count(
                "char",
                BlockCount {
                    min_num: Some(1),
                    max_num: Some(1),
                },
            );
        let none = block.to_python(&json!([{"type": "text", "value": "x"}]));
        let err = block.clean(&none).unwrap_err();
        assert_eq!(err.non_block_errors(), ["Char: The minimum number of items is 1"]);

        let one = block.to_python(&json!([{"type": "char", "value": "x"}]));
        assert!(block.clean(&one).is_ok());

        let two = block.to_python(&json!([
            {"type": "char", "value": "x"},
            {"type": "char", "value": "y"},
        ]));
        assert_eq!(
            block.clean(&two).unwrap_err().non_block_errors(),
            ["Char: The maximum number of items is 1"]
        );
    }

    #[test]
    fn test_clean_reports_items_by_index() {
        let block = Block::stream([("link", Block::url())]);
        let value = block.to_python(&json!([
            {"type": "link", "value": "http://www.example.com/"},
            {"type": "link", "value": "not a url"},
        ]));
        let err = block.clean(&value).unwrap_err();
        let params = err.params();
        assert_eq!(params.len(), 1);
        assert_eq!(
            params[&crate::error::ErrorKey::Index(1)],
            vec!["Enter a valid URL."]
        );
    }

    #[test]
    fn test_stream_validator_is_a_non_block_error() {
        let block = article_block().validator(|value| {
            let says_foo = value
                .as_stream()
                .is_some_and(|s| s.iter().any(|c| c.value().as_str() == Some("foo")));
            if says_foo {
                Ok(())
            } else {
                Err("At least one block must say 'foo'".to_string())
            }
        });
        let value = block.to_python(&json!([{"type": "paragraph", "value": "bar"}]));
        let err = block.clean(&value).unwrap_err();
        assert_eq!(err.non_block_errors(), ["At least one block must say 'foo'"]);
        let html = block.render_form(&value, "body", Some(&err));
        assert!(html.as_str().contains("help-block help-critical"));
    }

    #[test]
    fn test_clean_keeps_ids() {
        let block = article_block();
        let value = block.to_python(&json!([{"type": "heading", "value": "x", "id": "abc"}]));
        let cleaned = block.clean(&value).unwrap();
        assert_eq!(cleaned.as_stream().unwrap().get(0).unwrap().id(), Some("abc"));
    }

    #[test]
    fn test_value_from_datadict_order() {
        let block = article_block();
        let data = FormData::new()
            .with("article-count", "3")
            .with("article-0-type", "heading")
            .with("article-0-value", "My title")
            .with("article-0-order", "1")
            .with("article-0-id", "0001")
            .with("article-1-type", "paragraph")
            .with("article-1-value", "My first paragraph")
            .with("article-1-order", "0")
            .with("article-2-type", "rubbish")
            .with("article-2-value", "x")
            .with("article-2-order", "2");
        let value = block.value_from_datadict(&data, "article");
        let stream = value.as_stream().unwrap();
        let types: Vec<_> = stream.iter().map(|c| c.block_type()).collect();
        assert_eq!(types, vec!["paragraph", "heading"]);
        assert_eq!(stream.get(1).unwrap().id(), Some("0001"));
        assert_eq!(stream.get(0).unwrap().id(), None);
    }

    #[test]
    fn test_render_form_errors_skip_unknown_members() {
        let block = Block::stream([("link", Block::url())]).with_name("body");
        let value = block.to_python(&json!([
            {"type": "rubbish", "value": "x"},
            {"type": "link", "value": "not a url"},
        ]));
        let err = block.clean(&value).unwrap_err();
        let html = block.render_form(&value, "body", Some(&err));
        let html = html.as_str();
        assert!(html.contains("name=\"body-count\" id=\"body-count\" value=\"1\""));
        assert!(html.contains("name=\"body-0-value\""));
        assert!(html.contains("value=\"not a url\""));
        assert!(html.contains("Enter a valid URL."));
    }

    #[test]
    fn test_value_from_datadict_huge_count() {
        let block = Block::stream([("link", Block::url())]);
        let data = FormData::new()
            .with("body-count", "18446744073709551615")
            .with("body-0-type", "link")
            .with("body-0-value", "http://www.example.com/");
        let value = block.value_from_datadict(&data, "body");
        assert_eq!(value.as_stream().unwrap().len(), 1);

        let garbled = FormData::new().with("body-count", "-1");
        assert!(block.value_from_datadict(&garbled, "body").as_stream().unwrap().is_empty());
    }

    #[test]
    fn test_render_form_members() {
        let block = article_block().with_name("article");
        let value = block.to_python(&json!([
            {"type": "heading", "value": "My title", "id": "123"},
        ]));
        let html = block.render_form(&value, "myarticle", None);
        let html = html.as_str();
        assert!(html.contains("name=\"myarticle-count\" id=\"myarticle-count\" value=\"1\""));
        assert!(html.contains("name=\"myarticle-0-type\" id=\"myarticle-0-type\" value=\"heading\""));
        assert!(html.contains("name=\"myarticle-0-id\" id=\"myarticle-0-id\" value=\"123\""));
        assert!(html.contains("name=\"myarticle-0-value\""));
        assert!(html.contains("id=\"myarticle-newmember-paragraph\""));
    }

    #[test]
    fn test_searchable_content_skips_unknown() {
        let block = article_block();
        let value = block.to_python(&json!([
            {"type": "heading", "value": "Title"},
            {"type": "rubbish", "value": "nope"},
            {"type": "paragraph", "value": "Body"},
        ]));
        assert_eq!(block.get_searchable_content(&value), vec!["Title", "Body"]);
    }

    #[test]
    fn test_api_representation() {
        let block = article_block();
        let value = block.to_python(&json!([{"type": "heading", "value": "Title", "id": "x"}]));
        assert_eq!(
            block.get_api_representation(&value, &Context::new()),
            json!([{"type": "heading", "value": "Title", "id": "x"}])
        );
    }
}
