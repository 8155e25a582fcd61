//! List blocks: one child type, repeated.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use tessera_richtext::{Markup, escape};
use tracing::warn;

use crate::block::Block;
use crate::context::Context;
use crate::error::ValidationError;
use crate::field::REQUIRED_MESSAGE;
use crate::form::{
    FormData, child_prefix, help_html, hidden_input, non_block_errors_html, sequence_members,
};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct ListBlock {
    pub child: Block,
}

impl ListBlock {
    pub fn new(child: Block) -> Self {
        Self { child }
    }

    /// One item holding the child's default.
    pub fn default_value(&self) -> Value {
        Value::List(vec![self.child.get_default()])
    }

    pub fn to_python(&self, value: &JsonValue) -> Value {
        match value {
            JsonValue::Array(items) => {
                Value::List(items.iter().map(|item| self.child.to_python(item)).collect())
            }
            JsonValue::Null => Value::List(Vec::new()),
            other => {
                warn!(value = %other, "list block expected an array");
                Value::List(Vec::new())
            }
        }
    }

    pub fn get_prep_value(&self, value: &Value) -> JsonValue {
        match value {
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.child.get_prep_value(item))
                    .collect(),
            ),
            other => other.to_json(),
        }
    }

    pub fn api_representation(&self, value: &Value, context: &Context) -> JsonValue {
        match value {
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.child.get_api_representation(item, context))
                    .collect(),
            ),
            other => other.to_json(),
        }
    }

    pub fn clean(&self, block: &Block, value: &Value) -> Result<Value, ValidationError> {
        let items = value.as_list().unwrap_or_default();

        let mut cleaned = Vec::with_capacity(items.len());
        let mut block_errors = BTreeMap::new();
        for (index, item) in items.iter().enumerate() {
            match self.child.clean(item) {
                Ok(c) => cleaned.push(c),
                Err(e) => {
                    block_errors.insert(index, e);
                }
            }
        }

        let non_block_errors = count_errors(block, items.len());
        if !block_errors.is_empty() || !non_block_errors.is_empty() {
            return Err(ValidationError::Sequence {
                block_errors,
                non_block_errors,
            });
        }
        Ok(Value::List(cleaned))
    }

    pub fn render_basic(&self, value: &Value, context: &Context) -> Markup {
        let items = value.as_list().unwrap_or_default();
        let rendered: Vec<Markup> = items
            .iter()
            .map(|item| {
                Markup::safe(format!("<li>{}</li>", self.child.render(item, context)))
            })
            .collect();
        Markup::safe(format!("<ul>{}</ul>", Markup::join(&rendered, "\n")))
    }

    pub fn render_form(
        &self,
        block: &Block,
        value: &Value,
        prefix: &str,
        errors: Option<&ValidationError>,
    ) -> Markup {
        let items = value.as_list().unwrap_or_default();
        let mut html = sequence_open("list-block", block, prefix, items.len(), errors);

        for (index, item) in items.iter().enumerate() {
            let item_prefix = child_prefix(prefix, &index.to_string());
            html.push_str(&member_open(&item_prefix, index));
            html.push_str(
                self.child
                    .render_form(
                        item,
                        &format!("{item_prefix}-value"),
                        errors.and_then(|e| e.for_index(index)),
                    )
                    .as_str(),
            );
            html.push_str("</li>");
        }
        html.push_str("</ul>");

        let template_prefix = child_prefix(prefix, "__PREFIX__");
        html.push_str(&format!(
            "<script type=\"text/template\" id=\"{}\">{}{}</li></script>",
            escape(&child_prefix(prefix, "newmember")),
            member_open(&template_prefix, 0),
            self.child.render_form(
                &self.child.get_default(),
                &format!("{template_prefix}-value"),
                None
            ),
        ));
        html.push_str("</div>");
        Markup::safe(html)
    }

    pub fn value_from_datadict(&self, data: &FormData, prefix: &str) -> Value {
        Value::List(
            sequence_members(data, prefix)
                .iter()
                .map(|m| {
                    self.child
                        .value_from_datadict(data, &format!("{}-value", m.prefix))
                })
                .collect(),
        )
    }

    pub fn searchable_content(&self, value: &Value) -> Vec<String> {
        value
            .as_list()
            .unwrap_or_default()
            .iter()
            .flat_map(|item| self.child.get_searchable_content(item))
            .collect()
    }
}

/// Required / min / max messages shared by lists and streams.
pub(crate) fn count_errors(block: &Block, count: usize) -> Vec<String> {
    let meta = block.meta();
    let mut errors = Vec::new();
    match meta.min_num {
        Some(min) if count < min => {
            errors.push(format!("The minimum number of items is {min}"));
        }
        _ if count == 0 && block.is_required() => errors.push(REQUIRED_MESSAGE.to_string()),
        _ => {}
    }
    if let Some(max) = meta.max_num.filter(|max| count > *max) {
        errors.push(format!("The maximum number of items is {max}"));
    }
    errors
}

/// Opening markup of a list or stream form, up to the open member list.
pub(crate) fn sequence_open(
    class: &str,
    block: &Block,
    prefix: &str,
    count: usize,
    errors: Option<&ValidationError>,
) -> String {
    let mut classes = format!("c-sf-container {class}");
    if let Some(extra) = block.meta().classname.as_deref() {
        classes.push(' ');
        classes.push_str(extra);
    }
    format!(
        "<div class=\"{}\">{}{}{}<ul id=\"{}\" class=\"sequence-container\">",
        escape(&classes),
        hidden_input(&child_prefix(prefix, "count"), &count.to_string()),
        help_html(block.meta().help_text.as_deref()),
        non_block_errors_html(errors),
        escape(&child_prefix(prefix, "list")),
    )
}

/// Opening `<li>` of one sequence member with its bookkeeping inputs.
pub(crate) fn member_open(item_prefix: &str, order: usize) -> String {
    format!(
        "<li id=\"{}-container\" class=\"sequence-member\">{}{}",
        escape(item_prefix),
        hidden_input(&format!("{item_prefix}-deleted"), ""),
        hidden_input(&format!("{item_prefix}-order"), &order.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_unordered_list() {
        let block = Block::list(Block::char());
        let value = block.to_python(&json!(["foo", "bar"]));
        assert_eq!(
            block.render(&value, &Context::new()).as_str(),
            "<ul><li>foo</li>\n<li>bar</li></ul>"
        );
    }

    #[test]
    fn test_default_is_one_child_default() {
        let block = Block::list(Block::char().default_value("chocolate"));
        assert_eq!(block.get_default(), Value::List(vec![Value::from("chocolate")]));
    }

    #[test]
    fn test_clean_reports_items_by_index() {
        let block = Block::list(Block::url());
        let value = block.to_python(&json!(["http://www.example.com/", "not a url"]));
        let err = block.clean(&value).unwrap_err();
        assert!(err.for_index(0).is_none());
        assert_eq!(err.for_index(1).unwrap().messages(), vec!["Enter a valid URL."]);
    }

    #[test]
    fn test_min_max() {
        let block = Block::list(Block::char()).min_num(2).max_num(3);
        let one = block.to_python(&json!(["a"]));
        assert_eq!(
            block.clean(&one).unwrap_err().non_block_errors(),
            ["The minimum number of items is 2"]
        );
        let four = block.to_python(&json!(["a", "b", "c", "d"]));
        assert_eq!(
            block.clean(&four).unwrap_err().non_block_errors(),
            ["The maximum number of items is 3"]
        );
        assert!(block.clean(&block.to_python(&json!(["a", "b"]))).is_ok());
    }

    #[test]
    fn test_value_from_datadict_reorders_and_drops_deleted() {
        let block = Block::list(Block::char());
        let data = FormData::new()
            .with("shoppinglist-count", "3")
            .with("shoppinglist-0-value", "cheese")
            .with("shoppinglist-0-order", "2")
            .with("shoppinglist-1-value", "bread")
            .with("shoppinglist-1-order", "0")
            .with("shoppinglist-2-value", "coffee")
            .with("shoppinglist-2-order", "1")
            .with("shoppinglist-2-deleted", "1");
        let value = block.value_from_datadict(&data, "shoppinglist");
        assert_eq!(value, Value::List(vec![Value::from("bread"), Value::from("cheese")]));
    }

    #[test]
    fn test_render_form_prefixes() {
        let block = Block::list(Block::char()).with_name("test");
        let value = block.to_python(&json!(["Wagtail", "Django"]));
        let html = block.render_form(&value, "links", None);
        let html = html.as_str();
        assert!(html.contains("name=\"links-count\" id=\"links-count\" value=\"2\""));
        assert!(html.contains("name=\"links-1-value\""));
        assert!(html.contains("name=\"links-1-order\" id=\"links-1-order\" value=\"1\""));
        assert!(html.contains("id=\"links-newmember\""));
    }

    #[test]
    fn test_searchable_content() {
        let block = Block::list(Block::char());
        let value = block.to_python(&json!(["Wagtail", "Django"]));
        assert_eq!(block.get_searchable_content(&value), vec!["Wagtail", "Django"]);
    }
}
