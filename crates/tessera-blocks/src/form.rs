//! Posted form data and the HTML pieces shared by block forms.
//!
//! Field names nest by prefix:
//!
//! - struct child: `{prefix}-{name}`
//! - list/stream item value: `{prefix}-{i}-value`
//! - list/stream bookkeeping: `{prefix}-count`, `{prefix}-{i}-order`,
//!   `{prefix}-{i}-deleted`
//! - stream only: `{prefix}-{i}-type`, `{prefix}-{i}-id`

use indexmap::IndexMap;
use tessera_richtext::{Markup, escape};

use crate::error::ValidationError;

/// Submitted form fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormData(IndexMap<String, String>);

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// `{prefix}-{suffix}`, or just `suffix` at the top level.
pub fn child_prefix(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{prefix}-{suffix}")
    }
}

pub fn hidden_input(name: &str, value: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{0}\" id=\"{0}\" value=\"{1}\">",
        escape(name),
        escape(value)
    )
}

pub fn help_html(help_text: Option<&str>) -> String {
    match help_text {
        Some(text) if !text.is_empty() => format!(
            "<div class=\"help\"><span class=\"icon-help-inverse\" aria-hidden=\"true\"></span>{}</div>",
            escape(text)
        ),
        _ => String::new(),
    }
}

/// Leaf error messages as rendered under a field.
pub fn errors_html(errors: Option<&ValidationError>) -> String {
    let Some(ValidationError::Field { messages }) = errors else {
        return String::new();
    };
    messages
        .iter()
        .map(|m| format!("<p class=\"error-message\"><span>{}</span></p>", escape(m)))
        .collect()
}

/// Errors about a sequence as a whole.
pub fn non_block_errors_html(errors: Option<&ValidationError>) -> String {
    errors
        .map(|e| e.non_block_errors())
        .unwrap_or_default()
        .iter()
        .map(|m| format!("<div class=\"help-block help-critical\">{}</div>", escape(m)))
        .collect()
}

/// Wrap a leaf widget in the standard field markup.
pub fn field_html(
    field_class: &str,
    widget_class: &str,
    classname: Option<&str>,
    widget: &str,
    help_text: Option<&str>,
    errors: Option<&ValidationError>,
) -> Markup {
    let mut classes = format!("field {field_class} widget-{widget_class}");
    if let Some(extra) = classname.filter(|c| !c.is_empty()) {
        classes.push(' ');
        classes.push_str(extra);
    }
    Markup::safe(format!(
        "<div class=\"{}\"><div class=\"field-content\"><div class=\"input\">{}</div>{}{}</div></div>",
        escape(&classes),
        widget,
        help_html(help_text),
        errors_html(errors),
    ))
}

/// Bookkeeping read back from a posted list or stream.
pub(crate) struct SequenceMember {
    pub index: usize,
    pub prefix: String,
    order: i64,
}

/// One past the highest `{prefix}-{i}-*` index present in `data`.
fn posted_len(data: &FormData, prefix: &str) -> usize {
    let head = child_prefix(prefix, "");
    data.0
        .keys()
        .filter_map(|key| key.strip_prefix(head.as_str())?.split_once('-'))
        .filter_map(|(index, _)| index.parse::<usize>().ok())
        .map(|index| index.saturating_add(1))
        .max()
        .unwrap_or(0)
}

/// Live (not deleted) members of a posted sequence, in submitted order.
///
/// The posted count is capped at the members actually present.
pub(crate) fn sequence_members(data: &FormData, prefix: &str) -> Vec<SequenceMember> {
    let count = data
        .get(&child_prefix(prefix, "count"))
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(0)
        .min(posted_len(data, prefix));

    let mut members = Vec::new();
    for index in 0..count {
        let item_prefix = child_prefix(prefix, &index.to_string());
        let deleted = data
            .get(&format!("{item_prefix}-deleted"))
            .is_some_and(|s| !s.is_empty());
        if deleted {
            continue;
        }
        let order = data
            .get(&format!("{item_prefix}-order"))
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(index as i64);
        members.push(SequenceMember {
            index,
            prefix: item_prefix,
            order,
        });
    }
    // stable: ties keep posted position
    members.sort_by_key(|m| m.order);
    members
}
