//! Leaf blocks wrapping a single form field.

use std::fmt;
use std::sync::{Arc, LazyLock};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value as JsonValue;
use tessera_richtext::{Markup, RichText, escape};

use crate::block::Block;
use crate::context::Context;
use crate::error::{Result, SchemaError, ValidationError};
use crate::form::{FormData, field_html};
use crate::value::{DATE_FORMAT, DATETIME_FORMAT, TIME_FORMAT, Value};

pub const REQUIRED_MESSAGE: &str = "This field is required.";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@.]+$").expect("static pattern"));
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(https?|ftps?)://([^\s/?#:]+)(:\d+)?([/?#][^\s]*)?$").expect("static pattern")
});

pub type ChoicesFn = Arc<dyn Fn() -> Vec<ChoiceEntry> + Send + Sync>;

/// One entry of a choice list: a plain option or a labelled group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChoiceEntry {
    Option { value: String, label: String },
    Group {
        label: String,
        options: Vec<(String, String)>,
    },
}

impl ChoiceEntry {
    pub fn option(value: impl Into<String>, label: impl Into<String>) -> Self {
        ChoiceEntry::Option {
            value: value.into(),
            label: label.into(),
        }
    }

    pub fn group<V: Into<String>, L: Into<String>>(
        label: impl Into<String>,
        options: impl IntoIterator<Item = (V, L)>,
    ) -> Self {
        ChoiceEntry::Group {
            label: label.into(),
            options: options
                .into_iter()
                .map(|(v, l)| (v.into(), l.into()))
                .collect(),
        }
    }
}

/// Choices for a choice block, fixed or computed each time they are needed.
#[derive(Clone)]
pub enum Choices {
    Static(Vec<ChoiceEntry>),
    Callable(ChoicesFn),
}

impl Choices {
    /// Flat `(value, label)` choices.
    pub fn flat<V: Into<String>, L: Into<String>>(pairs: impl IntoIterator<Item = (V, L)>) -> Self {
        Choices::Static(
            pairs
                .into_iter()
                .map(|(v, l)| ChoiceEntry::option(v, l))
                .collect(),
        )
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: Fn() -> Vec<ChoiceEntry> + Send + Sync + 'static,
    {
        Choices::Callable(Arc::new(f))
    }

    pub fn entries(&self) -> Vec<ChoiceEntry> {
        match self {
            Choices::Static(entries) => entries.clone(),
            Choices::Callable(f) => f(),
        }
    }

    /// Every selectable option, groups flattened.
    pub fn options(&self) -> Vec<(String, String)> {
        self.entries()
            .into_iter()
            .flat_map(|entry| match entry {
                ChoiceEntry::Option { value, label } => vec![(value, label)],
                ChoiceEntry::Group { options, .. } => options,
            })
            .collect()
    }

    pub fn label_for(&self, value: &str) -> Option<String> {
        self.options()
            .into_iter()
            .find(|(v, _)| v == value)
            .map(|(_, l)| l)
    }
}

impl fmt::Debug for Choices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choices::Static(entries) => f.debug_tuple("Static").field(entries).finish(),
            Choices::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

/// The wrapped field.
#[derive(Clone, Debug)]
pub enum FieldKind {
    Char {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Text {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Email,
    Url,
    Integer {
        min_value: Option<i64>,
        max_value: Option<i64>,
    },
    Float {
        min_value: Option<f64>,
        max_value: Option<f64>,
    },
    /// Exact decimal, kept as text.
    Decimal {
        min_value: Option<f64>,
        max_value: Option<f64>,
        max_digits: Option<usize>,
        decimal_places: Option<usize>,
    },
    /// Text that must match `pattern` somewhere. `error_messages` may
    /// override `"required"` and `"invalid"`.
    Regex {
        pattern: Regex,
        error_messages: IndexMap<String, String>,
    },
    Boolean,
    Choice(Choices),
    /// `format` is a strftime string used when rendering.
    Date { format: Option<String> },
    Time { format: Option<String> },
    DateTime { format: Option<String> },
    RichText { features: Option<Vec<String>> },
    RawHtml,
    BlockQuote,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Char { .. } => "char",
            FieldKind::Text { .. } => "text",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
            FieldKind::Integer { .. } => "integer",
            FieldKind::Float { .. } => "float",
            FieldKind::Decimal { .. } => "decimal",
            FieldKind::Regex { .. } => "regex",
            FieldKind::Boolean => "boolean",
            FieldKind::Choice(_) => "choice",
            FieldKind::Date { .. } => "date",
            FieldKind::Time { .. } => "time",
            FieldKind::DateTime { .. } => "datetime",
            FieldKind::RichText { .. } => "rich_text",
            FieldKind::RawHtml => "raw_html",
            FieldKind::BlockQuote => "blockquote",
        }
    }

    pub fn default_icon(&self) -> &'static str {
        match self {
            FieldKind::Email => "mail",
            FieldKind::Url => "site",
            FieldKind::Date { .. } | FieldKind::DateTime { .. } => "date",
            FieldKind::Time { .. } => "time",
            FieldKind::RawHtml => "code",
            FieldKind::BlockQuote => "openquote",
            _ => "placeholder",
        }
    }

    fn field_class(&self) -> &'static str {
        match self {
            FieldKind::Char { .. } | FieldKind::Text { .. } | FieldKind::RawHtml => "char_field",
            FieldKind::BlockQuote => "char_field",
            FieldKind::Email => "email_field",
            FieldKind::Url => "url_field",
            FieldKind::Integer { .. } => "integer_field",
            FieldKind::Float { .. } => "float_field",
            FieldKind::Decimal { .. } => "decimal_field",
            FieldKind::Regex { .. } => "regex_field",
            FieldKind::Boolean => "boolean_field",
            FieldKind::Choice(_) => "choice_field",
            FieldKind::Date { .. } => "date_field",
            FieldKind::Time { .. } => "time_field",
            FieldKind::DateTime { .. } => "date_time_field",
            FieldKind::RichText { .. } => "char_field",
        }
    }

    fn widget_class(&self) -> &'static str {
        match self {
            FieldKind::Char { .. } | FieldKind::Regex { .. } => "text_input",
            FieldKind::Text { .. } | FieldKind::RawHtml | FieldKind::BlockQuote => "textarea",
            FieldKind::Email => "email_input",
            FieldKind::Url => "url_input",
            FieldKind::Integer { .. } | FieldKind::Float { .. } | FieldKind::Decimal { .. } => {
                "number_input"
            }
            FieldKind::Boolean => "checkbox_input",
            FieldKind::Choice(_) => "select",
            FieldKind::Date { .. } => "admin_date_input",
            FieldKind::Time { .. } => "admin_time_input",
            FieldKind::DateTime { .. } => "admin_date_time_input",
            FieldKind::RichText { .. } => "rich_text_area",
        }
    }

    fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldKind::Char { .. }
                | FieldKind::Text { .. }
                | FieldKind::Email
                | FieldKind::Url
                | FieldKind::Regex { .. }
                | FieldKind::Choice(_)
                | FieldKind::RawHtml
                | FieldKind::BlockQuote
        )
    }
}

#[derive(Clone, Debug)]
pub struct FieldBlock {
    pub field: FieldKind,
}

impl FieldBlock {
    pub fn new(field: FieldKind) -> Self {
        Self { field }
    }

    /// Value used when neither the block nor its class supplies a default.
    pub fn empty_value(&self) -> Value {
        match &self.field {
            FieldKind::RichText { .. } => Value::RichText(RichText::default()),
            _ => Value::Null,
        }
    }

    pub fn to_python(&self, value: &JsonValue) -> Value {
        if value.is_null() {
            return self.empty_value();
        }
        let raw = || Value::Raw(value.clone());
        match (&self.field, value) {
            (f, JsonValue::String(s)) if f.is_textual() => Value::Text(s.clone()),
            (f, JsonValue::Number(n)) if f.is_textual() => Value::Text(n.to_string()),
            (FieldKind::RichText { .. }, JsonValue::String(s)) => {
                Value::RichText(RichText::new(s.as_str()))
            }
            (FieldKind::Integer { .. }, JsonValue::Number(n)) => {
                n.as_i64().map(Value::Int).unwrap_or_else(raw)
            }
            (FieldKind::Integer { .. }, JsonValue::String(s)) => {
                s.trim().parse().map(Value::Int).unwrap_or_else(|_| raw())
            }
            (FieldKind::Float { .. }, JsonValue::Number(n)) => {
                n.as_f64().map(Value::Float).unwrap_or_else(raw)
            }
            (FieldKind::Float { .. }, JsonValue::String(s)) => {
                s.trim().parse().map(Value::Float).unwrap_or_else(|_| raw())
            }
            (FieldKind::Decimal { .. }, JsonValue::Number(n)) => Value::Decimal(n.to_string()),
            (FieldKind::Decimal { .. }, JsonValue::String(s)) => match parse_decimal(s) {
                Some(d) => Value::Decimal(d),
                None => raw(),
            },
            (FieldKind::Boolean, JsonValue::Bool(b)) => Value::Bool(*b),
            (FieldKind::Date { .. }, JsonValue::String(s)) => {
                parse_date(s).map(Value::Date).unwrap_or_else(raw)
            }
            (FieldKind::Time { .. }, JsonValue::String(s)) => {
                parse_time(s).map(Value::Time).unwrap_or_else(raw)
            }
            (FieldKind::DateTime { .. }, JsonValue::String(s)) => {
                parse_datetime(s).map(Value::DateTime).unwrap_or_else(raw)
            }
            _ => raw(),
        }
    }

    pub fn get_prep_value(&self, value: &Value) -> JsonValue {
        value.to_json()
    }

    pub fn api_representation(&self, value: &Value, context: &Context) -> JsonValue {
        match (&self.field, value) {
            (FieldKind::RichText { .. }, Value::RichText(rt)) => {
                JsonValue::String(context.features().expand_db_html(rt.source()).into_string())
            }
            _ => value.to_json(),
        }
    }

    /// Coerce to the field's native type and validate.
    pub fn clean(&self, block: &Block, value: &Value) -> std::result::Result<Value, ValidationError> {
        let empty = value.is_empty()
            || (matches!(self.field, FieldKind::Boolean) && *value == Value::Bool(false));
        if empty {
            if block.is_required() {
                return Err(ValidationError::field(self.message("required", REQUIRED_MESSAGE)));
            }
            return Ok(self.cleaned_empty());
        }

        match &self.field {
            FieldKind::Char {
                min_length,
                max_length,
            }
            | FieldKind::Text {
                min_length,
                max_length,
            } => {
                let text = text_of(value).unwrap_or_default();
                check_length(&text, *min_length, *max_length)?;
                Ok(Value::Text(text))
            }
            FieldKind::RawHtml | FieldKind::BlockQuote => {
                Ok(Value::Text(text_of(value).unwrap_or_default()))
            }
            FieldKind::Email => {
                let text = text_of(value).unwrap_or_default().trim().to_string();
                if !EMAIL_RE.is_match(&text) {
                    return Err(ValidationError::field("Enter a valid email address."));
                }
                Ok(Value::Text(text))
            }
            FieldKind::Url => {
                let mut text = text_of(value).unwrap_or_default().trim().to_string();
                if !text.contains("://") {
                    text = format!("http://{text}");
                }
                if !URL_RE.is_match(&text) {
                    return Err(ValidationError::field("Enter a valid URL."));
                }
                Ok(Value::Text(text))
            }
            FieldKind::Regex { pattern, .. } => {
                let text = text_of(value).unwrap_or_default();
                if !pattern.is_match(&text) {
                    return Err(ValidationError::field(
                        self.message("invalid", "Enter a valid value."),
                    ));
                }
                Ok(Value::Text(text))
            }
            FieldKind::Integer {
                min_value,
                max_value,
            } => {
                let n = match value {
                    Value::Int(n) => *n,
                    Value::Float(x) if x.fract() == 0.0 => *x as i64,
                    other => text_of(other)
                        .and_then(|s| s.trim().parse::<i64>().ok())
                        .ok_or_else(|| ValidationError::field("Enter a whole number."))?,
                };
                check_range(n as f64, min_value.map(|m| m as f64), max_value.map(|m| m as f64))?;
                Ok(Value::Int(n))
            }
            FieldKind::Float {
                min_value,
                max_value,
            } => {
                let x = match value {
                    Value::Float(x) => *x,
                    Value::Int(n) => *n as f64,
                    other => text_of(other)
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .filter(|x| x.is_finite())
                        .ok_or_else(|| ValidationError::field("Enter a number."))?,
                };
                check_range(x, *min_value, *max_value)?;
                Ok(Value::Float(x))
            }
            FieldKind::Decimal {
                min_value,
                max_value,
                max_digits,
                decimal_places,
            } => {
                let d = text_of(value)
                    .and_then(|s| parse_decimal(&s))
                    .ok_or_else(|| ValidationError::field("Enter a number."))?;
                let x: f64 = d
                    .parse()
                    .map_err(|_| ValidationError::field("Enter a number."))?;
                check_range(x, *min_value, *max_value)?;
                check_digits(&d, *max_digits, *decimal_places)?;
                Ok(Value::Decimal(d))
            }
            FieldKind::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                other => Ok(Value::Bool(!other.is_empty())),
            },
            FieldKind::Choice(choices) => {
                let text = text_of(value).unwrap_or_default();
                if choices.options().iter().any(|(v, _)| *v == text) {
                    Ok(Value::Text(text))
                } else {
                    Err(ValidationError::field(format!(
                        "Select a valid choice. {text} is not one of the available choices."
                    )))
                }
            }
            FieldKind::Date { .. } => match value {
                Value::Date(d) => Ok(Value::Date(*d)),
                Value::DateTime(dt) => Ok(Value::Date(dt.date())),
                other => text_of(other)
                    .and_then(|s| parse_date(&s))
                    .map(Value::Date)
                    .ok_or_else(|| ValidationError::field("Enter a valid date.")),
            },
            FieldKind::Time { .. } => match value {
                Value::Time(t) => Ok(Value::Time(*t)),
                other => text_of(other)
                    .and_then(|s| parse_time(&s))
                    .map(Value::Time)
                    .ok_or_else(|| ValidationError::field("Enter a valid time.")),
            },
            FieldKind::DateTime { .. } => match value {
                Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
                other => text_of(other)
                    .and_then(|s| parse_datetime(&s))
                    .map(Value::DateTime)
                    .ok_or_else(|| ValidationError::field("Enter a valid date/time.")),
            },
            FieldKind::RichText { .. } => match value {
                Value::RichText(rt) => Ok(Value::RichText(rt.clone())),
                other => Ok(Value::RichText(RichText::new(
                    text_of(other).unwrap_or_default(),
                ))),
            },
        }
    }

    fn cleaned_empty(&self) -> Value {
        match &self.field {
            FieldKind::RichText { .. } => Value::RichText(RichText::default()),
            FieldKind::Boolean => Value::Bool(false),
            f if f.is_textual() => Value::Text(String::new()),
            _ => Value::Null,
        }
    }

    fn message(&self, key: &str, fallback: &str) -> String {
        match &self.field {
            FieldKind::Regex { error_messages, .. } => error_messages
                .get(key)
                .cloned()
                .unwrap_or_else(|| fallback.to_string()),
            _ => fallback.to_string(),
        }
    }

    pub fn render_basic(&self, value: &Value, context: &Context) -> Markup {
        match (&self.field, value) {
            (_, Value::Null) => Markup::new(),
            (FieldKind::RichText { .. }, Value::RichText(rt)) => rt.render_with(context.features()),
            (FieldKind::RawHtml, v) => Markup::safe(v.to_string()),
            (FieldKind::BlockQuote, v) => {
                Markup::safe(format!("<blockquote>{}</blockquote>", escape(&v.to_string())))
            }
            (FieldKind::Date { format: Some(fmt) }, Value::Date(d)) => {
                Markup::text(&d.format(fmt).to_string())
            }
            (FieldKind::Time { format: Some(fmt) }, Value::Time(t)) => {
                Markup::text(&t.format(fmt).to_string())
            }
            (FieldKind::DateTime { format: Some(fmt) }, Value::DateTime(dt)) => {
                Markup::text(&dt.format(fmt).to_string())
            }
            (_, v) => Markup::text(&v.to_string()),
        }
    }

    /// The value as it appears in a form input.
    pub fn value_for_form(&self, value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
            Value::Time(t) => t.format("%H:%M").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            other => other.to_string(),
        }
    }

    /// Parse a posted string back into a native value.
    pub fn value_from_form(&self, raw: Option<&str>) -> Value {
        match (&self.field, raw) {
            (FieldKind::Boolean, raw) => Value::Bool(
                raw.is_some_and(|s| !matches!(s, "" | "false" | "False" | "0" | "off")),
            ),
            (_, None) => self.empty_value(),
            (f, Some(s)) if s.trim().is_empty() && !f.is_textual() => self.empty_value(),
            (_, Some(s)) => self.to_python(&JsonValue::String(s.to_string())),
        }
    }

    pub fn value_from_datadict(&self, data: &FormData, prefix: &str) -> Value {
        self.value_from_form(data.get(prefix))
    }

    pub fn render_form(
        &self,
        block: &Block,
        value: &Value,
        prefix: &str,
        errors: Option<&ValidationError>,
    ) -> Markup {
        let widget = self.widget_html(block, value, prefix);
        field_html(
            self.field.field_class(),
            self.field.widget_class(),
            block.meta().classname.as_deref(),
            &widget,
            block.meta().help_text.as_deref(),
            errors,
        )
    }

    fn widget_html(&self, block: &Block, value: &Value, prefix: &str) -> String {
        let name = escape(prefix);
        let current = escape(&self.value_for_form(value));
        let placeholder = escape(&block.label());
        let input = |ty: &str, extra: &str| {
            format!(
                "<input type=\"{ty}\" name=\"{name}\" id=\"{name}\" placeholder=\"{placeholder}\" value=\"{current}\"{extra}>"
            )
        };
        match &self.field {
            FieldKind::Char { max_length, .. } => {
                let extra = max_length
                    .map(|m| format!(" maxlength=\"{m}\""))
                    .unwrap_or_default();
                input("text", &extra)
            }
            FieldKind::Regex { .. } => input("text", ""),
            FieldKind::Email => input("email", ""),
            FieldKind::Url => input("url", ""),
            FieldKind::Integer { .. } => input("number", ""),
            FieldKind::Float { .. } | FieldKind::Decimal { .. } => input("number", " step=\"any\""),
            FieldKind::Text { .. } | FieldKind::RawHtml | FieldKind::BlockQuote => format!(
                "<textarea name=\"{name}\" id=\"{name}\" placeholder=\"{placeholder}\" cols=\"40\" rows=\"1\">{current}</textarea>"
            ),
            FieldKind::Boolean => {
                let checked = if *value == Value::Bool(true) { " checked" } else { "" };
                format!("<input type=\"checkbox\" name=\"{name}\" id=\"{name}\"{checked}>")
            }
            FieldKind::Choice(choices) => self.select_html(block, choices, value, &name),
            FieldKind::Date { .. } => format!(
                "<input type=\"text\" name=\"{name}\" value=\"{current}\" autocomplete=\"new-date\" id=\"{name}\"><script>initDateChooser(\"{name}\", {{\"dayOfWeekStart\": 0, \"format\": \"Y-m-d\"}});</script>"
            ),
            FieldKind::Time { .. } => format!(
                "<input type=\"text\" name=\"{name}\" value=\"{current}\" autocomplete=\"new-time\" id=\"{name}\"><script>initTimeChooser(\"{name}\", {{\"format\": \"H:i\"}});</script>"
            ),
            FieldKind::DateTime { .. } => format!(
                "<input type=\"text\" name=\"{name}\" value=\"{current}\" autocomplete=\"new-date-time\" id=\"{name}\"><script>initDateTimeChooser(\"{name}\", {{\"dayOfWeekStart\": 0, \"format\": \"Y-m-d H:i\"}});</script>"
            ),
            FieldKind::RichText { features } => {
                let features = features
                    .as_ref()
                    .map(|f| serde_json::to_string(f).unwrap_or_default())
                    .unwrap_or_else(|| "null".to_string());
                format!(
                    "<input type=\"hidden\" name=\"{name}\" id=\"{name}\" value=\"{current}\"><script>makeRichTextEditable(\"{name}\", {});</script>",
                    escape(&features)
                )
            }
        }
    }

    fn select_html(&self, block: &Block, choices: &Choices, value: &Value, name: &str) -> String {
        let selected = value.as_str().unwrap_or_default();
        let entries = choices.entries();
        let has_blank = entries.iter().any(|e| match e {
            ChoiceEntry::Option { value, .. } => value.is_empty(),
            ChoiceEntry::Group { options, .. } => options.iter().any(|(v, _)| v.is_empty()),
        });
        let show_blank = !has_blank && !(block.is_required() && block.meta().default.is_some());

        let option = |v: &str, l: &str| {
            let sel = if v == selected { " selected" } else { "" };
            format!("<option value=\"{}\"{sel}>{}</option>", escape(v), escape(l))
        };
        let mut html = format!("<select name=\"{name}\" id=\"{name}\" placeholder=\"{}\">", escape(&block.label()));
        if show_blank {
            html.push_str(&option("", "---------"));
        }
        for entry in &entries {
            match entry {
                ChoiceEntry::Option { value, label } => html.push_str(&option(value, label)),
                ChoiceEntry::Group { label, options } => {
                    html.push_str(&format!("<optgroup label=\"{}\">", escape(label)));
                    for (v, l) in options {
                        html.push_str(&option(v, l));
                    }
                    html.push_str("</optgroup>");
                }
            }
        }
        html.push_str("</select>");
        html
    }

    pub fn searchable_content(&self, value: &Value) -> Vec<String> {
        match (&self.field, value) {
            (_, Value::Null) => Vec::new(),
            (FieldKind::RichText { .. }, Value::RichText(rt)) => vec![rt.source().to_string()],
            (FieldKind::Choice(choices), v) => {
                let text = v.to_string();
                vec![choices.label_for(&text).unwrap_or(text)]
            }
            (
                FieldKind::Char { .. }
                | FieldKind::Text { .. }
                | FieldKind::Email
                | FieldKind::BlockQuote
                | FieldKind::RawHtml,
                v,
            ) => vec![v.to_string()],
            _ => Vec::new(),
        }
    }
}

impl Block {
    /// Text block validated against `pattern` (unanchored search).
    pub fn regex(pattern: &str) -> Result<Self> {
        Self::regex_with_messages(pattern, IndexMap::new())
    }

    pub fn regex_with_messages(
        pattern: &str,
        error_messages: IndexMap<String, String>,
    ) -> Result<Self> {
        let compiled = Regex::new(pattern).map_err(|source| SchemaError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self::field(FieldKind::Regex {
            pattern: compiled,
            error_messages,
        }))
    }

    pub fn choice(choices: Choices) -> Self {
        Self::field(FieldKind::Choice(choices))
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Raw(JsonValue::Null) => None,
        Value::Raw(JsonValue::String(s)) => Some(s.clone()),
        Value::Raw(other) => Some(other.to_string()),
        other => Some(other.to_string()),
    }
}

fn check_length(
    text: &str,
    min: Option<usize>,
    max: Option<usize>,
) -> std::result::Result<(), ValidationError> {
    let len = text.chars().count();
    if let Some(max) = max.filter(|m| len > *m) {
        return Err(ValidationError::field(format!(
            "Ensure this value has at most {max} characters (it has {len})."
        )));
    }
    if let Some(min) = min.filter(|m| len < *m) {
        return Err(ValidationError::field(format!(
            "Ensure this value has at least {min} characters (it has {len})."
        )));
    }
    Ok(())
}

fn check_range(x: f64, min: Option<f64>, max: Option<f64>) -> std::result::Result<(), ValidationError> {
    if let Some(max) = max.filter(|m| x > *m) {
        return Err(ValidationError::field(format!(
            "Ensure this value is less than or equal to {max}."
        )));
    }
    if let Some(min) = min.filter(|m| x < *m) {
        return Err(ValidationError::field(format!(
            "Ensure this value is greater than or equal to {min}."
        )));
    }
    Ok(())
}

fn check_digits(
    decimal: &str,
    max_digits: Option<usize>,
    decimal_places: Option<usize>,
) -> std::result::Result<(), ValidationError> {
    let unsigned = decimal.trim_start_matches(['-', '+']);
    let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let whole_digits = whole.trim_start_matches('0').len();
    let decimals = frac.len();
    let digits = whole_digits + decimals;

    if let Some(max) = max_digits.filter(|m| digits > *m) {
        return Err(ValidationError::field(format!(
            "Ensure that there are no more than {max} digits in total."
        )));
    }
    if let Some(places) = decimal_places.filter(|p| decimals > *p) {
        return Err(ValidationError::field(format!(
            "Ensure that there are no more than {places} decimal places."
        )));
    }
    if let (Some(max), Some(places)) = (max_digits, decimal_places) {
        let allowed = max.saturating_sub(places);
        if whole_digits > allowed {
            return Err(ValidationError::field(format!(
                "Ensure that there are no more than {allowed} digits before the decimal point."
            )));
        }
    }
    Ok(())
}

/// Normalised decimal text, or `None` if `s` is not a plain decimal number.
fn parse_decimal(s: &str) -> Option<String> {
    static DECIMAL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[-+]?(\d+\.?\d*|\.\d+)$").expect("static pattern"));
    let s = s.trim();
    DECIMAL_RE.is_match(s).then(|| s.to_string())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S%.f"))
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", DATETIME_FORMAT, "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clean_err(block: &Block, value: Value) -> Vec<String> {
        block.clean(&value).unwrap_err().messages()
    }

    #[test]
    fn test_charfield_render() {
        let block = Block::char();
        let html = block.render(&Value::from("Hello world!"), &Context::new());
        assert_eq!(html.as_str(), "Hello world!");
        let html = block.render(&Value::from("<b>x</b>"), &Context::new());
        assert_eq!(html.as_str(), "&lt;b&gt;x&lt;/b&gt;");
    }

    #[test]
    fn test_char_required_and_length() {
        let block = Block::field(FieldKind::Char {
            min_length: None,
            max_length: Some(5),
        });
        assert_eq!(clean_err(&block, Value::from("")), vec![REQUIRED_MESSAGE]);
        assert_eq!(
            clean_err(&block, Value::from("abcdef")),
            vec!["Ensure this value has at most 5 characters (it has 6)."]
        );
        let optional = Block::char().required(false);
        assert_eq!(optional.clean(&Value::Null).unwrap(), Value::from(""));
    }

    #[test]
    fn test_url_and_email() {
        let url = Block::url();
        assert_eq!(
            url.clean(&Value::from("http://www.example.com/")).unwrap(),
            Value::from("http://www.example.com/")
        );
        assert_eq!(clean_err(&url, Value::from("not a url")), vec!["Enter a valid URL."]);
        let email = Block::email();
        assert!(email.clean(&Value::from("somebody@example.com")).is_ok());
        assert_eq!(
            clean_err(&email, Value::from("example.com")),
            vec!["Enter a valid email address."]
        );
    }

    #[test]
    fn test_integer_and_float() {
        let int = Block::field(FieldKind::Integer {
            min_value: Some(0),
            max_value: Some(10),
        });
        assert_eq!(int.to_python(&json!("3")), Value::Int(3));
        assert_eq!(int.clean(&Value::Int(3)).unwrap(), Value::Int(3));
        assert_eq!(clean_err(&int, Value::from("x")), vec!["Enter a whole number."]);
        assert_eq!(
            clean_err(&int, Value::Int(11)),
            vec!["Ensure this value is less than or equal to 10."]
        );
        let float = Block::float();
        assert_eq!(float.clean(&Value::from("1.5")).unwrap(), Value::Float(1.5));
        assert_eq!(clean_err(&float, Value::from("abc")), vec!["Enter a number."]);
    }

    #[test]
    fn test_decimal_digits() {
        let block = Block::field(FieldKind::Decimal {
            min_value: None,
            max_value: None,
            max_digits: Some(4),
            decimal_places: Some(2),
        });
        assert_eq!(
            block.clean(&Value::from("12.50")).unwrap(),
            Value::Decimal("12.50".into())
        );
        assert_eq!(
            clean_err(&block, Value::from("123.45")),
            vec!["Ensure that there are no more than 4 digits in total."]
        );
        assert_eq!(
            clean_err(&block, Value::from("1.234")),
            vec!["Ensure that there are no more than 2 decimal places."]
        );
        assert_eq!(
            clean_err(&block, Value::from("123.4")),
            vec!["Ensure that there are no more than 2 digits before the decimal point."]
        );
        assert_eq!(block.get_prep_value(&Value::Decimal("12.50".into())), json!("12.50"));
    }

    #[test]
    fn test_regex_messages() {
        let block = Block::regex(r"^[0-9]{3}$").unwrap();
        assert!(block.clean(&Value::from("123")).is_ok());
        assert_eq!(clean_err(&block, Value::from("abc")), vec!["Enter a valid value."]);

        let custom = Block::regex_with_messages(
            r"^[0-9]{3}$",
            IndexMap::from([
                ("required".to_string(), "Oops, you missed a bit.".to_string()),
                ("invalid".to_string(), "Not the right format.".to_string()),
            ]),
        )
        .unwrap();
        assert_eq!(clean_err(&custom, Value::from("")), vec!["Oops, you missed a bit."]);
        assert_eq!(clean_err(&custom, Value::from("abc")), vec!["Not the right format."]);

        assert!(matches!(
            Block::regex("(unclosed"),
            Err(SchemaError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_choice_form_blank_option() {
        let choices = Choices::flat([("tea", "Tea"), ("coffee", "Coffee")]);
        let block = Block::choice(choices.clone()).with_name("beverage");
        let html = block.render_form(&Value::Null, "beverage", None);
        assert!(html.as_str().contains(">---------</option>"));

        let with_default = Block::choice(choices).default_value("tea").with_name("beverage");
        let html = with_default.render_form(&with_default.get_default(), "beverage", None);
        assert!(!html.as_str().contains("---------"));
        assert!(html.as_str().contains("<option value=\"tea\" selected>Tea</option>"));
    }

    #[test]
    fn test_choice_clean_and_search() {
        let block = Block::choice(Choices::Static(vec![
            ChoiceEntry::option("tea", "Tea"),
            ChoiceEntry::group("Coffee", [("espresso", "Espresso"), ("latte", "Latte")]),
        ]));
        assert_eq!(block.clean(&Value::from("latte")).unwrap(), Value::from("latte"));
        assert_eq!(
            clean_err(&block, Value::from("water")),
            vec!["Select a valid choice. water is not one of the available choices."]
        );
        assert_eq!(block.get_searchable_content(&Value::from("latte")), vec!["Latte"]);

        let optional = Block::choice(Choices::flat([("tea", "Tea")])).required(false);
        assert_eq!(optional.clean(&Value::Null).unwrap(), Value::from(""));
    }

    #[test]
    fn test_callable_choices_are_evaluated_each_time() {
        let block = Block::choice(Choices::callable(|| vec![ChoiceEntry::option("a", "A")]));
        assert!(block.clean(&Value::from("a")).is_ok());
    }

    #[test]
    fn test_date_round_trip() {
        let block = Block::date();
        let value = block.to_python(&json!("2015-08-13"));
        assert_eq!(value, Value::Date(NaiveDate::from_ymd_opt(2015, 8, 13).unwrap()));
        assert_eq!(block.get_prep_value(&value), json!("2015-08-13"));
        let html = block.render_form(&value, "dateblock", None);
        assert!(html.as_str().contains("autocomplete=\"new-date\""));
        assert!(html.as_str().contains(
            "<script>initDateChooser(\"dateblock\", {\"dayOfWeekStart\": 0, \"format\": \"Y-m-d\"});</script>"
        ));
        assert_eq!(clean_err(&block, Value::from("32/13")), vec!["Enter a valid date."]);
    }

    #[test]
    fn test_date_render_format() {
        let block = Block::field(FieldKind::Date {
            format: Some("%d %B %Y".into()),
        });
        let value = block.to_python(&json!("2015-08-13"));
        assert_eq!(block.render(&value, &Context::new()).as_str(), "13 August 2015");
    }

    #[test]
    fn test_boolean_required_means_checked() {
        let block = Block::boolean();
        assert_eq!(clean_err(&block, Value::Bool(false)), vec![REQUIRED_MESSAGE]);
        assert_eq!(block.clean(&Value::Bool(true)).unwrap(), Value::Bool(true));
        let optional = Block::boolean().required(false);
        assert_eq!(optional.clean(&Value::Bool(false)).unwrap(), Value::Bool(false));
        let data = FormData::new().with("flag", "on");
        assert_eq!(block.value_from_datadict(&data, "flag"), Value::Bool(true));
        assert_eq!(block.value_from_datadict(&FormData::new(), "flag"), Value::Bool(false));
    }

    #[test]
    fn test_rich_text_default_and_render() {
        let block = Block::rich_text();
        assert_eq!(block.get_default(), Value::RichText(RichText::default()));
        let value = block.to_python(&json!("<p>Hello</p>"));
        assert_eq!(
            block.render(&value, &Context::new()).as_str(),
            "<div class=\"rich-text\"><p>Hello</p></div>"
        );
        assert_eq!(block.get_searchable_content(&value), vec!["<p>Hello</p>"]);
    }

    #[test]
    fn test_blockquote_and_raw_html() {
        let quote = Block::blockquote();
        assert_eq!(
            quote.render(&Value::from("Gin & tonic"), &Context::new()).as_str(),
            "<blockquote>Gin &amp; tonic</blockquote>"
        );
        let raw = Block::raw_html();
        assert_eq!(
            raw.render(&Value::from("<blink>BÖÖM</blink>"), &Context::new()).as_str(),
            "<blink>BÖÖM</blink>"
        );
    }

    #[test]
    fn test_unparsed_input_is_kept_until_clean() {
        let block = Block::integer();
        let value = block.to_python(&json!({"bad": true}));
        assert!(matches!(value, Value::Raw(_)));
        assert!(block.clean(&value).is_err());
    }

    #[test]
    fn test_form_contains_help_and_errors() {
        let block = Block::char()
            .with_name("title")
            .help_text("Some helpful text")
            .classname("full");
        let err = ValidationError::field(REQUIRED_MESSAGE);
        let html = block.render_form(&Value::from("x"), "title", Some(&err));
        let html = html.as_str();
        assert!(html.starts_with("<div class=\"field char_field widget-text_input full\">"));
        assert!(html.contains("Some helpful text"));
        assert!(html.contains("<p class=\"error-message\"><span>This field is required.</span></p>"));
        assert!(html.contains("placeholder=\"Title\""));
    }
}
