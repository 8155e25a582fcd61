//! Declarative block trees.
//!
//! A [`BlockSpec`] describes a block tree as data, internally tagged by
//! `"type"`, so schemas can live in JSON or TOML configuration:
//!
//! ```json
//! {
//!   "type": "stream",
//!   "children": {
//!     "heading": {"type": "char", "max_length": 80, "icon": "title"},
//!     "paragraph": {"type": "rich_text"},
//!     "page": {"type": "page_chooser", "required": false}
//!   },
//!   "block_counts": {"heading": {"max_num": 1}}
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tessera_types::ModelLabel;

use crate::block::Block;
use crate::chooser::ChooserKind;
use crate::error::Result;
use crate::field::{ChoiceEntry, Choices, FieldKind};
use crate::meta::{BlockCount, DefaultValue, MetaOptions};

/// Options common to every block type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_num: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_num: Option<usize>,
}

impl From<&SpecMeta> for MetaOptions {
    fn from(spec: &SpecMeta) -> Self {
        MetaOptions {
            label: spec.label.clone(),
            icon: spec.icon.clone(),
            template: spec.template.clone(),
            group: spec.group.clone(),
            classname: spec.classname.clone(),
            help_text: spec.help_text.clone(),
            admin_text: spec.admin_text.clone(),
            default: spec.default.clone().map(DefaultValue::Json),
            required: spec.required,
            min_num: spec.min_num,
            max_num: spec.max_num,
            ..Default::default()
        }
    }
}

/// A choice: `["value", "label"]` or `{"group": "...", "options": [...]}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceSpec {
    Option(String, String),
    Group {
        group: String,
        options: Vec<(String, String)>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockSpec {
    Char {
        #[serde(default)]
        min_length: Option<usize>,
        #[serde(default)]
        max_length: Option<usize>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Text {
        #[serde(default)]
        min_length: Option<usize>,
        #[serde(default)]
        max_length: Option<usize>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Email {
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Url {
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Integer {
        #[serde(default)]
        min_value: Option<i64>,
        #[serde(default)]
        max_value: Option<i64>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Float {
        #[serde(default)]
        min_value: Option<f64>,
        #[serde(default)]
        max_value: Option<f64>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Decimal {
        #[serde(default)]
        min_value: Option<f64>,
        #[serde(default)]
        max_value: Option<f64>,
        #[serde(default)]
        max_digits: Option<usize>,
        #[serde(default)]
        decimal_places: Option<usize>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Regex {
        regex: String,
        #[serde(default)]
        error_messages: IndexMap<String, String>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Boolean {
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Choice {
        choices: Vec<ChoiceSpec>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Date {
        #[serde(default)]
        format: Option<String>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Time {
        #[serde(default)]
        format: Option<String>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    #[serde(rename = "datetime")]
    DateTime {
        #[serde(default)]
        format: Option<String>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    RichText {
        #[serde(default)]
        features: Option<Vec<String>>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    RawHtml {
        #[serde(flatten)]
        meta: SpecMeta,
    },
    #[serde(rename = "blockquote")]
    BlockQuote {
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Struct {
        children: IndexMap<String, BlockSpec>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    List {
        child: Box<BlockSpec>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Stream {
        children: IndexMap<String, BlockSpec>,
        #[serde(default)]
        block_counts: IndexMap<String, BlockCount>,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Static {
        #[serde(flatten)]
        meta: SpecMeta,
    },
    PageChooser {
        #[serde(default)]
        page_types: Vec<String>,
        #[serde(default)]
        can_choose_root: bool,
        #[serde(flatten)]
        meta: SpecMeta,
    },
    DocumentChooser {
        #[serde(flatten)]
        meta: SpecMeta,
    },
    ImageChooser {
        #[serde(flatten)]
        meta: SpecMeta,
    },
    Image {
        #[serde(flatten)]
        meta: SpecMeta,
    },
    SnippetChooser {
        model: String,
        #[serde(flatten)]
        meta: SpecMeta,
    },
}

impl BlockSpec {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn meta(&self) -> &SpecMeta {
        match self {
            BlockSpec::Char { meta, .. }
            | BlockSpec::Text { meta, .. }
            | BlockSpec::Email { meta }
            | BlockSpec::Url { meta }
            | BlockSpec::Integer { meta, .. }
            | BlockSpec::Float { meta, .. }
            | BlockSpec::Decimal { meta, .. }
            | BlockSpec::Regex { meta, .. }
            | BlockSpec::Boolean { meta }
            | BlockSpec::Choice { meta, .. }
            | BlockSpec::Date { meta, .. }
            | BlockSpec::Time { meta, .. }
            | BlockSpec::DateTime { meta, .. }
            | BlockSpec::RichText { meta, .. }
            | BlockSpec::RawHtml { meta }
            | BlockSpec::BlockQuote { meta }
            | BlockSpec::Struct { meta, .. }
            | BlockSpec::List { meta, .. }
            | BlockSpec::Stream { meta, .. }
            | BlockSpec::Static { meta }
            | BlockSpec::PageChooser { meta, .. }
            | BlockSpec::DocumentChooser { meta }
            | BlockSpec::ImageChooser { meta }
            | BlockSpec::Image { meta }
            | BlockSpec::SnippetChooser { meta, .. } => meta,
        }
    }

    /// Build the block tree. Children are named after their keys.
    pub fn build(&self) -> Result<Block> {
        let block = match self {
            BlockSpec::Char {
                min_length,
                max_length,
                ..
            } => Block::field(FieldKind::Char {
                min_length: *min_length,
                max_length: *max_length,
            }),
            BlockSpec::Text {
                min_length,
                max_length,
                ..
            } => Block::field(FieldKind::Text {
                min_length: *min_length,
                max_length: *max_length,
            }),
            BlockSpec::Email { .. } => Block::email(),
            BlockSpec::Url { .. } => Block::url(),
            BlockSpec::Integer {
                min_value,
                max_value,
                ..
            } => Block::field(FieldKind::Integer {
                min_value: *min_value,
                max_value: *max_value,
            }),
            BlockSpec::Float {
                min_value,
                max_value,
                ..
            } => Block::field(FieldKind::Float {
                min_value: *min_value,
                max_value: *max_value,
            }),
            BlockSpec::Decimal {
                min_value,
                max_value,
                max_digits,
                decimal_places,
                ..
            } => Block::field(FieldKind::Decimal {
                min_value: *min_value,
                max_value: *max_value,
                max_digits: *max_digits,
                decimal_places: *decimal_places,
            }),
            BlockSpec::Regex {
                regex,
                error_messages,
                ..
            } => Block::regex_with_messages(regex, error_messages.clone())?,
            BlockSpec::Boolean { .. } => Block::boolean(),
            BlockSpec::Choice { choices, .. } => Block::choice(Choices::Static(
                choices
                    .iter()
                    .map(|choice| match choice {
                        ChoiceSpec::Option(value, label) => ChoiceEntry::option(value, label),
                        ChoiceSpec::Group { group, options } => {
                            ChoiceEntry::group(group, options.iter().cloned())
                        }
                    })
                    .collect(),
            )),
            BlockSpec::Date { format, .. } => Block::field(FieldKind::Date {
                format: format.clone(),
            }),
            BlockSpec::Time { format, .. } => Block::field(FieldKind::Time {
                format: format.clone(),
            }),
            BlockSpec::DateTime { format, .. } => Block::field(FieldKind::DateTime {
                format: format.clone(),
            }),
            BlockSpec::RichText { features, .. } => Block::field(FieldKind::RichText {
                features: features.clone(),
            }),
            BlockSpec::RawHtml { .. } => Block::raw_html(),
            BlockSpec::BlockQuote { .. } => Block::blockquote(),
            BlockSpec::Struct { children, .. } => Block::struct_block(build_children(children)?),
            BlockSpec::List { child, .. } => Block::list(child.build()?),
            BlockSpec::Stream {
                children,
                block_counts,
                ..
            } => {
                let mut block = Block::stream(build_children(children)?);
                for (block_type, count) in block_counts {
                    block = block.block_count(block_type.as_str(), *count);
                }
                block
            }
            BlockSpec::Static { .. } => Block::static_block(),
            BlockSpec::PageChooser {
                page_types,
                can_choose_root,
                ..
            } => Block::chooser(ChooserKind::Page {
                page_types: page_types
                    .iter()
                    .map(|t| ModelLabel::parse(t))
                    .collect::<std::result::Result<_, _>>()?,
                can_choose_root: *can_choose_root,
            }),
            BlockSpec::DocumentChooser { .. } => Block::document_chooser(),
            BlockSpec::ImageChooser { .. } => Block::image_chooser(),
            BlockSpec::Image { .. } => Block::image(),
            BlockSpec::SnippetChooser { model, .. } => {
                Block::snippet_chooser(ModelLabel::parse(model)?)
            }
        };
        Ok(block.with_overrides(&MetaOptions::from(self.meta())))
    }
}

fn build_children(children: &IndexMap<String, BlockSpec>) -> Result<Vec<(String, Block)>> {
    children
        .iter()
        .map(|(name, spec)| Ok((name.clone(), spec.build()?)))
        .collect()
}

/// Parse and build a JSON schema declaration in one step.
pub fn block_from_json(json: &str) -> Result<Block> {
    BlockSpec::from_json(json)?.build()
}
