//! Block definitions.
//!
//! A [`Block`] is an immutable schema node: a name, a variant
//! ([`BlockKind`]), merged options and validators. It is a cheap handle
//! (`Arc` inside), so values can carry the block that produced them.
//!
//! Every operation dispatches on the variant. Variant data lives in the
//! variant's own module.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tessera_richtext::{Markup, escape};

use crate::check::{self, CheckMessage};
use crate::chooser::{ChooserBlock, ChooserKind};
use crate::context::{Context, TemplateArgs};
use crate::error::ValidationError;
use crate::field::{FieldBlock, FieldKind};
use crate::form::FormData;
use crate::list_block::ListBlock;
use crate::meta::{BlockCount, DefaultValue, MetaOptions, label_from_name};
use crate::static_block::StaticBlock;
use crate::stream_block::StreamBlock;
use crate::struct_block::StructBlock;
use crate::value::Value;
use tracing::warn;

/// Named child blocks, in declaration order.
pub type ChildBlocks = IndexMap<String, Block>;

/// Checks a cleaned value. `Err` carries the message to show.
pub type ValidatorFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Custom API representation for a block's values.
pub type ApiFn = Arc<dyn Fn(&Value, &Context) -> JsonValue + Send + Sync>;

/// The closed set of block variants.
#[derive(Clone, Debug)]
pub enum BlockKind {
    Field(FieldBlock),
    Struct(StructBlock),
    List(ListBlock),
    Stream(StreamBlock),
    Static(StaticBlock),
    Chooser(ChooserBlock),
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Field(f) => f.field.as_str(),
            BlockKind::Struct(_) => "struct",
            BlockKind::List(_) => "list",
            BlockKind::Stream(_) => "stream",
            BlockKind::Static(_) => "static",
            BlockKind::Chooser(c) => c.kind.as_str(),
        }
    }

    fn default_required(&self) -> bool {
        match self {
            BlockKind::Field(_) | BlockKind::Chooser(_) | BlockKind::Stream(_) => true,
            BlockKind::Struct(_) | BlockKind::List(_) | BlockKind::Static(_) => false,
        }
    }
}

#[derive(Clone)]
struct BlockDef {
    name: String,
    kind: BlockKind,
    meta: MetaOptions,
    validators: Vec<ValidatorFn>,
    api_representation: Option<ApiFn>,
}

/// A schema node. Cloning shares the definition.
#[derive(Clone)]
pub struct Block {
    def: Arc<BlockDef>,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            def: Arc::new(BlockDef {
                name: String::new(),
                kind,
                meta: MetaOptions::default(),
                validators: Vec::new(),
                api_representation: None,
            }),
        }
    }

    pub fn field(kind: FieldKind) -> Self {
        Self::new(BlockKind::Field(FieldBlock::new(kind)))
    }

    pub fn char() -> Self {
        Self::field(FieldKind::Char {
            min_length: None,
            max_length: None,
        })
    }

    pub fn text() -> Self {
        Self::field(FieldKind::Text {
            min_length: None,
            max_length: None,
        })
    }

    pub fn email() -> Self {
        Self::field(FieldKind::Email)
    }

    pub fn url() -> Self {
        Self::field(FieldKind::Url)
    }

    pub fn integer() -> Self {
        Self::field(FieldKind::Integer {
            min_value: None,
            max_value: None,
        })
    }

    pub fn float() -> Self {
        Self::field(FieldKind::Float {
            min_value: None,
            max_value: None,
        })
    }

    pub fn decimal() -> Self {
        Self::field(FieldKind::Decimal {
            min_value: None,
            max_value: None,
            max_digits: None,
            decimal_places: None,
        })
    }

    pub fn boolean() -> Self {
        Self::field(FieldKind::Boolean)
    }

    pub fn date() -> Self {
        Self::field(FieldKind::Date { format: None })
    }

    pub fn time() -> Self {
        Self::field(FieldKind::Time { format: None })
    }

    pub fn datetime() -> Self {
        Self::field(FieldKind::DateTime { format: None })
    }

    pub fn rich_text() -> Self {
        Self::field(FieldKind::RichText { features: None })
    }

    pub fn raw_html() -> Self {
        Self::field(FieldKind::RawHtml)
    }

    pub fn blockquote() -> Self {
        Self::field(FieldKind::BlockQuote)
    }

    /// Struct block with the given named children.
    pub fn struct_block<S: Into<String>>(children: impl IntoIterator<Item = (S, Block)>) -> Self {
        Self::new(BlockKind::Struct(StructBlock::new(named(children))))
    }

    /// List block repeating `child`.
    pub fn list(child: Block) -> Self {
        Self::new(BlockKind::List(ListBlock::new(child)))
    }

    /// Stream block accepting the given named child types.
    pub fn stream<S: Into<String>>(children: impl IntoIterator<Item = (S, Block)>) -> Self {
        Self::new(BlockKind::Stream(StreamBlock::new(named(children))))
    }

    pub fn static_block() -> Self {
        Self::new(BlockKind::Static(StaticBlock))
    }

    pub fn chooser(kind: ChooserKind) -> Self {
        Self::new(BlockKind::Chooser(ChooserBlock::new(kind)))
    }

    pub fn page_chooser() -> Self {
        Self::chooser(ChooserKind::Page {
            page_types: Vec::new(),
            can_choose_root: false,
        })
    }

    pub fn document_chooser() -> Self {
        Self::chooser(ChooserKind::Document)
    }

    pub fn image_chooser() -> Self {
        Self::chooser(ChooserKind::Image)
    }

    /// Image chooser that also records alt text for this use.
    pub fn image() -> Self {
        Self::chooser(ChooserKind::ImageWithAlt)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn kind(&self) -> &BlockKind {
        &self.def.kind
    }

    pub fn meta(&self) -> &MetaOptions {
        &self.def.meta
    }

    pub fn label(&self) -> String {
        match &self.def.meta.label {
            Some(label) => label.clone(),
            None => label_from_name(&self.def.name),
        }
    }

    pub fn is_required(&self) -> bool {
        self.def
            .meta
            .required
            .unwrap_or_else(|| self.def.kind.default_required())
    }

    /// Named children of a struct or stream block.
    pub fn child_blocks(&self) -> Option<&ChildBlocks> {
        match &self.def.kind {
            BlockKind::Struct(s) => Some(&s.children),
            BlockKind::Stream(s) => Some(&s.children),
            _ => None,
        }
    }

    pub fn child_block(&self, name: &str) -> Option<&Block> {
        self.child_blocks().and_then(|c| c.get(name))
    }

    /// True if both handles share one definition.
    pub fn ptr_eq(&self, other: &Block) -> bool {
        Arc::ptr_eq(&self.def, &other.def)
    }

    pub(crate) fn validators(&self) -> &[ValidatorFn] {
        &self.def.validators
    }

    // ========================================================================
    // Builders
    // ========================================================================

    fn edit(mut self, f: impl FnOnce(&mut BlockDef)) -> Self {
        f(Arc::make_mut(&mut self.def));
        self
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.edit(|d| d.name = name)
    }

    /// Replace all options.
    pub fn with_meta(self, meta: MetaOptions) -> Self {
        self.edit(|d| d.meta = meta)
    }

    /// Apply constructor-style overrides on top of the current options.
    pub fn with_overrides(self, overrides: &MetaOptions) -> Self {
        self.edit(|d| d.meta = d.meta.overridden_by(overrides))
    }

    pub(crate) fn with_kind(self, kind: BlockKind) -> Self {
        self.edit(|d| d.kind = kind)
    }

    pub fn label_text(self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.edit(|d| d.meta.label = Some(label))
    }

    pub fn required(self, required: bool) -> Self {
        self.edit(|d| d.meta.required = Some(required))
    }

    /// Default in serialized form; converted by `to_python` on use.
    pub fn default_value(self, default: impl Into<JsonValue>) -> Self {
        let default = DefaultValue::Json(default.into());
        self.edit(|d| d.meta.default = Some(default))
    }

    pub fn default_fn<F>(self, f: F) -> Self
    where
        F: Fn() -> JsonValue + Send + Sync + 'static,
    {
        self.edit(|d| d.meta.default = Some(DefaultValue::Callable(Arc::new(f))))
    }

    pub fn template(self, template: impl Into<String>) -> Self {
        let template = template.into();
        self.edit(|d| d.meta.template = Some(template))
    }

    pub fn with_icon(self, icon: impl Into<String>) -> Self {
        let icon = icon.into();
        self.edit(|d| d.meta.icon = Some(icon))
    }

    pub fn group(self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.edit(|d| d.meta.group = Some(group))
    }

    pub fn classname(self, classname: impl Into<String>) -> Self {
        let classname = classname.into();
        self.edit(|d| d.meta.classname = Some(classname))
    }

    pub fn help_text(self, help_text: impl Into<String>) -> Self {
        let help_text = help_text.into();
        self.edit(|d| d.meta.help_text = Some(help_text))
    }

    pub fn admin_text(self, admin_text: impl Into<String>) -> Self {
        let admin_text = admin_text.into();
        self.edit(|d| d.meta.admin_text = Some(admin_text))
    }

    pub fn min_num(self, n: usize) -> Self {
        self.edit(|d| d.meta.min_num = Some(n))
    }

    pub fn max_num(self, n: usize) -> Self {
        self.edit(|d| d.meta.max_num = Some(n))
    }

    /// Per-type count limits for a stream child.
    pub fn block_count(self, block_type: impl Into<String>, count: BlockCount) -> Self {
        let block_type = block_type.into();
        self.edit(|d| {
            d.meta
                .block_counts
                .get_or_insert_with(IndexMap::new)
                .insert(block_type, count);
        })
    }

    pub fn validator<F>(self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.edit(|d| d.validators.push(Arc::new(f)))
    }

    pub fn api_representation<F>(self, f: F) -> Self
    where
        F: Fn(&Value, &Context) -> JsonValue + Send + Sync + 'static,
    {
        self.edit(|d| d.api_representation = Some(Arc::new(f)))
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// The block's default, as a native value.
    pub fn get_default(&self) -> Value {
        if let Some(default) = &self.def.meta.default {
            return self.to_python(&default.produce());
        }
        match &self.def.kind {
            BlockKind::Field(f) => f.empty_value(),
            BlockKind::Struct(s) => s.default_value(self),
            BlockKind::List(l) => l.default_value(),
            BlockKind::Stream(_) => self.to_python(&JsonValue::Array(Vec::new())),
            BlockKind::Static(_) | BlockKind::Chooser(_) => Value::Null,
        }
    }

    /// Serialized form → native value. Never fails; unparseable input is kept
    /// as [`Value::Raw`] and rejected later by `clean`.
    pub fn to_python(&self, value: &JsonValue) -> Value {
        match &self.def.kind {
            BlockKind::Field(f) => f.to_python(value),
            BlockKind::Struct(s) => s.to_python(self, value),
            BlockKind::List(l) => l.to_python(value),
            BlockKind::Stream(_) => StreamBlock::to_python(self, value),
            BlockKind::Static(_) => Value::Null,
            BlockKind::Chooser(c) => c.to_python(value),
        }
    }

    /// Native value → serialized form.
    pub fn get_prep_value(&self, value: &Value) -> JsonValue {
        match &self.def.kind {
            BlockKind::Field(f) => f.get_prep_value(value),
            BlockKind::Struct(s) => s.get_prep_value(value),
            BlockKind::List(l) => l.get_prep_value(value),
            BlockKind::Stream(_) => StreamBlock::get_prep_value(self, value),
            BlockKind::Static(_) => JsonValue::Null,
            BlockKind::Chooser(c) => c.get_prep_value(value),
        }
    }

    /// JSON for API consumers. Defaults to the serialized form, with rich
    /// text expanded.
    pub fn get_api_representation(&self, value: &Value, context: &Context) -> JsonValue {
        if let Some(api) = &self.def.api_representation {
            return api(value, context);
        }
        match &self.def.kind {
            BlockKind::Field(f) => f.api_representation(value, context),
            BlockKind::Struct(s) => s.api_representation(value, context),
            BlockKind::List(l) => l.api_representation(value, context),
            BlockKind::Stream(_) => StreamBlock::api_representation(value, context),
            BlockKind::Static(_) => JsonValue::Null,
            BlockKind::Chooser(c) => c.get_prep_value(value),
        }
    }

    /// Validate and normalise a value.
    ///
    /// Block-level validators run after the variant's own checks pass. On a
    /// stream their messages become sequence-level errors.
    pub fn clean(&self, value: &Value) -> Result<Value, ValidationError> {
        let cleaned = match &self.def.kind {
            BlockKind::Field(f) => f.clean(self, value)?,
            BlockKind::Struct(s) => s.clean(self, value)?,
            BlockKind::List(l) => l.clean(self, value)?,
            BlockKind::Stream(s) => s.clean(self, value)?,
            BlockKind::Static(_) => Value::Null,
            BlockKind::Chooser(c) => c.clean(self, value)?,
        };

        let messages: Vec<String> = self
            .def
            .validators
            .iter()
            .filter_map(|v| v(&cleaned).err())
            .collect();
        if messages.is_empty() {
            return Ok(cleaned);
        }
        match &self.def.kind {
            BlockKind::Stream(_) | BlockKind::List(_) => Err(ValidationError::Sequence {
                block_errors: Default::default(),
                non_block_errors: messages,
            }),
            _ => Err(ValidationError::Field { messages }),
        }
    }

    /// Render for the front end, through the block's template if it has one.
    pub fn render(&self, value: &Value, context: &Context) -> Markup {
        let Some(template) = self.def.meta.template.as_deref() else {
            return self.render_basic(value, context);
        };
        match context.find_template(template) {
            Some(render) => render(&TemplateArgs {
                block: self,
                value,
                context,
            }),
            None => {
                warn!(template, block = self.name(), "template not registered, using basic rendering");
                self.render_basic(value, context)
            }
        }
    }

    /// Rendering used when there is no template.
    pub fn render_basic(&self, value: &Value, context: &Context) -> Markup {
        match &self.def.kind {
            BlockKind::Field(f) => f.render_basic(value, context),
            BlockKind::Struct(s) => s.render_basic(value, context),
            BlockKind::List(l) => l.render_basic(value, context),
            BlockKind::Stream(_) => StreamBlock::render_basic(value, context),
            BlockKind::Static(_) => Markup::new(),
            BlockKind::Chooser(c) => c.render_basic(value, context),
        }
    }

    /// Editable representation, with field names under `prefix`.
    pub fn render_form(
        &self,
        value: &Value,
        prefix: &str,
        errors: Option<&ValidationError>,
    ) -> Markup {
        match &self.def.kind {
            BlockKind::Field(f) => f.render_form(self, value, prefix, errors),
            BlockKind::Struct(s) => s.render_form(self, value, prefix, errors),
            BlockKind::List(l) => l.render_form(self, value, prefix, errors),
            BlockKind::Stream(s) => s.render_form(self, value, prefix, errors),
            BlockKind::Static(s) => s.render_form(self),
            BlockKind::Chooser(c) => c.render_form(self, value, prefix, errors),
        }
    }

    /// Rebuild a (not yet cleaned) value from posted form data.
    pub fn value_from_datadict(&self, data: &FormData, prefix: &str) -> Value {
        match &self.def.kind {
            BlockKind::Field(f) => f.value_from_datadict(data, prefix),
            BlockKind::Struct(s) => s.value_from_datadict(self, data, prefix),
            BlockKind::List(l) => l.value_from_datadict(data, prefix),
            BlockKind::Stream(s) => s.value_from_datadict(self, data, prefix),
            BlockKind::Static(_) => Value::Null,
            BlockKind::Chooser(c) => c.value_from_datadict(data, prefix),
        }
    }

    /// True if the form posted nothing for this block.
    pub fn value_omitted_from_data(&self, data: &FormData, prefix: &str) -> bool {
        match &self.def.kind {
            BlockKind::List(_) | BlockKind::Stream(_) => {
                !data.contains(&crate::form::child_prefix(prefix, "count"))
            }
            BlockKind::Struct(s) => s.children.iter().all(|(name, child)| {
                child.value_omitted_from_data(data, &crate::form::child_prefix(prefix, name))
            }),
            BlockKind::Static(_) => false,
            BlockKind::Chooser(c) => c.value_omitted_from_data(data, prefix),
            BlockKind::Field(_) => !data.contains(prefix),
        }
    }

    /// Text to index for search.
    pub fn get_searchable_content(&self, value: &Value) -> Vec<String> {
        match &self.def.kind {
            BlockKind::Field(f) => f.searchable_content(value),
            BlockKind::Struct(s) => s.searchable_content(value),
            BlockKind::List(l) => l.searchable_content(value),
            BlockKind::Stream(_) => StreamBlock::searchable_content(value),
            BlockKind::Static(_) | BlockKind::Chooser(_) => Vec::new(),
        }
    }

    /// Schema metadata for an interactive editor.
    pub fn get_definition(&self) -> JsonValue {
        let mut def = JsonMap::new();
        def.insert("key".into(), JsonValue::from(self.name()));
        def.insert("label".into(), JsonValue::from(self.label()));
        def.insert("required".into(), JsonValue::from(self.is_required()));
        if let Some(icon) = self.icon().filter(|i| *i != "placeholder") {
            def.insert(
                "icon".into(),
                JsonValue::from(format!("<i class=\"icon icon-{}\"></i>", escape(icon))),
            );
        }
        if let Some(group) = &self.def.meta.group {
            def.insert("group".into(), JsonValue::from(group.as_str()));
        }
        def.insert("closed".into(), JsonValue::Bool(false));
        def.insert("dangerouslyRunInnerScripts".into(), JsonValue::Bool(true));

        match &self.def.kind {
            BlockKind::Field(_) => {
                let default = self.get_prep_value(&self.get_default());
                if !default.is_null() {
                    def.insert("default".into(), default);
                }
                def.insert("titleTemplate".into(), title_template(self.name()));
            }
            BlockKind::Struct(s) => {
                def.insert("isStruct".into(), JsonValue::Bool(true));
                if let Some(first) = s.children.keys().next() {
                    def.insert("titleTemplate".into(), title_template(first));
                }
                def.insert("children".into(), children_definitions(s.children.values()));
            }
            BlockKind::List(l) => {
                def.insert("default".into(), self.get_prep_value(&self.get_default()));
                def.insert("minNum".into(), opt_num(self.def.meta.min_num));
                def.insert("maxNum".into(), opt_num(self.def.meta.max_num));
                def.insert("children".into(), children_definitions([&l.child]));
            }
            BlockKind::Stream(s) => {
                def.insert("minNum".into(), opt_num(self.def.meta.min_num));
                def.insert("maxNum".into(), opt_num(self.def.meta.max_num));
                def.insert("children".into(), children_definitions(s.children.values()));
            }
            BlockKind::Static(_) => {
                def.insert("isStatic".into(), JsonValue::Bool(true));
            }
            BlockKind::Chooser(_) => {}
        }

        let html = self.render_form(&self.get_default(), "field-__ID__", None);
        def.insert("html".into(), JsonValue::from(html.into_string()));
        JsonValue::Object(def)
    }

    /// Lint the schema tree below this block.
    pub fn check(&self) -> Vec<CheckMessage> {
        check::check_block(self)
    }

    /// Effective icon: the option if set, else the variant's.
    pub fn icon(&self) -> Option<&str> {
        self.def.meta.icon.as_deref().or(match &self.def.kind {
            BlockKind::Field(f) => Some(f.field.default_icon()),
            BlockKind::Chooser(c) => Some(c.kind.default_icon()),
            BlockKind::Struct(_) | BlockKind::List(_) | BlockKind::Stream(_) => Some("placeholder"),
            BlockKind::Static(_) => None,
        })
    }
}

fn named<S: Into<String>>(children: impl IntoIterator<Item = (S, Block)>) -> ChildBlocks {
    children
        .into_iter()
        .map(|(name, block)| {
            let name = name.into();
            (name.clone(), block.with_name(name))
        })
        .collect()
}

/// Name a set of children as a struct or stream does.
pub(crate) fn name_children<S: Into<String>>(
    children: impl IntoIterator<Item = (S, Block)>,
) -> ChildBlocks {
    named(children)
}

fn title_template(name: &str) -> JsonValue {
    JsonValue::from(format!("${{{name}}}"))
}

fn opt_num(n: Option<usize>) -> JsonValue {
    n.map(JsonValue::from).unwrap_or(JsonValue::Null)
}

fn children_definitions<'a>(children: impl IntoIterator<Item = &'a Block>) -> JsonValue {
    JsonValue::Array(children.into_iter().map(Block::get_definition).collect())
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.def.name)
            .field("kind", &self.def.kind)
            .field("meta", &self.def.meta)
            .field("validators", &self.def.validators.len())
            .finish()
    }
}
