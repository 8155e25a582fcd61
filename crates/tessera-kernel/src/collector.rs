//! Embedded reference collection.
//!
//! Rich text and stream fields hold references the relational layer cannot
//! see. Each collector narrows the rows to scan with a regex prefilter run by
//! the database, then re-parses every candidate and keeps only exact identity
//! matches. The prefilter may over-match. It must never under-match.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;
use serde_json::Value as JsonValue;
use tessera_blocks::{Block, BlockKind, FieldKind as BlockFieldKind, Value};
use tessera_richtext::{
    EmbedHandler, EntityHandler, FeatureRegistry, LinkHandler, find_objects_in_rich_text,
};
use tessera_types::{ModelLabel, ObjectRef, ObjectSummary};
use tracing::{debug, warn};

use crate::config::DbVendor;
use crate::error::Result;
use crate::models::{FieldDef, FieldKind};
use crate::store::{ContentStore, Filter, StoredObject};

/// A registered link or embed handler.
#[derive(Clone)]
pub enum AnyHandler {
    Link(Arc<dyn LinkHandler>),
    Embed(Arc<dyn EmbedHandler>),
}

impl AnyHandler {
    pub fn identifier(&self) -> &str {
        match self {
            AnyHandler::Link(h) => h.identifier(),
            AnyHandler::Embed(h) => h.identifier(),
        }
    }

    pub fn model(&self) -> Option<&ModelLabel> {
        match self {
            AnyHandler::Link(h) => h.model(),
            AnyHandler::Embed(h) => h.model(),
        }
    }

    pub fn id_pair_from_instance(&self, instance: &ObjectSummary) -> (String, String) {
        match self {
            AnyHandler::Link(h) => h.id_pair_from_instance(instance),
            AnyHandler::Embed(h) => h.id_pair_from_instance(instance),
        }
    }
}

/// Every model-backed handler, links first.
pub fn model_handlers(features: &FeatureRegistry) -> Vec<(ModelLabel, AnyHandler)> {
    let links = features
        .get_link_types()
        .into_values()
        .map(AnyHandler::Link);
    let embeds = features
        .get_embed_types()
        .into_values()
        .map(AnyHandler::Embed);
    links
        .chain(embeds)
        .filter_map(|h| Some((h.model()?.clone(), h)))
        .collect()
}

/// Replace each space in `template` with "anything up to whitespace" in the
/// vendor's regex dialect.
fn widen_spaces(template: &str, vendor: DbVendor) -> String {
    template.replace(' ', &format!("[^>]*{}", vendor.space_class()))
}

fn alternation(parts: &[String]) -> String {
    match parts {
        [single] => single.clone(),
        _ => format!("({})", parts.join("|")),
    }
}

/// Pattern for the `linktype` / `embedtype` attribute of any of `handlers`.
fn type_attribute_pattern<'a>(handlers: impl IntoIterator<Item = &'a AnyHandler>) -> String {
    let types: IndexSet<String> = handlers
        .into_iter()
        .map(|h| regex::escape(h.identifier()))
        .collect();
    let types: Vec<String> = types.into_iter().collect();
    format!(r#"(link|embed)type="{}""#, alternation(&types))
}

// ============================================================================
// Rich text
// ============================================================================

/// Searches every rich text field of one model.
pub struct ModelRichTextCollector<'a> {
    store: &'a dyn ContentStore,
    features: &'a FeatureRegistry,
    model: ModelLabel,
    fields: Vec<String>,
    vendor: DbVendor,
}

impl<'a> ModelRichTextCollector<'a> {
    pub fn new(store: &'a dyn ContentStore, features: &'a FeatureRegistry, model: ModelLabel) -> Self {
        let fields = store
            .registry()
            .rich_text_fields(&model)
            .into_iter()
            .map(|f| f.name.clone())
            .collect();
        Self {
            vendor: store.vendor(),
            store,
            features,
            model,
            fields,
        }
    }

    pub fn model(&self) -> &ModelLabel {
        &self.model
    }

    /// Handlers whose model is the model, or an ancestor of the model, of
    /// one of `searched`.
    fn handlers_for(&self, searched: &[StoredObject]) -> Vec<(ModelLabel, AnyHandler)> {
        let registry = self.store.registry();
        let searched_models: HashSet<ModelLabel> = searched
            .iter()
            .flat_map(|o| registry.lineage(o.model()))
            .collect();
        model_handlers(self.features)
            .into_iter()
            .filter(|(model, _)| searched_models.contains(model))
            .collect()
    }

    /// Pattern matching rich text that may link to or embed any of
    /// `searched`. `None` when no handler can represent them.
    pub fn pattern_for_objects(&self, searched: &[StoredObject]) -> Option<String> {
        let handlers = self.handlers_for(searched);
        if handlers.is_empty() {
            return None;
        }
        let registry = self.store.registry();

        let mut values: IndexSet<String> = IndexSet::new();
        for object in searched {
            let summary = object.summary(registry);
            for (model, handler) in &handlers {
                if registry.is_subclass(object.model(), model) {
                    let (k, v) = handler.id_pair_from_instance(&summary);
                    values.insert(format!(r#"{k}="{}""#, regex::escape(&v)));
                }
            }
        }
        let values: Vec<String> = values.into_iter().collect();
        if values.is_empty() {
            return None;
        }

        let template = widen_spaces(r"<(a|embed)( TYPE VAL| VAL TYPE)[^>]*>", self.vendor);
        Some(
            template
                .replace("TYPE", &type_attribute_pattern(handlers.iter().map(|(_, h)| h)))
                .replace("VAL", &alternation(&values)),
        )
    }

    /// Pattern matching rich text containing any model-backed link or embed.
    pub fn pattern_for_all_objects(&self) -> Option<String> {
        let handlers = model_handlers(self.features);
        if handlers.is_empty() {
            return None;
        }
        let template = widen_spaces(r"<(a|embed) TYPE[^>]*>", self.vendor);
        Some(template.replace(
            "TYPE",
            &type_attribute_pattern(handlers.iter().map(|(_, h)| h)),
        ))
    }

    fn field_filter(&self, pattern: &str) -> Filter {
        Filter::Or(
            self.fields
                .iter()
                .map(|f| Filter::regex(f.as_str(), pattern))
                .collect(),
        )
    }

    fn scan_rows(
        &self,
        pattern: &str,
        mut keep: impl FnMut(&ObjectRef) -> bool,
    ) -> Result<Vec<(StoredObject, ObjectRef)>> {
        let rows = self.store.filter(&self.model, &self.field_filter(pattern))?;
        debug!(model = %self.model, candidates = rows.len(), "rich text prefilter");
        let mut found = Vec::new();
        for row in rows {
            for field in &self.fields {
                let Some(html) = row.text(field) else {
                    continue;
                };
                for instance in find_objects_in_rich_text(self.features, &html) {
                    if keep(&instance.object) {
                        found.push((row.clone(), instance.object));
                    }
                }
            }
        }
        Ok(found)
    }

    /// `(row, referenced)` pairs for each link or embed of one of `searched`
    /// inside this model's rich text fields.
    pub fn find_objects(&self, searched: &[StoredObject]) -> Result<Vec<(StoredObject, ObjectRef)>> {
        if self.fields.is_empty() {
            return Ok(Vec::new());
        }
        let Some(pattern) = self.pattern_for_objects(searched) else {
            return Ok(Vec::new());
        };
        let registry = self.store.registry();
        let searched_ids: HashSet<ObjectRef> = searched
            .iter()
            .map(|o| registry.identity(&o.object))
            .collect();
        self.scan_rows(&pattern, |found| {
            searched_ids.contains(&registry.identity(found))
        })
    }

    /// `(row, referenced)` pairs for every resolvable object referenced in
    /// this model's rich text fields.
    pub fn find_all_objects(&self) -> Result<Vec<(StoredObject, ObjectRef)>> {
        if self.fields.is_empty() {
            return Ok(Vec::new());
        }
        let Some(pattern) = self.pattern_for_all_objects() else {
            return Ok(Vec::new());
        };
        self.scan_rows(&pattern, |_| true)
    }
}

// ============================================================================
// Stream fields
// ============================================================================

/// Chooser blocks and rich text blocks.
pub fn is_reference_block(block: &Block) -> bool {
    match block.kind() {
        BlockKind::Chooser(_) => true,
        BlockKind::Field(f) => matches!(f.field, BlockFieldKind::RichText { .. }),
        _ => false,
    }
}

/// Walks the values of one stream field along paths of its block tree.
pub struct StreamFieldCollector {
    field: String,
    block: Block,
}

impl StreamFieldCollector {
    pub fn new(field: impl Into<String>, block: Block) -> Self {
        Self {
            field: field.into(),
            block,
        }
    }

    /// Collector for a stream field definition.
    pub fn for_field(field: &FieldDef) -> Option<Self> {
        match &field.kind {
            FieldKind::Stream(block) => Some(Self::new(field.name.as_str(), block.clone())),
            _ => None,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Every root-to-leaf path through the block definition.
    pub fn block_tree_paths(&self) -> Vec<Vec<Block>> {
        let mut paths = Vec::new();
        collect_paths(&self.block, &mut Vec::new(), &mut paths);
        paths
    }

    /// Paths whose leaf satisfies `is_match`.
    pub fn find_block_type(&self, is_match: impl Fn(&Block) -> bool) -> Vec<Vec<Block>> {
        self.block_tree_paths()
            .into_iter()
            .filter(|path| path.last().is_some_and(&is_match))
            .collect()
    }

    /// Objects found in `value` at the leaf of `path`. `path` starts at the
    /// field's root block, which describes `value` itself.
    pub fn find_objects(
        &self,
        features: &FeatureRegistry,
        value: &Value,
        path: &[Block],
    ) -> Vec<ObjectRef> {
        let mut found = Vec::new();
        walk(features, value, path.get(1..).unwrap_or_default(), &mut found);
        found
    }
}

fn collect_paths(block: &Block, ancestors: &mut Vec<Block>, out: &mut Vec<Vec<Block>>) {
    ancestors.push(block.clone());
    match block.kind() {
        BlockKind::Stream(_) | BlockKind::Struct(_) => {
            for child in block.child_blocks().into_iter().flat_map(|c| c.values()) {
                collect_paths(child, ancestors, out);
            }
        }
        BlockKind::List(list) => collect_paths(&list.child, ancestors, out),
        _ => out.push(ancestors.clone()),
    }
    ancestors.pop();
}

/// The name of the deepest block on `path` that appears in stored JSON:
/// stream item types and struct keys. List children have no stored name.
fn deepest_stored_name(path: &[Block]) -> Option<&str> {
    path.windows(2)
        .rev()
        .find(|pair| matches!(pair[0].kind(), BlockKind::Stream(_) | BlockKind::Struct(_)))
        .map(|pair| pair[1].name())
}

fn walk(features: &FeatureRegistry, value: &Value, rest: &[Block], found: &mut Vec<ObjectRef>) {
    let Some((next, rest)) = rest.split_first() else {
        match value {
            Value::RichText(rt) => found.extend(
                find_objects_in_rich_text(features, rt.source())
                    .into_iter()
                    .map(|s| s.object),
            ),
            Value::Object(object) => found.push(object.clone()),
            Value::Image(image) => found.push(image.image.clone()),
            v if v.is_null() => {}
            other => warn!(value = %truncated(other), "unexpected stream field value at leaf"),
        }
        return;
    };

    match value {
        Value::Stream(stream) => {
            for child in stream.iter().filter(|c| c.block_type() == next.name()) {
                walk(features, child.value(), rest, found);
            }
        }
        Value::Struct(sv) => {
            if let Some(child) = sv.get(next.name()) {
                walk(features, child, rest, found);
            }
        }
        Value::List(items) => {
            for item in items {
                walk(features, item, rest, found);
            }
        }
        v if v.is_null() => {}
        other => warn!(value = %truncated(other), "unexpected stream field value"),
    }
}

fn truncated(value: &Value) -> String {
    value.to_string().chars().take(30).collect()
}

/// Searches every stream field of one model.
pub struct ModelStreamFieldsCollector<'a> {
    store: &'a dyn ContentStore,
    features: &'a FeatureRegistry,
    model: ModelLabel,
    collectors: Vec<StreamFieldCollector>,
    rich_text: ModelRichTextCollector<'a>,
    vendor: DbVendor,
}

impl<'a> ModelStreamFieldsCollector<'a> {
    pub fn new(store: &'a dyn ContentStore, features: &'a FeatureRegistry, model: ModelLabel) -> Self {
        let collectors = store
            .registry()
            .stream_fields(&model)
            .into_iter()
            .filter_map(StreamFieldCollector::for_field)
            .collect();
        Self {
            rich_text: ModelRichTextCollector::new(store, features, model.clone()),
            vendor: store.vendor(),
            store,
            features,
            model,
            collectors,
        }
    }

    pub fn model(&self) -> &ModelLabel {
        &self.model
    }

    /// Pattern for a primary key stored as a JSON value inside an array or
    /// object, unioned with the rich text pattern escaped for JSON strings.
    pub fn pattern_for_objects(&self, searched: &[StoredObject]) -> String {
        let ids: IndexSet<String> = searched
            .iter()
            .map(|o| regex::escape(&o.pk().json_text()))
            .collect();
        let ids = ids.into_iter().collect::<Vec<_>>().join("|");
        let structure = match self.vendor {
            DbVendor::Mysql => format!("[[,[:space:]:]({ids})[]}},[:space:]]"),
            DbVendor::Sqlite | DbVendor::Postgresql => format!(r"[\[,\s:]({ids})[\]}},\s]"),
        };
        match self.rich_text.pattern_for_objects(searched) {
            Some(rich_text) => format!("({structure}|{})", rich_text.replace('"', r#"\\""#)),
            None => structure,
        }
    }

    /// Matches for `searched` found in chooser and rich text blocks.
    pub fn find_objects(&self, searched: &[StoredObject]) -> Result<Vec<(StoredObject, ObjectRef)>> {
        self.find_objects_with(searched, is_reference_block)
    }

    /// Matches for `searched` found in blocks satisfying `is_reference`.
    pub fn find_objects_with(
        &self,
        searched: &[StoredObject],
        is_reference: impl Fn(&Block) -> bool,
    ) -> Result<Vec<(StoredObject, ObjectRef)>> {
        if self.collectors.is_empty() || searched.is_empty() {
            return Ok(Vec::new());
        }

        let paths_per_collector: Vec<(&StreamFieldCollector, Vec<Vec<Block>>)> = self
            .collectors
            .iter()
            .map(|c| (c, c.find_block_type(&is_reference)))
            .filter(|(_, paths)| !paths.is_empty())
            .collect();
        if paths_per_collector.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = self.pattern_for_objects(searched);
        let mut filters = Vec::new();
        for (collector, paths) in &paths_per_collector {
            let names: IndexSet<String> = paths
                .iter()
                .filter_map(|p| deepest_stored_name(p))
                .map(regex::escape)
                .collect();
            let value_filter = Filter::regex(collector.field(), pattern.as_str());
            filters.push(if names.is_empty() {
                value_filter
            } else {
                let names = names.into_iter().collect::<Vec<_>>().join("|");
                Filter::regex(collector.field(), format!(r#""({names})""#)).and(value_filter)
            });
        }

        let registry = self.store.registry();
        let searched_ids: HashSet<ObjectRef> = searched
            .iter()
            .map(|o| registry.identity(&o.object))
            .collect();

        let rows = self.store.filter(&self.model, &Filter::Or(filters))?;
        debug!(model = %self.model, candidates = rows.len(), "stream field prefilter");
        let mut found = Vec::new();
        for row in rows {
            for (collector, paths) in &paths_per_collector {
                let stored = row.get(collector.field()).cloned().unwrap_or(JsonValue::Null);
                let value = collector.block().to_python(&stored);
                for path in paths {
                    for object in collector.find_objects(self.features, &value, path) {
                        if searched_ids.contains(&registry.identity(&object)) {
                            found.push((row.clone(), object));
                        }
                    }
                }
            }
        }
        Ok(found)
    }
}
