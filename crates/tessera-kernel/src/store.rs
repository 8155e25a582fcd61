//! The persistence boundary.
//!
//! [`ContentStore`] is what the reference collector needs from storage:
//! pattern-filtered queries, point lookups, reverse foreign-key lookups and
//! cascade collection. Objects are stored as JSON field maps keyed by their
//! concrete model and primary key.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tessera_types::{ModelLabel, ObjectRef, ObjectSummary, OnDelete, Pk};
use tracing::debug;

use crate::config::DbVendor;
use crate::error::Result;
use crate::models::{FieldDef, ModelRegistry};

/// One stored row.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredObject {
    /// Reference using the concrete model.
    pub object: ObjectRef,
    pub data: JsonMap<String, JsonValue>,
}

impl StoredObject {
    pub fn new(object: ObjectRef, data: JsonMap<String, JsonValue>) -> Self {
        Self { object, data }
    }

    pub fn model(&self) -> &ModelLabel {
        &self.object.model
    }

    pub fn pk(&self) -> &Pk {
        &self.object.pk
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.data.get(field)
    }

    /// A field as text. JSON strings are returned unquoted; other values in
    /// their JSON form; missing and null fields as `None`.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.data.get(field)? {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Display title: the model's title field, else `"<verbose name> object (<pk>)"`.
    pub fn title(&self, registry: &ModelRegistry) -> String {
        let model = registry.get(self.model());
        if let Some(title) = model
            .and_then(|m| m.title_field.as_deref())
            .and_then(|f| self.text(f))
        {
            return title;
        }
        let name = model
            .map(|m| m.verbose_name.clone())
            .unwrap_or_else(|| self.model().model_name().to_string());
        format!("{name} object ({})", self.pk())
    }

    pub fn summary(&self, registry: &ModelRegistry) -> ObjectSummary {
        let url = registry
            .lineage(self.model())
            .iter()
            .filter_map(|m| registry.get(m)?.url_pattern.as_deref())
            .next()
            .map(|pattern| pattern.replace("{pk}", &self.pk().to_string()));
        ObjectSummary {
            object: self.object.clone(),
            title: self.title(registry),
            url,
        }
    }
}

/// Row filter.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// The field's text matches `pattern`. Missing fields never match.
    Regex { field: String, pattern: String },
    /// All must match; empty matches everything.
    And(Vec<Filter>),
    /// Any must match; empty matches nothing.
    Or(Vec<Filter>),
    /// Every row.
    Any,
}

impl Filter {
    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Regex {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::Any => other,
            Filter::And(mut all) => {
                all.push(other);
                Filter::And(all)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut any) => {
                any.push(other);
                Filter::Or(any)
            }
            first => Filter::Or(vec![first, other]),
        }
    }
}

/// A node of the cascade tree: an object and the objects deleted with it.
#[derive(Clone, Debug, PartialEq)]
pub struct CascadeNode {
    pub object: StoredObject,
    pub children: Vec<CascadeNode>,
}

/// Objects whose field would be changed rather than deleted.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldUpdate {
    pub model: ModelLabel,
    pub field: FieldDef,
    pub on_delete: OnDelete,
    pub objects: Vec<StoredObject>,
}

/// What deleting a set of objects would touch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Collected {
    /// Objects that block the deletion.
    pub protected: Vec<StoredObject>,
    /// One tree per root, in root order.
    pub cascade: Vec<CascadeNode>,
    /// Field-level actions, in discovery order.
    pub field_updates: Vec<FieldUpdate>,
}

pub trait ContentStore {
    fn registry(&self) -> &ModelRegistry;

    fn vendor(&self) -> DbVendor;

    /// Rows of `model` (and of models inheriting from it) matching `filter`,
    /// in insertion order.
    fn filter(&self, model: &ModelLabel, filter: &Filter) -> Result<Vec<StoredObject>>;

    /// The row `object` refers to, through any model in its chain.
    fn get(&self, object: &ObjectRef) -> Result<Option<StoredObject>>;

    /// Rows of `model` whose `field` holds any of `pks`.
    fn related(&self, model: &ModelLabel, field: &str, pks: &[Pk]) -> Result<Vec<StoredObject>>;

    /// Work out what deleting `roots` would do: cascade deletions as a tree,
    /// protecting objects, and field updates. Each object appears at most
    /// once in the cascade trees.
    fn collect(&self, roots: &[StoredObject]) -> Result<Collected> {
        let registry = self.registry();
        let mut seen: HashSet<ObjectRef> = roots
            .iter()
            .map(|r| registry.identity(&r.object))
            .collect();
        let mut collected = Collected::default();
        let mut protected_seen = HashSet::new();
        let mut updates: IndexMap<(ModelLabel, String), FieldUpdate> = IndexMap::new();

        for root in roots {
            let node = collect_node(
                self,
                root.clone(),
                &mut seen,
                &mut collected.protected,
                &mut protected_seen,
                &mut updates,
            )?;
            collected.cascade.push(node);
        }
        collected.field_updates = updates.into_values().collect();
        Ok(collected)
    }
}

fn collect_node<S: ContentStore + ?Sized>(
    store: &S,
    object: StoredObject,
    seen: &mut HashSet<ObjectRef>,
    protected: &mut Vec<StoredObject>,
    protected_seen: &mut HashSet<ObjectRef>,
    updates: &mut IndexMap<(ModelLabel, String), FieldUpdate>,
) -> Result<CascadeNode> {
    let registry = store.registry();
    let mut children = Vec::new();

    for relation in registry.relations_to(object.model()) {
        let related = store.related(
            &relation.model,
            &relation.field.name,
            std::slice::from_ref(object.pk()),
        )?;
        for row in related {
            let key = registry.identity(&row.object);
            match relation.on_delete {
                OnDelete::Cascade => {
                    if seen.insert(key) {
                        children.push(collect_node(
                            store,
                            row,
                            seen,
                            protected,
                            protected_seen,
                            updates,
                        )?);
                    }
                }
                OnDelete::Protect => {
                    if protected_seen.insert(key) {
                        debug!(object = %row.object, "deletion protected");
                        protected.push(row);
                    }
                }
                OnDelete::SetNull | OnDelete::SetDefault | OnDelete::DoNothing | OnDelete::Set => {
                    let update = updates
                        .entry((relation.model.clone(), relation.field.name.clone()))
                        .or_insert_with(|| FieldUpdate {
                            model: relation.model.clone(),
                            field: relation.field.clone(),
                            on_delete: relation.on_delete,
                            objects: Vec::new(),
                        });
                    if !update.objects.iter().any(|o| o.object == row.object) {
                        update.objects.push(row);
                    }
                }
            }
        }
    }

    Ok(CascadeNode { object, children })
}
