//! Model registry.
//!
//! Describes the stored model types: their inheritance chain, their fields and
//! the few capabilities the reference collector asks about. Multi-table
//! inheritance is modelled the usual way: a child model shares its parent's
//! primary key, so every object has one identity, `(base model, pk)`, where the
//! base model is the topmost non-abstract ancestor.

use indexmap::IndexMap;
use tessera_blocks::Block;
use tessera_types::{ModelLabel, ObjectRef, OnDelete};

use crate::error::{KernelError, Result};

/// The kind of a model field, as far as reference tracking cares.
#[derive(Clone, Debug)]
pub enum FieldKind {
    /// Plain text or any other scalar.
    Text,
    /// Stored rich text containing entity tags.
    RichText,
    /// JSON stream content described by a stream block.
    Stream(Block),
    /// Reference to one object of `to`.
    ForeignKey { to: ModelLabel, on_delete: OnDelete },
    /// Ownership by a parent object; deleting the parent deletes this row.
    ParentalKey { to: ModelLabel },
    /// Set of references owned by this row.
    ParentalManyToMany { to: ModelLabel },
}

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    pub verbose_name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            verbose_name: name.replace('_', " "),
            name,
            kind,
        }
    }

    pub fn verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
        self.verbose_name = verbose_name.into();
        self
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn rich_text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::RichText)
    }

    pub fn stream(name: impl Into<String>, block: Block) -> Self {
        Self::new(name, FieldKind::Stream(block))
    }

    pub fn foreign_key(name: impl Into<String>, to: ModelLabel, on_delete: OnDelete) -> Self {
        Self::new(name, FieldKind::ForeignKey { to, on_delete })
    }

    pub fn parental_key(name: impl Into<String>, to: ModelLabel) -> Self {
        Self::new(name, FieldKind::ParentalKey { to })
    }

    /// Target model and deletion behaviour, for fields that point at a single
    /// object.
    pub fn relation(&self) -> Option<(&ModelLabel, OnDelete)> {
        match &self.kind {
            FieldKind::ForeignKey { to, on_delete } => Some((to, *on_delete)),
            FieldKind::ParentalKey { to } => Some((to, OnDelete::Cascade)),
            _ => None,
        }
    }

    pub fn is_parental(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::ParentalKey { .. } | FieldKind::ParentalManyToMany { .. }
        )
    }
}

/// Fields compare by name; the kind is not comparable.
impl PartialEq for FieldDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.verbose_name == other.verbose_name
    }
}

#[derive(Clone, Debug)]
pub struct ModelDef {
    pub label: ModelLabel,
    pub parent: Option<ModelLabel>,
    pub is_abstract: bool,
    pub verbose_name: String,
    /// False when the model's objects never appear in usage listings.
    pub shown_in_uses: bool,
    /// Tag-through rows are hidden from usage listings.
    pub tag_item: bool,
    /// Field holding the object's display title.
    pub title_field: Option<String>,
    /// Public URL, with `{pk}` substituted.
    pub url_pattern: Option<String>,
    /// Fields declared on this model, not inherited ones.
    pub fields: Vec<FieldDef>,
}

impl ModelDef {
    pub fn new(label: ModelLabel) -> Self {
        Self {
            verbose_name: label.model_name().to_string(),
            label,
            parent: None,
            is_abstract: false,
            shown_in_uses: true,
            tag_item: false,
            title_field: None,
            url_pattern: None,
            fields: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: ModelLabel) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn abstract_model(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
        self.verbose_name = verbose_name.into();
        self
    }

    pub fn hidden_from_uses(mut self) -> Self {
        self.shown_in_uses = false;
        self
    }

    pub fn tag_item(mut self) -> Self {
        self.tag_item = true;
        self
    }

    pub fn title_field(mut self, field: impl Into<String>) -> Self {
        self.title_field = Some(field.into());
        self
    }

    pub fn url_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.url_pattern = Some(pattern.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}

/// One field that can point at objects of some model.
#[derive(Clone, Debug)]
pub struct Relation {
    /// Model declaring the field.
    pub model: ModelLabel,
    pub field: FieldDef,
    pub on_delete: OnDelete,
}

/// Registered models, in registration order.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    models: IndexMap<ModelLabel, ModelDef>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model. Its parent, if any, must already be registered.
    pub fn register(&mut self, model: ModelDef) -> Result<()> {
        if self.models.contains_key(&model.label) {
            return Err(KernelError::InvalidModel {
                model: model.label,
                reason: "already registered".into(),
            });
        }
        if let Some(parent) = &model.parent {
            if !self.models.contains_key(parent) {
                return Err(KernelError::InvalidModel {
                    reason: format!("parent {parent} is not registered"),
                    model: model.label,
                });
            }
        }
        self.models.insert(model.label.clone(), model);
        Ok(())
    }

    pub fn get(&self, label: &ModelLabel) -> Option<&ModelDef> {
        self.models.get(label)
    }

    pub fn require(&self, label: &ModelLabel) -> Result<&ModelDef> {
        self.get(label)
            .ok_or_else(|| KernelError::UnknownModel(label.clone()))
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.values()
    }

    /// Concrete models, in registration order.
    pub fn concrete_models(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.values().filter(|m| !m.is_abstract)
    }

    /// Ancestors of `label`, nearest first.
    pub fn parent_list(&self, label: &ModelLabel) -> Vec<ModelLabel> {
        let mut parents = Vec::new();
        let mut current = self.get(label).and_then(|m| m.parent.clone());
        while let Some(parent) = current {
            // registration order makes cycles impossible, but stay bounded
            if parents.contains(&parent) {
                break;
            }
            current = self.get(&parent).and_then(|m| m.parent.clone());
            parents.push(parent);
        }
        parents
    }

    /// `label` followed by its ancestors.
    pub fn lineage(&self, label: &ModelLabel) -> Vec<ModelLabel> {
        let mut lineage = vec![label.clone()];
        lineage.extend(self.parent_list(label));
        lineage
    }

    /// True if `label` is `ancestor` or inherits from it.
    pub fn is_subclass(&self, label: &ModelLabel, ancestor: &ModelLabel) -> bool {
        label == ancestor || self.parent_list(label).contains(ancestor)
    }

    /// `label` and every model inheriting from it.
    pub fn descendants(&self, label: &ModelLabel) -> Vec<ModelLabel> {
        self.models
            .keys()
            .filter(|m| self.is_subclass(m, label))
            .cloned()
            .collect()
    }

    /// Topmost non-abstract model in the inheritance chain.
    pub fn base_model(&self, label: &ModelLabel) -> ModelLabel {
        self.lineage(label)
            .into_iter()
            .rev()
            .find(|m| self.get(m).is_some_and(|def| !def.is_abstract))
            .unwrap_or_else(|| label.clone())
    }

    /// The identity used to compare objects: base model and primary key.
    /// References to unregistered models are returned unchanged.
    pub fn identity(&self, object: &ObjectRef) -> ObjectRef {
        ObjectRef::new(self.base_model(&object.model), object.pk.clone())
    }

    /// Own and inherited fields, ancestors' first.
    pub fn fields(&self, label: &ModelLabel) -> Vec<&FieldDef> {
        self.lineage(label)
            .iter()
            .rev()
            .filter_map(|m| self.get(m))
            .flat_map(|m| m.fields.iter())
            .collect()
    }

    pub fn field(&self, label: &ModelLabel, name: &str) -> Option<&FieldDef> {
        self.fields(label).into_iter().find(|f| f.name == name)
    }

    pub fn rich_text_fields(&self, label: &ModelLabel) -> Vec<&FieldDef> {
        self.fields(label)
            .into_iter()
            .filter(|f| matches!(f.kind, FieldKind::RichText))
            .collect()
    }

    pub fn stream_fields(&self, label: &ModelLabel) -> Vec<&FieldDef> {
        self.fields(label)
            .into_iter()
            .filter(|f| matches!(f.kind, FieldKind::Stream(_)))
            .collect()
    }

    /// True if any field of `label`, inherited or own, is parental.
    pub fn has_parental_field(&self, label: &ModelLabel) -> bool {
        self.fields(label).iter().any(|f| f.is_parental())
    }

    /// Fields, declared anywhere, that can point at an object of `label`.
    pub fn relations_to(&self, label: &ModelLabel) -> Vec<Relation> {
        let lineage = self.lineage(label);
        self.models
            .values()
            .flat_map(|model| {
                model.fields.iter().filter_map(|field| {
                    let (to, on_delete) = field.relation()?;
                    lineage.contains(to).then(|| Relation {
                        model: model.label.clone(),
                        field: field.clone(),
                        on_delete,
                    })
                })
            })
            .collect()
    }
}
