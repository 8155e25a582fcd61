//! Admin edit URLs.
//!
//! Finders are registered per model and looked up along the model's
//! inheritance chain, nearest first.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tessera_types::{ModelLabel, ObjectSummary};

use crate::models::ModelRegistry;

/// Produces the admin edit URL for objects of one model.
pub trait AdminUrlFinder: Send + Sync {
    fn get_edit_url(&self, object: &ObjectSummary) -> Option<String>;
}

/// URL template with a `{pk}` placeholder, e.g. `/admin/pages/{pk}/edit/`.
#[derive(Clone, Debug)]
pub struct PatternUrlFinder {
    pattern: String,
}

impl PatternUrlFinder {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl AdminUrlFinder for PatternUrlFinder {
    fn get_edit_url(&self, object: &ObjectSummary) -> Option<String> {
        Some(self.pattern.replace("{pk}", &object.object.pk.to_string()))
    }
}

#[derive(Default)]
pub struct AdminUrlFinders {
    finders: RwLock<IndexMap<ModelLabel, Arc<dyn AdminUrlFinder>>>,
}

impl AdminUrlFinders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `finder` for `model` and its subclasses. Replaces any
    /// finder registered for exactly `model`.
    pub fn register(&self, model: ModelLabel, finder: Arc<dyn AdminUrlFinder>) {
        self.finders.write().insert(model, finder);
    }

    pub fn finder_for(&self, models: &ModelRegistry, model: &ModelLabel) -> Option<Arc<dyn AdminUrlFinder>> {
        let finders = self.finders.read();
        models
            .lineage(model)
            .iter()
            .find_map(|m| finders.get(m).cloned())
    }

    /// Edit URL for `object`, from the nearest finder in its model's lineage.
    pub fn get_edit_url(&self, models: &ModelRegistry, object: &ObjectSummary) -> Option<String> {
        self.finder_for(models, &object.object.model)?
            .get_edit_url(object)
    }

    pub fn reset(&self) {
        self.finders.write().clear();
    }
}
