//! Rendering context and templates.
//!
//! A template is a plain function from `(block, value, context)` to markup,
//! registered under a name. Blocks name their template in
//! [`MetaOptions::template`](crate::meta::MetaOptions::template); rendering
//! looks the name up in the context's registry first and then in the
//! process-wide one.

use std::fmt;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tessera_richtext::{FeatureRegistry, Markup, features};
use tessera_types::ObjectLookup;

use crate::block::Block;
use crate::value::Value;

/// Everything a template can see.
pub struct TemplateArgs<'a> {
    pub block: &'a Block,
    pub value: &'a Value,
    pub context: &'a Context,
}

pub type TemplateFn = Arc<dyn Fn(&TemplateArgs<'_>) -> Markup + Send + Sync>;

/// Named templates.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: RwLock<IndexMap<String, TemplateFn>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, template: F)
    where
        F: Fn(&TemplateArgs<'_>) -> Markup + Send + Sync + 'static,
    {
        self.templates.write().insert(name.into(), Arc::new(template));
    }

    pub fn get(&self, name: &str) -> Option<TemplateFn> {
        self.templates.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }

    pub fn reset(&self) {
        self.templates.write().clear();
    }
}

static TEMPLATES: LazyLock<TemplateRegistry> = LazyLock::new(TemplateRegistry::new);

/// The process-wide template registry.
pub fn templates() -> &'static TemplateRegistry {
    &TEMPLATES
}

/// Variables and collaborators available while rendering.
///
/// Passed unchanged from a container block to its children.
#[derive(Clone, Default)]
pub struct Context {
    vars: JsonMap<String, JsonValue>,
    templates: Option<Arc<TemplateRegistry>>,
    lookup: Option<Arc<dyn ObjectLookup>>,
    features: Option<Arc<FeatureRegistry>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object. Non-object values give an empty context.
    pub fn from_json(vars: JsonValue) -> Self {
        match vars {
            JsonValue::Object(vars) => Self {
                vars,
                ..Default::default()
            },
            _ => Self::default(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_templates(mut self, templates: Arc<TemplateRegistry>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn ObjectLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_features(mut self, features: Arc<FeatureRegistry>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.vars.get(key)
    }

    /// String variable, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.vars.get(key).and_then(JsonValue::as_str)
    }

    pub fn vars(&self) -> &JsonMap<String, JsonValue> {
        &self.vars
    }

    pub fn lookup(&self) -> Option<&dyn ObjectLookup> {
        self.lookup.as_deref()
    }

    /// Feature registry for rich text expansion.
    pub fn features(&self) -> &FeatureRegistry {
        match &self.features {
            Some(f) => f.as_ref(),
            None => features(),
        }
    }

    /// Resolve a template name, context registry first.
    pub fn find_template(&self, name: &str) -> Option<TemplateFn> {
        self.templates
            .as_ref()
            .and_then(|t| t.get(name))
            .or_else(|| templates().get(name))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("vars", &self.vars)
            .field("templates", &self.templates.is_some())
            .field("lookup", &self.lookup.is_some())
            .field("features", &self.features.is_some())
            .finish()
    }
}
