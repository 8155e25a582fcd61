//! Entity handlers and the feature registry.
//!
//! An *entity* is a placeholder tag in stored rich text that is expanded into
//! real HTML at render time: links (`<a linktype="page" id="4">`) and embeds
//! (`<embed embedtype="image" id="1"/>`). Each type registers a handler here.

use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tessera_types::{ModelLabel, ObjectLookup, ObjectSummary, Pk};
use thiserror::Error;
use tracing::debug;

use crate::html::Markup;
use crate::rewriter::{
    AttributeRewriter, Attributes, ElementRewriter, HtmlRewriter, RewriteAction, Rewritten,
};

/// Failure to resolve an entity tag to a live object.
///
/// Always recoverable: rendering degrades to a bare tag and reference
/// scanning skips the entity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    #[error("{model} matching query does not exist (pk={pk})")]
    DoesNotExist { model: ModelLabel, pk: Pk },

    #[error("entity tag is missing the {0:?} attribute")]
    MissingAttribute(&'static str),

    #[error("{0:?} entities do not correspond to a model")]
    NotAModel(String),
}

/// Behaviour shared by link and embed handlers.
pub trait EntityHandler: Send + Sync {
    /// Value of the `linktype` / `embedtype` attribute this handler owns.
    fn identifier(&self) -> &str;

    /// Model this handler's entities refer to, if any.
    fn model(&self) -> Option<&ModelLabel> {
        None
    }

    /// Resolve the tag's attributes to a live object.
    fn get_instance(&self, attrs: &Attributes) -> Result<ObjectSummary, EntityError>;

    /// Attribute name and value that identify `instance` in a stored tag.
    fn id_pair_from_instance(&self, instance: &ObjectSummary) -> (String, String) {
        ("id".to_string(), instance.object.pk.to_string())
    }
}

/// Handler for `<a linktype="...">` tags.
pub trait LinkHandler: EntityHandler {
    /// Attributes for the front-end `<a>` tag. Empty when unresolvable.
    fn rewrite_attributes(&self, attrs: &Attributes) -> Attributes;

    /// The front-end opening tag, e.g. `<a href="/xmas/">`.
    fn expand_db_attributes(&self, attrs: &Attributes) -> Markup {
        let rewritten = self.rewrite_attributes(attrs);
        if rewritten.is_empty() {
            Markup::safe("<a>")
        } else {
            Markup::safe(format!("<a {}>", crate::html::format_attrs(&rewritten)))
        }
    }
}

/// Handler for `<embed embedtype="..."/>` tags.
pub trait EmbedHandler: EntityHandler {
    /// Full front-end HTML replacing the embed tag.
    fn expand_db_attributes(&self, attrs: &Attributes) -> Markup;
}

/// Resolve `attrs["id"]` against `model` through `lookup`.
pub fn instance_by_id(
    lookup: &dyn ObjectLookup,
    model: &ModelLabel,
    attrs: &Attributes,
) -> Result<ObjectSummary, EntityError> {
    let id = attrs.get("id").ok_or(EntityError::MissingAttribute("id"))?;
    let pk = Pk::from_attr(id);
    lookup
        .lookup(model, &pk)
        .ok_or_else(|| EntityError::DoesNotExist {
            model: model.clone(),
            pk,
        })
}

// ============================================================================
// Rewriter adapters
// ============================================================================

struct LinkRule(Arc<dyn LinkHandler>);

impl AttributeRewriter for LinkRule {
    fn rewrite_attributes(&self, _name: &str, attrs: &Attributes) -> Attributes {
        self.0.rewrite_attributes(attrs)
    }
}

struct EmbedRule(Arc<dyn EmbedHandler>);

impl ElementRewriter for EmbedRule {
    fn rewrite_element(&self, _name: &str, attrs: &Attributes, _content: Markup) -> Rewritten {
        Rewritten::Safe(self.0.expand_db_attributes(attrs))
    }
}

/// Wraps content in a fixed tag, dropping attributes.
struct Retag(&'static str);

impl ElementRewriter for Retag {
    fn rewrite_element(&self, _name: &str, _attrs: &Attributes, content: Markup) -> Rewritten {
        Rewritten::Safe(Markup::safe(format!("<{0}>{1}</{0}>", self.0, content)))
    }
}

// ============================================================================
// FeatureRegistry
// ============================================================================

#[derive(Default)]
struct Features {
    link_types: IndexMap<String, Arc<dyn LinkHandler>>,
    embed_types: IndexMap<String, Arc<dyn EmbedHandler>>,
    frontend: Option<Arc<HtmlRewriter>>,
}

/// Registered link and embed types, plus the front-end rewriter built from
/// them.
///
/// The rewriter is compiled on first use and discarded whenever a type is
/// registered or the registry is reset.
#[derive(Default)]
pub struct FeatureRegistry {
    inner: RwLock<Features>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_link_type(&self, handler: Arc<dyn LinkHandler>) {
        let mut inner = self.inner.write();
        debug!(linktype = handler.identifier(), "registering link type");
        inner.link_types.insert(handler.identifier().to_string(), handler);
        inner.frontend = None;
    }

    pub fn register_embed_type(&self, handler: Arc<dyn EmbedHandler>) {
        let mut inner = self.inner.write();
        debug!(embedtype = handler.identifier(), "registering embed type");
        inner.embed_types.insert(handler.identifier().to_string(), handler);
        inner.frontend = None;
    }

    pub fn get_link_types(&self) -> IndexMap<String, Arc<dyn LinkHandler>> {
        self.inner.read().link_types.clone()
    }

    pub fn get_embed_types(&self) -> IndexMap<String, Arc<dyn EmbedHandler>> {
        self.inner.read().embed_types.clone()
    }

    pub fn get_link_type(&self, identifier: &str) -> Option<Arc<dyn LinkHandler>> {
        self.inner.read().link_types.get(identifier).cloned()
    }

    pub fn get_embed_type(&self, identifier: &str) -> Option<Arc<dyn EmbedHandler>> {
        self.inner.read().embed_types.get(identifier).cloned()
    }

    /// Drop every registration and the cached rewriter.
    pub fn reset(&self) {
        *self.inner.write() = Features::default();
    }

    /// Rewriter that turns stored rich text into front-end HTML.
    pub fn frontend_rewriter(&self) -> Arc<HtmlRewriter> {
        if let Some(rw) = self.inner.read().frontend.as_ref() {
            return Arc::clone(rw);
        }

        let mut inner = self.inner.write();
        if let Some(rw) = inner.frontend.as_ref() {
            return Arc::clone(rw);
        }

        let mut rewriter = HtmlRewriter::new();
        rewriter.add_rule("b", RewriteAction::Element(Arc::new(Retag("strong"))));
        rewriter.add_rule("i", RewriteAction::Element(Arc::new(Retag("em"))));
        for (embedtype, handler) in &inner.embed_types {
            rewriter.add_rule(
                &format!("embed[embedtype='{embedtype}']"),
                RewriteAction::Element(Arc::new(EmbedRule(Arc::clone(handler)))),
            );
        }
        for (linktype, handler) in &inner.link_types {
            rewriter.add_rule(
                &format!("a[linktype='{linktype}']"),
                RewriteAction::Attributes(Arc::new(LinkRule(Arc::clone(handler)))),
            );
        }

        let rewriter = Arc::new(rewriter);
        inner.frontend = Some(Arc::clone(&rewriter));
        rewriter
    }

    /// Expand stored rich text into HTML usable in front-end templates.
    pub fn expand_db_html(&self, html: &str) -> Markup {
        self.frontend_rewriter().rewrite(html)
    }
}

static FEATURES: LazyLock<FeatureRegistry> = LazyLock::new(FeatureRegistry::new);

/// The process-wide feature registry.
pub fn features() -> &'static FeatureRegistry {
    &FEATURES
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::ObjectRef;

    struct Fixed;

    impl EntityHandler for Fixed {
        fn identifier(&self) -> &str {
            "fixed"
        }

        fn get_instance(&self, _attrs: &Attributes) -> Result<ObjectSummary, EntityError> {
            Err(EntityError::NotAModel("fixed".into()))
        }
    }

    impl LinkHandler for Fixed {
        fn rewrite_attributes(&self, attrs: &Attributes) -> Attributes {
            let mut out = Attributes::new();
            if let Some(to) = attrs.get("to") {
                out.insert("href".into(), format!("/fixed/{to}/"));
            }
            out
        }
    }

    struct NoLookup;

    impl ObjectLookup for NoLookup {
        fn lookup(&self, _model: &ModelLabel, _pk: &Pk) -> Option<ObjectSummary> {
            None
        }
    }

    #[test]
    fn test_bold_italic_rewritten() {
        let registry = FeatureRegistry::new();
        let out = registry.expand_db_html("<b>bold</b> and <i>it</i>");
        assert_eq!(out.as_str(), "<strong>bold</strong> and <em>it</em>");
    }

    #[test]
    fn test_registering_invalidates_rewriter() {
        let registry = FeatureRegistry::new();
        let html = "<a linktype=\"fixed\" to=\"x\">go</a>";
        assert_eq!(registry.expand_db_html(html).as_str(), html);

        registry.register_link_type(Arc::new(Fixed));
        assert_eq!(registry.expand_db_html(html).as_str(), "<a href=\"/fixed/x/\">go</a>");

        registry.reset();
        assert!(registry.get_link_types().is_empty());
        assert_eq!(registry.expand_db_html(html).as_str(), html);
    }

    #[test]
    fn test_default_expand_db_attributes() {
        let mut attrs = Attributes::new();
        assert_eq!(Fixed.expand_db_attributes(&attrs).as_str(), "<a>");
        attrs.insert("to".into(), "y".into());
        assert_eq!(Fixed.expand_db_attributes(&attrs).as_str(), "<a href=\"/fixed/y/\">");
    }

    #[test]
    fn test_instance_by_id_errors() {
        let model = ModelLabel::new("core", "page");
        let attrs = Attributes::new();
        assert_eq!(
            instance_by_id(&NoLookup, &model, &attrs),
            Err(EntityError::MissingAttribute("id"))
        );

        let mut attrs = Attributes::new();
        attrs.insert("id".into(), "9".into());
        assert_eq!(
            instance_by_id(&NoLookup, &model, &attrs),
            Err(EntityError::DoesNotExist { model: model.clone(), pk: Pk::Int(9) })
        );
    }

    #[test]
    fn test_default_id_pair() {
        let summary = ObjectSummary {
            object: ObjectRef::new(ModelLabel::new("core", "page"), 3),
            title: "Three".into(),
            url: None,
        };
        assert_eq!(Fixed.id_pair_from_instance(&summary), ("id".to_string(), "3".to_string()));
    }
}
