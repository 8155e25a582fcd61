//! Built-in link and embed types.

use std::sync::Arc;

use tessera_types::{ModelLabel, ObjectLookup, ObjectSummary};

use crate::entity::{
    EmbedHandler, EntityError, EntityHandler, FeatureRegistry, LinkHandler, instance_by_id,
};
use crate::html::{Markup, escape};
use crate::rewriter::Attributes;

pub fn page_model() -> ModelLabel {
    ModelLabel::new("core", "page")
}

pub fn document_model() -> ModelLabel {
    ModelLabel::new("documents", "document")
}

pub fn image_model() -> ModelLabel {
    ModelLabel::new("images", "image")
}

fn href_for(instance: &ObjectSummary) -> Attributes {
    let mut out = Attributes::new();
    out.insert("href".to_string(), instance.url.clone().unwrap_or_default());
    out
}

/// `<a linktype="page" id="N">`, resolved to the page's URL.
pub struct PageLinkHandler {
    model: ModelLabel,
    lookup: Arc<dyn ObjectLookup>,
}

impl PageLinkHandler {
    pub fn new(lookup: Arc<dyn ObjectLookup>) -> Self {
        Self {
            model: page_model(),
            lookup,
        }
    }
}

impl EntityHandler for PageLinkHandler {
    fn identifier(&self) -> &str {
        "page"
    }

    fn model(&self) -> Option<&ModelLabel> {
        Some(&self.model)
    }

    /// Resolves to the most specific page type.
    fn get_instance(&self, attrs: &Attributes) -> Result<ObjectSummary, EntityError> {
        instance_by_id(self.lookup.as_ref(), &self.model, attrs)
    }
}

impl LinkHandler for PageLinkHandler {
    fn rewrite_attributes(&self, attrs: &Attributes) -> Attributes {
        match self.get_instance(attrs) {
            Ok(page) => href_for(&page),
            Err(_) => Attributes::new(),
        }
    }
}

/// `<a linktype="document" id="N">`, resolved to the document's serve URL.
pub struct DocumentLinkHandler {
    model: ModelLabel,
    lookup: Arc<dyn ObjectLookup>,
}

impl DocumentLinkHandler {
    pub fn new(lookup: Arc<dyn ObjectLookup>) -> Self {
        Self {
            model: document_model(),
            lookup,
        }
    }
}

impl EntityHandler for DocumentLinkHandler {
    fn identifier(&self) -> &str {
        "document"
    }

    fn model(&self) -> Option<&ModelLabel> {
        Some(&self.model)
    }

    fn get_instance(&self, attrs: &Attributes) -> Result<ObjectSummary, EntityError> {
        instance_by_id(self.lookup.as_ref(), &self.model, attrs)
    }
}

impl LinkHandler for DocumentLinkHandler {
    fn rewrite_attributes(&self, attrs: &Attributes) -> Attributes {
        match self.get_instance(attrs) {
            Ok(doc) => href_for(&doc),
            Err(_) => Attributes::new(),
        }
    }
}

/// `<embed embedtype="image" id="N" format="left" alt="..."/>`.
pub struct ImageEmbedHandler {
    model: ModelLabel,
    lookup: Arc<dyn ObjectLookup>,
}

impl ImageEmbedHandler {
    pub fn new(lookup: Arc<dyn ObjectLookup>) -> Self {
        Self {
            model: image_model(),
            lookup,
        }
    }
}

impl EntityHandler for ImageEmbedHandler {
    fn identifier(&self) -> &str {
        "image"
    }

    fn model(&self) -> Option<&ModelLabel> {
        Some(&self.model)
    }

    fn get_instance(&self, attrs: &Attributes) -> Result<ObjectSummary, EntityError> {
        instance_by_id(self.lookup.as_ref(), &self.model, attrs)
    }
}

impl EmbedHandler for ImageEmbedHandler {
    fn expand_db_attributes(&self, attrs: &Attributes) -> Markup {
        let Ok(image) = self.get_instance(attrs) else {
            return Markup::safe("<img alt=\"\">");
        };
        let alt = attrs.get("alt").map(String::as_str).unwrap_or(&image.title);
        let class = match attrs.get("format") {
            Some(format) if !format.is_empty() => format!("richtext-image {format}"),
            _ => "richtext-image".to_string(),
        };
        Markup::safe(format!(
            "<img alt=\"{}\" class=\"{}\" src=\"{}\">",
            escape(alt),
            escape(&class),
            escape(image.url.as_deref().unwrap_or_default()),
        ))
    }
}

/// `<embed embedtype="media" url="..."/>`. Not backed by a model, so never
/// shows up in reference scans.
#[derive(Default)]
pub struct MediaEmbedHandler;

impl EntityHandler for MediaEmbedHandler {
    fn identifier(&self) -> &str {
        "media"
    }

    fn get_instance(&self, _attrs: &Attributes) -> Result<ObjectSummary, EntityError> {
        Err(EntityError::NotAModel(self.identifier().to_string()))
    }

    fn id_pair_from_instance(&self, instance: &ObjectSummary) -> (String, String) {
        ("url".to_string(), instance.url.clone().unwrap_or_default())
    }
}

impl EmbedHandler for MediaEmbedHandler {
    fn expand_db_attributes(&self, attrs: &Attributes) -> Markup {
        let url = attrs.get("url").map(String::as_str).unwrap_or_default();
        if url.is_empty() {
            return Markup::new();
        }
        let url = escape(url);
        Markup::safe(format!(
            "<div class=\"media-embed\"><a href=\"{url}\">{url}</a></div>"
        ))
    }
}

/// Register page and document links plus image and media embeds.
pub fn register_core_features(registry: &FeatureRegistry, lookup: Arc<dyn ObjectLookup>) {
    registry.register_link_type(Arc::new(PageLinkHandler::new(Arc::clone(&lookup))));
    registry.register_link_type(Arc::new(DocumentLinkHandler::new(Arc::clone(&lookup))));
    registry.register_embed_type(Arc::new(ImageEmbedHandler::new(lookup)));
    registry.register_embed_type(Arc::new(MediaEmbedHandler));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{ObjectRef, Pk};

    struct Site;

    impl ObjectLookup for Site {
        fn lookup(&self, model: &ModelLabel, pk: &Pk) -> Option<ObjectSummary> {
            match (model.as_str(), pk) {
                ("core.page", Pk::Int(4)) => Some(ObjectSummary {
                    object: ObjectRef::new(ModelLabel::new("tests", "eventpage"), 4),
                    title: "Christmas".into(),
                    url: Some("/events/christmas/".into()),
                }),
                ("documents.document", Pk::Int(1)) => Some(ObjectSummary {
                    object: ObjectRef::new(model.clone(), 1),
                    title: "Report".into(),
                    url: Some("/documents/1/report.pdf".into()),
                }),
                ("images.image", Pk::Int(2)) => Some(ObjectSummary {
                    object: ObjectRef::new(model.clone(), 2),
                    title: "A \"tree\"".into(),
                    url: Some("/media/tree.jpg".into()),
                }),
                _ => None,
            }
        }
    }

    fn registry() -> FeatureRegistry {
        let registry = FeatureRegistry::new();
        register_core_features(&registry, Arc::new(Site));
        registry
    }

    #[test]
    fn test_page_link_expands_to_url() {
        let out = registry().expand_db_html("<a linktype=\"page\" id=\"4\">Christmas</a>");
        assert_eq!(out.as_str(), "<a href=\"/events/christmas/\">Christmas</a>");
    }

    #[test]
    fn test_missing_page_degrades_to_bare_anchor() {
        let out = registry().expand_db_html("<a linktype=\"page\" id=\"999\">Gone</a>");
        assert_eq!(out.as_str(), "<a>Gone</a>");
    }

    #[test]
    fn test_page_instance_is_specific() {
        let handler = PageLinkHandler::new(Arc::new(Site));
        let mut attrs = Attributes::new();
        attrs.insert("id".into(), "4".into());
        let page = handler.get_instance(&attrs).unwrap();
        assert_eq!(page.object.model.as_str(), "tests.eventpage");
        assert_eq!(handler.expand_db_attributes(&attrs).as_str(), "<a href=\"/events/christmas/\">");
    }

    #[test]
    fn test_document_link() {
        let out = registry().expand_db_html("<p><a id=\"1\" linktype=\"document\">report</a></p>");
        assert_eq!(out.as_str(), "<p><a href=\"/documents/1/report.pdf\">report</a></p>");
    }

    #[test]
    fn test_image_embed() {
        let out = registry().expand_db_html("<embed embedtype=\"image\" id=\"2\" format=\"left\"/>");
        assert_eq!(
            out.as_str(),
            "<img alt=\"A &quot;tree&quot;\" class=\"richtext-image left\" src=\"/media/tree.jpg\">"
        );
        let missing = registry().expand_db_html("<embed embedtype=\"image\" id=\"3\"/>");
        assert_eq!(missing.as_str(), "<img alt=\"\">");
    }

    #[test]
    fn test_media_embed_is_not_a_model() {
        let handler = MediaEmbedHandler;
        assert!(handler.model().is_none());
        let mut attrs = Attributes::new();
        attrs.insert("url".into(), "https://example.com/v".into());
        assert!(handler.get_instance(&attrs).is_err());
        assert_eq!(
            handler.expand_db_attributes(&attrs).as_str(),
            "<div class=\"media-embed\"><a href=\"https://example.com/v\">https://example.com/v</a></div>"
        );
    }
}
