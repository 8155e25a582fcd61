//! Rich text for Tessera.
//!
//! Stored rich text is plain HTML plus placeholder *entity* tags:
//! `<a linktype="page" id="4">` and `<embed embedtype="image" id="1"/>`. This
//! crate expands those into front-end HTML and scans them for references.
//!
//! # Key Types
//!
//! |---------------------|---------------------------------------------------|
//! | Type                | Purpose                                           |
//! |---------------------|---------------------------------------------------|
//! | [`Markup`]          | HTML that is already safe to emit                 |
//! | [`HtmlRewriter`]    | Selector-driven single-pass tag rewriter          |
//! | [`LinkHandler`]     | Expands one `linktype`                            |
//! | [`EmbedHandler`]    | Expands one `embedtype`                           |
//! | [`FeatureRegistry`] | Registered entity types + cached front-end rewriter |
//! | [`RichText`]        | A stored rich text value                          |
//! |---------------------|---------------------------------------------------|

pub mod entity;
pub mod handlers;
pub mod html;
pub mod rewriter;
pub mod tags;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use entity::{
    EmbedHandler, EntityError, EntityHandler, FeatureRegistry, LinkHandler, features,
};
pub use handlers::{
    DocumentLinkHandler, ImageEmbedHandler, MediaEmbedHandler, PageLinkHandler,
    register_core_features,
};
pub use html::{Markup, escape, unescape};
pub use rewriter::{
    AttributeRewriter, Attributes, ElementRewriter, HtmlRewriter, RewriteAction, Rewritten,
};
pub use tags::{extract_attrs, find_a_tags, find_embed_tags, find_objects_in_rich_text};

/// Expand stored rich text using the process-wide feature registry.
pub fn expand_db_html(html: &str) -> Markup {
    features().expand_db_html(html)
}

/// A rich text value: the stored source, rendered on demand.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RichText {
    source: String,
}

impl RichText {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// The stored form, entity tags intact.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Front-end HTML, wrapped in the rich text container.
    pub fn render_with(&self, features: &FeatureRegistry) -> Markup {
        Markup::safe(format!(
            "<div class=\"rich-text\">{}</div>",
            features.expand_db_html(&self.source)
        ))
    }

    pub fn render(&self) -> Markup {
        self.render_with(features())
    }
}

impl fmt::Debug for RichText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RichText({:?})", self.source)
    }
}

impl From<&str> for RichText {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RichText {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rich_text_render_wraps() {
        let registry = FeatureRegistry::new();
        let rt = RichText::new("<p><b>hi</b></p>");
        assert_eq!(
            rt.render_with(&registry).as_str(),
            "<div class=\"rich-text\"><p><strong>hi</strong></p></div>"
        );
    }

    #[test]
    fn test_rich_text_truthiness_and_serde() {
        assert!(RichText::default().is_empty());
        let rt = RichText::from("<p>x</p>");
        assert!(!rt.is_empty());
        assert_eq!(serde_json::to_value(&rt).unwrap(), serde_json::json!("<p>x</p>"));
    }
}
