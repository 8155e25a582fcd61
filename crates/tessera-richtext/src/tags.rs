//! Entity tag scanning for reference collection.
//!
//! Unlike the rewriter this does no nesting analysis: it just finds every
//! `<a ...>` opening tag and `<embed .../>` tag and reads its attributes.

use std::sync::LazyLock;

use regex::Regex;
use tessera_types::ObjectSummary;
use tracing::debug;

use crate::entity::{EntityError, EntityHandler, FeatureRegistry};
use crate::html::unescape;
use crate::rewriter::Attributes;

pub static FIND_A_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a(\b[^>]*)>").expect("static pattern"));
pub static FIND_EMBED_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<embed(\b[^>]*)/>").expect("static pattern"));
static FIND_ATTRS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([\w-]+)="([^"]*)""#).expect("static pattern"));

/// Read the double-quoted attributes out of a tag's attribute string.
pub fn extract_attrs(attr_string: &str) -> Attributes {
    FIND_ATTRS
        .captures_iter(attr_string)
        .map(|caps| (caps[1].to_string(), unescape(&caps[2])))
        .collect()
}

fn find_tags(re: &Regex, html: &str) -> Vec<Attributes> {
    re.captures_iter(html)
        .map(|caps| extract_attrs(caps.get(1).map(|m| m.as_str()).unwrap_or_default()))
        .collect()
}

/// Attributes of every `<a>` tag in `html`.
pub fn find_a_tags(html: &str) -> Vec<Attributes> {
    find_tags(&FIND_A_TAG, html)
}

/// Attributes of every self-closing `<embed/>` tag in `html`.
pub fn find_embed_tags(html: &str) -> Vec<Attributes> {
    find_tags(&FIND_EMBED_TAG, html)
}

fn resolve<H: EntityHandler + ?Sized>(
    handler: &H,
    attrs: &Attributes,
) -> Result<ObjectSummary, EntityError> {
    handler.get_instance(attrs)
}

/// Every live object referenced by a link or embed in `html`, in document
/// order (links first, then embeds).
///
/// Entities of unregistered types, entities not backed by a model and
/// entities whose target no longer exists are skipped.
pub fn find_objects_in_rich_text(features: &FeatureRegistry, html: &str) -> Vec<ObjectSummary> {
    let mut found = Vec::new();

    for attrs in find_a_tags(html) {
        let Some(linktype) = attrs.get("linktype") else {
            continue;
        };
        let Some(handler) = features.get_link_type(linktype) else {
            debug!(linktype, "no handler for link type");
            continue;
        };
        match resolve(handler.as_ref(), &attrs) {
            Ok(instance) => found.push(instance),
            Err(e) => debug!("skipping link: {}", e),
        }
    }

    for attrs in find_embed_tags(html) {
        let Some(embedtype) = attrs.get("embedtype") else {
            continue;
        };
        let Some(handler) = features.get_embed_type(embedtype) else {
            debug!(embedtype, "no handler for embed type");
            continue;
        };
        match resolve(handler.as_ref(), &attrs) {
            Ok(instance) => found.push(instance),
            Err(e) => debug!("skipping embed: {}", e),
        }
    }

    found
}
