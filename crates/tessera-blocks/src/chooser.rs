//! Chooser blocks: a reference to one stored object.
//!
//! The value is an [`ObjectRef`]; the stored form is the bare primary key.
//! Rendering resolves the reference through the context's
//! [`ObjectLookup`](tessera_types::ObjectLookup), and an object that no longer
//! exists renders as nothing.
//!
//! [`ChooserKind::ImageWithAlt`] is the exception: its value is an
//! [`ImageValue`] stored as `{"id": pk, "alt": text}`, and its form posts
//! `{prefix}-image` and `{prefix}-alt`.

use serde_json::{Map as JsonMap, Value as JsonValue};
use tessera_richtext::handlers::{document_model, image_model, page_model};
use tessera_richtext::{Markup, escape};
use tessera_types::{ModelLabel, ObjectRef, Pk};
use tracing::debug;

use crate::block::Block;
use crate::context::Context;
use crate::error::ValidationError;
use crate::field::REQUIRED_MESSAGE;
use crate::form::{FormData, field_html};
use crate::value::{ImageValue, Value};

const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChooserKind {
    /// Pages, optionally restricted to some page types.
    Page {
        page_types: Vec<ModelLabel>,
        can_choose_root: bool,
    },
    Document,
    Image,
    /// An image with alt text given where it is used.
    ImageWithAlt,
    /// Any registered model.
    Snippet(ModelLabel),
}

impl ChooserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChooserKind::Page { .. } => "page_chooser",
            ChooserKind::Document => "document_chooser",
            ChooserKind::Image => "image_chooser",
            ChooserKind::ImageWithAlt => "image",
            ChooserKind::Snippet(_) => "snippet_chooser",
        }
    }

    pub fn default_icon(&self) -> &'static str {
        match self {
            ChooserKind::Page { .. } => "redirect",
            ChooserKind::Document => "doc-full-inverse",
            ChooserKind::Image | ChooserKind::ImageWithAlt => "image",
            ChooserKind::Snippet(_) => "snippet",
        }
    }

    /// The model values refer to.
    pub fn target_model(&self) -> ModelLabel {
        match self {
            ChooserKind::Page { .. } => page_model(),
            ChooserKind::Document => document_model(),
            ChooserKind::Image | ChooserKind::ImageWithAlt => image_model(),
            ChooserKind::Snippet(model) => model.clone(),
        }
    }

    fn noun(&self) -> String {
        match self {
            ChooserKind::Page { .. } => "page".to_string(),
            ChooserKind::Document => "document".to_string(),
            ChooserKind::Image | ChooserKind::ImageWithAlt => "image".to_string(),
            ChooserKind::Snippet(model) => model.model_name().to_string(),
        }
    }

    fn script(&self, id: &str) -> String {
        match self {
            ChooserKind::Page {
                page_types,
                can_choose_root,
            } => {
                let types: Vec<String> = if page_types.is_empty() {
                    vec![page_model().to_string()]
                } else {
                    page_types.iter().map(ModelLabel::to_string).collect()
                };
                format!(
                    "createPageChooser(\"{id}\", {}, null, {can_choose_root}, null);",
                    serde_json::to_string(&types).unwrap_or_else(|_| "[]".to_string())
                )
            }
            ChooserKind::Document => format!("createDocumentChooser(\"{id}\");"),
            ChooserKind::Image | ChooserKind::ImageWithAlt => {
                format!("createImageChooser(\"{id}\");")
            }
            ChooserKind::Snippet(model) => format!(
                "createSnippetChooser(\"{id}\", \"{}/{}\");",
                model.app_label(),
                model.model_name()
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChooserBlock {
    pub kind: ChooserKind,
}

impl ChooserBlock {
    pub fn new(kind: ChooserKind) -> Self {
        Self { kind }
    }

    fn with_alt(&self) -> bool {
        self.kind == ChooserKind::ImageWithAlt
    }

    fn reference(&self, pk: &JsonValue) -> Option<ObjectRef> {
        let pk = Pk::from_json(pk).ok()?;
        Some(ObjectRef::new(self.kind.target_model(), pk))
    }

    pub fn to_python(&self, value: &JsonValue) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        if self.with_alt() {
            return self.image_to_python(value);
        }
        match self.reference(value) {
            Some(obj) => Value::Object(obj),
            None => Value::Raw(value.clone()),
        }
    }

    /// Accepts `{"id", "alt"}` or a bare id.
    fn image_to_python(&self, value: &JsonValue) -> Value {
        let (id, alt) = match value {
            JsonValue::Object(map) => (
                map.get("id").unwrap_or(&JsonValue::Null),
                map.get("alt").and_then(JsonValue::as_str),
            ),
            other => (other, None),
        };
        match self.reference(id) {
            Some(image) => Value::Image(ImageValue::new(image, alt.map(str::to_string))),
            None => Value::Raw(value.clone()),
        }
    }

    pub fn get_prep_value(&self, value: &Value) -> JsonValue {
        match value {
            Value::Image(image) if self.with_alt() => image.to_json(),
            Value::Object(obj) if self.with_alt() => {
                let mut map = JsonMap::new();
                map.insert("id".to_string(), obj.pk.to_json());
                map.insert("alt".to_string(), JsonValue::Null);
                JsonValue::Object(map)
            }
            Value::Image(image) => image.image.pk.to_json(),
            Value::Object(obj) => obj.pk.to_json(),
            other => other.to_json(),
        }
    }

    pub fn clean(&self, block: &Block, value: &Value) -> Result<Value, ValidationError> {
        if value.is_empty() {
            if block.is_required() {
                return Err(ValidationError::field(REQUIRED_MESSAGE));
            }
            return Ok(Value::Null);
        }
        let (obj, alt) = match value {
            Value::Image(image) => (image.image.clone(), image.alt.clone()),
            Value::Object(obj) => (obj.clone(), None),
            Value::Int(n) => (ObjectRef::new(self.kind.target_model(), *n), None),
            Value::Text(s) => (
                ObjectRef::new(self.kind.target_model(), Pk::from_attr(s)),
                None,
            ),
            Value::Raw(raw) => (
                self.reference(raw)
                    .ok_or_else(|| ValidationError::field(INVALID_CHOICE))?,
                None,
            ),
            _ => return Err(ValidationError::field(INVALID_CHOICE)),
        };
        Ok(if self.with_alt() {
            Value::Image(ImageValue::new(obj, alt))
        } else {
            Value::Object(obj)
        })
    }

    /// The chosen object's title, or nothing if it cannot be resolved.
    /// Images with alt text render as an `<img>` tag.
    pub fn render_basic(&self, value: &Value, context: &Context) -> Markup {
        let Some(obj) = value.as_object() else {
            return Markup::new();
        };
        let Some(lookup) = context.lookup() else {
            debug!(object = %obj, "no object lookup in context");
            return Markup::new();
        };
        let Some(summary) = lookup.lookup(&obj.model, &obj.pk) else {
            debug!(object = %obj, "chosen object no longer exists");
            return Markup::new();
        };
        match value {
            Value::Image(image) => Markup::safe(format!(
                "<img alt=\"{}\" src=\"{}\">",
                escape(image.alt_text(&summary.title)),
                escape(summary.url.as_deref().unwrap_or_default()),
            )),
            _ => Markup::text(&summary.title),
        }
    }

    pub fn render_form(
        &self,
        block: &Block,
        value: &Value,
        prefix: &str,
        errors: Option<&ValidationError>,
    ) -> Markup {
        let input_name = if self.with_alt() {
            format!("{prefix}-image")
        } else {
            prefix.to_string()
        };
        let id = escape(&input_name);
        let current = value
            .as_object()
            .map(|obj| obj.pk.to_string())
            .unwrap_or_default();
        let blank = if current.is_empty() { " blank" } else { "" };
        let noun = self.kind.noun();
        let mut widget = format!(
            "<input type=\"hidden\" name=\"{id}\" id=\"{id}\" value=\"{}\">\
             <div class=\"chooser {}-chooser{blank}\">\
             <div class=\"chosen\"><span class=\"title\"></span></div>\
             <div class=\"unchosen\"><button type=\"button\" class=\"button action-choose button-small button-secondary\">Choose a {}</button></div>\
             </div><script>{}</script>",
            escape(&current),
            escape(&noun),
            escape(&noun),
            self.kind.script(&id),
        );
        if self.with_alt() {
            let alt = match value {
                Value::Image(image) => image.alt.as_deref().unwrap_or_default(),
                _ => "",
            };
            widget.push_str(&format!(
                "<b>Alt text</b><textarea name=\"{0}\" id=\"{0}\" rows=\"2\">{1}</textarea>",
                escape(&format!("{prefix}-alt")),
                escape(alt),
            ));
        }
        field_html(
            "model_choice_field",
            &format!("admin_{}_chooser", self.kind.as_str().trim_end_matches("_chooser")),
            block.meta().classname.as_deref(),
            &widget,
            block.meta().help_text.as_deref(),
            errors,
        )
    }

    pub fn value_from_datadict(&self, data: &FormData, prefix: &str) -> Value {
        if self.with_alt() {
            let alt = data.get(&format!("{prefix}-alt")).map(str::to_string);
            return match data.get(&format!("{prefix}-image")).map(str::trim) {
                None | Some("") => Value::Null,
                Some(pk) => Value::Image(ImageValue::new(
                    ObjectRef::new(self.kind.target_model(), Pk::from_attr(pk)),
                    alt,
                )),
            };
        }
        match data.get(prefix).map(str::trim) {
            None | Some("") => Value::Null,
            Some(pk) => Value::Object(ObjectRef::new(self.kind.target_model(), Pk::from_attr(pk))),
        }
    }

    pub fn value_omitted_from_data(&self, data: &FormData, prefix: &str) -> bool {
        if self.with_alt() {
            !data.contains(&format!("{prefix}-image"))
        } else {
            !data.contains(prefix)
        }
    }
}

impl Block {
    /// Chooser restricted to the given page types.
    pub fn page_chooser_for(page_types: Vec<ModelLabel>, can_choose_root: bool) -> Self {
        Self::chooser(ChooserKind::Page {
            page_types,
            can_choose_root,
        })
    }

    pub fn snippet_chooser(model: ModelLabel) -> Self {
        Self::chooser(ChooserKind::Snippet(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use tessera_types::{ObjectLookup, ObjectSummary};

    struct Pages;

    impl ObjectLookup for Pages {
        fn lookup(&self, model: &ModelLabel, pk: &Pk) -> Option<ObjectSummary> {
            (model.as_str() == "core.page" && *pk == Pk::Int(2)).then(|| ObjectSummary {
                object: ObjectRef::new(model.clone(), 2),
                title: "Hello world!".to_string(),
                url: Some("/hello-world/".to_string()),
            })
        }
    }

    #[test]
    fn test_serialize_and_convert() {
        let block = Block::page_chooser();
        let value = block.to_python(&json!(2));
        assert_eq!(value, Value::Object(ObjectRef::new(page_model(), 2)));
        assert_eq!(block.get_prep_value(&value), json!(2));
        assert_eq!(block.to_python(&JsonValue::Null), Value::Null);
        assert_eq!(block.get_prep_value(&Value::Null), JsonValue::Null);
    }

    #[test]
    fn test_render_resolves_through_lookup() {
        let block = Block::page_chooser();
        let ctx = Context::new().with_lookup(Arc::new(Pages));
        let value = block.to_python(&json!(2));
        assert_eq!(block.render(&value, &ctx).as_str(), "Hello world!");
        let missing = block.to_python(&json!(99));
        assert!(block.render(&missing, &ctx).is_empty());
        assert!(block.render(&value, &Context::new()).is_empty());
    }

    #[test]
    fn test_form_script() {
        let block = Block::page_chooser().with_name("page");
        let html = block.render_form(&Value::Null, "page", None);
        let html = html.as_str();
        assert!(html.contains("createPageChooser(\"page\", [\"core.page\"], null, false, null);"));
        assert!(html.contains(
            "<button type=\"button\" class=\"button action-choose button-small button-secondary\">Choose a page</button>"
        ));

        let restricted = Block::page_chooser_for(
            vec![ModelLabel::parse("tests.eventpage").unwrap()],
            true,
        );
        let html = restricted.render_form(&Value::Null, "page", None);
        assert!(html.as_str().contains("createPageChooser(\"page\", [\"tests.eventpage\"], null, true, null);"));
    }

    #[test]
    fn test_clean() {
        let block = Block::page_chooser();
        assert_eq!(
            block.clean(&Value::Null).unwrap_err().messages(),
            vec![REQUIRED_MESSAGE]
        );
        let optional = Block::page_chooser().required(false);
        assert_eq!(optional.clean(&Value::Null).unwrap(), Value::Null);
        assert_eq!(
            block.clean(&Value::Int(2)).unwrap(),
            Value::Object(ObjectRef::new(page_model(), 2))
        );
    }

    #[test]
    fn test_value_from_datadict() {
        let block = Block::document_chooser();
        let data = FormData::new().with("doc", "7");
        assert_eq!(
            block.value_from_datadict(&data, "doc"),
            Value::Object(ObjectRef::new(document_model(), 7))
        );
        assert_eq!(block.value_from_datadict(&FormData::new().with("doc", ""), "doc"), Value::Null);
    }

    struct Images;

    impl ObjectLookup for Images {
        fn lookup(&self, model: &ModelLabel, pk: &Pk) -> Option<ObjectSummary> {
            (*model == image_model() && *pk == Pk::Int(5)).then(|| ObjectSummary {
                object: ObjectRef::new(model.clone(), 5),
                title: "A lighthouse".to_string(),
                url: Some("/media/lighthouse.jpg".to_string()),
            })
        }
    }

    #[test]
    fn test_image_with_alt_round_trip() {
        let block = Block::image();
        let value = block.to_python(&json!({"id": 5, "alt": "Beam at dusk"}));
        assert_eq!(
            value,
            Value::Image(ImageValue::new(
                ObjectRef::new(image_model(), 5),
                Some("Beam at dusk".to_string())
            ))
        );
        assert_eq!(block.get_prep_value(&value), json!({"id": 5, "alt": "Beam at dusk"}));
        assert_eq!(block.to_python(&block.get_prep_value(&value)), value);

        // a bare id from a plain image chooser
        let bare = block.to_python(&json!(5));
        assert_eq!(block.get_prep_value(&bare), json!({"id": 5, "alt": null}));
        assert_eq!(block.to_python(&JsonValue::Null), Value::Null);
        assert_eq!(block.get_prep_value(&Value::Null), JsonValue::Null);
    }

    #[test]
    fn test_image_alt_falls_back_to_title() {
        let block = Block::image();
        let ctx = Context::new().with_lookup(Arc::new(Images));
        assert_eq!(
            block.render(&block.to_python(&json!({"id": 5, "alt": "Beam"})), &ctx).as_str(),
            "<img alt=\"Beam\" src=\"/media/lighthouse.jpg\">"
        );
        assert_eq!(
            block.render(&block.to_python(&json!({"id": 5, "alt": ""})), &ctx).as_str(),
            "<img alt=\"A lighthouse\" src=\"/media/lighthouse.jpg\">"
        );
    }

    #[test]
    fn test_image_form_inputs() {
        let block = Block::image().with_name("photo");
        let value = block.to_python(&json!({"id": 5, "alt": "Beam & lamp"}));
        let html = block.render_form(&value, "photo", None);
        let html = html.as_str();
        assert!(html.contains("name=\"photo-image\" id=\"photo-image\" value=\"5\""));
        assert!(html.contains("<textarea name=\"photo-alt\" id=\"photo-alt\" rows=\"2\">Beam &amp; lamp</textarea>"));

        let data = FormData::new()
            .with("photo-image", "5")
            .with("photo-alt", "Beam");
        let posted = block.value_from_datadict(&data, "photo");
        assert_eq!(posted, block.to_python(&json!({"id": 5, "alt": "Beam"})));
        assert!(!block.value_omitted_from_data(&data, "photo"));
        assert!(block.value_omitted_from_data(&FormData::new().with("photo", "5"), "photo"));
        assert_eq!(block.clean(&posted).unwrap(), posted);
    }
}
