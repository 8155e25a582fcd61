//! Usage reports: everything that refers to a set of objects.
//!
//! Relational references come from cascade collection. Embedded references
//! come from the rich text and stream field collectors of every concrete
//! model, searched for the originals and for everything collected so far.

use std::collections::HashMap;
use std::fmt;

use tessera_richtext::{FeatureRegistry, Markup, escape};
use tessera_types::{ObjectRef, OnDelete};
use tracing::debug;

use crate::admin_urls::AdminUrlFinders;
use crate::collector::{ModelRichTextCollector, ModelStreamFieldsCollector};
use crate::error::Result;
use crate::models::FieldDef;
use crate::store::{CascadeNode, ContentStore, StoredObject};

/// One object that refers to an object being deleted.
#[derive(Clone)]
pub struct Use {
    pub object: StoredObject,
    /// Base model and primary key.
    pub identity: ObjectRef,
    pub title: String,
    pub model_name: String,
    pub edit_url: Option<String>,
    /// Zero for direct dependents; cascade descendants count up from there.
    pub depth: usize,
    pub on_delete: OnDelete,
    /// The referencing field, for field updates.
    pub field: Option<FieldDef>,
    hideable: bool,
}

impl Use {
    fn new(
        ctx: &UsageContext<'_>,
        object: StoredObject,
        depth: usize,
        on_delete: OnDelete,
        field: Option<FieldDef>,
    ) -> Self {
        let models = ctx.store.registry();
        let model = models.get(object.model());
        let hideable = model.is_some_and(|m| m.tag_item || !m.shown_in_uses)
            || models.has_parental_field(object.model());
        let summary = object.summary(models);
        Self {
            identity: models.identity(&object.object),
            title: summary.title.clone(),
            model_name: model
                .map(|m| m.verbose_name.clone())
                .unwrap_or_else(|| object.model().model_name().to_string()),
            edit_url: ctx.finders.get_edit_url(models, &summary),
            object,
            depth,
            on_delete,
            field,
            hideable,
        }
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    pub fn is_protected(&self) -> bool {
        self.on_delete == OnDelete::Protect
    }

    /// Hidden from the listing. Protecting uses are always shown; otherwise
    /// tag items, models opted out of usage listings and models owned by a
    /// parent through a parental field are hidden.
    pub fn is_hidden(&self) -> bool {
        !self.is_protected() && self.hideable
    }

    /// Status tag css class and message describing what deletion does here.
    pub fn on_delete_data(&self) -> (&'static str, String) {
        match self.on_delete {
            OnDelete::Cascade => ("serious", "Will also be deleted".to_string()),
            OnDelete::Protect => ("primary", "Prevents deletion".to_string()),
            OnDelete::SetNull => match &self.field {
                Some(field) => ("", format!("Field “{}” will be emptied", field.verbose_name)),
                None => ("", "Field will be emptied".to_string()),
            },
            OnDelete::SetDefault => ("primary", "Default object will be set".to_string()),
            OnDelete::DoNothing => ("", "Nothing will happen".to_string()),
            OnDelete::Set => ("primary", "Another object will be set".to_string()),
        }
    }

    pub fn on_delete_html(&self) -> Markup {
        let (class, message) = self.on_delete_data();
        Markup::safe(format!(
            "<span class=\"status-tag {}\">{}</span>",
            escape(class),
            escape(&message)
        ))
    }

    /// Link to the object's edit view, or its bare title.
    pub fn edit_link(&self) -> Markup {
        match &self.edit_url {
            Some(url) => Markup::safe(format!(
                "<a href=\"{}\">{}</a>",
                escape(url),
                escape(&self.title)
            )),
            None => Markup::text(&self.title),
        }
    }

    /// The edit link, indented by depth with an arrow for nested uses.
    pub fn html(&self) -> Markup {
        let link = self.edit_link();
        if self.is_root() {
            return link;
        }
        let indent = "\u{a0}".repeat(self.depth * 8);
        Markup::safe(format!(
            "{indent}<i class=\"icon icon-arrow-right\"></i> {link}"
        ))
    }
}

impl fmt::Debug for Use {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Use {} pk={}>", self.object.model(), self.object.pk())
    }
}

struct UsageContext<'a> {
    store: &'a dyn ContentStore,
    finders: &'a AdminUrlFinders,
}

/// Uses in discovery order, deduplicated by identity.
struct UseList<'a> {
    ctx: UsageContext<'a>,
    uses: Vec<Use>,
    /// Identity to depth, originals included.
    seen: HashMap<ObjectRef, Option<usize>>,
    originals: Vec<StoredObject>,
}

impl UseList<'_> {
    /// Add a use unless its identity was already found. Returns the depth of
    /// the use that holds the identity, `None` for originals.
    fn push(
        &mut self,
        object: StoredObject,
        depth: usize,
        on_delete: OnDelete,
        field: Option<FieldDef>,
    ) -> Option<usize> {
        let identity = self.ctx.store.registry().identity(&object.object);
        if let Some(existing) = self.seen.get(&identity) {
            return *existing;
        }
        self.seen.insert(identity, Some(depth));
        self.uses
            .push(Use::new(&self.ctx, object, depth, on_delete, field));
        Some(depth)
    }

    fn push_cascade(&mut self, node: &CascadeNode, depth: usize) {
        for child in &node.children {
            match self.push(child.object.clone(), depth, OnDelete::Cascade, None) {
                Some(held) => self.push_cascade(child, held + 1),
                None => self.push_cascade(child, depth),
            }
        }
    }

    /// Originals plus every object found so far.
    fn searched(&self) -> Vec<StoredObject> {
        self.originals
            .iter()
            .cloned()
            .chain(self.uses.iter().map(|u| u.object.clone()))
            .collect()
    }
}

/// Every object that uses any of `roots`, in report order: the cascade tree
/// depth first, protecting objects, field updates, then objects referencing
/// them from rich text or stream fields. Roots that no longer exist are
/// skipped. The roots themselves are never reported.
pub fn get_all_uses(
    store: &dyn ContentStore,
    features: &FeatureRegistry,
    finders: &AdminUrlFinders,
    roots: &[ObjectRef],
) -> Result<Vec<Use>> {
    let registry = store.registry();
    let mut originals = Vec::new();
    for root in roots {
        match store.get(root)? {
            Some(object) => originals.push(object),
            None => debug!(object = %root, "usage root does not exist"),
        }
    }

    let collected = store.collect(&originals)?;
    let mut list = UseList {
        ctx: UsageContext { store, finders },
        uses: Vec::new(),
        seen: originals
            .iter()
            .map(|o| (registry.identity(&o.object), None))
            .collect(),
        originals,
    };

    for tree in &collected.cascade {
        list.push_cascade(tree, 0);
    }
    for object in collected.protected {
        list.push(object, 0, OnDelete::Protect, None);
    }
    for update in collected.field_updates {
        for object in update.objects {
            list.push(object, 0, update.on_delete, Some(update.field.clone()));
        }
    }

    for model in registry.concrete_models() {
        let rich_text = ModelRichTextCollector::new(store, features, model.label.clone());
        for (row, _) in rich_text.find_objects(&list.searched())? {
            list.push(row, 0, OnDelete::SetNull, None);
        }
        let streams = ModelStreamFieldsCollector::new(store, features, model.label.clone());
        for (row, _) in streams.find_objects(&list.searched())? {
            list.push(row, 0, OnDelete::SetNull, None);
        }
    }

    debug!(roots = roots.len(), uses = list.uses.len(), "collected uses");
    Ok(list.uses)
}

/// One page of visible uses.
#[derive(Debug)]
pub struct UsagePage {
    pub uses: Vec<Use>,
    /// 1-based page number actually shown.
    pub number: usize,
    pub num_pages: usize,
    pub per_page: usize,
    /// Visible uses across all pages.
    pub count: usize,
    /// True if any use, hidden or not, prevents deletion.
    pub are_protected: bool,
}

impl UsagePage {
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

/// Visible uses of `roots`, paginated. Page numbers start at 1; out of range
/// pages are clamped to the first or last page.
pub fn get_paginated_uses(
    store: &dyn ContentStore,
    features: &FeatureRegistry,
    finders: &AdminUrlFinders,
    roots: &[ObjectRef],
    page: usize,
    per_page: usize,
) -> Result<UsagePage> {
    let uses = get_all_uses(store, features, finders, roots)?;
    let are_protected = uses.iter().any(Use::is_protected);
    let visible: Vec<Use> = uses.into_iter().filter(|u| !u.is_hidden()).collect();
    Ok(paginate(visible, page, per_page, are_protected))
}

fn paginate(uses: Vec<Use>, page: usize, per_page: usize, are_protected: bool) -> UsagePage {
    let per_page = per_page.max(1);
    let count = uses.len();
    let num_pages = count.div_ceil(per_page).max(1);
    let number = page.clamp(1, num_pages);
    let uses = uses
        .into_iter()
        .skip((number - 1) * per_page)
        .take(per_page)
        .collect();
    UsagePage {
        uses,
        number,
        num_pages,
        per_page,
        count,
        are_protected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelDef, ModelRegistry};
    use crate::sqlite::SqliteStore;
    use serde_json::json;
    use tessera_types::ModelLabel;

    fn label(s: &str) -> ModelLabel {
        ModelLabel::parse(s).unwrap()
    }

    fn store() -> SqliteStore {
        let mut registry = ModelRegistry::new();
        registry
            .register(
                ModelDef::new(label("core.page"))
                    .title_field("title")
                    .field(FieldDef::text("title")),
            )
            .unwrap();
        registry
            .register(
                ModelDef::new(label("tests.section"))
                    .title_field("title")
                    .field(FieldDef::foreign_key("page", label("core.page"), OnDelete::Cascade)),
            )
            .unwrap();
        registry
            .register(
                ModelDef::new(label("tests.row"))
                    .field(FieldDef::foreign_key("section", label("tests.section"), OnDelete::Cascade)),
            )
            .unwrap();
        registry
            .register(
                ModelDef::new(label("tests.advert"))
                    .field(
                        FieldDef::foreign_key("page", label("core.page"), OnDelete::SetNull)
                            .verbose_name("linked page"),
                    ),
            )
            .unwrap();
        registry
            .register(
                ModelDef::new(label("tests.lock"))
                    .hidden_from_uses()
                    .field(FieldDef::foreign_key("page", label("core.page"), OnDelete::Protect)),
            )
            .unwrap();
        registry
            .register(
                ModelDef::new(label("tests.tag"))
                    .tag_item()
                    .field(FieldDef::foreign_key("page", label("core.page"), OnDelete::Cascade)),
            )
            .unwrap();
        SqliteStore::in_memory(registry).unwrap()
    }

    fn uses_of(store: &SqliteStore, pk: i64) -> Vec<Use> {
        get_all_uses(
            store,
            &FeatureRegistry::new(),
            &AdminUrlFinders::new(),
            &[ObjectRef::new(label("core.page"), pk)],
        )
        .unwrap()
    }

    #[test]
    fn test_cascade_depths_and_order() {
        let store = store();
        store.insert(&label("core.page"), 1, json!({"title": "Home"})).unwrap();
        store.insert(&label("tests.section"), 10, json!({"page": 1, "title": "S"})).unwrap();
        store.insert(&label("tests.row"), 100, json!({"section": 10})).unwrap();
        store.insert(&label("tests.advert"), 20, json!({"page": 1})).unwrap();
        store.insert(&label("tests.lock"), 30, json!({"page": 1})).unwrap();

        let uses = uses_of(&store, 1);
        let summary: Vec<(String, usize, OnDelete)> = uses
            .iter()
            .map(|u| (u.identity.to_string(), u.depth, u.on_delete))
            .collect();
        assert_eq!(
            summary,
            vec![
                (ObjectRef::new(label("tests.section"), 10).to_string(), 0, OnDelete::Cascade),
                (ObjectRef::new(label("tests.row"), 100).to_string(), 1, OnDelete::Cascade),
                (ObjectRef::new(label("tests.lock"), 30).to_string(), 0, OnDelete::Protect),
                (ObjectRef::new(label("tests.advert"), 20).to_string(), 0, OnDelete::SetNull),
            ]
        );

        assert!(uses[0].is_root());
        assert!(!uses[1].is_root());
        assert_eq!(
            uses[1].html().as_str(),
            format!(
                "{}<i class=\"icon icon-arrow-right\"></i> row object (100)",
                "\u{a0}".repeat(8)
            )
        );
        assert_eq!(
            uses[3].on_delete_data(),
            ("", "Field “linked page” will be emptied".to_string())
        );
        // protected uses stay visible even for models hidden from listings
        assert!(!uses[2].is_hidden());
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let store = store();
        assert!(uses_of(&store, 99).is_empty());
    }

    #[test]
    fn test_pagination_and_hidden_uses() {
        let store = store();
        store.insert(&label("core.page"), 1, json!({"title": "Home"})).unwrap();
        for pk in 0..5 {
            store.insert(&label("tests.advert"), 20 + pk, json!({"page": 1})).unwrap();
        }
        store.insert(&label("tests.tag"), 40, json!({"page": 1})).unwrap();

        let roots = [ObjectRef::new(label("core.page"), 1)];
        let features = FeatureRegistry::new();
        let finders = AdminUrlFinders::new();
        let page = get_paginated_uses(&store, &features, &finders, &roots, 2, 2).unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.num_pages, 3);
        assert_eq!(page.number, 2);
        assert_eq!(page.uses.len(), 2);
        assert!(page.has_next() && page.has_previous());
        assert!(!page.are_protected);

        let last = get_paginated_uses(&store, &features, &finders, &roots, 99, 2).unwrap();
        assert_eq!(last.number, 3);
        assert_eq!(last.uses.len(), 1);
        let first = get_paginated_uses(&store, &features, &finders, &roots, 0, 2).unwrap();
        assert_eq!(first.number, 1);
    }

    #[test]
    fn test_empty_report_has_one_page() {
        let page = paginate(Vec::new(), 5, 20, false);
        assert_eq!(page.num_pages, 1);
        assert_eq!(page.number, 1);
        assert!(!page.has_next());
    }

    #[test]
    fn test_on_delete_html_and_edit_link() {
        let store = store();
        store.insert(&label("core.page"), 1, json!({"title": "Home"})).unwrap();
        store.insert(&label("tests.section"), 10, json!({"page": 1, "title": "A & B"})).unwrap();
        let finders = AdminUrlFinders::new();
        finders.register(
            label("tests.section"),
            std::sync::Arc::new(crate::admin_urls::PatternUrlFinder::new("/admin/sections/{pk}/")),
        );
        let uses = get_all_uses(
            &store,
            &FeatureRegistry::new(),
            &finders,
            &[ObjectRef::new(label("core.page"), 1)],
        )
        .unwrap();
        assert_eq!(
            uses[0].on_delete_html().as_str(),
            "<span class=\"status-tag serious\">Will also be deleted</span>"
        );
        assert_eq!(
            uses[0].html().as_str(),
            "<a href=\"/admin/sections/10/\">A &amp; B</a>"
        );
    }
}
