//! Usage reports across foreign keys, rich text and stream fields.

use std::sync::Arc;

use serde_json::json;
use tessera_blocks::Block;
use tessera_kernel::{
    AdminUrlFinders, ContentStore, FieldDef, ModelDef, ModelRegistry, SqliteStore, TesseraConfig,
    get_all_uses, get_paginated_uses,
};
use tessera_richtext::FeatureRegistry;
use tessera_richtext::handlers::{page_model, register_core_features};
use tessera_types::{ModelLabel, ObjectLookup, ObjectRef, OnDelete, Pk};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tessera_kernel=debug")
        .with_test_writer()
        .try_init();
}

fn label(s: &str) -> ModelLabel {
    ModelLabel::parse(s).unwrap()
}

fn registry() -> ModelRegistry {
    let mut models = ModelRegistry::new();
    models
        .register(
            ModelDef::new(page_model())
                .title_field("title")
                .url_pattern("/pages/{pk}/")
                .field(FieldDef::text("title")),
        )
        .unwrap();
    models
        .register(ModelDef::new(label("tests.eventpage")).parent(page_model()))
        .unwrap();
    models
        .register(
            ModelDef::new(label("tests.blogpost"))
                .title_field("title")
                .field(FieldDef::text("title"))
                .field(FieldDef::rich_text("body"))
                .field(
                    FieldDef::foreign_key("featured", page_model(), OnDelete::SetNull)
                        .verbose_name("featured page"),
                ),
        )
        .unwrap();
    models
        .register(
            ModelDef::new(label("tests.article"))
                .title_field("title")
                .field(FieldDef::text("title"))
                .field(FieldDef::stream(
                    "content",
                    Block::stream([
                        ("text", Block::rich_text()),
                        ("page", Block::page_chooser()),
                    ]),
                )),
        )
        .unwrap();
    models
}

struct Fixture {
    store: Arc<SqliteStore>,
    features: FeatureRegistry,
    finders: AdminUrlFinders,
}

fn fixture() -> Fixture {
    init_tracing();
    let store = Arc::new(SqliteStore::in_memory(registry()).unwrap());
    let features = FeatureRegistry::new();
    register_core_features(&features, Arc::clone(&store) as Arc<dyn ObjectLookup>);

    // A is an event page, referenced as a plain page everywhere
    store
        .insert(&label("tests.eventpage"), 1, json!({"title": "A"}))
        .unwrap();
    store.insert(&page_model(), 2, json!({"title": "Unrelated"})).unwrap();
    store
        .insert(
            &label("tests.blogpost"),
            10,
            json!({
                "title": "B",
                "body": r#"<p>See <a linktype="page" id="1">A</a> and <a linktype="page" id="2">x</a></p>"#,
                "featured": 1,
            }),
        )
        .unwrap();
    store
        .insert(
            &label("tests.article"),
            20,
            json!({
                "title": "C",
                "content": [
                    {"type": "page", "value": 1, "id": "c1"},
                    {"type": "text", "value": r#"<a linktype="page" id="1">again</a>"#, "id": "c2"},
                ],
            }),
        )
        .unwrap();
    store
        .insert(
            &label("tests.article"),
            21,
            json!({"title": "D", "content": [{"type": "page", "value": 2}]}),
        )
        .unwrap();

    Fixture {
        store,
        features,
        finders: AdminUrlFinders::new(),
    }
}

fn titles(uses: &[tessera_kernel::Use]) -> Vec<&str> {
    uses.iter().map(|u| u.title.as_str()).collect()
}

#[test]
fn test_rich_text_stream_and_foreign_key_uses() {
    let f = fixture();
    let uses = get_all_uses(
        f.store.as_ref(),
        &f.features,
        &f.finders,
        &[ObjectRef::new(page_model(), 1)],
    )
    .unwrap();

    assert_eq!(titles(&uses), vec!["B", "C"]);

    // B is found first through its foreign key
    assert_eq!(uses[0].on_delete, OnDelete::SetNull);
    assert_eq!(
        uses[0].on_delete_data().1,
        "Field “featured page” will be emptied"
    );
    assert_eq!(uses[1].on_delete, OnDelete::SetNull);
    assert_eq!(uses[1].on_delete_data().1, "Field will be emptied");
    assert!(uses.iter().all(|u| u.is_root() && !u.is_hidden()));
}

#[test]
fn test_subclass_references_collapse() {
    let f = fixture();
    let uses = get_all_uses(
        f.store.as_ref(),
        &f.features,
        &f.finders,
        &[
            ObjectRef::new(page_model(), 1),
            ObjectRef::new(label("tests.eventpage"), 1),
        ],
    )
    .unwrap();
    assert_eq!(titles(&uses), vec!["B", "C"]);
    assert_eq!(uses[1].identity, ObjectRef::new(label("tests.article"), 20));
}

#[test]
fn test_unreferenced_object_has_no_uses() {
    let f = fixture();
    f.store.insert(&page_model(), 3, json!({"title": "Lonely"})).unwrap();
    let page = get_paginated_uses(
        f.store.as_ref(),
        &f.features,
        &f.finders,
        &[ObjectRef::new(page_model(), 3)],
        1,
        20,
    )
    .unwrap();
    assert!(page.uses.is_empty());
    assert_eq!(page.num_pages, 1);
    assert!(!page.are_protected);
}

#[test]
fn test_other_page_uses() {
    let f = fixture();
    let uses = get_all_uses(
        f.store.as_ref(),
        &f.features,
        &f.finders,
        &[ObjectRef::new(page_model(), 2)],
    )
    .unwrap();
    assert_eq!(titles(&uses), vec!["B", "D"]);
    assert_eq!(uses[1].object.pk(), &Pk::Int(21));
}

#[test]
fn test_registry_from_config_drives_the_store() {
    let config = TesseraConfig::from_toml_str(
        r#"
        [[models]]
        label = "core.page"
        title_field = "title"

        [[models]]
        label = "tests.note"
        title_field = "title"
        fields = [
            { name = "page", kind = "foreign_key", to = "core.page", on_delete = "protect" },
        ]
        "#,
    )
    .unwrap();
    let store = SqliteStore::in_memory(config.build_registry().unwrap()).unwrap();
    store.insert(&page_model(), 1, json!({"title": "Home"})).unwrap();
    store
        .insert(&label("tests.note"), 1, json!({"title": "Keep", "page": 1}))
        .unwrap();

    let page = get_paginated_uses(
        &store,
        &FeatureRegistry::new(),
        &AdminUrlFinders::new(),
        &[ObjectRef::new(page_model(), 1)],
        1,
        config.pagination.per_page,
    )
    .unwrap();
    assert!(page.are_protected);
    assert_eq!(page.uses.len(), 1);
    assert_eq!(page.uses[0].on_delete_data().1, "Prevents deletion");
    assert_eq!(store.registry().models().count(), 2);
}
