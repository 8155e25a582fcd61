//! End-to-end behaviour of a realistic page body schema.

use std::sync::Arc;

use serde_json::json;
use tessera_blocks::{
    Block, BlockCount, BlockSpec, Context, ErrorKey, FormData, TemplateRegistry, Value,
};
use tessera_richtext::Markup;

fn body_block() -> Block {
    let link = Block::struct_block([
        ("title", Block::char()),
        ("url", Block::url().required(false)),
    ]);
    Block::stream([
        ("heading", Block::char().label_text("Heading")),
        ("paragraph", Block::rich_text()),
        ("links", Block::list(link)),
        ("page", Block::page_chooser()),
    ])
}

#[test]
fn test_stored_content_round_trips_with_stable_ids() {
    let block = body_block();
    let stored = json!([
        {"type": "heading", "value": "Welcome", "id": "a1"},
        {"type": "paragraph", "value": "<p>Hello <b>there</b></p>", "id": "a2"},
        {"type": "links", "value": [{"title": "Docs", "url": "https://example.com/"}]},
        {"type": "page", "value": 3},
    ]);

    let value = block.to_python(&stored);
    let first = block.get_prep_value(&value);
    let second = block.get_prep_value(&value);
    assert_eq!(first, second);

    let items = first.as_array().unwrap();
    assert_eq!(items[0]["id"], "a1");
    assert_eq!(items[1]["id"], "a2");
    let generated = items[2]["id"].as_str().unwrap();
    assert!(!generated.is_empty());
    assert_eq!(items[3]["value"], 3);

    let reloaded = block.to_python(&first);
    assert_eq!(reloaded, value);
    let ids: Vec<_> = reloaded
        .as_stream()
        .unwrap()
        .iter()
        .map(|c| c.id().map(str::to_string))
        .collect();
    assert_eq!(ids[2].as_deref(), Some(generated));
}

#[test]
fn test_clean_reports_per_item_and_count_errors() {
    let block = body_block()
        .max_num(2)
        .block_count("heading", BlockCount {
            min_num: Some(1),
            max_num: None,
        });
    let value = block.to_python(&json!([
        {"type": "paragraph", "value": "<p>one</p>"},
        {"type": "links", "value": [{"title": "", "url": ""}]},
        {"type": "paragraph", "value": "<p>three</p>"},
    ]));

    let err = block.clean(&value).unwrap_err();
    let params = err.params();
    assert!(params.contains_key(&ErrorKey::Index(1)));
    assert_eq!(
        err.non_block_errors(),
        [
            "The maximum number of items is 2".to_string(),
            "Heading: The minimum number of items is 1".to_string(),
        ]
    );

    let fixed = block.to_python(&json!([
        {"type": "heading", "value": "Title"},
        {"type": "paragraph", "value": "<p>one</p>"},
    ]));
    assert!(block.clean(&fixed).is_ok());
}

#[test]
fn test_required_stream_needs_an_item() {
    let block = body_block();
    assert!(block.clean(&block.to_python(&json!([]))).is_err());
    let one = block.to_python(&json!([{"type": "heading", "value": "x"}]));
    assert!(block.clean(&one).is_ok());
}

#[test]
fn test_posted_form_keeps_submitted_order() {
    let block = body_block();
    let data = FormData::new()
        .with("body-count", "3")
        .with("body-0-type", "heading")
        .with("body-0-value", "Second")
        .with("body-0-order", "1")
        .with("body-1-type", "heading")
        .with("body-1-value", "First")
        .with("body-1-order", "0")
        .with("body-2-type", "heading")
        .with("body-2-value", "Gone")
        .with("body-2-order", "2")
        .with("body-2-deleted", "1");

    let value = block.value_from_datadict(&data, "body");
    let headings: Vec<String> = value
        .as_stream()
        .unwrap()
        .iter()
        .map(|c| c.value().to_string())
        .collect();
    assert_eq!(headings, vec!["First", "Second"]);
}

#[test]
fn test_templates_and_search() {
    let registry = Arc::new(TemplateRegistry::new());
    registry.register("heading.html", |args| {
        Markup::safe(format!("<h2>{}</h2>", Markup::text(&args.value.to_string())))
    });
    let block = Block::stream([
        ("heading", Block::char().template("heading.html")),
        ("quote", Block::blockquote()),
    ]);
    let value = block.to_python(&json!([
        {"type": "heading", "value": "Fish & chips"},
        {"type": "quote", "value": "Eat well"},
    ]));

    let ctx = Context::new().with_templates(registry);
    assert_eq!(
        block.render(&value, &ctx).as_str(),
        "<div class=\"block-heading\"><h2>Fish &amp; chips</h2></div>\n\
         <div class=\"block-quote\"><blockquote>Eat well</blockquote></div>"
    );
    assert_eq!(
        block.get_searchable_content(&value),
        vec!["Fish & chips", "Eat well"]
    );
}

#[test]
fn test_declared_schema_matches_built_schema() {
    let spec = BlockSpec::from_json(
        r#"{
            "type": "stream",
            "children": {
                "heading": {"type": "char", "label": "Heading"},
                "paragraph": {"type": "rich_text"}
            }
        }"#,
    )
    .unwrap();
    let declared = spec.build().unwrap();
    let built = Block::stream([
        ("heading", Block::char().label_text("Heading")),
        ("paragraph", Block::rich_text()),
    ]);

    let stored = json!([{"type": "heading", "value": "Same"}]);
    let ctx = Context::new();
    assert_eq!(
        declared.render(&declared.to_python(&stored), &ctx),
        built.render(&built.to_python(&stored), &ctx)
    );
    assert_eq!(declared.get_definition()["children"], built.get_definition()["children"]);
    assert!(declared.check().is_empty());
}

#[test]
fn test_struct_value_bound_blocks() {
    let block = Block::struct_block([
        ("name", Block::char()),
        ("age", Block::integer().required(false)),
    ]);
    let value = block.to_python(&json!({"name": "Ada", "age": 36, "extra": true}));
    let sv = value.as_struct().unwrap();
    let names: Vec<&str> = sv.bound_blocks().iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["name", "age"]);
    assert_eq!(sv.get("extra"), Some(&Value::Raw(json!(true))));

    let value = block.to_python(&json!({"name": "Ada", "age": 36}));
    assert_eq!(
        block.render(&value, &Context::new()).as_str(),
        "<dl>\n<dt>name</dt>\n<dd>Ada</dd>\n<dt>age</dt>\n<dd>36</dd>\n</dl>"
    );
}
