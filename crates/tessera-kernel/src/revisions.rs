//! Stored revisions and backfilling the action log from them.
//!
//! Installations that kept revisions before they kept an action log can
//! rebuild the log: the first revision of an object becomes a create, a
//! revision with changed content an edit, and the object's live revision a
//! publish. Entries carry the revision id in their data, so revisions that
//! already have an entry are skipped and the backfill can be rerun.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tessera_types::{ModelLabel, ObjectRef};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::log_actions::{LogActionRegistry, LogEntry, LogEntryModel};
use crate::sqlite::SqliteStore;
use crate::store::{ContentStore, StoredObject};

/// Fields that change without anyone editing content.
const METADATA_FIELDS: &[&str] = &[
    "path",
    "depth",
    "numchild",
    "url_path",
    "draft_title",
    "live",
    "has_unpublished_changes",
    "owner",
    "locked",
    "locked_at",
    "locked_by",
    "expired",
    "first_published_at",
    "last_published_at",
    "latest_revision_created_at",
    "live_revision",
];

/// A saved copy of an object's content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: i64,
    pub object: ObjectRef,
    pub content: JsonValue,
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Revision {
    /// Content without metadata fields.
    fn edited_content(&self) -> JsonMap<String, JsonValue> {
        let mut content = self.content.as_object().cloned().unwrap_or_default();
        for field in METADATA_FIELDS {
            content.remove(*field);
        }
        content
    }

    /// The live revision recorded when this one was saved.
    fn live_revision(&self) -> Option<i64> {
        self.content.get("live_revision").and_then(JsonValue::as_i64)
    }
}

/// What a backfill run wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub revisions: usize,
    pub entries: usize,
    pub skipped_models: Vec<ModelLabel>,
}

struct Backfill<'a> {
    store: &'a SqliteStore,
    report: BackfillReport,
}

impl Backfill<'_> {
    fn log(
        &mut self,
        log_model: &dyn LogEntryModel,
        instance: &StoredObject,
        action: &str,
        revision: &Revision,
        content_changed: bool,
    ) -> Result<()> {
        let entry = LogEntry {
            id: 0,
            object: instance.object.clone(),
            label: instance.title(self.store.registry()),
            action: action.to_string(),
            actor: revision.actor.clone(),
            data: json!({"revision": revision.id, "content_changed": content_changed}),
            timestamp: revision.created_at,
        };
        debug!(object = %entry.object, action, revision = revision.id, "backfilling log entry");
        log_model.log_action(entry)?;
        self.report.entries += 1;
        Ok(())
    }
}

fn is_logged(log_model: &dyn LogEntryModel, revision: &Revision) -> Result<bool> {
    Ok(log_model
        .for_instance(&revision.object)?
        .iter()
        .any(|e| e.data.get("revision").and_then(JsonValue::as_i64) == Some(revision.id)))
}

/// Write log entries for stored revisions that have none.
///
/// Revisions of unregistered models, deleted objects, or models without a
/// log entry model are skipped.
pub fn create_log_entries_from_revisions(
    store: &SqliteStore,
    registry: &LogActionRegistry,
) -> Result<BackfillReport> {
    let mut backfill = Backfill {
        store,
        report: BackfillReport::default(),
    };
    let mut missing_models: HashSet<ModelLabel> = HashSet::new();
    let mut current: Option<ObjectRef> = None;
    let mut previous: Option<(Revision, JsonMap<String, JsonValue>)> = None;

    for revision in store.revisions()? {
        let model = &revision.object.model;
        if missing_models.contains(model) {
            continue;
        }
        if store.registry().get(model).is_none() {
            warn!(model = %model, "revisions of an unregistered model");
            missing_models.insert(model.clone());
            backfill.report.skipped_models.push(model.clone());
            continue;
        }
        let Some(instance) = store.get(&revision.object)? else {
            debug!(object = %revision.object, "revision of a deleted object");
            continue;
        };
        let Some(log_model) = registry.log_model_for_model(store.registry(), instance.model()) else {
            missing_models.insert(model.clone());
            backfill.report.skipped_models.push(model.clone());
            continue;
        };
        backfill.report.revisions += 1;

        let is_new_object = current.as_ref() != Some(&revision.object);
        if is_new_object {
            previous = None;
            current = Some(revision.object.clone());
        }
        let content = revision.edited_content();

        if !is_logged(log_model.as_ref(), &revision)? {
            let published = instance.get("live_revision").and_then(JsonValue::as_i64) == Some(revision.id);
            let mut content_changed = false;
            if let Some((previous_revision, previous_content)) = &previous {
                if revision.live_revision() == Some(previous_revision.id) {
                    backfill.log(log_model.as_ref(), &instance, "tessera.publish", previous_revision, true)?;
                }
                content_changed = content != *previous_content;
            }

            if is_new_object || content_changed || published {
                let action = if is_new_object {
                    "tessera.create"
                } else if published {
                    "tessera.publish"
                } else {
                    "tessera.edit"
                };
                // publishing changed content also saved a draft
                if published && content_changed {
                    backfill.log(log_model.as_ref(), &instance, "tessera.edit", &revision, true)?;
                }
                backfill.log(log_model.as_ref(), &instance, action, &revision, content_changed)?;
            }
        }

        previous = Some((revision, content));
    }

    info!(
        revisions = backfill.report.revisions,
        entries = backfill.report.entries,
        "backfilled log entries from revisions"
    );
    Ok(backfill.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;

    use crate::log_actions::{SqliteLogEntries, register_core_actions};
    use crate::models::{FieldDef, ModelDef, ModelRegistry};

    fn label(s: &str) -> ModelLabel {
        ModelLabel::parse(s).unwrap()
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 12, minute, 0).unwrap()
    }

    fn setup() -> (Arc<SqliteStore>, LogActionRegistry) {
        let mut models = ModelRegistry::new();
        models
            .register(
                ModelDef::new(label("core.page"))
                    .title_field("title")
                    .field(FieldDef::text("title")),
            )
            .unwrap();
        models.register(ModelDef::new(label("tests.advert"))).unwrap();
        let store = Arc::new(SqliteStore::in_memory(models).unwrap());
        let registry = LogActionRegistry::new();
        registry.add_hook(register_core_actions);
        registry.register_model(
            label("core.page"),
            Arc::new(SqliteLogEntries::new(Arc::clone(&store), "page")),
        );
        (store, registry)
    }

    fn actions(store: &SqliteStore, object: &ObjectRef) -> Vec<(String, i64)> {
        store
            .log_entries_for("page", object)
            .unwrap()
            .into_iter()
            .map(|e| (e.action, e.data["revision"].as_i64().unwrap()))
            .collect()
    }

    #[test]
    fn test_create_edit_and_publish() {
        let (store, registry) = setup();
        let page = ObjectRef::new(label("core.page"), 1);
        let first = store
            .insert_revision(&page, json!({"title": "Draft"}), Some("alice"), at(0))
            .unwrap();
        // only metadata changed
        let second = store
            .insert_revision(&page, json!({"title": "Draft", "locked": true}), None, at(1))
            .unwrap();
        let third = store
            .insert_revision(&page, json!({"title": "Final"}), Some("bob"), at(2))
            .unwrap();
        store
            .insert(&page.model, 1, json!({"title": "Final", "live_revision": third.id}))
            .unwrap();

        let report = create_log_entries_from_revisions(&store, &registry).unwrap();
        assert_eq!(report.revisions, 3);
        assert_eq!(
            actions(&store, &page),
            vec![
                ("tessera.create".to_string(), first.id),
                ("tessera.edit".to_string(), third.id),
                ("tessera.publish".to_string(), third.id),
            ]
        );
        let logs = store.log_entries_for("page", &page).unwrap();
        assert_eq!(logs[0].actor.as_deref(), Some("alice"));
        assert_eq!(logs[0].timestamp, at(0));
        assert_eq!(logs[0].label, "Final");
        assert!(second.id > first.id);

        // entries are keyed by revision, so a rerun writes nothing
        let again = create_log_entries_from_revisions(&store, &registry).unwrap();
        assert_eq!(again.entries, 0);
        assert_eq!(store.log_entries_for("page", &page).unwrap().len(), 3);
    }

    #[test]
    fn test_publish_seen_from_the_next_revision() {
        let (store, registry) = setup();
        let page = ObjectRef::new(label("core.page"), 2);
        let first = store
            .insert_revision(&page, json!({"title": "One"}), None, at(0))
            .unwrap();
        let second = store
            .insert_revision(&page, json!({"title": "Two", "live_revision": first.id}), None, at(1))
            .unwrap();
        store.insert(&page.model, 2, json!({"title": "Two"})).unwrap();

        create_log_entries_from_revisions(&store, &registry).unwrap();
        assert_eq!(
            actions(&store, &page),
            vec![
                ("tessera.create".to_string(), first.id),
                ("tessera.publish".to_string(), first.id),
                ("tessera.edit".to_string(), second.id),
            ]
        );
    }

    #[test]
    fn test_skips_unlogged_and_deleted_objects() {
        let (store, registry) = setup();
        let advert = ObjectRef::new(label("tests.advert"), 1);
        store.insert(&advert.model, 1, json!({})).unwrap();
        store.insert_revision(&advert, json!({}), None, at(0)).unwrap();
        let gone = ObjectRef::new(label("core.page"), 9);
        store.insert_revision(&gone, json!({"title": "Gone"}), None, at(0)).unwrap();

        let report = create_log_entries_from_revisions(&store, &registry).unwrap();
        assert_eq!(report.entries, 0);
        assert_eq!(report.skipped_models, vec![label("tests.advert")]);
    }
}
