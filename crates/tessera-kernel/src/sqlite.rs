//! SQLite content store.
//!
//! Objects live in one table as JSON field maps. Field values are read with
//! `json_extract`, and pattern filters run through a `regexp(pattern, text)`
//! scalar function backed by the `regex` crate, compiled once per statement.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tessera_types::{ModelLabel, ObjectLookup, ObjectRef, ObjectSummary, Pk};
use tracing::{debug, info};

use crate::config::DbVendor;
use crate::error::{KernelError, Result};
use crate::log_actions::LogEntry;
use crate::models::ModelRegistry;
use crate::revisions::Revision;
use crate::store::{ContentStore, Filter, StoredObject};

const SCHEMA: &str = r#"
-- Stored objects, one row per object under its concrete model
CREATE TABLE IF NOT EXISTS objects (
    model TEXT NOT NULL,
    base TEXT NOT NULL,
    pk TEXT NOT NULL,
    data TEXT NOT NULL,
    UNIQUE (base, pk)
);
CREATE INDEX IF NOT EXISTS idx_objects_model ON objects(model);

-- Action log
CREATE TABLE IF NOT EXISTS log_entries (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    model TEXT NOT NULL,
    pk TEXT NOT NULL,
    label TEXT NOT NULL,
    action TEXT NOT NULL,
    actor TEXT,
    data TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_log_entries_object ON log_entries(kind, model, pk, id);

-- Saved revisions of an object's content
CREATE TABLE IF NOT EXISTS revisions (
    id INTEGER PRIMARY KEY,
    model TEXT NOT NULL,
    pk TEXT NOT NULL,
    content TEXT NOT NULL,
    actor TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_revisions_object ON revisions(model, pk, created_at);
"#;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn add_regexp_function(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let re = ctx.get_or_create_aux(0, |vr| -> std::result::Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            let is_match = match ctx.get_raw(1) {
                ValueRef::Text(bytes) => {
                    let text = std::str::from_utf8(bytes)
                        .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
                    re.is_match(text)
                }
                ValueRef::Integer(n) => re.is_match(&n.to_string()),
                ValueRef::Real(x) => re.is_match(&x.to_string()),
                ValueRef::Null | ValueRef::Blob(_) => false,
            };
            Ok(is_match)
        },
    )
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

fn pk_param(pk: &Pk) -> SqlValue {
    match pk {
        Pk::Int(n) => SqlValue::Integer(*n),
        Pk::Str(s) => SqlValue::Text(s.clone()),
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Append the SQL for `filter` to `sql`, pushing its parameters in order.
fn filter_sql(filter: &Filter, sql: &mut String, params: &mut Vec<SqlValue>) {
    match filter {
        Filter::Any => sql.push('1'),
        Filter::Regex { field, pattern } => {
            sql.push_str("regexp(?, json_extract(data, ?))");
            params.push(SqlValue::Text(pattern.clone()));
            params.push(SqlValue::Text(json_path(field)));
        }
        Filter::And(all) if all.is_empty() => sql.push('1'),
        Filter::Or(any) if any.is_empty() => sql.push('0'),
        Filter::And(parts) | Filter::Or(parts) => {
            let joiner = if matches!(filter, Filter::And(_)) { " AND " } else { " OR " };
            sql.push('(');
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    sql.push_str(joiner);
                }
                filter_sql(part, sql, params);
            }
            sql.push(')');
        }
    }
}

/// Every regex pattern in `filter`, so bad patterns fail before querying.
fn check_patterns(filter: &Filter) -> Result<()> {
    match filter {
        Filter::Regex { pattern, .. } => {
            Regex::new(pattern)?;
        }
        Filter::And(parts) | Filter::Or(parts) => {
            for part in parts {
                check_patterns(part)?;
            }
        }
        Filter::Any => {}
    }
    Ok(())
}

/// rusqlite-backed [`ContentStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    registry: ModelRegistry,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P, registry: ModelRegistry) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening content store");
        let conn = Connection::open(path)?;
        Self::init(conn, registry)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory(registry: ModelRegistry) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, registry)
    }

    fn init(conn: Connection, registry: ModelRegistry) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        add_regexp_function(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry,
        })
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Store a new object of a concrete model.
    pub fn insert(&self, model: &ModelLabel, pk: impl Into<Pk>, data: JsonValue) -> Result<StoredObject> {
        let def = self.registry.require(model)?;
        if def.is_abstract {
            return Err(KernelError::AbstractModel(model.clone()));
        }
        let JsonValue::Object(data) = data else {
            return Err(KernelError::InvalidObject(model.clone()));
        };
        let object = ObjectRef::new(model.clone(), pk);
        let base = self.registry.base_model(model);
        self.conn.lock().execute(
            "INSERT INTO objects (model, base, pk, data) VALUES (?1, ?2, ?3, ?4)",
            params![
                model.as_str(),
                base.as_str(),
                object.pk.json_text(),
                serde_json::to_string(&data)?,
            ],
        )?;
        debug!(object = %object, "stored object");
        Ok(StoredObject::new(object, data))
    }

    /// Replace an object's data.
    pub fn update(&self, object: &StoredObject) -> Result<()> {
        let base = self.registry.base_model(object.model());
        self.conn.lock().execute(
            "UPDATE objects SET data = ?1 WHERE base = ?2 AND pk = ?3",
            params![
                serde_json::to_string(&object.data)?,
                base.as_str(),
                object.pk().json_text(),
            ],
        )?;
        Ok(())
    }

    /// Remove an object. Returns false if it did not exist.
    pub fn delete(&self, object: &ObjectRef) -> Result<bool> {
        let base = self.registry.base_model(&object.model);
        let n = self.conn.lock().execute(
            "DELETE FROM objects WHERE base = ?1 AND pk = ?2",
            params![base.as_str(), object.pk.json_text()],
        )?;
        Ok(n > 0)
    }

    /// Every row of `model` and its subclasses.
    pub fn all(&self, model: &ModelLabel) -> Result<Vec<StoredObject>> {
        self.filter(model, &Filter::Any)
    }

    fn query_objects(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<StoredObject>> {
        let rows: Vec<(String, String, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter()
            .map(|(model, pk, data)| decode_object(&model, &pk, &data))
            .collect()
    }

    // =========================================================================
    // Log entries
    // =========================================================================

    /// Append a log entry, returning it with its assigned id.
    pub fn insert_log_entry(&self, kind: &str, mut entry: LogEntry) -> Result<LogEntry> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO log_entries (kind, model, pk, label, action, actor, data, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                kind,
                entry.object.model.as_str(),
                entry.object.pk.json_text(),
                entry.label,
                entry.action,
                entry.actor,
                serde_json::to_string(&entry.data)?,
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        entry.id = conn.last_insert_rowid();
        Ok(entry)
    }

    /// Log entries of `kind` for one object, oldest first.
    pub fn log_entries_for(&self, kind: &str, object: &ObjectRef) -> Result<Vec<LogEntry>> {
        type Row = (i64, String, String, String, String, Option<String>, String, String);
        let rows: Vec<Row> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id, model, pk, label, action, actor, data, timestamp
                 FROM log_entries WHERE kind = ?1 AND model = ?2 AND pk = ?3 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(
                    params![kind, object.model.as_str(), object.pk.json_text()],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                        ))
                    },
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        rows.into_iter()
            .map(|(id, model, pk, label, action, actor, data, timestamp)| {
                let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default();
                Ok(LogEntry {
                    id,
                    object: ObjectRef::new(ModelLabel::parse(&model)?, decode_pk(&pk)?),
                    label,
                    action,
                    actor,
                    data: serde_json::from_str(&data)?,
                    timestamp,
                })
            })
            .collect()
    }
}

impl SqliteStore {
    // =========================================================================
    // Revisions
    // =========================================================================

    /// Save a revision of `object`'s content.
    pub fn insert_revision(
        &self,
        object: &ObjectRef,
        content: JsonValue,
        actor: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<Revision> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO revisions (model, pk, content, actor, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                object.model.as_str(),
                object.pk.json_text(),
                serde_json::to_string(&content)?,
                actor,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(Revision {
            id: conn.last_insert_rowid(),
            object: object.clone(),
            content,
            actor: actor.map(str::to_string),
            created_at,
        })
    }

    /// Every revision, grouped by object and oldest first within each.
    pub fn revisions(&self) -> Result<Vec<Revision>> {
        type Row = (i64, String, String, String, Option<String>, String);
        let rows: Vec<Row> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id, model, pk, content, actor, created_at
                 FROM revisions ORDER BY model, pk, created_at, id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        rows.into_iter()
            .map(|(id, model, pk, content, actor, created_at)| {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default();
                Ok(Revision {
                    id,
                    object: ObjectRef::new(ModelLabel::parse(&model)?, decode_pk(&pk)?),
                    content: serde_json::from_str(&content)?,
                    actor,
                    created_at,
                })
            })
            .collect()
    }
}

fn decode_pk(text: &str) -> Result<Pk> {
    let json: JsonValue = serde_json::from_str(text)?;
    Ok(Pk::from_json(&json)?)
}

fn decode_object(model: &str, pk: &str, data: &str) -> Result<StoredObject> {
    let object = ObjectRef::new(ModelLabel::parse(model)?, decode_pk(pk)?);
    let data: JsonMap<String, JsonValue> = serde_json::from_str(data)?;
    Ok(StoredObject::new(object, data))
}

impl ContentStore for SqliteStore {
    fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn vendor(&self) -> DbVendor {
        DbVendor::Sqlite
    }

    fn filter(&self, model: &ModelLabel, filter: &Filter) -> Result<Vec<StoredObject>> {
        check_patterns(filter)?;
        let models = self.registry.descendants(model);
        if models.is_empty() {
            return Err(KernelError::UnknownModel(model.clone()));
        }
        let mut sql = format!(
            "SELECT model, pk, data FROM objects WHERE model IN ({}) AND ",
            placeholders(models.len())
        );
        let mut params: Vec<SqlValue> = models
            .iter()
            .map(|m| SqlValue::Text(m.to_string()))
            .collect();
        filter_sql(filter, &mut sql, &mut params);
        sql.push_str(" ORDER BY rowid");
        self.query_objects(&sql, params)
    }

    fn get(&self, object: &ObjectRef) -> Result<Option<StoredObject>> {
        let base = self.registry.base_model(&object.model);
        let row: Option<(String, String, String)> = self
            .conn
            .lock()
            .query_row(
                "SELECT model, pk, data FROM objects WHERE base = ?1 AND pk = ?2",
                params![base.as_str(), object.pk.json_text()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((model, pk, data)) = row else {
            return Ok(None);
        };
        let found = decode_object(&model, &pk, &data)?;
        // a parent-only row is not an instance of a subclass
        if !self.registry.is_subclass(found.model(), &object.model) {
            return Ok(None);
        }
        Ok(Some(found))
    }

    fn related(&self, model: &ModelLabel, field: &str, pks: &[Pk]) -> Result<Vec<StoredObject>> {
        if pks.is_empty() {
            return Ok(Vec::new());
        }
        let models = self.registry.descendants(model);
        if models.is_empty() {
            return Err(KernelError::UnknownModel(model.clone()));
        }
        let sql = format!(
            "SELECT model, pk, data FROM objects
             WHERE model IN ({}) AND json_extract(data, ?) IN ({}) ORDER BY rowid",
            placeholders(models.len()),
            placeholders(pks.len())
        );
        let mut params: Vec<SqlValue> = models
            .iter()
            .map(|m| SqlValue::Text(m.to_string()))
            .collect();
        params.push(SqlValue::Text(json_path(field)));
        params.extend(pks.iter().map(pk_param));
        self.query_objects(&sql, params)
    }
}

impl ObjectLookup for SqliteStore {
    fn lookup(&self, model: &ModelLabel, pk: &Pk) -> Option<ObjectSummary> {
        match self.get(&ObjectRef::new(model.clone(), pk.clone())) {
            Ok(found) => found.map(|o| o.summary(&self.registry)),
            Err(e) => {
                debug!("lookup of {model} pk={pk} failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldDef, ModelDef};
    use serde_json::json;
    use tessera_types::OnDelete;

    fn label(s: &str) -> ModelLabel {
        ModelLabel::parse(s).unwrap()
    }

    fn store() -> SqliteStore {
        let mut registry = ModelRegistry::new();
        registry
            .register(
                ModelDef::new(label("core.page"))
                    .title_field("title")
                    .url_pattern("/pages/{pk}/")
                    .field(FieldDef::text("title"))
                    .field(FieldDef::rich_text("body")),
            )
            .unwrap();
        registry
            .register(ModelDef::new(label("tests.eventpage")).parent(label("core.page")))
            .unwrap();
        registry
            .register(
                ModelDef::new(label("tests.advert"))
                    .field(FieldDef::foreign_key("page", label("core.page"), OnDelete::Cascade)),
            )
            .unwrap();
        SqliteStore::in_memory(registry).unwrap()
    }

    #[test]
    fn test_insert_and_get_through_lineage() {
        let store = store();
        store
            .insert(&label("tests.eventpage"), 3, json!({"title": "Christmas"}))
            .unwrap();
        store.insert(&label("core.page"), 4, json!({"title": "Plain"})).unwrap();

        let via_base = store.get(&ObjectRef::new(label("core.page"), 3)).unwrap().unwrap();
        assert_eq!(via_base.model(), &label("tests.eventpage"));
        assert!(store.get(&ObjectRef::new(label("tests.eventpage"), 4)).unwrap().is_none());
        assert!(store.get(&ObjectRef::new(label("core.page"), 99)).unwrap().is_none());

        let summary = store.lookup(&label("core.page"), &Pk::Int(3)).unwrap();
        assert_eq!(summary.title, "Christmas");
        assert_eq!(summary.url.as_deref(), Some("/pages/3/"));
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let store = store();
        store.insert(&label("core.page"), 1, json!({})).unwrap();
        assert!(matches!(
            store.insert(&label("tests.eventpage"), 1, json!({})),
            Err(KernelError::Sqlite(_))
        ));
        assert!(matches!(
            store.insert(&label("core.page"), 2, json!("nope")),
            Err(KernelError::InvalidObject(_))
        ));
    }

    #[test]
    fn test_regex_filter() {
        let store = store();
        store
            .insert(&label("core.page"), 1, json!({"body": "<a linktype=\"page\" id=\"2\">x</a>"}))
            .unwrap();
        store.insert(&label("core.page"), 2, json!({"body": "plain"})).unwrap();
        store.insert(&label("tests.eventpage"), 3, json!({"title": "no body"})).unwrap();

        let found = store
            .filter(&label("core.page"), &Filter::regex("body", r#"linktype="page""#))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pk(), &Pk::Int(1));

        let either = Filter::regex("body", "plain").or(Filter::regex("title", "^no"));
        let found = store.filter(&label("core.page"), &either).unwrap();
        let pks: Vec<_> = found.iter().map(|o| o.pk().clone()).collect();
        assert_eq!(pks, vec![Pk::Int(2), Pk::Int(3)]);

        assert!(store.filter(&label("core.page"), &Filter::Or(Vec::new())).unwrap().is_empty());
        assert_eq!(store.all(&label("core.page")).unwrap().len(), 3);
        assert!(matches!(
            store.filter(&label("core.page"), &Filter::regex("body", "(")),
            Err(KernelError::Regex(_))
        ));
    }

    #[test]
    fn test_related_and_collect() {
        let store = store();
        let page = store.insert(&label("core.page"), 1, json!({"title": "Home"})).unwrap();
        store.insert(&label("tests.advert"), 10, json!({"page": 1})).unwrap();
        store.insert(&label("tests.advert"), 11, json!({"page": 2})).unwrap();

        let related = store.related(&label("tests.advert"), "page", &[Pk::Int(1)]).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].pk(), &Pk::Int(10));

        let collected = store.collect(&[page]).unwrap();
        assert_eq!(collected.cascade.len(), 1);
        assert_eq!(collected.cascade[0].children.len(), 1);
        assert!(collected.protected.is_empty());
    }

    #[test]
    fn test_update_and_delete() {
        let store = store();
        let mut page = store.insert(&label("core.page"), 1, json!({"title": "Old"})).unwrap();
        page.data.insert("title".into(), json!("New"));
        store.update(&page).unwrap();
        let reloaded = store.get(&page.object).unwrap().unwrap();
        assert_eq!(reloaded.text("title").as_deref(), Some("New"));
        assert!(store.delete(&page.object).unwrap());
        assert!(!store.delete(&page.object).unwrap());
    }

    #[test]
    fn test_open_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.db");
        {
            let store = SqliteStore::open(&path, store().registry().clone()).unwrap();
            store.insert(&label("core.page"), 1, json!({"title": "Kept"})).unwrap();
        }
        let store = SqliteStore::open(&path, store().registry().clone()).unwrap();
        assert_eq!(store.all(&label("core.page")).unwrap().len(), 1);
    }
}
