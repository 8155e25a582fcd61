//! Log action registry.
//!
//! Actions are namespaced strings (`tessera.edit`) with a label for filters
//! and a message for log listings. Registration normally happens in hooks,
//! run once the first time the registry is read. Log entries are written to
//! whichever [`LogEntryModel`] is registered for the object's model or its
//! nearest ancestor.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tessera_types::{ModelLabel, ObjectRef};
use tracing::{debug, trace};

use crate::error::Result;
use crate::models::ModelRegistry;
use crate::sqlite::SqliteStore;
use crate::store::StoredObject;

/// One recorded action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub object: ObjectRef,
    /// Object title when the action happened.
    pub label: String,
    pub action: String,
    pub actor: Option<String>,
    pub data: JsonValue,
    pub timestamp: DateTime<Utc>,
}

/// Message or comment for an action.
#[derive(Clone)]
pub enum LogMessage {
    Static(String),
    /// Built from the whole entry.
    Entry(Arc<dyn Fn(&LogEntry) -> String + Send + Sync>),
    /// Built from the entry's data only.
    Data(Arc<dyn Fn(&JsonValue) -> String + Send + Sync>),
}

impl LogMessage {
    pub fn from_entry<F>(f: F) -> Self
    where
        F: Fn(&LogEntry) -> String + Send + Sync + 'static,
    {
        LogMessage::Entry(Arc::new(f))
    }

    pub fn from_data<F>(f: F) -> Self
    where
        F: Fn(&JsonValue) -> String + Send + Sync + 'static,
    {
        LogMessage::Data(Arc::new(f))
    }

    pub fn format(&self, entry: &LogEntry) -> String {
        match self {
            LogMessage::Static(s) => s.clone(),
            LogMessage::Entry(f) => f(entry),
            LogMessage::Data(f) => f(&entry.data),
        }
    }
}

impl From<&str> for LogMessage {
    fn from(s: &str) -> Self {
        LogMessage::Static(s.to_string())
    }
}

impl From<String> for LogMessage {
    fn from(s: String) -> Self {
        LogMessage::Static(s)
    }
}

impl fmt::Debug for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogMessage::Static(s) => write!(f, "Static({s:?})"),
            LogMessage::Entry(_) => f.write_str("Entry(<fn>)"),
            LogMessage::Data(_) => f.write_str("Data(<fn>)"),
        }
    }
}

/// Storage for log entries of some set of models.
pub trait LogEntryModel: Send + Sync {
    /// Distinguishes this model's entries from other log entry models.
    fn name(&self) -> &str;

    fn log_action(&self, entry: LogEntry) -> Result<LogEntry>;

    /// Entries for `object`, oldest first.
    fn for_instance(&self, object: &ObjectRef) -> Result<Vec<LogEntry>>;
}

/// Log entries kept in the content store's `log_entries` table.
pub struct SqliteLogEntries {
    store: Arc<SqliteStore>,
    name: String,
}

impl SqliteLogEntries {
    pub fn new(store: Arc<SqliteStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }
}

impl LogEntryModel for SqliteLogEntries {
    fn name(&self) -> &str {
        &self.name
    }

    fn log_action(&self, entry: LogEntry) -> Result<LogEntry> {
        self.store.insert_log_entry(&self.name, entry)
    }

    fn for_instance(&self, object: &ObjectRef) -> Result<Vec<LogEntry>> {
        self.store.log_entries_for(&self.name, object)
    }
}

// ============================================================================
// Log context
// ============================================================================

thread_local! {
    static ACTIVE: RefCell<Option<LogContext>> = const { RefCell::new(None) };
}

/// Who is acting, for log entries written without an explicit actor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogContext {
    pub actor: Option<String>,
}

impl LogContext {
    pub fn new(actor: Option<String>) -> Self {
        Self { actor }
    }

    /// Make a context with `actor` active on this thread until the guard drops.
    pub fn activate(actor: impl Into<String>) -> LogContextGuard {
        Self::new(Some(actor.into())).enter()
    }

    pub fn enter(self) -> LogContextGuard {
        let previous = ACTIVE.with(|active| active.replace(Some(self)));
        LogContextGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    /// The active context, or an empty one.
    pub fn active() -> LogContext {
        ACTIVE.with(|active| active.borrow().clone()).unwrap_or_default()
    }
}

/// Restores the previously active context on drop.
#[must_use = "the context is deactivated when the guard is dropped"]
pub struct LogContextGuard {
    previous: Option<LogContext>,
    // the guard must drop on the thread that entered
    _not_send: PhantomData<*const ()>,
}

impl Drop for LogContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|active| *active.borrow_mut() = previous);
    }
}

// ============================================================================
// Registry
// ============================================================================

pub type RegistrationHook = Arc<dyn Fn(&LogActionRegistry) + Send + Sync>;

#[derive(Clone, Debug)]
struct ActionDef {
    label: String,
    message: LogMessage,
    comment: Option<LogMessage>,
}

#[derive(Default)]
struct RegistryState {
    scanned: bool,
    hooks: Vec<RegistrationHook>,
    actions: IndexMap<String, ActionDef>,
    choices: Vec<(String, String)>,
    models: IndexMap<ModelLabel, Arc<dyn LogEntryModel>>,
}

#[derive(Default)]
pub struct LogActionRegistry {
    state: RwLock<RegistryState>,
}

impl LogActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration hook. Hooks run once, on the first read.
    pub fn add_hook<F>(&self, hook: F)
    where
        F: Fn(&LogActionRegistry) + Send + Sync + 'static,
    {
        self.state.write().hooks.push(Arc::new(hook));
    }

    /// Run registration hooks if they have not run yet.
    pub fn scan_for_actions(&self) {
        let hooks = {
            let mut state = self.state.write();
            if state.scanned {
                return;
            }
            state.scanned = true;
            state.hooks.clone()
        };
        debug!(hooks = hooks.len(), "scanning for log actions");
        for hook in hooks {
            hook(self);
        }
    }

    pub fn register_action(
        &self,
        action: impl Into<String>,
        label: impl Into<String>,
        message: impl Into<LogMessage>,
        comment: Option<LogMessage>,
    ) {
        let action = action.into();
        let label = label.into();
        let mut state = self.state.write();
        state.choices.push((action.clone(), label.clone()));
        state.actions.insert(
            action,
            ActionDef {
                label,
                message: message.into(),
                comment,
            },
        );
    }

    /// Registered action names, in registration order.
    pub fn get_actions(&self) -> Vec<String> {
        self.scan_for_actions();
        self.state.read().actions.keys().cloned().collect()
    }

    /// `(action, label)` pairs for filter choices.
    pub fn get_choices(&self) -> Vec<(String, String)> {
        self.scan_for_actions();
        self.state.read().choices.clone()
    }

    pub fn get_action_label(&self, action: &str) -> Option<String> {
        self.scan_for_actions();
        self.state.read().actions.get(action).map(|a| a.label.clone())
    }

    /// The action's message for `entry`, or `"Unknown <action>"`.
    pub fn format_message(&self, entry: &LogEntry) -> String {
        self.scan_for_actions();
        let message = self
            .state
            .read()
            .actions
            .get(&entry.action)
            .map(|a| a.message.clone());
        match message {
            Some(message) => message.format(entry),
            None => format!("Unknown {}", entry.action),
        }
    }

    /// The action's comment for `entry`, empty when it has none.
    pub fn format_comment(&self, entry: &LogEntry) -> String {
        self.scan_for_actions();
        let comment = self
            .state
            .read()
            .actions
            .get(&entry.action)
            .and_then(|a| a.comment.clone());
        comment.map(|c| c.format(entry)).unwrap_or_default()
    }

    /// Store log entries for `model` and its subclasses in `log_model`.
    pub fn register_model(&self, model: ModelLabel, log_model: Arc<dyn LogEntryModel>) {
        self.state.write().models.insert(model, log_model);
    }

    /// Distinct log entry models, by name.
    pub fn get_log_entry_models(&self) -> Vec<Arc<dyn LogEntryModel>> {
        self.scan_for_actions();
        let state = self.state.read();
        let mut seen = IndexMap::new();
        for model in state.models.values() {
            seen.entry(model.name().to_string())
                .or_insert_with(|| Arc::clone(model));
        }
        seen.into_values().collect()
    }

    /// The log entry model for `model`, found along its parent chain.
    pub fn log_model_for_model(
        &self,
        models: &ModelRegistry,
        model: &ModelLabel,
    ) -> Option<Arc<dyn LogEntryModel>> {
        let state = self.state.read();
        models
            .lineage(model)
            .iter()
            .find_map(|m| state.models.get(m).cloned())
    }

    /// Record `action` on `instance`. Without an explicit actor the active
    /// [`LogContext`]'s actor is used. Returns `None` when no log entry
    /// model covers the instance's model.
    pub fn log(
        &self,
        models: &ModelRegistry,
        instance: &StoredObject,
        action: &str,
        actor: Option<&str>,
        data: JsonValue,
    ) -> Result<Option<LogEntry>> {
        self.scan_for_actions();
        let Some(log_model) = self.log_model_for_model(models, instance.model()) else {
            trace!(model = %instance.model(), action, "no log entry model");
            return Ok(None);
        };
        let actor = actor
            .map(str::to_string)
            .or_else(|| LogContext::active().actor);
        let entry = LogEntry {
            id: 0,
            object: instance.object.clone(),
            label: instance.title(models),
            action: action.to_string(),
            actor,
            data,
            timestamp: Utc::now(),
        };
        debug!(object = %entry.object, action, "logging action");
        log_model.log_action(entry).map(Some)
    }

    /// Log entries for `instance`, empty when its model has no log entry model.
    pub fn logs_for_instance(&self, models: &ModelRegistry, instance: &ObjectRef) -> Result<Vec<LogEntry>> {
        match self.log_model_for_model(models, &instance.model) {
            Some(log_model) => log_model.for_instance(instance),
            None => Ok(Vec::new()),
        }
    }

    /// Forget actions and models and allow hooks to run again. Hooks stay
    /// registered.
    pub fn reset(&self) {
        let mut state = self.state.write();
        let hooks = std::mem::take(&mut state.hooks);
        *state = RegistryState {
            hooks,
            ..RegistryState::default()
        };
    }
}

static REGISTRY: LazyLock<LogActionRegistry> = LazyLock::new(|| {
    let registry = LogActionRegistry::new();
    registry.add_hook(register_core_actions);
    registry
});

/// The process-wide registry, with the core actions hooked in.
pub fn registry() -> &'static LogActionRegistry {
    &REGISTRY
}

/// Log through the process-wide registry.
pub fn log(
    models: &ModelRegistry,
    instance: &StoredObject,
    action: &str,
    actor: Option<&str>,
    data: JsonValue,
) -> Result<Option<LogEntry>> {
    registry().log(models, instance, action, actor, data)
}

fn data_str<'a>(data: &'a JsonValue, pointer: &str) -> &'a str {
    data.pointer(pointer).and_then(JsonValue::as_str).unwrap_or_default()
}

/// Actions every installation knows.
pub fn register_core_actions(registry: &LogActionRegistry) {
    registry.register_action("tessera.create", "Create", "Created", None);
    registry.register_action("tessera.edit", "Save draft", "Draft saved", None);
    registry.register_action("tessera.delete", "Delete", "Deleted", None);
    registry.register_action("tessera.publish", "Publish", "Published", None);
    registry.register_action("tessera.unpublish", "Unpublish", "Unpublished", None);
    registry.register_action("tessera.lock", "Lock", "Locked", None);
    registry.register_action("tessera.unlock", "Unlock", "Unlocked", None);
    registry.register_action(
        "tessera.rename",
        "Rename",
        LogMessage::from_data(|data| {
            format!(
                "Renamed from '{}' to '{}'",
                data_str(data, "/title/old"),
                data_str(data, "/title/new")
            )
        }),
        None,
    );
    registry.register_action(
        "tessera.copy",
        "Copy",
        LogMessage::from_data(|data| {
            format!(
                "Copied from '{}' to '{}'",
                data_str(data, "/source/title"),
                data_str(data, "/destination/title")
            )
        }),
        None,
    );
    registry.register_action(
        "tessera.move",
        "Move",
        LogMessage::from_data(|data| {
            format!(
                "Moved from '{}' to '{}'",
                data_str(data, "/source/title"),
                data_str(data, "/destination/title")
            )
        }),
        None,
    );
    registry.register_action(
        "tessera.workflow.reject",
        "Workflow: reject",
        "Changes requested",
        Some(LogMessage::from_data(|data| {
            data_str(data, "/comment").to_string()
        })),
    );
}
