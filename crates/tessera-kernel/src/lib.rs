//! # tessera-kernel
//!
//! Models, storage and reference tracking for Tessera.
//!
//! The kernel knows which models exist and how their fields refer to each
//! other, stores objects as JSON rows, and answers "what uses this object?"
//! across foreign keys, rich text links and stream field choosers. It also
//! owns the action log.
//!
//! # Key Types
//!
//! |----------------------------------|--------------------------------------------|
//! | Type                             | Purpose                                    |
//! |----------------------------------|--------------------------------------------|
//! | [`ModelRegistry`]                | Models, inheritance and field relations    |
//! | [`ContentStore`]                 | Persistence boundary, cascade collection   |
//! | [`SqliteStore`]                  | rusqlite-backed content store              |
//! | [`ModelRichTextCollector`]       | Rich text references of one model          |
//! | [`ModelStreamFieldsCollector`]   | Stream field references of one model       |
//! | [`Use`]                          | One object referring to a deleted object   |
//! | [`UsagePage`]                    | Paginated visible uses                     |
//! | [`LogActionRegistry`]            | Log actions, messages and entry models     |
//! | [`LogContext`]                   | Ambient actor for log entries              |
//! | [`Revision`]                     | Saved content, source for log backfills    |
//! | [`TesseraConfig`]                | TOML configuration                         |
//! |----------------------------------|--------------------------------------------|

pub mod admin_urls;
pub mod collector;
pub mod config;
pub mod error;
pub mod log_actions;
pub mod models;
pub mod revisions;
pub mod sqlite;
pub mod store;
pub mod uses;

pub use admin_urls::{AdminUrlFinder, AdminUrlFinders, PatternUrlFinder};
pub use collector::{
    AnyHandler, ModelRichTextCollector, ModelStreamFieldsCollector, StreamFieldCollector,
    is_reference_block, model_handlers,
};
pub use config::{DatabaseConfig, DbVendor, FieldConfig, ModelConfig, PaginationConfig, TesseraConfig};
pub use error::{KernelError, Result};
pub use log_actions::{
    LogActionRegistry, LogContext, LogContextGuard, LogEntry, LogEntryModel, LogMessage,
    SqliteLogEntries, log, register_core_actions, registry,
};
pub use models::{FieldDef, FieldKind, ModelDef, ModelRegistry, Relation};
pub use revisions::{BackfillReport, Revision, create_log_entries_from_revisions};
pub use sqlite::SqliteStore;
pub use store::{CascadeNode, Collected, ContentStore, FieldUpdate, Filter, StoredObject};
pub use uses::{Use, UsagePage, get_all_uses, get_paginated_uses};
