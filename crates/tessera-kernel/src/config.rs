//! TOML configuration.
//!
//! ```toml
//! [database]
//! path = "tessera.db"
//! vendor = "sqlite"
//!
//! [pagination]
//! per_page = 20
//!
//! [[models]]
//! label = "core.page"
//! title_field = "title"
//! url_pattern = "/pages/{pk}/"
//! admin_url = "/admin/pages/{pk}/edit/"
//! fields = [
//!     { name = "title", kind = "text" },
//!     { name = "body", kind = "rich_text" },
//! ]
//!
//! [[models]]
//! label = "tests.advert"
//! fields = [
//!     { name = "page", kind = "foreign_key", to = "core.page", on_delete = "set_null" },
//!     { name = "content", kind = "stream", schema = { type = "stream", children = { page = { type = "page_chooser" } } } },
//! ]
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::EnumString;
use tessera_blocks::BlockSpec;
use tessera_types::{ModelLabel, OnDelete};
use tracing::debug;

use crate::admin_urls::{AdminUrlFinders, PatternUrlFinder};
use crate::error::Result;
use crate::models::{FieldDef, FieldKind, ModelDef, ModelRegistry};

/// Database backend. Selects the regex dialect of prefilter patterns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum DbVendor {
    #[default]
    Sqlite,
    Postgresql,
    Mysql,
}

impl DbVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbVendor::Sqlite => "sqlite",
            DbVendor::Postgresql => "postgresql",
            DbVendor::Mysql => "mysql",
        }
    }

    /// Whitespace class in this backend's regex syntax.
    pub fn space_class(&self) -> &'static str {
        match self {
            DbVendor::Mysql => "[[:space:]]",
            DbVendor::Sqlite | DbVendor::Postgresql => r"\s",
        }
    }
}

impl fmt::Display for DbVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// In-memory when unset.
    pub path: Option<PathBuf>,
    pub vendor: DbVendor,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub per_page: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { per_page: 20 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldConfig {
    Text {
        name: String,
        #[serde(default)]
        verbose_name: Option<String>,
    },
    RichText {
        name: String,
        #[serde(default)]
        verbose_name: Option<String>,
    },
    Stream {
        name: String,
        #[serde(default)]
        verbose_name: Option<String>,
        schema: BlockSpec,
    },
    ForeignKey {
        name: String,
        #[serde(default)]
        verbose_name: Option<String>,
        to: ModelLabel,
        #[serde(default)]
        on_delete: OnDelete,
    },
    ParentalKey {
        name: String,
        #[serde(default)]
        verbose_name: Option<String>,
        to: ModelLabel,
    },
    ParentalManyToMany {
        name: String,
        #[serde(default)]
        verbose_name: Option<String>,
        to: ModelLabel,
    },
}

impl FieldConfig {
    fn build(&self) -> Result<FieldDef> {
        let (name, verbose_name, kind) = match self {
            FieldConfig::Text { name, verbose_name } => (name, verbose_name, FieldKind::Text),
            FieldConfig::RichText { name, verbose_name } => {
                (name, verbose_name, FieldKind::RichText)
            }
            FieldConfig::Stream {
                name,
                verbose_name,
                schema,
            } => (name, verbose_name, FieldKind::Stream(schema.build()?)),
            FieldConfig::ForeignKey {
                name,
                verbose_name,
                to,
                on_delete,
            } => (
                name,
                verbose_name,
                FieldKind::ForeignKey {
                    to: to.clone(),
                    on_delete: *on_delete,
                },
            ),
            FieldConfig::ParentalKey {
                name,
                verbose_name,
                to,
            } => (name, verbose_name, FieldKind::ParentalKey { to: to.clone() }),
            FieldConfig::ParentalManyToMany {
                name,
                verbose_name,
                to,
            } => (
                name,
                verbose_name,
                FieldKind::ParentalManyToMany { to: to.clone() },
            ),
        };
        let field = FieldDef::new(name.as_str(), kind);
        Ok(match verbose_name {
            Some(v) => field.verbose_name(v.as_str()),
            None => field,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    pub label: ModelLabel,
    #[serde(default)]
    pub parent: Option<ModelLabel>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub verbose_name: Option<String>,
    #[serde(default = "default_true")]
    pub shown_in_uses: bool,
    #[serde(default)]
    pub tag_item: bool,
    #[serde(default)]
    pub title_field: Option<String>,
    #[serde(default)]
    pub url_pattern: Option<String>,
    /// Admin edit URL with `{pk}`, used for links in usage reports.
    #[serde(default)]
    pub admin_url: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

fn default_true() -> bool {
    true
}

impl ModelConfig {
    fn build(&self) -> Result<ModelDef> {
        let mut model = ModelDef::new(self.label.clone());
        model.parent = self.parent.clone();
        model.is_abstract = self.is_abstract;
        if let Some(v) = &self.verbose_name {
            model.verbose_name = v.clone();
        }
        model.shown_in_uses = self.shown_in_uses;
        model.tag_item = self.tag_item;
        model.title_field = self.title_field.clone();
        model.url_pattern = self.url_pattern.clone();
        model.fields = self
            .fields
            .iter()
            .map(FieldConfig::build)
            .collect::<Result<_>>()?;
        Ok(model)
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    pub database: DatabaseConfig,
    pub pagination: PaginationConfig,
    pub models: Vec<ModelConfig>,
}

impl TesseraConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading config");
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Build the model registry. Models must be listed after their parents.
    pub fn build_registry(&self) -> Result<ModelRegistry> {
        let mut registry = ModelRegistry::new();
        for model in &self.models {
            registry.register(model.build()?)?;
        }
        Ok(registry)
    }

    /// Edit URL finders for models declaring an `admin_url`.
    pub fn admin_url_finders(&self) -> AdminUrlFinders {
        let finders = AdminUrlFinders::new();
        for model in &self.models {
            if let Some(pattern) = &model.admin_url {
                finders.register(model.label.clone(), Arc::new(PatternUrlFinder::new(pattern.as_str())));
            }
        }
        finders
    }
}
