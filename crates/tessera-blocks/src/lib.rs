//! Block schema engine for Tessera.
//!
//! A block is a typed node in a content schema: a leaf field (text, number,
//! date, rich text, choice), a container (struct, list, stream), a static
//! placeholder or a chooser that refers to another stored object. One block
//! tree describes how a piece of JSON content is converted to native values,
//! validated, rendered, edited in a form and indexed for search.
//!
//! Blocks are immutable handles. Builder methods return modified copies, and
//! children are named by their container when it is constructed.
//!
//! # Key Types
//!
//! |---------------------|---------------------------------------------------|
//! | Type                | Purpose                                           |
//! |---------------------|---------------------------------------------------|
//! | [`Block`]           | A schema node (cheap to clone)                    |
//! | [`BlockKind`]       | The closed set of block variants                  |
//! | [`BlockClass`]      | Reusable declaration with inheritance             |
//! | [`BlockSpec`]       | Block tree declared as JSON or TOML               |
//! | [`Value`]           | A native value produced by `to_python`            |
//! | [`StructValue`]     | Ordered child values of a struct block            |
//! | [`StreamValue`]     | Lazily converted sequence of typed children       |
//! | [`Context`]         | Render-time variables, templates and lookups      |
//! | [`ValidationError`] | Nested clean errors, addressable per child        |
//! | [`CheckMessage`]    | A schema lint finding                             |
//! |---------------------|---------------------------------------------------|

pub mod block;
pub mod check;
pub mod chooser;
pub mod class;
pub mod context;
pub mod error;
pub mod field;
pub mod form;
pub mod list_block;
pub mod meta;
pub mod schema;
pub mod static_block;
pub mod stream_block;
pub mod struct_block;
pub mod value;

pub use block::{ApiFn, Block, BlockKind, ChildBlocks, ValidatorFn};
pub use check::{CheckMessage, INVALID_NAME, check_name};
pub use chooser::{ChooserBlock, ChooserKind};
pub use class::BlockClass;
pub use context::{Context, TemplateArgs, TemplateFn, TemplateRegistry, templates};
pub use error::{ErrorKey, Result, SchemaError, ValidationError};
pub use field::{ChoiceEntry, Choices, FieldBlock, FieldKind, REQUIRED_MESSAGE};
pub use form::FormData;
pub use list_block::ListBlock;
pub use meta::{BlockCount, DefaultValue, MetaOptions, label_from_name};
pub use schema::{BlockSpec, ChoiceSpec, SpecMeta, block_from_json};
pub use static_block::StaticBlock;
pub use stream_block::{StreamBlock, StreamChild, StreamValue};
pub use struct_block::{BoundBlock, StructBlock, StructValue};
pub use value::{ImageValue, Value};
