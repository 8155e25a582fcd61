//! Reusable block classes with inheritance.
//!
//! A [`BlockClass`] is a named declaration: some bases, its own children and
//! its own options. Root classes wrap a prototype [`Block`] that supplies the
//! variant. Building a class resolves its bases with the C3 linearization
//! and merges, once:
//!
//! - children in reverse resolution order, so bases contribute before
//!   subclasses, and a redeclared name is replaced where it first appeared;
//! - options in resolution order, the first class to set an option winning,
//!   with the prototype's options last.
//!
//! Constructor overrides passed to [`BlockClass::instantiate`] beat every
//! class-level option. Extra constructor children go after inherited ones.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::block::{Block, BlockKind, name_children};
use crate::error::{Result, SchemaError};
use crate::meta::MetaOptions;
use crate::stream_block::StreamBlock;
use crate::struct_block::StructBlock;

#[derive(Clone)]
struct ClassDef {
    name: String,
    bases: Vec<BlockClass>,
    prototype: Option<Block>,
    children: Vec<(String, Block)>,
    meta: MetaOptions,
}

#[derive(Clone)]
pub struct BlockClass {
    def: Arc<ClassDef>,
}

impl BlockClass {
    /// A root class for `prototype`'s variant. A container prototype's
    /// children become the class's own children.
    pub fn base(name: impl Into<String>, prototype: Block) -> Self {
        let children = prototype
            .child_blocks()
            .map(|c| c.iter().map(|(n, b)| (n.clone(), b.clone())).collect())
            .unwrap_or_default();
        Self {
            def: Arc::new(ClassDef {
                name: name.into(),
                bases: Vec::new(),
                prototype: Some(prototype),
                children,
                meta: MetaOptions::default(),
            }),
        }
    }

    /// A subclass of `bases`, listed in declaration order.
    pub fn derive(name: impl Into<String>, bases: impl IntoIterator<Item = BlockClass>) -> Self {
        Self {
            def: Arc::new(ClassDef {
                name: name.into(),
                bases: bases.into_iter().collect(),
                prototype: None,
                children: Vec::new(),
                meta: MetaOptions::default(),
            }),
        }
    }

    pub fn child(mut self, name: impl Into<String>, block: Block) -> Self {
        Arc::make_mut(&mut self.def).children.push((name.into(), block));
        self
    }

    pub fn meta(mut self, meta: MetaOptions) -> Self {
        Arc::make_mut(&mut self.def).meta = meta;
        self
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn ptr_eq(&self, other: &BlockClass) -> bool {
        Arc::ptr_eq(&self.def, &other.def)
    }

    /// C3 linearization, starting with this class.
    pub fn mro(&self) -> Result<Vec<BlockClass>> {
        let mut sequences = self
            .def
            .bases
            .iter()
            .map(BlockClass::mro)
            .collect::<Result<Vec<_>>>()?;
        sequences.push(self.def.bases.clone());

        let mut order = vec![self.clone()];
        loop {
            sequences.retain(|s| !s.is_empty());
            if sequences.is_empty() {
                return Ok(order);
            }
            // first head that appears in no tail
            let head = sequences
                .iter()
                .map(|s| &s[0])
                .find(|candidate| {
                    !sequences
                        .iter()
                        .any(|s| s[1..].iter().any(|c| c.ptr_eq(candidate)))
                })
                .cloned()
                .ok_or_else(|| SchemaError::InconsistentMro(self.def.name.clone()))?;
            for s in sequences.iter_mut() {
                if s[0].ptr_eq(&head) {
                    s.remove(0);
                }
            }
            order.push(head);
        }
    }

    pub fn build(&self) -> Result<Block> {
        self.instantiate(&MetaOptions::default(), Vec::<(String, Block)>::new())
    }

    pub fn instantiate<S: Into<String>>(
        &self,
        overrides: &MetaOptions,
        extra_children: impl IntoIterator<Item = (S, Block)>,
    ) -> Result<Block> {
        let mro = self.mro()?;
        let prototype = mro
            .iter()
            .find_map(|class| class.def.prototype.clone())
            .ok_or_else(|| SchemaError::NoBaseBlock(self.def.name.clone()))?;

        let mut children: IndexMap<String, Block> = IndexMap::new();
        for class in mro.iter().rev() {
            for (name, block) in &class.def.children {
                children.insert(name.clone(), block.clone());
            }
        }
        for (name, block) in extra_children {
            children.insert(name.into(), block);
        }

        let mut meta = MetaOptions::default();
        for class in &mro {
            meta.merge_missing(&class.def.meta);
        }
        meta.merge_missing(prototype.meta());

        let kind = match prototype.kind() {
            BlockKind::Struct(_) => BlockKind::Struct(StructBlock::new(name_children(children))),
            BlockKind::Stream(_) => BlockKind::Stream(StreamBlock::new(name_children(children))),
            _ if !children.is_empty() => {
                return Err(SchemaError::UnexpectedChildren(self.def.name.clone()));
            }
            other => other.clone(),
        };

        Ok(prototype
            .with_kind(kind)
            .with_meta(meta)
            .with_overrides(overrides))
    }
}

impl fmt::Debug for BlockClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bases: Vec<&str> = self.def.bases.iter().map(BlockClass::name).collect();
        f.debug_struct("BlockClass")
            .field("name", &self.def.name)
            .field("bases", &bases)
            .field("children", &self.def.children.len())
            .finish()
    }
}
