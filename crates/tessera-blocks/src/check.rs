//! Schema lint: invalid child block names.

use std::fmt;

use crate::block::{Block, BlockKind};

pub const INVALID_NAME: &str = "tessera.E001";

/// One problem found in a block tree.
#[derive(Clone, Debug)]
pub struct CheckMessage {
    pub id: &'static str,
    pub msg: String,
    pub hint: &'static str,
    /// Names from the checked block down to the offending one.
    pub path: Vec<String>,
    /// The offending block.
    pub block: Block,
}

impl fmt::Display for CheckMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ({}) {}", self.path.join("."), self.id, self.msg)?;
        if !self.hint.is_empty() {
            write!(f, "\n\tHINT: {}", self.hint)?;
        }
        Ok(())
    }
}

/// Problems with a block's name. Every rule that fails is reported.
pub fn check_name(name: &str) -> Vec<&'static str> {
    let mut hints = Vec::new();
    if name.is_empty() {
        hints.push("Block name cannot be empty");
    }
    if name.contains(' ') {
        hints.push("Block names cannot contain spaces");
    }
    if name.contains('-') {
        hints.push("Block names cannot contain dashes");
    }
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        hints.push("Block names cannot begin with a digit");
    }
    hints
}

pub(crate) fn check_block(block: &Block) -> Vec<CheckMessage> {
    let mut messages = Vec::new();
    walk(block, &mut Vec::new(), &mut messages);
    messages
}

fn walk(block: &Block, path: &mut Vec<String>, out: &mut Vec<CheckMessage>) {
    match block.kind() {
        BlockKind::Struct(_) | BlockKind::Stream(_) => {
            let Some(children) = block.child_blocks() else {
                return;
            };
            for (name, child) in children {
                path.push(name.clone());
                // nested problems come before the child's own name
                walk(child, path, out);
                for hint in check_name(name) {
                    out.push(CheckMessage {
                        id: INVALID_NAME,
                        msg: format!("Block name \"{name}\" is invalid"),
                        hint,
                        path: path.clone(),
                        block: child.clone(),
                    });
                }
                path.pop();
            }
        }
        // list children are anonymous; only their contents are checked
        BlockKind::List(list) => walk(&list.child, path, out),
        BlockKind::Field(_) | BlockKind::Static(_) | BlockKind::Chooser(_) => {}
    }
}
