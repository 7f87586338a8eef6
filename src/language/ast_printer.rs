use std::fmt::Display;
use std::io::Write as IOWrite;

use super::ast::*;

const INDENT: usize = 2;

const PREFIX_NODE_ID: &'static str = "Node";
const PREFIX_TOKEN_ID: &'static str = "Tok ";

/// Reproduces the text of the tree rooted at `root` from its tokens and the
/// whitespace recorded in front of each of them.
pub fn print_source(heap: &Heap, root: NodeId) -> String {
    let mut result = String::new();
    for token in heap.leaves(root) {
        let token = heap.token(token);
        result.push_str(&token.space);
        result.push_str(&token.text);
    }
    result
}

struct KV<'a> {
    buffer: &'a mut String,
    prefix: Option<(&'static str, u32)>,
    indent: usize,
    temp_key: &'a mut String,
    temp_val: &'a mut String,
}

impl<'a> KV<'a> {
    fn new(buffer: &'a mut String, temp_key: &'a mut String, temp_val: &'a mut String, indent: usize) -> Self {
        temp_key.clear();
        temp_val.clear();
        KV{
            buffer,
            prefix: None,
            indent,
            temp_key,
            temp_val
        }
    }

    fn with_id(mut self, prefix: &'static str, id: u32) -> Self {
        self.prefix = Some((prefix, id));
        self
    }

    fn with_s_key(self, key: &str) -> Self {
        self.temp_key.push_str(key);
        self
    }

    fn with_disp_val<D: Display>(self, val: &D) -> Self {
        self.temp_val.push_str(&format!("{}", val));
        self
    }

    fn with_debug_val<D: std::fmt::Debug>(self, val: &D) -> Self {
        self.temp_val.push_str(&format!("{:?}", val));
        self
    }
}

impl<'a> Drop for KV<'a> {
    fn drop(&mut self) {
        if let Some((prefix, id)) = &self.prefix {
            self.buffer.push_str(&format!("{}[{:04}]", prefix, id));
        } else {
            self.buffer.push_str("          ");
        }

        for _ in 0..self.indent * INDENT {
            self.buffer.push(' ');
        }

        self.buffer.push_str("- ");
        self.buffer.push_str(self.temp_key);
        if self.temp_val.is_empty() {
            self.buffer.push(':');
        } else {
            self.buffer.push_str(": ");
            self.buffer.push_str(&self.temp_val);
        }
        self.buffer.push('\n');
    }
}

/// Writes an indented outline of a tree, one line per node, field and
/// token. Used when a test fails to show what the parser produced.
pub(crate) struct ASTWriter {
    buffer: String,
    temp1: String,
    temp2: String,
}

impl ASTWriter {
    pub(crate) fn new() -> Self {
        Self{
            buffer: String::with_capacity(4096),
            temp1: String::with_capacity(256),
            temp2: String::with_capacity(256),
        }
    }

    pub(crate) fn write_ast<W: IOWrite>(&mut self, w: &mut W, heap: &Heap, root: NodeId) -> std::io::Result<()> {
        self.write_node(heap, root, 0);
        w.write_all(self.buffer.as_bytes())?;
        self.buffer.clear();
        Ok(())
    }

    pub(crate) fn to_string(mut self, heap: &Heap, root: NodeId) -> String {
        self.write_node(heap, root, 0);
        self.buffer
    }

    fn write_node(&mut self, heap: &Heap, id: NodeId, indent: usize) {
        let node = &heap[id];
        if let Node::Unparsable(unparsable) = node {
            self.kv(indent).with_id(PREFIX_NODE_ID, id.index())
                .with_s_key(node.kind_name())
                .with_disp_val(&unparsable.reason);
        } else {
            self.kv(indent).with_id(PREFIX_NODE_ID, id.index())
                .with_s_key(node.kind_name());
        }

        for field in node.fields() {
            if field.children.is_empty() {
                continue;
            }
            self.kv(indent + 1).with_s_key(field.name);
            for child in field.children {
                match child {
                    Child::Node(child) => self.write_node(heap, child, indent + 2),
                    Child::Token(token) => {
                        let token = heap.token(token);
                        self.kv(indent + 2)
                            .with_id(PREFIX_TOKEN_ID, token.offset)
                            .with_debug_val(&token.kind)
                            .with_s_key(&token.text);
                    }
                }
            }
        }
    }

    fn kv(&mut self, indent: usize) -> KV {
        KV::new(&mut self.buffer, &mut self.temp1, &mut self.temp2, indent)
    }
}
