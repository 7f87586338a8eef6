#[macro_use]
pub mod ast;
pub mod arena;
pub mod ast_printer;
pub mod conflicts;
pub mod context;
pub mod cursor;
pub mod eval;
mod parser;
pub mod tokenizer;
pub mod tokens;
pub mod types;
pub mod typing;

#[cfg(test)]
mod tests;

use crate::common::*;
use ast::EditError;
use parser::Parser;
use tokens::{TokenBuffer, TokenCacheError};

/// A named program together with the heap holding its tree. The tree is
/// never mutated: revising a source allocates new ancestors next to the
/// old ones and moves `program` to the new root.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub heap: Heap,
    pub program: NodeId,
}

impl Source {
    pub fn new(name: &str, text: &str) -> Self {
        Self::from_tokens(name, tokenizer::tokenize(text))
    }

    /// Parses a token buffer produced earlier, possibly restored from the
    /// token cache.
    pub fn from_tokens(name: &str, tokens: TokenBuffer) -> Self {
        let (heap, program) = Parser::new(tokens).parse();
        Self { name: name.to_string(), heap, program }
    }

    /// Restores a source from bytes written by `cache_tokens`.
    pub fn from_cached_tokens(name: &str, bytes: &[u8]) -> Result<Self, TokenCacheError> {
        Ok(Self::from_tokens(name, TokenBuffer::from_bytes(bytes)?))
    }

    pub fn cache_tokens(&self) -> Result<Vec<u8>, TokenCacheError> {
        self.heap.tokens.to_bytes()
    }

    /// The source text, rebuilt from the tokens of the current tree.
    pub fn text(&self) -> String {
        ast_printer::print_source(&self.heap, self.program)
    }

    /// Replaces `original` in the current tree by `replacement`, which must
    /// already be allocated on this source's heap. Returns the previous root.
    pub fn revise(&mut self, original: NodeId, replacement: NodeId) -> Result<NodeId, EditError> {
        let root = self.heap.clone_with_replacement(self.program, original, replacement)?;
        Ok(std::mem::replace(&mut self.program, root))
    }
}

/// Tokenizes and parses `text`. Never fails: malformed regions end up in
/// unparsable nodes.
pub fn parse(text: &str) -> Source {
    Source::new("main", text)
}
