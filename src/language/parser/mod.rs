mod expressions;
mod types;

use crate::common::*;
use crate::language::ast::*;
use crate::language::cursor::{Checkpoint, TokenCursor};
use crate::language::tokens::TokenBuffer;

// Operator spellings the parser needs to tell apart within `BinaryOp`
pub(crate) const SYM_PRODUCT: &'static str = "·";
pub(crate) const SYM_POWER: &'static str = "^";
pub(crate) const SYM_UNION: &'static str = "∨";
pub(crate) const SYM_NEGATE: &'static str = "-";

#[inline]
pub(crate) fn tok(id: TokenId) -> Child {
    Child::Token(id)
}

#[inline]
pub(crate) fn node(id: NodeId) -> Child {
    Child::Node(id)
}

/// Recursive descent parser. Parsing never fails: whenever a production
/// cannot be completed the parser wraps what it consumed so far, plus the
/// remainder of the line, into an `Unparsable` node and carries on.
pub(crate) struct Parser {
    cursor: TokenCursor,
    nodes: Arena<Node>,
    /// Bind-or-expression decisions by the token index they were made at.
    bind_decisions: HashMap<u32, bool>,
}

impl Parser {
    pub(crate) fn new(tokens: TokenBuffer) -> Self {
        Self { cursor: TokenCursor::new(tokens), nodes: Arena::new(), bind_decisions: HashMap::new() }
    }

    /// Parses a whole program and hands back the heap holding it.
    pub(crate) fn parse(mut self) -> (Heap, NodeId) {
        let program = self.parse_program();
        let heap = Heap { tokens: self.cursor.into_buffer(), nodes: self.nodes };
        (heap, program)
    }

    //--------------------------------------------------------------------------
    // Utilities
    //--------------------------------------------------------------------------

    fn alloc(&mut self, node: impl Into<Node>) -> NodeId {
        self.nodes.alloc(node.into())
    }

    fn mark(&self) -> Checkpoint {
        self.cursor.mark(self.nodes.len())
    }

    fn rewind(&mut self, checkpoint: Checkpoint) {
        self.cursor.rewind(checkpoint);
        self.nodes.truncate(checkpoint.node_count);
    }

    /// Gives up on the current production. `before` holds whatever the
    /// production already consumed; the rest of the line is swallowed too.
    /// With nothing consumed yet at least one token is taken so parsing
    /// always advances.
    fn unparsable(&mut self, reason: UnparsableReason, before: Vec<Child>) -> NodeId {
        let mut parts = before;
        if parts.is_empty() {
            parts.extend(self.cursor.read_rest_of_line().into_iter().map(tok));
        } else {
            while !self.cursor.at_end() && !self.cursor.next_has_preceding_line_break() {
                parts.push(tok(self.cursor.read()));
            }
        }
        self.alloc(Unparsable { reason, parts })
    }

    fn is_unparsable(&self, id: NodeId) -> bool {
        self.nodes[id].is_unparsable()
    }

    fn count_unparsable(&self, root: NodeId) -> usize {
        let mut count = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.is_unparsable() {
                count += 1;
            }
            for child in node.children() {
                if let Child::Node(child) = child {
                    stack.push(child);
                }
            }
        }
        count
    }

    //--------------------------------------------------------------------------
    // Program, blocks and binds
    //--------------------------------------------------------------------------

    /// PROGRAM :: BORROW* BLOCK
    fn parse_program(&mut self) -> NodeId {
        let mut borrows = Vec::new();
        while self.cursor.next_is(TokenKind::Borrow) {
            borrows.push(self.parse_borrow());
        }
        let block = self.parse_block(true);
        let end = self.cursor.end();
        self.alloc(Program { borrows, block, end })
    }

    /// BORROW :: ↓ name number?
    fn parse_borrow(&mut self) -> NodeId {
        let borrow = self.cursor.read();
        if !self.cursor.next_is(TokenKind::Name) {
            return self.unparsable(UnparsableReason::ExpectedBorrowName, vec![tok(borrow)]);
        }
        let name = self.cursor.read();
        let version = if self.cursor.next_is(TokenKind::Number) && !self.cursor.next_has_preceding_line_break() {
            Some(self.cursor.read())
        } else {
            None
        };
        self.alloc(Borrow { borrow, name, version })
    }

    /// SHARE :: ↑ BIND
    fn parse_share(&mut self) -> NodeId {
        let share = self.cursor.read();
        let bind = self.parse_bind(true);
        self.alloc(Share { share, bind })
    }

    /// BLOCK :: DOCS? ( [SHARE|BIND|EXPRESSION]* )
    ///
    /// The root block of a program has no parentheses.
    pub(crate) fn parse_block(&mut self, root: bool) -> NodeId {
        let docs = self.parse_docs();

        let open = if root {
            None
        } else if self.cursor.next_is(TokenKind::EvalOpen) {
            Some(self.cursor.read())
        } else {
            let before = docs.into_iter().map(node).collect();
            return self.unparsable(UnparsableReason::ExpectedEvalOpen, before);
        };

        let mut statements = Vec::new();
        loop {
            if self.cursor.at_end() || (!root && self.cursor.next_is(TokenKind::EvalClose)) {
                break;
            }
            let statement = if self.cursor.next_is(TokenKind::Share) {
                self.parse_share()
            } else if self.next_is_bind() {
                self.parse_bind(true)
            } else {
                self.parse_expression()
            };
            statements.push(statement);
        }

        let close = if root {
            None
        } else if self.cursor.next_is(TokenKind::EvalClose) {
            Some(self.cursor.read())
        } else {
            let mut before: Vec<Child> = docs.into_iter().map(node).collect();
            before.extend(open.into_iter().map(tok));
            before.extend(statements.into_iter().map(node));
            return self.unparsable(UnparsableReason::ExpectedEvalClose, before);
        };

        self.alloc(Block { docs, open, statements, close })
    }

    /// Decides between a bind and an expression by parsing both from the
    /// same position. A bind wins if it has a type or a value and does not
    /// contain more unparsable nodes than the expression; ties go to the
    /// bind. Each position is decided once, so nested blocks do not parse
    /// their contents over and over.
    pub(crate) fn next_is_bind(&mut self) -> bool {
        if !self.next_could_start_bind() {
            return false;
        }

        let checkpoint = self.mark();
        if let Some(decided) = self.bind_decisions.get(&checkpoint.token_index) {
            return *decided;
        }
        let bind = self.parse_bind(true);
        let bind_is_complete = match &self.nodes[bind] {
            Node::Bind(b) => b.dot.is_some() || b.colon.is_some(),
            _ => false,
        };
        let bind_unparsable = self.count_unparsable(bind);
        self.rewind(checkpoint);

        let expression = self.parse_expression();
        let expression_unparsable = self.count_unparsable(expression);
        self.rewind(checkpoint);

        let decided = bind_is_complete && bind_unparsable <= expression_unparsable;
        self.bind_decisions.insert(checkpoint.token_index, decided);
        decided
    }

    /// Cheap lookahead: docs, an optional `…`, then a list of names with
    /// optional languages, followed by `•` or `:`.
    fn next_could_start_bind(&self) -> bool {
        let mut ahead = 0;
        let kind = |ahead: u32| self.cursor.peek_at(ahead).kind;
        while kind(ahead) == TokenKind::Docs {
            ahead += 1;
            if kind(ahead) == TokenKind::Language {
                ahead += 1;
                if kind(ahead) == TokenKind::Name {
                    ahead += 1;
                }
            }
        }
        if kind(ahead) == TokenKind::Etc {
            ahead += 1;
        }
        if kind(ahead) != TokenKind::Name {
            return false;
        }
        loop {
            ahead += 1;
            if kind(ahead) == TokenKind::Language && kind(ahead + 1) == TokenKind::Name {
                ahead += 2;
            }
            if kind(ahead) == TokenKind::Alias && kind(ahead + 1) == TokenKind::Name {
                ahead += 1;
                continue;
            }
            break;
        }
        match kind(ahead) {
            TokenKind::Type | TokenKind::Bind => true,
            _ => false,
        }
    }

    /// BIND :: DOCS? …? NAMES (• TYPE)? (: EXPRESSION)?
    pub(crate) fn parse_bind(&mut self, expect_value: bool) -> NodeId {
        let docs = self.parse_docs();
        let etc = if self.cursor.next_is(TokenKind::Etc) { Some(self.cursor.read()) } else { None };

        let names = match self.parse_names() {
            Some(names) => names,
            None => {
                let mut before: Vec<Child> = docs.into_iter().map(node).collect();
                before.extend(etc.into_iter().map(tok));
                return self.unparsable(UnparsableReason::ExpectedBindName, before);
            }
        };

        let mut dot = None;
        let mut ty = None;
        if self.cursor.next_is(TokenKind::Type) {
            dot = Some(self.cursor.read());
            ty = Some(self.parse_type());
        }

        let mut colon = None;
        let mut value = None;
        if expect_value && self.cursor.next_is(TokenKind::Bind) {
            colon = Some(self.cursor.read());
            value = Some(self.parse_expression());
        }

        self.alloc(Bind { docs, etc, names, dot, ty, colon, value })
    }

    /// NAMES :: name LANGUAGE? (, name LANGUAGE?)*
    pub(crate) fn parse_names(&mut self) -> Option<NodeId> {
        if !self.cursor.next_is(TokenKind::Name) {
            return None;
        }
        let mut names = Vec::new();
        loop {
            let separator = if names.is_empty() {
                None
            } else if self.cursor.next_is_sequence(&[TokenKind::Alias, TokenKind::Name]) {
                Some(self.cursor.read())
            } else {
                break;
            };
            let name = self.cursor.read();
            let language = if self.cursor.next_is(TokenKind::Language) {
                Some(self.parse_language())
            } else {
                None
            };
            names.push(self.alloc(Name { separator, name, language }));
        }
        Some(self.alloc(Names { names }))
    }

    /// LANGUAGE :: / name
    pub(crate) fn parse_language(&mut self) -> NodeId {
        let slash = self.cursor.read();
        let name = if self.cursor.next_is(TokenKind::Name) && self.cursor.next_lacks_preceding_space() {
            Some(self.cursor.read())
        } else {
            None
        };
        self.alloc(Language { slash, name })
    }

    /// DOCS :: (doc LANGUAGE?)*
    pub(crate) fn parse_docs(&mut self) -> Option<NodeId> {
        let mut docs = Vec::new();
        while self.cursor.next_is(TokenKind::Docs) {
            let text = self.cursor.read();
            let language = if self.cursor.next_is(TokenKind::Language) {
                Some(self.parse_language())
            } else {
                None
            };
            docs.push(self.alloc(Doc { text, language }));
        }
        if docs.is_empty() {
            None
        } else {
            Some(self.alloc(Docs { docs }))
        }
    }
}
