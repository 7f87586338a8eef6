use super::tokens::*;
use super::arena::Id;

/// Position to return to after a speculative parse. The node count lets the
/// parser discard nodes allocated during the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Checkpoint {
    pub(crate) token_index: u32,
    pub(crate) node_count: usize,
}

/// Forward-only view over a token buffer with explicit rewinding. Reading
/// past the final token keeps returning the `End` token.
pub(crate) struct TokenCursor {
    buffer: TokenBuffer,
    index: u32,
    end: TokenId,
}

impl TokenCursor {
    pub(crate) fn new(mut buffer: TokenBuffer) -> Self {
        let end = match buffer.iter().last() {
            Some((id, token)) if token.is(TokenKind::End) => id,
            _ => buffer.tokens.alloc(Token::new(TokenKind::End, "")),
        };
        Self { buffer, index: 0, end }
    }

    pub(crate) fn into_buffer(self) -> TokenBuffer {
        self.buffer
    }

    #[inline]
    fn current(&self) -> TokenId {
        if (self.index as usize) < self.buffer.len() {
            Id::new(self.index)
        } else {
            self.end
        }
    }

    pub(crate) fn token(&self, id: TokenId) -> &Token {
        &self.buffer[id]
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.buffer[self.current()]
    }

    pub(crate) fn peek_at(&self, ahead: u32) -> &Token {
        let index = self.index + ahead;
        if (index as usize) < self.buffer.len() {
            &self.buffer[Id::new(index)]
        } else {
            &self.buffer[self.end]
        }
    }

    #[inline]
    pub(crate) fn next_is(&self, kind: TokenKind) -> bool {
        self.peek().is(kind)
    }

    pub(crate) fn next_is_not(&self, kind: TokenKind) -> bool {
        !self.next_is(kind) && !self.at_end()
    }

    pub(crate) fn next_is_one_of(&self, kinds: &[TokenKind]) -> bool {
        kinds.iter().any(|k| self.next_is(*k))
    }

    pub(crate) fn next_is_sequence(&self, kinds: &[TokenKind]) -> bool {
        kinds.iter().enumerate().all(|(ahead, kind)| self.peek_at(ahead as u32).is(*kind))
    }

    pub(crate) fn next_is_text(&self, kind: TokenKind, text: &str) -> bool {
        let token = self.peek();
        token.is(kind) && token.text == text
    }

    /// True when the next token is of the given kind, possibly preceded by
    /// docs with their languages. Used to spot documented definitions.
    pub(crate) fn next_are_docs_then(&self, kind: TokenKind) -> bool {
        let mut ahead = 0;
        while self.peek_at(ahead).is(TokenKind::Docs) {
            ahead += 1;
            if self.peek_at(ahead).is(TokenKind::Language) {
                ahead += 1;
                if self.peek_at(ahead).is(TokenKind::Name) {
                    ahead += 1;
                }
            }
        }
        self.peek_at(ahead).is(kind)
    }

    pub(crate) fn next_lacks_preceding_space(&self) -> bool {
        !self.peek().preceding_space
    }

    pub(crate) fn next_has_preceding_line_break(&self) -> bool {
        self.peek().preceding_line_break
    }

    pub(crate) fn at_end(&self) -> bool {
        self.next_is(TokenKind::End)
    }

    /// Consumes the next token. The `End` token is never consumed, reading
    /// it again returns the same id.
    pub(crate) fn read(&mut self) -> TokenId {
        let id = self.current();
        if id != self.end {
            self.index += 1;
        }
        id
    }

    pub(crate) fn end(&self) -> TokenId {
        self.end
    }

    pub(crate) fn mark(&self, node_count: usize) -> Checkpoint {
        Checkpoint { token_index: self.index, node_count }
    }

    pub(crate) fn rewind(&mut self, checkpoint: Checkpoint) {
        self.index = checkpoint.token_index;
    }

    /// Consumes at least one token, then every token up to the next line
    /// break. Never consumes `End`.
    pub(crate) fn read_rest_of_line(&mut self) -> Vec<TokenId> {
        let mut tokens = Vec::new();
        while !self.at_end() {
            if !tokens.is_empty() && self.next_has_preceding_line_break() {
                break;
            }
            tokens.push(self.read());
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::tokenizer::tokenize;

    #[test]
    fn test_reading_past_end() {
        let mut cursor = TokenCursor::new(tokenize("a"));
        let a = cursor.read();
        assert_eq!(cursor.token(a).text, "a");
        let end = cursor.read();
        assert!(cursor.token(end).is(TokenKind::End));
        assert_eq!(cursor.read(), end);
        assert!(cursor.at_end());
    }

    #[test]
    fn test_mark_and_rewind() {
        let mut cursor = TokenCursor::new(tokenize("a: 1\nb"));
        let mark = cursor.mark(0);
        assert!(cursor.next_is_sequence(&[TokenKind::Name, TokenKind::Bind, TokenKind::Number]));
        let skipped = cursor.read_rest_of_line();
        assert_eq!(skipped.len(), 3);
        assert_eq!(cursor.peek().text, "b");
        cursor.rewind(mark);
        assert_eq!(cursor.peek().text, "a");
    }
}
