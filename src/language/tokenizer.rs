use lazy_static::lazy_static;

use super::tokens::*;
use crate::common::*;

lazy_static! {
    /// Every fixed-spelling token. The tokenizer tries the longest spelling
    /// first, so `|?` wins over `|` and `->` wins over `-`.
    static ref SYMBOLS: HashMap<&'static str, TokenKind> = hashmap! {
        "(" => TokenKind::EvalOpen,
        ")" => TokenKind::EvalClose,
        "[" => TokenKind::ListOpen,
        "]" => TokenKind::ListClose,
        "{" => TokenKind::SetOpen,
        "}" => TokenKind::SetClose,
        ":" => TokenKind::Bind,
        "•" => TokenKind::Type,
        "," => TokenKind::Alias,
        "/" => TokenKind::Language,
        "ƒ" => TokenKind::Function,
        "→" => TokenKind::Convert,
        "->" => TokenKind::Convert,
        "∘" => TokenKind::TypeVariable,
        "?" => TokenKind::Conditional,
        "…" => TokenKind::Etc,
        "..." => TokenKind::Etc,
        "." => TokenKind::Access,
        "!" => TokenKind::None,
        "↓" => TokenKind::Borrow,
        "↑" => TokenKind::Share,
        "∆" => TokenKind::Stream,
        "|" => TokenKind::Table,
        "|?" => TokenKind::Select,
        "|+" => TokenKind::Insert,
        "|:" => TokenKind::Update,
        "|-" => TokenKind::Delete,
        "#" => TokenKind::MeasurementType,
        "+" => TokenKind::BinaryOp,
        "-" => TokenKind::BinaryOp,
        "×" => TokenKind::BinaryOp,
        "*" => TokenKind::BinaryOp,
        "·" => TokenKind::BinaryOp,
        "÷" => TokenKind::BinaryOp,
        "%" => TokenKind::BinaryOp,
        "^" => TokenKind::BinaryOp,
        "<" => TokenKind::BinaryOp,
        ">" => TokenKind::BinaryOp,
        "≤" => TokenKind::BinaryOp,
        "<=" => TokenKind::BinaryOp,
        "≥" => TokenKind::BinaryOp,
        ">=" => TokenKind::BinaryOp,
        "=" => TokenKind::BinaryOp,
        "≠" => TokenKind::BinaryOp,
        "!=" => TokenKind::BinaryOp,
        "∧" => TokenKind::BinaryOp,
        "&" => TokenKind::BinaryOp,
        "∨" => TokenKind::BinaryOp,
        "¬" => TokenKind::UnaryOp,
        "~" => TokenKind::UnaryOp,
        "⊤" => TokenKind::Boolean,
        "⊥" => TokenKind::Boolean,
    };

    /// First characters of all symbols, plus the characters that open
    /// texts, docs and template parts. A name never contains one of these.
    static ref RESERVED: HashSet<char> = {
        let mut reserved: HashSet<char> = SYMBOLS.keys().filter_map(|s| s.chars().next()).collect();
        reserved.extend(['"', '\'', '“', '”', '`', '\\'].iter().copied());
        reserved
    };
}

const TEMPLATE_SEPARATOR: char = '\\';

fn closing_quote(c: char) -> Option<char> {
    match c {
        '"' => Some('"'),
        '\'' => Some('\''),
        '“' => Some('”'),
        _ => None,
    }
}

#[inline]
fn is_whitespace(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\n' || c == '\r'
}

#[inline]
fn is_name_start(c: char) -> bool {
    !is_whitespace(c) && !RESERVED.contains(&c) && !c.is_ascii_digit()
        && (c.is_alphabetic() || c == '_' || !c.is_ascii())
}

#[inline]
fn is_name_continue(c: char) -> bool {
    !is_whitespace(c) && !RESERVED.contains(&c)
        && (c.is_alphanumeric() || c == '_' || !c.is_ascii())
}

/// Tokenizer turns text into a `TokenBuffer`. It never fails: characters it
/// cannot classify become `Unknown` tokens, and the buffer always ends with
/// an `End` token carrying the trailing whitespace.
pub(crate) struct PassTokenizer {
    source: Vec<char>,
    pos: usize,
    // Closing quote characters of the templates we are currently inside of.
    template_stack: Vec<char>,
}

impl PassTokenizer {
    pub(crate) fn new(text: &str) -> Self {
        Self { source: text.chars().collect(), pos: 0, template_stack: Vec::new() }
    }

    pub(crate) fn tokenize(mut self) -> TokenBuffer {
        let mut target = TokenBuffer::new();

        loop {
            let space_start = self.pos;
            while let Some(c) = self.peek(0) {
                if !is_whitespace(c) {
                    break;
                }
                self.pos += 1;
            }
            let space: String = self.source[space_start..self.pos].iter().collect();

            let start = self.pos;
            let c = match self.peek(0) {
                Some(c) => c,
                None => {
                    self.push(&mut target, TokenKind::End, start, &space);
                    break;
                }
            };

            let kind = if c == TEMPLATE_SEPARATOR && !self.template_stack.is_empty() {
                self.consume_template_continuation()
            } else if let Some(close) = closing_quote(c) {
                self.consume_text(close)
            } else if c == '`' {
                self.consume_docs()
            } else if c.is_ascii_digit() {
                self.consume_number()
            } else if let Some(kind) = self.consume_symbol() {
                kind
            } else if is_name_start(c) {
                self.consume_name()
            } else {
                self.pos += 1;
                TokenKind::Unknown
            };
            self.push(&mut target, kind, start, &space);
        }

        target
    }

    fn push(&self, target: &mut TokenBuffer, kind: TokenKind, start: usize, space: &str) {
        let text: String = self.source[start..self.pos].iter().collect();
        let mut token = Token::new(kind, &text).with_space(space);
        token.offset = start as u32;
        target.tokens.alloc(token);
    }

    #[inline]
    fn peek(&self, ahead: usize) -> Option<char> {
        self.source.get(self.pos + ahead).copied()
    }

    fn consume_symbol(&mut self) -> Option<TokenKind> {
        for length in (1..=3).rev() {
            if self.pos + length > self.source.len() {
                continue;
            }
            let candidate: String = self.source[self.pos..self.pos + length].iter().collect();
            if let Some(kind) = SYMBOLS.get(candidate.as_str()) {
                self.pos += length;
                return Some(*kind);
            }
        }
        None
    }

    fn consume_number(&mut self) -> TokenKind {
        while matches!(self.peek(0), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek(0) == Some('.') && matches!(self.peek(1), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
            while matches!(self.peek(0), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        TokenKind::Number
    }

    fn consume_name(&mut self) -> TokenKind {
        let start = self.pos;
        self.pos += 1;
        while matches!(self.peek(0), Some(c) if is_name_continue(c)) {
            self.pos += 1;
        }
        if self.pos - start == 1 && self.source[start] == '_' {
            TokenKind::Placeholder
        } else {
            TokenKind::Name
        }
    }

    fn consume_docs(&mut self) -> TokenKind {
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            self.pos += 1;
            if c == '`' {
                return TokenKind::Docs;
            }
        }
        TokenKind::Unknown
    }

    /// Reads a text literal or the opening part of a template. Unterminated
    /// texts stop at the end of the line and are not classified.
    fn consume_text(&mut self, close: char) -> TokenKind {
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                return TokenKind::Unknown;
            }
            self.pos += 1;
            if c == close {
                return TokenKind::Text;
            }
            if c == TEMPLATE_SEPARATOR {
                self.template_stack.push(close);
                return TokenKind::TemplateOpen;
            }
        }
        TokenKind::Unknown
    }

    fn consume_template_continuation(&mut self) -> TokenKind {
        let close = match self.template_stack.last() {
            Some(close) => *close,
            None => return TokenKind::Unknown,
        };
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.pos += 1;
            if c == TEMPLATE_SEPARATOR {
                return TokenKind::TemplateBetween;
            }
            if c == close {
                self.template_stack.pop();
                return TokenKind::TemplateClose;
            }
        }
        self.template_stack.pop();
        TokenKind::Unknown
    }
}

/// Tokenizes the given text.
pub fn tokenize(text: &str) -> TokenBuffer {
    PassTokenizer::new(text).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).iter().map(|(_, t)| t.kind).collect()
    }

    #[test]
    fn test_symbols_prefer_longest_spelling() {
        assert_eq!(
            kinds("a |? b |- c -> d"),
            vec![
                TokenKind::Name, TokenKind::Select, TokenKind::Name, TokenKind::Delete,
                TokenKind::Name, TokenKind::Convert, TokenKind::Name, TokenKind::End
            ]
        );
        assert_eq!(kinds("1 != 2"), vec![TokenKind::Number, TokenKind::BinaryOp, TokenKind::Number, TokenKind::End]);
    }

    #[test]
    fn test_spacing_flags() {
        let buffer = tokenize("1m\n  + 2");
        let tokens: Vec<&Token> = buffer.iter().map(|(_, t)| t).collect();
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[1].kind, TokenKind::Name);
        assert!(!tokens[1].preceding_space);
        assert!(tokens[2].preceding_space && tokens[2].preceding_line_break);
        assert_eq!(tokens[2].space, "\n  ");
        assert!(tokens[3].preceding_space && !tokens[3].preceding_line_break);
        assert_eq!(tokens[3].offset, 7);
    }

    #[test]
    fn test_templates() {
        assert_eq!(
            kinds("\"a \\1 + 2\\ b \\x\\ c\""),
            vec![
                TokenKind::TemplateOpen, TokenKind::Number, TokenKind::BinaryOp, TokenKind::Number,
                TokenKind::TemplateBetween, TokenKind::Name, TokenKind::TemplateClose, TokenKind::End
            ]
        );
    }

    #[test]
    fn test_totality() {
        let buffer = tokenize("@ $ \"open");
        let kinds: Vec<TokenKind> = buffer.iter().map(|(_, t)| t.kind).collect();
        assert_eq!(kinds, vec![TokenKind::Unknown, TokenKind::Unknown, TokenKind::Unknown, TokenKind::End]);
        assert_eq!(tokenize("").len(), 1);
    }

    #[test]
    fn test_names_and_placeholders() {
        assert_eq!(kinds("_ _x x1 ƒ"), vec![
            TokenKind::Placeholder, TokenKind::Name, TokenKind::Name, TokenKind::Function, TokenKind::End
        ]);
    }
}
