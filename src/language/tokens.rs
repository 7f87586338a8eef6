use super::arena::{Arena, Id};

/// Represents a particular kind of token. Tokens with a fixed spelling are
/// listed with their characters, the ASCII alternatives are accepted by the
/// tokenizer as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum TokenKind {
    // Variable-character tokens
    Name,           // identifier, any run of word characters
    Number,         // 12 or 1.5
    Text,           // "text", 'text', “text”, range includes the quotes
    TemplateOpen,   // "text \    opening part of a template
    TemplateBetween,// \ text \   part between two template expressions
    TemplateClose,  // \ text"    closing part of a template
    Docs,           // `docs`, range includes the backticks
    BinaryOp,       // + - × * · ÷ % ^ < > ≤ ≥ = ≠ ∧ & ∨
    UnaryOp,        // ¬ ~
    Boolean,        // ⊤ ⊥
    // Punctuation
    EvalOpen,       // (
    EvalClose,      // )
    ListOpen,       // [
    ListClose,      // ]
    SetOpen,        // {
    SetClose,       // }
    Bind,           // :
    Type,           // •
    Alias,          // ,
    Language,       // /
    Function,       // ƒ
    Convert,        // → or ->
    TypeVariable,   // ∘
    Conditional,    // ?
    Etc,            // … or ...
    Access,         // .
    None,           // !
    Borrow,         // ↓
    Share,          // ↑
    Stream,         // ∆
    Table,          // |
    Select,         // |?
    Insert,         // |+
    Update,         // |:
    Delete,         // |-
    MeasurementType,// #
    Placeholder,    // _
    // Anything the tokenizer could not classify
    Unknown,
    // Synthetic marker at the end of every token stream
    End,
}

impl TokenKind {
    /// Binary operators that may only appear between two operands.
    pub fn is_binary_op(&self) -> bool {
        *self == TokenKind::BinaryOp
    }

    pub fn is_text_part(&self) -> bool {
        match self {
            TokenKind::TemplateOpen | TokenKind::TemplateBetween | TokenKind::TemplateClose => true,
            _ => false,
        }
    }
}

pub type TokenId = Id<Token>;

/// A single lexical unit. The whitespace before a token is owned by that
/// token, so the concatenation of `space` and `text` over all tokens
/// reproduces the source exactly.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub space: String,
    pub preceding_space: bool,
    pub preceding_line_break: bool,
    pub offset: u32,
    pub length: u32,
}

impl Token {
    pub fn new(kind: TokenKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
            space: String::new(),
            preceding_space: false,
            preceding_line_break: false,
            offset: 0,
            length: text.chars().count() as u32,
        }
    }

    pub fn with_space(mut self, space: &str) -> Self {
        self.preceding_space = !space.is_empty();
        self.preceding_line_break = space.contains('\n');
        self.space = space.to_string();
        self
    }

    #[inline]
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Text between the delimiters of a text literal or template part.
    pub fn text_content(&self) -> &str {
        let mut chars = self.text.char_indices();
        let start = match chars.next() {
            Some((_, c)) => c.len_utf8(),
            None => return "",
        };
        let end = match self.text.char_indices().last() {
            Some((index, _)) if index >= start => index,
            _ => return "",
        };
        &self.text[start..end]
    }
}

#[derive(Debug)]
pub enum TokenCacheError {
    Encoding(bincode::Error),
    MissingEnd,
}
impl From<bincode::Error> for TokenCacheError {
    fn from(e: bincode::Error) -> Self {
        TokenCacheError::Encoding(e)
    }
}

/// The tokens of a single source, always terminated by an `End` token.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenBuffer {
    pub tokens: Arena<Token>,
}

impl TokenBuffer {
    pub(crate) fn new() -> Self {
        Self { tokens: Arena::new() }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &Token)> {
        self.tokens.iter()
    }

    /// Serializes the buffer so a caller can re-parse without tokenizing the
    /// text again.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TokenCacheError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TokenCacheError> {
        let buffer: TokenBuffer = bincode::deserialize(bytes)?;
        match buffer.tokens.iter().last() {
            Some((_, token)) if token.is(TokenKind::End) => Ok(buffer),
            _ => Err(TokenCacheError::MissingEnd),
        }
    }
}

impl core::ops::Index<TokenId> for TokenBuffer {
    type Output = Token;
    fn index(&self, id: TokenId) -> &Token {
        &self.tokens[id]
    }
}
