/// A lexed token: its kind, the exact matched text and the source line.
///
/// The executor re-tokenizes fragments (echo strings, condition and
/// assignment expressions) at run time, so tokens own their text instead of
/// borrowing from the source buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    /// `{name}` placeholder inside an echo string; `text` holds the bare name.
    BracedIdentifier,
    /// Quoted string literal; `text` keeps the surrounding quotes.
    String,
    Number,

    // Keywords (code mode only)
    If,
    Elif,
    Else,
    Fi,
    While,
    EndWhile,
    For,
    EndFor,
    Break,
    Continue,
    Echo,
    Input,

    // Operators
    Equivalent,    // ==
    NotEquivalent, // !=
    GreaterEqual,  // >=
    LessEqual,     // <=
    Greater,       // >
    Less,          // <
    Equal,         // =
    PlusEqual,     // +=
    MinusEqual,    // -=
    StarEqual,     // *=
    SlashEqual,    // /=
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Ampersand,
    Pipe,
    Bang,

    // Delimiters
    LParen,
    RParen,
    Semicolon,

    // Structural
    Newline,
    /// Whitespace, kept only in fragment mode.
    Space,
    /// Anything unrecognized, kept only in fragment mode.
    Unknown,
}

impl TokenKind {
    /// Binary operators the expression evaluator folds.
    pub fn is_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Equivalent
                | TokenKind::NotEquivalent
                | TokenKind::GreaterEqual
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::Less
                | TokenKind::Equal
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::Caret
                | TokenKind::Ampersand
                | TokenKind::Pipe
                | TokenKind::Bang
        )
    }

    pub fn is_assignment_op(self) -> bool {
        matches!(
            self,
            TokenKind::Equal
                | TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::SlashEqual
        )
    }
}
