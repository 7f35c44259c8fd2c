//! Token types for the Nix expression language.
//!
//! Tokens are the output of the lexer and input to the parser.

use crate::span::Span;

/// A token from lexical analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// The type and value of this token.
    pub kind: TokenKind,
    /// Source location of this token.
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns the text this token covers in the given source.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.text(source)
    }

    /// Returns true if this token can begin an argument in a function
    /// application.
    #[must_use]
    pub const fn starts_argument(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Ident(_)
                | TokenKind::Str(_)
                | TokenKind::IndStr(_)
                | TokenKind::Path(_)
                | TokenKind::SearchPath(_)
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::Rec
        )
    }
}

/// A piece of a string literal as seen by the lexer.
#[derive(Clone, Debug, PartialEq)]
pub enum StrSegment {
    /// Literal text with escapes already resolved.
    Literal(String),
    /// `${ ... }`; the byte range and position of the inner expression.
    Interpolation {
        /// Byte offset of the first character after `${`.
        start: usize,
        /// Byte offset of the closing `}`.
        end: usize,
        /// Line of `start`.
        line: u32,
        /// Column of `start`.
        column: u32,
    },
}

/// Token types for the Nix expression language.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Delimiters
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `${` outside a string, used for dynamic attribute names
    DollarBrace,

    // Literals
    /// Integer literal like `42`
    Int(i64),
    /// Float literal like `3.14`
    Float(f64),
    /// Double-quoted string
    Str(Vec<StrSegment>),
    /// Indented `''` string, indentation already stripped
    IndStr(Vec<StrSegment>),
    /// Path literal like `./foo` or `/etc`
    Path(String),
    /// Search path like `<nixpkgs>`, without the brackets
    SearchPath(String),
    /// Identifier like `foo` or `foldl'`
    Ident(String),

    // Keywords
    /// `let`
    Let,
    /// `in`
    In,
    /// `rec`
    Rec,
    /// `with`
    With,
    /// `inherit`
    Inherit,
    /// `if`
    If,
    /// `then`
    Then,
    /// `else`
    Else,
    /// `assert`
    Assert,
    /// `or`
    OrKw,

    // Punctuation
    /// `;`
    Semicolon,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `...`
    Ellipsis,
    /// `@`
    At,
    /// `?`
    Question,
    /// `=`
    Assign,

    // Operators
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `++`
    Concat,
    /// `//`
    Update,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `->`
    Implies,
    /// `!`
    Not,

    /// `# ...` or `/* ... */`
    Comment(String),
    /// End of input
    Eof,
    /// Lexical error
    Error {
        /// Description of the problem.
        message: String,
        /// Whether the error was caused by running out of input.
        at_end: bool,
    },
}

impl TokenKind {
    /// Returns the keyword token for an identifier, if it is one.
    #[must_use]
    pub fn keyword(text: &str) -> Option<Self> {
        Some(match text {
            "let" => Self::Let,
            "in" => Self::In,
            "rec" => Self::Rec,
            "with" => Self::With,
            "inherit" => Self::Inherit,
            "if" => Self::If,
            "then" => Self::Then,
            "else" => Self::Else,
            "assert" => Self::Assert,
            "or" => Self::OrKw,
            _ => return None,
        })
    }

    /// Returns a human-readable name for error messages.
    #[must_use]
    pub fn name(&self) -> String {
        let fixed = match self {
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::LBracket => "'['",
            Self::RBracket => "']'",
            Self::LBrace => "'{'",
            Self::RBrace => "'}'",
            Self::DollarBrace => "'${'",
            Self::Int(n) => return format!("integer {n}"),
            Self::Float(n) => return format!("float {n}"),
            Self::Str(_) | Self::IndStr(_) => "string",
            Self::Path(p) => return format!("path '{p}'"),
            Self::SearchPath(p) => return format!("path '<{p}>'"),
            Self::Ident(name) => return format!("identifier '{name}'"),
            Self::Let => "'let'",
            Self::In => "'in'",
            Self::Rec => "'rec'",
            Self::With => "'with'",
            Self::Inherit => "'inherit'",
            Self::If => "'if'",
            Self::Then => "'then'",
            Self::Else => "'else'",
            Self::Assert => "'assert'",
            Self::OrKw => "'or'",
            Self::Semicolon => "';'",
            Self::Colon => "':'",
            Self::Comma => "','",
            Self::Dot => "'.'",
            Self::Ellipsis => "'...'",
            Self::At => "'@'",
            Self::Question => "'?'",
            Self::Assign => "'='",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::Concat => "'++'",
            Self::Update => "'//'",
            Self::Eq => "'=='",
            Self::NotEq => "'!='",
            Self::Lt => "'<'",
            Self::LtEq => "'<='",
            Self::Gt => "'>'",
            Self::GtEq => "'>='",
            Self::And => "'&&'",
            Self::Or => "'||'",
            Self::Implies => "'->'",
            Self::Not => "'!'",
            Self::Comment(_) => "comment",
            Self::Eof => "end of file",
            Self::Error { message, .. } => return message.clone(),
        };
        fixed.to_string()
    }

    /// Returns true if this token is trivia (comments).
    #[must_use]
    pub const fn is_trivia(&self) -> bool {
        matches!(self, Self::Comment(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_recognized() {
        assert_eq!(TokenKind::keyword("let"), Some(TokenKind::Let));
        assert_eq!(TokenKind::keyword("or"), Some(TokenKind::OrKw));
        assert_eq!(TokenKind::keyword("lettuce"), None);
    }

    #[test]
    fn names_for_messages() {
        assert_eq!(TokenKind::Semicolon.name(), "';'");
        assert_eq!(TokenKind::Eof.name(), "end of file");
        assert_eq!(TokenKind::Ident("x".into()).name(), "identifier 'x'");
    }

    #[test]
    fn argument_starters() {
        let span = Span::at_start();
        assert!(Token::new(TokenKind::Ident("x".into()), span).starts_argument());
        assert!(Token::new(TokenKind::LBrace, span).starts_argument());
        assert!(!Token::new(TokenKind::Minus, span).starts_argument());
        assert!(!Token::new(TokenKind::Semicolon, span).starts_argument());
    }
}
