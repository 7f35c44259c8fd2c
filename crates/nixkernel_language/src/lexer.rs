//! Lexer for the Nix expression language.
//!
//! The lexer converts source text into a stream of tokens. String literals
//! are scanned whole; interpolations inside them are recorded as byte ranges
//! that the parser re-enters.

use crate::span::{SourceId, Span};
use crate::token::{StrSegment, Token, TokenKind};

/// Deepest nesting of strings inside `${ ... }` the lexer accepts.
const MAX_INTERPOLATION_DEPTH: usize = 64;

/// Lexer for Nix source code.
#[derive(Clone)]
pub struct Lexer<'src> {
    /// Source text being tokenized.
    source: &'src str,
    /// Remaining source text.
    rest: &'src str,
    /// Current byte offset in source.
    position: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    column: u32,
    /// Source the produced spans belong to.
    source_id: SourceId,
    /// Interpolations currently being scanned.
    interpolation_depth: usize,
}

/// Piece of an indented string before indentation stripping.
enum IndPiece {
    Text(String),
    Escaped(String),
    Interpolation(StrSegment),
}

impl<'src> Lexer<'src> {
    /// Creates a new lexer for the given source.
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            rest: source,
            position: 0,
            line: 1,
            column: 1,
            source_id: SourceId::INTERACTIVE,
            interpolation_depth: 0,
        }
    }

    /// Creates a lexer over `source[start..end]` that reports absolute
    /// positions.
    #[must_use]
    pub fn with_range(source: &'src str, start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            source,
            rest: &source[start..end],
            position: start,
            line,
            column,
            source_id: SourceId::INTERACTIVE,
            interpolation_depth: 0,
        }
    }

    /// Attributes produced spans to the given source.
    #[must_use]
    pub const fn with_source_id(mut self, source_id: SourceId) -> Self {
        self.source_id = source_id;
        self
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;

        let Some(c) = self.peek_char() else {
            return Token::new(
                TokenKind::Eof,
                Span::new(start, start, start_line, start_column).in_source(self.source_id),
            );
        };

        let kind = match c {
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            ';' => self.single(TokenKind::Semicolon),
            ':' => self.single(TokenKind::Colon),
            ',' => self.single(TokenKind::Comma),
            '@' => self.single(TokenKind::At),
            '?' => self.single(TokenKind::Question),
            '*' => self.single(TokenKind::Star),
            '#' => self.scan_line_comment(),
            '"' => self.scan_string(),
            '\'' if self.rest.starts_with("''") => self.scan_ind_string(),
            '<' => self.scan_angle(),
            '$' if self.rest.starts_with("${") => self.double(TokenKind::DollarBrace),
            '/' if self.rest.starts_with("/*") => self.scan_block_comment(),
            c if is_path_start(c) && self.path_len().is_some() => self.scan_path(),
            c if c.is_ascii_digit() => self.scan_number(),
            '.' => {
                if self.rest.starts_with("...") {
                    self.advance_n(3);
                    TokenKind::Ellipsis
                } else if self.peek_char_n(1).is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_number()
                } else {
                    self.single(TokenKind::Dot)
                }
            }
            c if is_ident_start(c) => self.scan_ident(),
            '+' => self.one_or_two('+', TokenKind::Concat, TokenKind::Plus),
            '-' => self.one_or_two('>', TokenKind::Implies, TokenKind::Minus),
            '/' => self.one_or_two('/', TokenKind::Update, TokenKind::Slash),
            '=' => self.one_or_two('=', TokenKind::Eq, TokenKind::Assign),
            '!' => self.one_or_two('=', TokenKind::NotEq, TokenKind::Not),
            '>' => self.one_or_two('=', TokenKind::GtEq, TokenKind::Gt),
            '&' if self.rest.starts_with("&&") => self.double(TokenKind::And),
            '|' if self.rest.starts_with("||") => self.double(TokenKind::Or),
            c => {
                self.advance();
                TokenKind::Error {
                    message: format!("unexpected character '{c}'"),
                    at_end: false,
                }
            }
        };

        Token::new(
            kind,
            Span::new(start, self.position, start_line, start_column).in_source(self.source_id),
        )
    }

    /// Tokenizes all source and returns a vector of tokens.
    ///
    /// Comments are included in the output.
    #[must_use]
    pub fn tokenize_all(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Peeks at the next character without consuming it.
    fn peek_char(&self) -> Option<char> {
        self.rest.chars().next()
    }

    /// Peeks `n` characters ahead.
    fn peek_char_n(&self, n: usize) -> Option<char> {
        self.rest.chars().nth(n)
    }

    /// Advances past the next character.
    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            let len = c.len_utf8();
            self.rest = &self.rest[len..];
            self.position += len;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.advance_n(2);
        kind
    }

    fn one_or_two(&mut self, second: char, two: TokenKind, one: TokenKind) -> TokenKind {
        if self.peek_char_n(1) == Some(second) {
            self.double(two)
        } else {
            self.single(one)
        }
    }

    /// Skips whitespace characters.
    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    /// Scans a comment starting with `#`.
    fn scan_line_comment(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.advance();
        }
        TokenKind::Comment(text)
    }

    /// Scans a `/* ... */` comment.
    fn scan_block_comment(&mut self) -> TokenKind {
        let start = self.position;
        self.advance_n(2);
        loop {
            if self.rest.starts_with("*/") {
                self.advance_n(2);
                return TokenKind::Comment(self.source[start..self.position].to_string());
            }
            if self.rest.is_empty() {
                return TokenKind::Error {
                    message: "unterminated comment".into(),
                    at_end: true,
                };
            }
            self.advance();
        }
    }

    /// Scans a `"..."` string literal.
    fn scan_string(&mut self) -> TokenKind {
        self.advance(); // consume opening '"'
        let mut segments = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek_char() {
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let Some(escaped) = self.peek_char() else {
                        return unterminated("string");
                    };
                    self.advance();
                    text.push(unescape(escaped));
                }
                Some('$') if self.rest.starts_with("${") => {
                    if !text.is_empty() {
                        segments.push(StrSegment::Literal(std::mem::take(&mut text)));
                    }
                    match self.scan_interpolation() {
                        Ok(segment) => segments.push(segment),
                        Err(kind) => return kind,
                    }
                }
                Some('$') if self.rest.starts_with("$$") => {
                    self.advance_n(2);
                    text.push_str("$$");
                }
                Some(c) => {
                    self.advance();
                    text.push(c);
                }
                None => return unterminated("string"),
            }
        }
        if !text.is_empty() || segments.is_empty() {
            segments.push(StrSegment::Literal(text));
        }
        TokenKind::Str(segments)
    }

    /// Scans a `''...''` indented string literal.
    fn scan_ind_string(&mut self) -> TokenKind {
        self.advance_n(2);
        let mut pieces = Vec::new();
        let mut text = String::new();
        loop {
            if self.rest.starts_with("'''") {
                self.advance_n(3);
                flush_text(&mut pieces, &mut text);
                pieces.push(IndPiece::Escaped("''".into()));
            } else if self.rest.starts_with("''$") {
                self.advance_n(3);
                flush_text(&mut pieces, &mut text);
                pieces.push(IndPiece::Escaped("$".into()));
            } else if self.rest.starts_with("''\\") {
                self.advance_n(3);
                let Some(escaped) = self.peek_char() else {
                    return unterminated("string");
                };
                self.advance();
                flush_text(&mut pieces, &mut text);
                pieces.push(IndPiece::Escaped(unescape(escaped).to_string()));
            } else if self.rest.starts_with("''") {
                self.advance_n(2);
                break;
            } else if self.rest.starts_with("${") {
                flush_text(&mut pieces, &mut text);
                match self.scan_interpolation() {
                    Ok(segment) => pieces.push(IndPiece::Interpolation(segment)),
                    Err(kind) => return kind,
                }
            } else if self.rest.starts_with("$$") {
                self.advance_n(2);
                text.push_str("$$");
            } else if let Some(c) = self.peek_char() {
                self.advance();
                text.push(c);
            } else {
                return unterminated("string");
            }
        }
        flush_text(&mut pieces, &mut text);
        TokenKind::IndStr(strip_indentation(pieces))
    }

    /// Scans the body of `${ ... }` after the opening `${`, returning the
    /// byte range of the inner expression.
    fn scan_interpolation(&mut self) -> Result<StrSegment, TokenKind> {
        if self.interpolation_depth >= MAX_INTERPOLATION_DEPTH {
            return Err(TokenKind::Error {
                message: "string interpolation is nested too deeply".to_string(),
                at_end: false,
            });
        }
        self.interpolation_depth += 1;
        let segment = self.scan_interpolation_body();
        self.interpolation_depth -= 1;
        segment
    }

    fn scan_interpolation_body(&mut self) -> Result<StrSegment, TokenKind> {
        self.advance_n(2);
        let start = self.position;
        let line = self.line;
        let column = self.column;
        let mut depth = 0usize;
        loop {
            let token = self.next_token();
            match token.kind {
                TokenKind::LBrace | TokenKind::DollarBrace => depth += 1,
                TokenKind::RBrace if depth == 0 => {
                    return Ok(StrSegment::Interpolation {
                        start,
                        end: token.span.start,
                        line,
                        column,
                    });
                }
                TokenKind::RBrace => depth -= 1,
                TokenKind::Eof => return Err(unterminated("interpolation")),
                TokenKind::Error { message, at_end } => {
                    return Err(TokenKind::Error { message, at_end });
                }
                _ => {}
            }
        }
    }

    /// Returns the byte length of the path literal at the cursor, if any.
    fn path_len(&self) -> Option<usize> {
        let bytes = self.rest.as_bytes();
        let mut i = 0;
        if bytes.first() == Some(&b'~') {
            i = 1;
        } else {
            while i < bytes.len() && is_path_byte(bytes[i]) {
                i += 1;
            }
        }
        let mut segments = 0;
        while i + 1 < bytes.len() && bytes[i] == b'/' && is_path_byte(bytes[i + 1]) {
            i += 1;
            while i < bytes.len() && is_path_byte(bytes[i]) {
                i += 1;
            }
            segments += 1;
        }
        (segments > 0).then_some(i)
    }

    /// Scans a path literal.
    fn scan_path(&mut self) -> TokenKind {
        let len = self.path_len().unwrap_or(0);
        let text = self.rest[..len].to_string();
        self.advance_n(text.chars().count());
        TokenKind::Path(text)
    }

    /// Scans `<nixpkgs>`, `<=` or `<`.
    fn scan_angle(&mut self) -> TokenKind {
        let bytes = self.rest.as_bytes();
        let mut i = 1;
        while i < bytes.len() && (is_path_byte(bytes[i]) || bytes[i] == b'/') {
            i += 1;
        }
        if i > 1 && bytes.get(i) == Some(&b'>') && bytes[1] != b'/' && bytes[i - 1] != b'/' {
            let name = self.rest[1..i].to_string();
            self.advance_n(i + 1);
            return TokenKind::SearchPath(name);
        }
        self.one_or_two('=', TokenKind::LtEq, TokenKind::Lt)
    }

    /// Scans a number (integer or float).
    fn scan_number(&mut self) -> TokenKind {
        let start = self.position;
        let mut is_float = false;

        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_char() == Some('.') && self.peek_char_n(1).is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.advance();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let signed = matches!(self.peek_char_n(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_char_n(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.advance_n(digit_at);
                while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let text = &self.source[start..self.position];
        if is_float {
            match text.parse::<f64>() {
                Ok(n) => TokenKind::Float(n),
                Err(e) => TokenKind::Error {
                    message: format!("invalid float '{text}': {e}"),
                    at_end: false,
                },
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => TokenKind::Int(n),
                Err(_) => TokenKind::Error {
                    message: format!("invalid integer '{text}'"),
                    at_end: false,
                },
            }
        }
    }

    /// Scans an identifier or keyword.
    fn scan_ident(&mut self) -> TokenKind {
        let start = self.position;
        while self.peek_char().is_some_and(is_ident_char) {
            self.advance();
        }
        let text = &self.source[start..self.position];
        TokenKind::keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()))
    }
}

fn unterminated(what: &str) -> TokenKind {
    TokenKind::Error {
        message: format!("unterminated {what}"),
        at_end: true,
    }
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        other => other,
    }
}

fn flush_text(pieces: &mut Vec<IndPiece>, text: &mut String) {
    if !text.is_empty() {
        pieces.push(IndPiece::Text(std::mem::take(text)));
    }
}

/// Removes the common leading indentation of an indented string, the
/// whitespace-only first line, and trailing spaces on the last line.
fn strip_indentation(mut pieces: Vec<IndPiece>) -> Vec<StrSegment> {
    if let Some(IndPiece::Text(first)) = pieces.first_mut() {
        if let Some(newline) = first.find('\n') {
            if first[..newline].chars().all(|c| c == ' ' || c == '\t') {
                first.drain(..=newline);
            }
        }
    }

    let mut min_indent = usize::MAX;
    let mut at_line_start = true;
    let mut indent = 0;
    for piece in &pieces {
        match piece {
            IndPiece::Text(text) => {
                for c in text.chars() {
                    if at_line_start {
                        if c == ' ' {
                            indent += 1;
                        } else if c == '\n' {
                            indent = 0;
                        } else {
                            min_indent = min_indent.min(indent);
                            at_line_start = false;
                        }
                    } else if c == '\n' {
                        at_line_start = true;
                        indent = 0;
                    }
                }
            }
            IndPiece::Escaped(_) | IndPiece::Interpolation(_) => {
                if at_line_start {
                    min_indent = min_indent.min(indent);
                    at_line_start = false;
                }
            }
        }
    }

    let mut segments = Vec::new();
    let mut buffer = String::new();
    let mut at_line_start = true;
    let mut dropped = 0;
    for piece in pieces {
        match piece {
            IndPiece::Text(text) => {
                for c in text.chars() {
                    if at_line_start {
                        if c == ' ' && dropped < min_indent {
                            dropped += 1;
                            continue;
                        }
                        if c == '\n' {
                            buffer.push('\n');
                            dropped = 0;
                            continue;
                        }
                        at_line_start = false;
                    }
                    buffer.push(c);
                    if c == '\n' {
                        at_line_start = true;
                        dropped = 0;
                    }
                }
            }
            IndPiece::Escaped(text) => {
                at_line_start = false;
                buffer.push_str(&text);
            }
            IndPiece::Interpolation(segment) => {
                at_line_start = false;
                if !buffer.is_empty() {
                    segments.push(StrSegment::Literal(std::mem::take(&mut buffer)));
                }
                segments.push(segment);
            }
        }
    }

    if let Some(newline) = buffer.rfind('\n') {
        if buffer[newline + 1..].chars().all(|c| c == ' ') {
            buffer.truncate(newline + 1);
        }
    }
    if !buffer.is_empty() || segments.is_empty() {
        segments.push(StrSegment::Literal(buffer));
    }
    segments
}

/// Returns true if the character can start an identifier.
#[must_use]
pub fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Returns true if the character can continue an identifier.
#[must_use]
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '\'' | '-')
}

fn is_path_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '~' | '/')
}

const fn is_path_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'+')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize_all(source)
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn literal(text: &str) -> StrSegment {
        StrSegment::Literal(text.into())
    }

    #[test]
    fn lex_empty() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
        assert_eq!(lex("   \n  "), vec![TokenKind::Eof]);
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(lex("42"), vec![TokenKind::Int(42), TokenKind::Eof]);
        assert_eq!(lex("1.5"), vec![TokenKind::Float(1.5), TokenKind::Eof]);
        assert_eq!(lex(".5"), vec![TokenKind::Float(0.5), TokenKind::Eof]);
        assert_eq!(lex("1e3"), vec![TokenKind::Float(1000.0), TokenKind::Eof]);
    }

    #[test]
    fn lex_identifiers_and_keywords() {
        assert_eq!(
            lex("foldl' my-var let"),
            vec![
                TokenKind::Ident("foldl'".into()),
                TokenKind::Ident("my-var".into()),
                TokenKind::Let,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_operators() {
        assert_eq!(
            lex("++ // == != <= >= && || -> ! ? ..."),
            vec![
                TokenKind::Concat,
                TokenKind::Update,
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Implies,
                TokenKind::Not,
                TokenKind::Question,
                TokenKind::Ellipsis,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_division_needs_spaces() {
        assert_eq!(
            lex("a / b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Slash,
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(lex("a/b"), vec![TokenKind::Path("a/b".into()), TokenKind::Eof]);
    }

    #[test]
    fn lex_paths() {
        assert_eq!(lex("./foo.nix"), vec![TokenKind::Path("./foo.nix".into()), TokenKind::Eof]);
        assert_eq!(lex("/etc/hosts"), vec![TokenKind::Path("/etc/hosts".into()), TokenKind::Eof]);
        assert_eq!(lex("~/x"), vec![TokenKind::Path("~/x".into()), TokenKind::Eof]);
        assert_eq!(
            lex("<nixpkgs>"),
            vec![TokenKind::SearchPath("nixpkgs".into()), TokenKind::Eof]
        );
        assert_eq!(
            lex("a < b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Lt,
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_plain_string() {
        assert_eq!(
            lex(r#""a\n\"b\"""#),
            vec![TokenKind::Str(vec![literal("a\n\"b\"")]), TokenKind::Eof]
        );
        assert_eq!(lex(r#""""#), vec![TokenKind::Str(vec![literal("")]), TokenKind::Eof]);
    }

    #[test]
    fn lex_string_interpolation_range() {
        let source = r#""x${ { a = 1; }.a }y""#;
        let tokens = lex(source);
        let TokenKind::Str(segments) = &tokens[0] else {
            panic!("expected string, got {:?}", tokens[0]);
        };
        assert_eq!(segments.len(), 3);
        let StrSegment::Interpolation { start, end, .. } = segments[1] else {
            panic!("expected interpolation");
        };
        assert_eq!(&source[start..end], " { a = 1; }.a ");
        assert_eq!(segments[2], literal("y"));
    }

    #[test]
    fn lex_nested_string_in_interpolation() {
        let tokens = lex(r#""${ "}" }""#);
        assert!(matches!(tokens[0], TokenKind::Str(_)));
        assert_eq!(tokens[1], TokenKind::Eof);
    }

    #[test]
    fn lex_indented_string_strips_indentation() {
        let tokens = lex("''\n    foo\n      bar\n  ''");
        assert_eq!(
            tokens[0],
            TokenKind::IndStr(vec![literal("foo\n  bar\n")])
        );
    }

    #[test]
    fn lex_indented_string_escapes() {
        let tokens = lex("'' '''a ''${b} ''\\n''");
        assert_eq!(
            tokens[0],
            TokenKind::IndStr(vec![literal("''a ${b} \n")])
        );
    }

    #[test]
    fn lex_comments() {
        let tokens = lex("# comment\n42 /* block */");
        assert!(matches!(tokens[0], TokenKind::Comment(_)));
        assert_eq!(tokens[1], TokenKind::Int(42));
        assert!(matches!(tokens[2], TokenKind::Comment(_)));
    }

    #[test]
    fn lex_unterminated_forms_flag_end_of_input() {
        for source in [r#""hello"#, "''abc", "/* open", r#""${ 1 + "#] {
            let tokens = lex(source);
            assert!(
                matches!(tokens[0], TokenKind::Error { at_end: true, .. }),
                "{source}: {:?}",
                tokens[0]
            );
        }
    }

    #[test]
    fn lex_deeply_nested_interpolation_is_an_error() {
        let source = format!("{}1{}", "\"${".repeat(10_000), "}\"".repeat(10_000));
        let tokens = lex(&source);
        assert!(matches!(tokens[0], TokenKind::Error { at_end: false, .. }), "{:?}", tokens[0]);
    }

    #[test]
    fn lex_unexpected_character_is_not_end() {
        let tokens = lex("`");
        assert!(matches!(tokens[0], TokenKind::Error { at_end: false, .. }));
    }

    #[test]
    fn lex_span_tracking() {
        let mut lexer = Lexer::new("foo\n  bar");
        let t1 = lexer.next_token();
        assert_eq!((t1.span.start, t1.span.end), (0, 3));
        let t2 = lexer.next_token();
        assert_eq!(t2.span.line, 2);
        assert_eq!(t2.span.column, 3);
    }
}
