//! Syntax highlighting for the console.

use std::borrow::Cow;

use nixkernel_language::{Lexer, TokenKind};

use crate::commands::{self, COMMAND_SIGIL, SHELL_SIGIL};

const RESET: &str = "\x1b[0m";
const KEYWORD: &str = "\x1b[1;35m";
const STRING: &str = "\x1b[33m";
const NUMBER: &str = "\x1b[36m";
const PATH: &str = "\x1b[32m";
const COMMENT: &str = "\x1b[2;3m";
const COMMAND: &str = "\x1b[1;34m";
const UNKNOWN_COMMAND: &str = "\x1b[31m";
const DELIMITER: &str = "\x1b[1m";

/// Highlighter for Nix input lines.
#[derive(Debug, Default)]
pub struct NixHighlighter;

impl NixHighlighter {
    /// Creates a new highlighter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Highlights a line of input.
    ///
    /// Commands get their name colored and their argument highlighted as
    /// Nix; shell escapes are left alone.
    #[allow(clippy::unused_self)]
    pub fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let trimmed = line.trim_start();
        if trimmed.starts_with(SHELL_SIGIL) || line.is_empty() {
            return Cow::Borrowed(line);
        }
        if trimmed.starts_with(COMMAND_SIGIL) {
            let indent = &line[..line.len() - trimmed.len()];
            let word_len = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
            let (word, rest) = trimmed.split_at(word_len);
            let color = if commands::lookup(word).is_some() { COMMAND } else { UNKNOWN_COMMAND };
            return Cow::Owned(format!("{indent}{color}{word}{RESET}{}", highlight_source(rest)));
        }
        Cow::Owned(highlight_source(line))
    }
}

fn color_of(kind: &TokenKind) -> Option<&'static str> {
    Some(match kind {
        TokenKind::Let
        | TokenKind::In
        | TokenKind::Rec
        | TokenKind::With
        | TokenKind::Inherit
        | TokenKind::If
        | TokenKind::Then
        | TokenKind::Else
        | TokenKind::Assert
        | TokenKind::OrKw => KEYWORD,
        TokenKind::Str(_) | TokenKind::IndStr(_) => STRING,
        TokenKind::Int(_) | TokenKind::Float(_) => NUMBER,
        TokenKind::Path(_) | TokenKind::SearchPath(_) => PATH,
        TokenKind::Comment(_) => COMMENT,
        TokenKind::LParen
        | TokenKind::RParen
        | TokenKind::LBracket
        | TokenKind::RBracket
        | TokenKind::LBrace
        | TokenKind::RBrace
        | TokenKind::DollarBrace => DELIMITER,
        _ => return None,
    })
}

/// Colors `source` token by token. Text between tokens is copied as is,
/// and everything from a lexical error onward is left uncolored.
fn highlight_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len() * 2);
    let mut copied = 0;
    for token in Lexer::tokenize_all(source) {
        if matches!(token.kind, TokenKind::Eof | TokenKind::Error { .. }) {
            break;
        }
        let (start, end) = (token.span.start, token.span.end);
        if start < copied || end > source.len() {
            break;
        }
        out.push_str(&source[copied..start]);
        let text = &source[start..end];
        match color_of(&token.kind) {
            Some(color) => {
                out.push_str(color);
                out.push_str(text);
                out.push_str(RESET);
            }
            None => out.push_str(text),
        }
        copied = end;
    }
    out.push_str(&source[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(text: &str) -> String {
        let mut out = String::new();
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for c in chars.by_ref() {
                    if c == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn text_is_preserved() {
        let h = NixHighlighter::new();
        for line in [
            "let x = 1; in x + 2 # done",
            r#"{ a = "s${toString 1}"; b = ./path; }"#,
            ":b pkgs.hello",
            "!ls -la",
            "\"unterminated",
            "   ",
        ] {
            assert_eq!(strip(&h.highlight(line, 0)), line);
        }
    }

    #[test]
    fn keywords_and_literals_are_colored() {
        let h = NixHighlighter::new();
        let out = h.highlight("let x = 42; in x", 0);
        assert!(out.contains(&format!("{KEYWORD}let{RESET}")));
        assert!(out.contains(&format!("{NUMBER}42{RESET}")));
        assert!(out.contains(&format!("{KEYWORD}in{RESET}")));
    }

    #[test]
    fn commands() {
        let h = NixHighlighter::new();
        assert!(h.highlight(":build x", 0).starts_with(&format!("{COMMAND}:build{RESET}")));
        assert!(h.highlight(":nope", 0).starts_with(&format!("{UNKNOWN_COMMAND}:nope{RESET}")));
        assert_eq!(h.highlight("!echo 1", 0), "!echo 1");
    }
}
