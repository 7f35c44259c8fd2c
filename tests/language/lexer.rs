//! Integration tests for the lexer
//!
//! Tests tokenization of Nix source as the console and completion see it.

use nixkernel_language::{Lexer, TokenKind};

fn kinds(source: &str) -> Vec<TokenKind> {
    Lexer::tokenize_all(source).into_iter().map(|t| t.kind).collect()
}

// =============================================================================
// Basic Tokens
// =============================================================================

#[test]
fn tokenize_empty() {
    assert_eq!(kinds(""), vec![TokenKind::Eof]);
}

#[test]
fn tokenize_numbers() {
    assert_eq!(kinds("42 1.5"), vec![TokenKind::Int(42), TokenKind::Float(1.5), TokenKind::Eof]);
}

#[test]
fn tokenize_keywords_and_identifiers() {
    assert_eq!(
        kinds("let x = y; in x"),
        vec![
            TokenKind::Let,
            TokenKind::Ident("x".into()),
            TokenKind::Assign,
            TokenKind::Ident("y".into()),
            TokenKind::Semicolon,
            TokenKind::In,
            TokenKind::Ident("x".into()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn tokenize_paths() {
    assert_eq!(kinds("./default.nix"), vec![TokenKind::Path("./default.nix".into()), TokenKind::Eof]);
    assert_eq!(kinds("<nixpkgs>"), vec![TokenKind::SearchPath("nixpkgs".into()), TokenKind::Eof]);
}

// =============================================================================
// Trivia and Spans
// =============================================================================

#[test]
fn comments_are_kept() {
    let tokens = Lexer::tokenize_all("1 # one\n/* two */ 2");
    let comments = tokens.iter().filter(|t| matches!(t.kind, TokenKind::Comment(_))).count();
    assert_eq!(comments, 2);
}

#[test]
fn spans_cover_source_text() {
    let source = "{ foo = \"bar\"; }";
    let tokens = Lexer::tokenize_all(source);
    let texts: Vec<&str> = tokens
        .iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.text(source))
        .collect();
    assert_eq!(texts, vec!["{", "foo", "=", "\"bar\"", ";", "}"]);
}

#[test]
fn unterminated_string_reports_end_of_input() {
    let tokens = Lexer::tokenize_all("\"abc");
    assert!(tokens.iter().any(|t| matches!(t.kind, TokenKind::Error { at_end: true, .. })));
}
