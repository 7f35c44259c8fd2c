//! Completion of commands, names and attribute paths.
//!
//! Positions are character offsets into the request text. Matching is
//! case-sensitive and prefix-only.

use std::collections::HashSet;

use nixkernel_language::lexer::is_ident_char;
use nixkernel_language::{Evaluator, Lexer, TokenKind, Value};
use tracing::debug;

use crate::commands::{self, COMMAND_SIGIL};
use crate::environment::Environment;

/// Where a candidate comes from. Declaration order is ranking order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// A command spelling.
    Command,
    /// A session binding.
    Variable,
    /// A `let` binding written earlier in the same input.
    LetBinding,
    /// A global name, builtin or attribute.
    Builtin,
}

/// A completion candidate before ranking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Replacement text.
    pub text: String,
    /// Source of the candidate.
    pub category: Category,
}

impl Candidate {
    fn new(text: impl Into<String>, category: Category) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }
}

/// Ranked matches and the range they replace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    /// Replacement candidates, best first.
    pub matches: Vec<String>,
    /// First replaced character.
    pub cursor_start: usize,
    /// One past the last replaced character.
    pub cursor_end: usize,
}

impl Completion {
    /// Returns a completion with no matches at `cursor`.
    #[must_use]
    pub const fn empty(cursor: usize) -> Self {
        Self {
            matches: Vec::new(),
            cursor_start: cursor,
            cursor_end: cursor,
        }
    }
}

/// Completes `code` at character offset `cursor`.
///
/// Failures while evaluating an attribute path base produce no matches.
#[must_use]
pub fn complete(ev: &Evaluator, env: &Environment, code: &str, cursor: usize) -> Completion {
    let chars: Vec<char> = code.chars().collect();
    let cursor = cursor.min(chars.len());
    let leading = chars[..cursor].iter().take_while(|c| c.is_whitespace()).count();
    if chars.get(leading) != Some(&COMMAND_SIGIL) || leading == cursor {
        return complete_expression(ev, env, &chars, cursor);
    }

    let word_end = leading
        + chars[leading..cursor]
            .iter()
            .take_while(|c| !c.is_whitespace())
            .count();
    let word: String = chars[leading..word_end].iter().collect();
    if word_end == cursor {
        let candidates = commands::spellings()
            .filter(|spelling| spelling.starts_with(word.as_str()))
            .map(|spelling| Candidate::new(spelling, Category::Command))
            .collect();
        return Completion {
            matches: rank(candidates),
            cursor_start: leading,
            cursor_end: cursor,
        };
    }

    match commands::lookup(&word) {
        Some(spec) if spec.argument.is_expression() => {
            let arg_start = word_end
                + chars[word_end..cursor]
                    .iter()
                    .take_while(|c| c.is_whitespace())
                    .count();
            let mut completion = complete_expression(ev, env, &chars[arg_start..cursor], cursor - arg_start);
            completion.cursor_start += arg_start;
            completion.cursor_end = cursor;
            completion
        }
        _ => Completion::empty(cursor),
    }
}

pub(crate) fn is_completion_char(c: char) -> bool {
    is_ident_char(c) || c == '.'
}

fn complete_expression(ev: &Evaluator, env: &Environment, chars: &[char], cursor: usize) -> Completion {
    let start = cursor - chars[..cursor].iter().rev().take_while(|c| is_completion_char(**c)).count();
    let end = cursor + chars[cursor..].iter().take_while(|c| is_completion_char(**c)).count();
    let prefix: String = chars[start..cursor].iter().collect();

    if let Some(dot) = prefix.rfind('.') {
        let (base, partial) = (&prefix[..dot], &prefix[dot + 1..]);
        let candidates = attribute_candidates(ev, env, base, partial);
        return Completion {
            matches: rank(candidates),
            cursor_start: start + base.chars().count() + 1,
            cursor_end: end,
        };
    }

    let before: String = chars[..start].iter().collect();
    let candidates = env
        .names()
        .map(|name| Candidate::new(name, Category::Variable))
        .chain(let_bound_names(&before).into_iter().map(|name| Candidate::new(name, Category::LetBinding)))
        .chain(ev.globals().names().into_iter().map(|name| Candidate::new(name, Category::Builtin)))
        .filter(|candidate| candidate.text.starts_with(prefix.as_str()))
        .collect();
    Completion {
        matches: rank(candidates),
        cursor_start: start,
        cursor_end: end,
    }
}

fn attribute_candidates(ev: &Evaluator, env: &Environment, base: &str, partial: &str) -> Vec<Candidate> {
    if base.is_empty() {
        return Vec::new();
    }
    let value = ev.eval_str(base, env.scope());
    // Traces raised while completing are not part of any request's output.
    let _ = ev.take_traces();
    match value {
        Ok(Value::Attrs(attrs)) => attrs
            .names()
            .filter(|name| name.starts_with(partial))
            .map(|name| Candidate::new(name, Category::Builtin))
            .collect(),
        Ok(_) => Vec::new(),
        Err(err) => {
            debug!(base, error = %err, "cannot complete attribute path");
            Vec::new()
        }
    }
}

/// Returns the names bound by `let` blocks still open at the end of
/// `text`.
#[must_use]
pub fn let_bound_names(text: &str) -> Vec<String> {
    let tokens = Lexer::tokenize_all(text);
    let tokens: Vec<_> = tokens.iter().filter(|t| !t.kind.is_trivia()).collect();
    // One entry per open `let`: brace depth at the keyword and names so far.
    let mut open: Vec<(usize, Vec<String>)> = Vec::new();
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match &token.kind {
            TokenKind::Let => open.push((depth, Vec::new())),
            TokenKind::In => {
                open.pop();
            }
            TokenKind::LBrace | TokenKind::DollarBrace => depth += 1,
            TokenKind::RBrace => depth = depth.saturating_sub(1),
            TokenKind::Ident(name) => {
                let assigned = tokens.get(i + 1).is_some_and(|next| next.kind == TokenKind::Assign);
                if let Some((let_depth, names)) = open.last_mut() {
                    if assigned && *let_depth == depth {
                        names.push(name.clone());
                    }
                }
            }
            _ => {}
        }
    }
    open.into_iter().flat_map(|(_, names)| names).collect()
}

/// Orders candidates by category, then text, dropping duplicates and
/// internal `__` names.
#[must_use]
pub fn rank(mut candidates: Vec<Candidate>) -> Vec<String> {
    candidates.retain(|candidate| !candidate.text.starts_with("__"));
    candidates.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.text.cmp(&b.text)));
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.text.clone()))
        .map(|candidate| candidate.text)
        .collect()
}

/// Returns every plain word the console completer offers: command
/// spellings, session names, globals and `builtins.` paths.
#[must_use]
pub fn vocabulary(ev: &Evaluator, env: &Environment) -> Vec<String> {
    let candidates = commands::spellings()
        .map(|spelling| Candidate::new(spelling, Category::Command))
        .chain(env.names().map(|name| Candidate::new(name, Category::Variable)))
        .chain(ev.globals().names().into_iter().map(|name| Candidate::new(name, Category::Builtin)))
        .chain(
            ev.builtins()
                .names()
                .map(|name| Candidate::new(format!("builtins.{name}"), Category::Builtin)),
        )
        .collect();
    rank(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nixkernel_foundation::Interrupt;
    use nixkernel_language::{EvalConfig, Thunk};

    use crate::environment::Provenance;

    fn fixture() -> (Evaluator, Environment) {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let mut env = Environment::new(ev.globals());
        env.add(
            [
                ("pkgs".to_string(), Thunk::lazy(|ev| ev.eval_str("{ hello = 1; hell = 2; world = 3; }", ev.globals()))),
                ("myVar".to_string(), Thunk::ready(Value::Int(1))),
            ],
            &Provenance::Literal,
        );
        (ev, env)
    }

    fn at_end(ev: &Evaluator, env: &Environment, code: &str) -> Completion {
        complete(ev, env, code, code.chars().count())
    }

    #[test]
    fn builtin_attribute_path() {
        let (ev, env) = fixture();
        let completion = at_end(&ev, &env, "builtins.toJ");
        assert_eq!(completion.matches, vec!["toJSON"]);
        assert_eq!(completion.cursor_start, "builtins.".len());
        assert_eq!(completion.cursor_end, "builtins.toJ".len());
    }

    #[test]
    fn session_attribute_path() {
        let (ev, env) = fixture();
        let completion = at_end(&ev, &env, "pkgs.hel");
        assert_eq!(completion.matches, vec!["hell", "hello"]);
    }

    #[test]
    fn command_words() {
        let (ev, env) = fixture();
        let completion = at_end(&ev, &env, ":l");
        assert!(completion.matches.contains(&":load".to_string()));
        assert!(completion.matches.contains(&":lf".to_string()));
        assert!(completion.matches.contains(&":log".to_string()));

        let completion = at_end(&ev, &env, ":b");
        assert!(completion.matches.contains(&":b".to_string()));
        assert!(completion.matches.contains(&":build-local".to_string()));

        let completion = at_end(&ev, &env, "  :p");
        assert!(completion.matches.contains(&":print".to_string()));
        assert_eq!(completion.cursor_start, 2);
    }

    #[test]
    fn command_argument_delegates() {
        let (ev, env) = fixture();
        let completion = at_end(&ev, &env, ":p builtins.toJ");
        assert_eq!(completion.matches, vec!["toJSON"]);
        assert_eq!(completion.cursor_start, ":p builtins.".len());

        let completion = at_end(&ev, &env, ":t my");
        assert_eq!(completion.matches, vec!["myVar"]);
        assert_eq!(completion.cursor_start, 3);
    }

    #[test]
    fn path_commands_do_not_complete() {
        let (ev, env) = fixture();
        assert!(at_end(&ev, &env, ":load my").matches.is_empty());
    }

    #[test]
    fn names_are_ranked_by_category() {
        let (ev, env) = fixture();
        let completion = at_end(&ev, &env, "let mapper = 1; in ma");
        assert_eq!(completion.matches, vec!["map"]);

        let completion = at_end(&ev, &env, "let mapper = 1; m");
        assert_eq!(completion.matches, vec!["myVar", "mapper", "map"]);
    }

    #[test]
    fn unmatched_prefix_is_empty() {
        let (ev, env) = fixture();
        assert!(at_end(&ev, &env, "zzzNothing").matches.is_empty());
        assert!(at_end(&ev, &env, "undefinedThing.x").matches.is_empty());
        assert!(at_end(&ev, &env, "1.").matches.is_empty());
    }

    #[test]
    fn internal_names_are_hidden() {
        let candidates = vec![
            Candidate::new("__internal", Category::Builtin),
            Candidate::new("b", Category::Builtin),
            Candidate::new("a", Category::Builtin),
            Candidate::new("b", Category::Variable),
        ];
        assert_eq!(rank(candidates), vec!["b", "a"]);
    }

    #[test]
    fn let_names_respect_nesting() {
        assert_eq!(let_bound_names("let a = 1; b = { c = 2; }; "), vec!["a", "b"]);
        assert!(let_bound_names("let a = 1; in a").is_empty());
        assert_eq!(let_bound_names("let a = let b = 1; in b; c = "), vec!["a", "c"]);
    }

    #[test]
    fn cursor_beyond_text_is_clamped() {
        let (ev, env) = fixture();
        let completion = complete(&ev, &env, "myV", 100);
        assert_eq!(completion.matches, vec!["myVar"]);
        assert_eq!(completion.cursor_end, 3);
    }

    #[test]
    fn vocabulary_includes_builtin_paths() {
        let (ev, env) = fixture();
        let words = vocabulary(&ev, &env);
        assert!(words.contains(&":help".to_string()));
        assert!(words.contains(&"builtins.toJSON".to_string()));
        assert!(words.contains(&"pkgs".to_string()));
    }
}
