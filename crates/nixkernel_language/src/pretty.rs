//! Pretty-printer for values.
//!
//! Renders values the way the Nix REPL prints them:
//!
//! ```text
//! {
//!   a = 1;
//!   b = [ "x" ];
//! }
//! ```
//!
//! Collections with more than one item, or with a single nested collection,
//! are spread over several lines when `pretty_indent` is non-zero.

use std::collections::HashSet;
use std::rc::Rc;

use nixkernel_foundation::{Error, ErrorKind, Result};

use crate::eval::Evaluator;
use crate::lexer::{is_ident_char, is_ident_start};
use crate::thunk::Thunk;
use crate::token::TokenKind;
use crate::value::{AttrSet, Value};

const ANSI_NORMAL: &str = "\x1b[0m";
const ANSI_RED: &str = "\x1b[31;1m";
const ANSI_GREEN: &str = "\x1b[32;1m";
const ANSI_MAGENTA: &str = "\x1b[35;1m";
const ANSI_CYAN: &str = "\x1b[36;1m";
const ANSI_BLUE: &str = "\x1b[34;1m";

/// Configuration for printing values.
#[derive(Debug, Clone)]
pub struct PrintOptions {
    /// Colorize output with ANSI escapes.
    pub ansi_colors: bool,
    /// Force thunks while printing. Unforced thunks print as `«thunk»`.
    pub force: bool,
    /// Print derivations as `«derivation <drvPath>»` instead of their
    /// attributes.
    pub derivation_paths: bool,
    /// Nesting depth below which collections print as `{ ... }`.
    pub max_depth: usize,
    /// Spaces per indentation level; 0 keeps everything on one line.
    pub pretty_indent: usize,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            ansi_colors: false,
            force: true,
            derivation_paths: true,
            max_depth: usize::MAX,
            pretty_indent: 2,
        }
    }
}

impl PrintOptions {
    /// Single-line, uncolored output, as used for trace messages.
    #[must_use]
    pub fn plain() -> Self {
        Self {
            pretty_indent: 0,
            ..Self::default()
        }
    }

    /// Sets whether ANSI colors are emitted.
    #[must_use]
    pub const fn with_colors(mut self, ansi_colors: bool) -> Self {
        self.ansi_colors = ansi_colors;
        self
    }

    /// Sets the maximum depth.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Prints a value.
///
/// Errors raised while forcing nested values are printed inline as
/// `«error: ...»`.
///
/// # Errors
/// Only interruption propagates.
pub fn print_value(ev: &Evaluator, value: &Value, options: &PrintOptions) -> Result<String> {
    let mut printer = Printer::new(ev, options);
    printer.print(value, 0)?;
    Ok(printer.output)
}

/// Formats a float the way C's `%g` does: six significant digits,
/// trailing zeros removed.
#[must_use]
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return if f.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if f.is_infinite() {
        return if f < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let scientific = format!("{f:.5e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_zeros(mantissa), exponent.abs());
    }
    let decimals = usize::try_from(5 - exponent).unwrap_or(0);
    trim_zeros(&format!("{f:.decimals$}")).to_string()
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Quotes and escapes a string as a Nix string literal.
#[must_use]
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Returns true if `name` can be written as a bare attribute name.
#[must_use]
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_ident_start)
        && chars.all(is_ident_char)
        && TokenKind::keyword(name).is_none()
}

/// Formats an attribute name, quoting it when needed.
#[must_use]
pub fn format_attr_name(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        escape_string(name)
    }
}

enum Item {
    Value(Value),
    Thunk,
    Failed(Error),
}

/// Printer state.
struct Printer<'a> {
    ev: &'a Evaluator,
    options: &'a PrintOptions,
    output: String,
    indent: usize,
    seen: HashSet<usize>,
}

impl<'a> Printer<'a> {
    fn new(ev: &'a Evaluator, options: &'a PrintOptions) -> Self {
        Self {
            ev,
            options,
            output: String::new(),
            indent: 0,
            seen: HashSet::new(),
        }
    }

    fn colored(&mut self, color: &str, text: &str) {
        if self.options.ansi_colors {
            self.output.push_str(color);
            self.output.push_str(text);
            self.output.push_str(ANSI_NORMAL);
        } else {
            self.output.push_str(text);
        }
    }

    /// Writes a newline and indentation when pretty, a space otherwise.
    fn space(&mut self, pretty: bool) {
        if pretty {
            self.output.push('\n');
            self.output.push_str(&" ".repeat(self.indent));
        } else {
            self.output.push(' ');
        }
    }

    fn item(&self, thunk: &Thunk) -> Result<Item> {
        if !self.options.force {
            return Ok(thunk.value().map_or(Item::Thunk, Item::Value));
        }
        match thunk.force(self.ev) {
            Ok(value) => Ok(Item::Value(value)),
            Err(err) if matches!(err.kind, ErrorKind::Interrupted) => Err(err),
            Err(err) => Ok(Item::Failed(err)),
        }
    }

    fn print_item(&mut self, item: &Item, depth: usize) -> Result<()> {
        match item {
            Item::Value(value) => self.print(value, depth),
            Item::Thunk => {
                self.colored(ANSI_MAGENTA, "«thunk»");
                Ok(())
            }
            Item::Failed(err) => {
                self.print_error(err);
                Ok(())
            }
        }
    }

    fn print_error(&mut self, err: &Error) {
        self.colored(ANSI_RED, &format!("«error: {err}»"));
    }

    /// Decides whether a collection goes multi-line: more than one item,
    /// or a single nested collection.
    fn should_pretty_print(&self, len: usize, first: Option<&Item>) -> bool {
        if self.options.pretty_indent == 0 || len == 0 {
            return false;
        }
        len > 1
            || matches!(
                first,
                Some(Item::Thunk | Item::Value(Value::List(_) | Value::Attrs(_)))
            )
    }

    fn print(&mut self, value: &Value, depth: usize) -> Result<()> {
        self.ev.interrupt().check()?;
        match value {
            Value::Null => self.colored(ANSI_CYAN, "null"),
            Value::Bool(b) => self.colored(ANSI_CYAN, if *b { "true" } else { "false" }),
            Value::Int(n) => self.colored(ANSI_CYAN, &n.to_string()),
            Value::Float(f) => self.colored(ANSI_CYAN, &format_float(*f)),
            Value::String(s) => self.colored(ANSI_MAGENTA, &escape_string(s.as_str())),
            Value::Path(p) => self.colored(ANSI_GREEN, &p.display().to_string()),
            Value::List(items) => self.print_list(items, depth)?,
            Value::Attrs(attrs) => self.print_attrs(attrs, depth)?,
            Value::Lambda(closure) => {
                let position = self.ev.position(closure.lambda.span);
                let text = match closure.name() {
                    Some(name) => format!("«lambda {name} @ {position}»"),
                    None => format!("«lambda @ {position}»"),
                };
                self.colored(ANSI_BLUE, &text);
            }
            Value::PrimOp(app) if app.args.is_empty() => {
                self.colored(ANSI_BLUE, &format!("«primop {}»", app.op.name));
            }
            Value::PrimOp(app) => {
                self.colored(ANSI_BLUE, &format!("«partially applied primop {}»", app.op.name));
            }
        }
        Ok(())
    }

    fn repeated(&mut self, ptr: usize) -> bool {
        if self.seen.insert(ptr) {
            false
        } else {
            self.colored(ANSI_MAGENTA, "«repeated»");
            true
        }
    }

    fn print_list(&mut self, items: &Rc<Vec<Thunk>>, depth: usize) -> Result<()> {
        if items.is_empty() {
            self.output.push_str("[ ]");
            return Ok(());
        }
        if self.repeated(Rc::as_ptr(items) as usize) {
            return Ok(());
        }
        if depth >= self.options.max_depth {
            self.output.push_str("[ ... ]");
            return Ok(());
        }
        let forced = items
            .iter()
            .map(|item| self.item(item))
            .collect::<Result<Vec<_>>>()?;
        let pretty = self.should_pretty_print(forced.len(), forced.first());

        self.indent += self.options.pretty_indent;
        self.output.push('[');
        for item in &forced {
            self.space(pretty);
            self.print_item(item, depth + 1)?;
        }
        self.indent -= self.options.pretty_indent;
        self.space(pretty);
        self.output.push(']');
        Ok(())
    }

    fn print_attrs(&mut self, attrs: &Rc<AttrSet>, depth: usize) -> Result<()> {
        if attrs.is_empty() {
            self.output.push_str("{ }");
            return Ok(());
        }
        if self.repeated(Rc::as_ptr(attrs) as usize) {
            return Ok(());
        }
        if self.options.force && self.options.derivation_paths {
            match self.ev.is_derivation(attrs) {
                Ok(true) => return self.print_derivation(attrs),
                Ok(false) => {}
                Err(err) if matches!(err.kind, ErrorKind::Interrupted) => return Err(err),
                Err(err) => {
                    self.print_error(&err);
                    return Ok(());
                }
            }
        }
        if depth >= self.options.max_depth {
            self.output.push_str("{ ... }");
            return Ok(());
        }
        let mut entries = Vec::with_capacity(attrs.len());
        for (name, thunk) in attrs.iter() {
            entries.push((name.as_str(), self.item(thunk)?));
        }
        let pretty = self.should_pretty_print(entries.len(), entries.first().map(|(_, item)| item));

        self.indent += self.options.pretty_indent;
        self.output.push('{');
        for (name, item) in &entries {
            self.space(pretty);
            self.output.push_str(&format_attr_name(name));
            self.output.push_str(" = ");
            self.print_item(item, depth + 1)?;
            self.output.push(';');
        }
        self.indent -= self.options.pretty_indent;
        self.space(pretty);
        self.output.push('}');
        Ok(())
    }

    fn print_derivation(&mut self, attrs: &AttrSet) -> Result<()> {
        let drv_path = match attrs.get("drvPath").map(|thunk| thunk.force(self.ev)) {
            Some(Ok(Value::String(s))) => Some(s.as_str().to_string()),
            Some(Err(err)) if matches!(err.kind, ErrorKind::Interrupted) => return Err(err),
            _ => None,
        };
        let text = match drv_path {
            Some(path) => format!("«derivation {path}»"),
            None => "«derivation»".to_string(),
        };
        self.colored(ANSI_GREEN, &text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EvalConfig;
    use nixkernel_foundation::Interrupt;

    fn show_with(source: &str, options: &PrintOptions) -> String {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let value = ev.eval_str(source, &Rc::clone(ev.globals())).unwrap();
        print_value(&ev, &value, options).unwrap()
    }

    fn show(source: &str) -> String {
        show_with(source, &PrintOptions::default())
    }

    #[test]
    fn scalars() {
        assert_eq!(show("100 * 5"), "500");
        assert_eq!(show("true"), "true");
        assert_eq!(show("null"), "null");
        assert_eq!(show(r#""foo" + "bar""#), r#""foobar""#);
        assert_eq!(show("1.5"), "1.5");
        assert_eq!(show("2.0 * 5"), "10");
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(0.1 + 0.2), "0.3");
        assert_eq!(format_float(1_234_567.0), "1.23457e+06");
        assert_eq!(format_float(0.000_01), "1e-05");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(123_456.0), "123456");
    }

    #[test]
    fn string_escapes() {
        assert_eq!(escape_string("a\"b\\c\n${x}"), r#""a\"b\\c\n\${x}""#);
        assert_eq!(escape_string("$a"), r#""$a""#);
    }

    #[test]
    fn attribute_names() {
        assert_eq!(format_attr_name("foo-bar'"), "foo-bar'");
        assert_eq!(format_attr_name("with space"), r#""with space""#);
        assert_eq!(format_attr_name("if"), r#""if""#);
        assert_eq!(format_attr_name("1x"), r#""1x""#);
    }

    #[test]
    fn collections_layout() {
        assert_eq!(show("{ }"), "{ }");
        assert_eq!(show("[ ]"), "[ ]");
        assert_eq!(show("{ a = 1; }"), "{ a = 1; }");
        assert_eq!(show("[ 1 ]"), "[ 1 ]");
        assert_eq!(show("{ b = 2; a = 1; }"), "{\n  a = 1;\n  b = 2;\n}");
        assert_eq!(show("[ 1 2 ]"), "[\n  1\n  2\n]");
        assert_eq!(show("{ a = { b = 1; }; }"), "{\n  a = { b = 1; };\n}");
    }

    #[test]
    fn single_line_when_not_pretty() {
        assert_eq!(
            show_with("{ a = [ 1 2 ]; b = \"x\"; }", &PrintOptions::plain()),
            r#"{ a = [ 1 2 ]; b = "x"; }"#
        );
    }

    #[test]
    fn max_depth_elides() {
        let options = PrintOptions::plain().with_max_depth(1);
        assert_eq!(show_with("{ a = { b = 1; }; }", &options), "{ a = { ... }; }");
    }

    #[test]
    fn functions() {
        assert_eq!(show("builtins.map"), "«primop map»");
        assert_eq!(show("builtins.map (x: x)"), "«partially applied primop map»");
        assert_eq!(show("x: x"), "«lambda @ «string»:1:1»");
        assert_eq!(show("let f = x: x; in f"), "«lambda f @ «string»:1:9»");
    }

    #[test]
    fn errors_and_repeats() {
        assert_eq!(
            show_with(r#"{ a = throw "bad"; }"#, &PrintOptions::plain()),
            "{ a = «error: bad»; }"
        );
        assert_eq!(
            show_with("let x = { a = 1; }; in [ x x ]", &PrintOptions::plain()),
            "[ { a = 1; } «repeated» ]"
        );
    }

    #[test]
    fn unforced_thunks() {
        let options = PrintOptions {
            force: false,
            ..PrintOptions::plain()
        };
        assert_eq!(show_with("[ (1 + 1) 2 ]", &options), "[ «thunk» 2 ]");
    }

    #[test]
    fn colors() {
        let options = PrintOptions::default().with_colors(true);
        assert_eq!(show_with("1", &options), "\x1b[36;1m1\x1b[0m");
        assert_eq!(show_with(r#""s""#, &options), "\x1b[35;1m\"s\"\x1b[0m");
    }

    #[test]
    fn derivations_print_their_path() {
        let text = show(r#"derivation { name = "d"; system = "s"; builder = "/bin/sh"; }"#);
        assert!(text.starts_with("«derivation "));
        assert!(text.ends_with("-d.drv»"));
    }
}
