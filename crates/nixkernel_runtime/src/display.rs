//! Rendering values as MIME bundles.
//!
//! A set with a `_toMime` attribute chooses its own representations: the
//! attribute maps MIME types to strings and becomes the bundle unchanged.
//! Every other value is shown as `text/plain` in its REPL form.

use std::collections::BTreeMap;

use nixkernel_foundation::{ErrorKind, Result};
use nixkernel_language::{Evaluator, PrintOptions, Value, print_value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Attribute that marks a custom display mapping.
pub const MIME_ATTRIBUTE: &str = "_toMime";

/// The plain text MIME type.
pub const TEXT_PLAIN: &str = "text/plain";

/// The markdown MIME type.
pub const TEXT_MARKDOWN: &str = "text/markdown";

/// MIME type to rendered content.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayBundle(BTreeMap<String, String>);

impl DisplayBundle {
    /// Creates a bundle with a single entry.
    #[must_use]
    pub fn single(mime: impl Into<String>, content: impl Into<String>) -> Self {
        Self(BTreeMap::from([(mime.into(), content.into())]))
    }

    /// Creates a `text/plain` bundle.
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self::single(TEXT_PLAIN, text)
    }

    /// Creates a `text/markdown` bundle.
    #[must_use]
    pub fn markdown(text: impl Into<String>) -> Self {
        Self::single(TEXT_MARKDOWN, text)
    }

    /// Returns the content for `mime`.
    #[must_use]
    pub fn get(&self, mime: &str) -> Option<&str> {
        self.0.get(mime).map(String::as_str)
    }

    /// Returns the number of representations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the bundle has no representations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(mime, content)` pairs in MIME order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl FromIterator<(String, String)> for DisplayBundle {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Renders an evaluated value.
///
/// A malformed `_toMime` mapping falls back to `text/plain`.
///
/// # Errors
///
/// Only interruption propagates; evaluation errors inside the value are
/// printed inline.
pub fn render(ev: &Evaluator, value: &Value, options: &PrintOptions) -> Result<DisplayBundle> {
    match custom_bundle(ev, value) {
        Ok(Some(bundle)) => return Ok(bundle),
        Ok(None) => {}
        Err(err) if matches!(err.kind, ErrorKind::Interrupted) => return Err(err),
        Err(err) => debug!(error = %err, "ignoring malformed {MIME_ATTRIBUTE}"),
    }
    Ok(DisplayBundle::plain(print_value(ev, value, options)?))
}

fn custom_bundle(ev: &Evaluator, value: &Value) -> Result<Option<DisplayBundle>> {
    let Value::Attrs(attrs) = value else {
        return Ok(None);
    };
    let Some(mime) = attrs.get(MIME_ATTRIBUTE) else {
        return Ok(None);
    };
    let mime = mime.force(ev)?;
    let mut bundle = BTreeMap::new();
    for (mime_type, content) in mime.as_attrs()?.iter() {
        let content = content.force(ev)?;
        bundle.insert(mime_type.clone(), content.as_string()?.as_str().to_string());
    }
    Ok(Some(DisplayBundle(bundle)))
}
