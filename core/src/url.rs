//! Normalization of loosely written URLs.
//!
//! `RawUrl::normalize` parses a user-supplied string, cleans its path and
//! defaults a missing scheme to `http`. Parse failures are returned to the
//! caller; the input is never passed through unchanged.

use std::fmt;

use url::Url;

use crate::error::Result;

const DEFAULT_SCHEME: &str = "http";

/// A URL string as written by a user, possibly without a scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawUrl(String);

impl RawUrl {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into a [`Url`] with a cleaned path and a scheme.
    ///
    /// Input that starts with `scheme://` is parsed as written; `://` later in
    /// the string does not count. Input starting with `//` is treated as
    /// scheme-relative and anything else as `host[/path]`; both get the
    /// default scheme.
    pub fn to_url(&self) -> Result<Url> {
        let raw = self.0.trim();
        let mut url = if has_scheme(raw) {
            Url::parse(raw)?
        } else if raw.starts_with("//") {
            Url::parse(&format!("{DEFAULT_SCHEME}:{raw}"))?
        } else {
            Url::parse(&format!("{DEFAULT_SCHEME}://{raw}"))?
        };

        if !url.cannot_be_a_base() {
            let cleaned = clean_path(url.path());
            url.set_path(&cleaned);
        }
        Ok(url)
    }

    /// The canonical string form of this URL.
    pub fn normalize(&self) -> Result<String> {
        self.to_url().map(String::from)
    }
}

impl fmt::Display for RawUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RawUrl {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for RawUrl {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Whether `raw` starts with `scheme://`, the scheme being an ASCII letter
/// followed by letters, digits, `+`, `-` or `.`.
fn has_scheme(raw: &str) -> bool {
    let Some((scheme, _)) = raw.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Lexically clean a slash-separated path.
///
/// Repeated slashes collapse, `.` segments drop, `..` removes the previous
/// segment (or is dropped at the root), and trailing slashes go away. A path
/// that cleans to nothing becomes `/` when it was rooted (`.` otherwise).
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
