//! Gradle build descriptor analysis
//!
//! Line-based inspection of a plugin's `android/build.gradle`: finding the
//! `group` declaration, deciding whether a `namespace` is already declared,
//! and inserting one. This is deliberately not a Groovy parser.

use nsfix_core::config::DetectionMode;
use nsfix_core::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// `group 'value'` or `group "value"` at the start of a line
static GROUP_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^([ \t]*)group[ \t]+['"]([^'"]+)['"]"#).unwrap());

/// `namespace` as a statement: first on a line, after `{` or `;`, or as
/// `android.namespace`
static NAMESPACE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:^|[{;]|\bandroid\.)[ \t]*namespace\b").unwrap()
});

/// Line and block comments
static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").unwrap());

/// The first group declaration found in a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDecl {
    /// Declared group, e.g. `com.example.foo_plugin`
    pub value: String,
    /// Leading whitespace of the declaration line
    pub indent: String,
    /// Byte offset just past the declaration line, including its line ending
    pub line_end: usize,
    /// Line ending used by the declaration line, if it has one
    pub newline: Option<&'static str>,
}

/// Result of looking for a group declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupLookup {
    /// Exactly one group value is declared
    Found(GroupDecl),
    /// No group declaration line
    Missing,
    /// Several group declarations with different values
    Ambiguous(Vec<String>),
}

/// What patching a descriptor's text would do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPatch {
    /// A namespace is already declared; leave the file alone
    AlreadyDeclared,
    /// Nothing to infer a namespace from
    NoGroup,
    /// Conflicting group values
    AmbiguousGroup(Vec<String>),
    /// New descriptor text with the inferred namespace
    Patched {
        /// Namespace copied from the group
        namespace: String,
        /// Full descriptor text after insertion
        text: String,
    },
}

/// A build descriptor read from disk
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Where the descriptor was read from
    pub path: PathBuf,
    /// Full descriptor contents
    pub text: String,
}

impl Descriptor {
    /// Wrap already loaded text
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    /// Read a descriptor from disk
    ///
    /// Returns `None` when the file is not valid UTF-8. Such a file is not
    /// something this tool can safely rewrite, but it is not an I/O failure.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = std::fs::read(path).map_err(|e| Error::descriptor_io(path, e))?;
        Ok(String::from_utf8(bytes)
            .ok()
            .map(|text| Self::new(path, text)))
    }

    /// Whether a namespace is already declared
    pub fn has_namespace(&self, mode: DetectionMode) -> bool {
        match mode {
            DetectionMode::Structural => {
                NAMESPACE_DECL.is_match(&COMMENT.replace_all(&self.text, ""))
            }
            DetectionMode::Substring => self.text.contains("namespace"),
        }
    }

    /// Locate the group declaration
    pub fn group(&self) -> GroupLookup {
        let mut captures = GROUP_DECL.captures_iter(&self.text);

        let Some(first) = captures.next() else {
            return GroupLookup::Missing;
        };

        let value = first[2].to_string();
        let mut values = vec![value.clone()];
        for other in captures {
            let other = &other[2];
            if !values.iter().any(|v| v == other) {
                values.push(other.to_string());
            }
        }
        if values.len() > 1 {
            return GroupLookup::Ambiguous(values);
        }

        let decl_end = first.get(0).map_or(0, |m| m.end());
        let (line_end, newline) = match self.text[decl_end..].find('\n') {
            Some(offset) => {
                let nl = decl_end + offset;
                let newline = if self.text[..nl].ends_with('\r') {
                    "\r\n"
                } else {
                    "\n"
                };
                (nl + 1, Some(newline))
            }
            None => (self.text.len(), None),
        };

        GroupLookup::Found(GroupDecl {
            value,
            indent: first[1].to_string(),
            line_end,
            newline,
        })
    }

    /// Text with `namespace '<group>'` inserted on the line after the group
    pub fn with_namespace(&self, group: &GroupDecl) -> String {
        let mut text = String::with_capacity(self.text.len() + group.value.len() + 16);
        let (head, tail) = self.text.split_at(group.line_end);
        text.push_str(head);

        let line = format!("{}namespace '{}'", group.indent, group.value);
        match group.newline {
            Some(newline) => {
                text.push_str(&line);
                text.push_str(newline);
            }
            None => {
                text.push('\n');
                text.push_str(&line);
            }
        }

        text.push_str(tail);
        text
    }

    /// Decide what patching this descriptor would do
    pub fn plan(&self, mode: DetectionMode) -> TextPatch {
        if self.has_namespace(mode) {
            return TextPatch::AlreadyDeclared;
        }

        match self.group() {
            GroupLookup::Missing => TextPatch::NoGroup,
            GroupLookup::Ambiguous(values) => TextPatch::AmbiguousGroup(values),
            GroupLookup::Found(group) => TextPatch::Patched {
                text: self.with_namespace(&group),
                namespace: group.value,
            },
        }
    }
}

/// Patch descriptor text without touching the filesystem
pub fn patch_text(text: &str, mode: DetectionMode) -> TextPatch {
    Descriptor::new(PathBuf::new(), text).plan(mode)
}
