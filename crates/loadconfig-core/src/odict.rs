//! Ordered mapping with YAML construction and attribute-style access
//!
//! `Odict` keeps insertion order for serialization while comparing
//! order-independently. Every merge strips the reserved `_` key, which
//! documents use to register an include root without emitting a value.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use crate::dumper::{self, Style};
use crate::error::{Error, Result};
use crate::loader::Loader;
use crate::value::Value;

/// Key stripped after every merge
pub const RESERVED_KEY: &str = "_";

static NULL: Value = Value::Null;

/// Ordered, string-keyed mapping of configuration values
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Odict(IndexMap<String, Value>);

/// Something that can be merged into an `Odict`
#[derive(Debug, Clone)]
pub enum Source {
    /// YAML text, parsed with brace-wrapping fallback
    Yaml(String),
    /// An already built mapping
    Mapping(Odict),
}

impl Source {
    /// Resolve the source into a mapping
    pub fn into_odict(self) -> Result<Odict> {
        match self {
            Source::Yaml(text) => Odict::parse(&text),
            Source::Mapping(map) => Ok(map),
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Source::Yaml(s.to_string())
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Source::Yaml(s)
    }
}

impl From<&String> for Source {
    fn from(s: &String) -> Self {
        Source::Yaml(s.clone())
    }
}

impl From<Odict> for Source {
    fn from(m: Odict) -> Self {
        Source::Mapping(m)
    }
}

impl From<&Odict> for Source {
    fn from(m: &Odict) -> Self {
        Source::Mapping(m.clone())
    }
}

impl Odict {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Parse YAML text into a mapping.
    ///
    /// The text is dedented first. When it fails to parse (e.g. the
    /// single-line shorthand `a: 1, b: 2`) it is retried wrapped in braces.
    /// Empty text yields an empty mapping; any other non-mapping document
    /// is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let text = dedent(text);
        let value = match Loader::new().load(&text) {
            Ok(value) => value,
            Err(err) => match Loader::new().load(&format!("{{{}}}", text)) {
                Ok(value) => value,
                Err(_) => return Err(err),
            },
        };

        match value {
            Value::Mapping(map) => Ok(map),
            Value::Null => Ok(Self::new()),
            Value::String(s) if s.is_empty() => Ok(Self::new()),
            other => Err(Error::parse(format!(
                "expected a mapping at the document root, found a {}",
                other.type_name()
            ))),
        }
    }

    /// Layer `source` over this mapping (last write wins per key), then
    /// drop the reserved key.
    pub fn update(&mut self, source: impl Into<Source>) -> Result<()> {
        let other = source.into().into_odict()?;
        log::trace!("merging {} keys", other.len());
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
        self.0.shift_remove(RESERVED_KEY);
        Ok(())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a mutable value by key
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    /// Attribute-style read: a missing key reads as null, never an error
    pub fn attr(&self, key: &str) -> &Value {
        self.0.get(key).unwrap_or(&NULL)
    }

    /// Write or overwrite a key, keeping its position if it exists
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a key, preserving the order of the others
    pub fn remove(&mut self, key: &str) -> Result<Value> {
        self.0
            .shift_remove(key)
            .ok_or_else(|| Error::path_not_found(key))
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Mutable entries in insertion order
    pub fn iter_mut(&mut self) -> indexmap::map::IterMut<'_, String, Value> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Representation form: single-line flow YAML
    pub fn to_flow_yaml(&self) -> String {
        dumper::dump_mapping(self, Style::Flow)
    }

    /// Display form: block YAML
    pub fn to_block_yaml(&self) -> String {
        dumper::dump_mapping(self, Style::Block)
    }
}

impl fmt::Display for Odict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_block_yaml())
    }
}

impl FromStr for Odict {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Odict::parse(s)
    }
}

impl Index<&str> for Odict {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        self.attr(key)
    }
}

impl FromIterator<(String, Value)> for Odict {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Odict {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Odict {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Remove the whitespace prefix common to every non-blank line
fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| &line[..line.len() - line.trim_start().len()])
        .reduce(|acc, indent| {
            let common = acc
                .char_indices()
                .zip(indent.chars())
                .find(|((_, a), b)| a != b)
                .map(|((i, _), _)| i)
                .unwrap_or_else(|| acc.len().min(indent.len()));
            &acc[..common]
        })
        .unwrap_or("");

    if margin.is_empty() {
        return text.to_string();
    }

    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
