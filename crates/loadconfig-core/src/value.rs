//! Configuration value types
//!
//! Values can be scalars (string, int, float, bool, null),
//! sequences, sets of strings, or ordered mappings.

use indexmap::IndexSet;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

use crate::dumper::{self, Style};
use crate::odict::Odict;

/// A configuration value
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value (may contain `$name` placeholders)
    String(String),
    /// Sequence of values
    Sequence(Vec<Value>),
    /// Set of strings (`!!set`)
    Set(IndexSet<String>),
    /// Ordered mapping of string keys to values
    Mapping(Odict),
}

static BOOL_RE: OnceLock<Regex> = OnceLock::new();
static INT_RE: OnceLock<Regex> = OnceLock::new();
static FLOAT_RE: OnceLock<Regex> = OnceLock::new();

fn bool_re() -> &'static Regex {
    BOOL_RE.get_or_init(|| {
        Regex::new(r"^(?:yes|Yes|YES|no|No|NO|true|True|TRUE|false|False|FALSE|on|On|ON|off|Off|OFF)$")
            .expect("bool pattern is valid")
    })
}

fn int_re() -> &'static Regex {
    INT_RE.get_or_init(|| {
        Regex::new(r"^[-+]?(?:0b[01_]+|0x[0-9a-fA-F_]+|0[0-7_]+|0|[1-9][0-9_]*)$")
            .expect("int pattern is valid")
    })
}

fn float_re() -> &'static Regex {
    FLOAT_RE.get_or_init(|| {
        Regex::new(
            r"^(?:[-+]?(?:[0-9][0-9_]*\.[0-9_]*|\.[0-9_]+)(?:[eE][-+]?[0-9]+)?|[-+]?\.(?:inf|Inf|INF)|\.(?:nan|NaN|NAN))$",
        )
        .expect("float pattern is valid")
    })
}

impl Value {
    /// Type a plain (unquoted, untagged) YAML scalar.
    ///
    /// Follows YAML 1.1 resolution for the subset loadconfig supports:
    /// `yes`/`no`/`on`/`off` are booleans and a float needs a `.`.
    pub fn from_plain_scalar(text: &str) -> Value {
        match text {
            "" | "~" | "null" | "Null" | "NULL" => return Value::Null,
            _ => {}
        }
        if bool_re().is_match(text) {
            let truthy = matches!(text.as_bytes()[0], b'y' | b'Y' | b't' | b'T')
                || text.eq_ignore_ascii_case("on");
            return Value::Bool(truthy);
        }
        if int_re().is_match(text) {
            if let Some(i) = parse_int(text) {
                return Value::Integer(i);
            }
        }
        if float_re().is_match(text) {
            if let Some(f) = parse_float(text) {
                return Value::Float(f);
            }
        }
        Value::String(text.to_string())
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a boolean
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Check if this value is an integer
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer(_))
    }

    /// Check if this value is a float
    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    /// Check if this value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if this value is a sequence
    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Sequence(_))
    }

    /// Check if this value is a set
    pub fn is_set(&self) -> bool {
        matches!(self, Value::Set(_))
    }

    /// Check if this value is a mapping
    pub fn is_mapping(&self) -> bool {
        matches!(self, Value::Mapping(_))
    }

    /// Null or the empty string: what unresolved tags degrade to
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Get as boolean if this is a Bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float or Integer
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as str if this is a String
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as slice if this is a Sequence
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    /// Get as set if this is a Set
    pub fn as_set(&self) -> Option<&IndexSet<String>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Get as mapping if this is a Mapping
    pub fn as_mapping(&self) -> Option<&Odict> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Get as mutable mapping if this is a Mapping
    pub fn as_mapping_mut(&mut self) -> Option<&mut Odict> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Set(_) => "set",
            Value::Mapping(_) => "mapping",
        }
    }

    /// Walk a colon-separated key path and return an independent copy of
    /// the node it reaches.
    ///
    /// An empty segment stops the walk at the current node. A missing key,
    /// a null value, a non-mapping in the middle of the path, an empty
    /// document or the path `&` all yield the empty string.
    pub fn subkey(&self, path: &str) -> Value {
        let empty = Value::String(String::new());
        if path == "&" || self.is_empty_document() {
            return empty;
        }

        let mut current = self;
        for key in path.split(':') {
            if key.is_empty() {
                return current.clone();
            }
            current = match current.as_mapping().and_then(|m| m.get(key)) {
                Some(Value::Null) | None => return empty,
                Some(next) => next,
            };
        }
        current.clone()
    }

    fn is_empty_document(&self) -> bool {
        match self {
            Value::Null | Value::Bool(false) => true,
            Value::Integer(i) => *i == 0,
            Value::String(s) => s.is_empty(),
            Value::Sequence(s) => s.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Mapping(m) => m.is_empty(),
            _ => false,
        }
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let cleaned = text.replace('_', "");
    let (negative, digits) = match cleaned.as_bytes().first() {
        Some(b'-') => (true, &cleaned[1..]),
        Some(b'+') => (false, &cleaned[1..]),
        _ => (false, cleaned.as_str()),
    };
    let magnitude = if let Some(bin) = digits.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()?
    } else if let Some(hex) = digits.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_float(text: &str) -> Option<f64> {
    let cleaned = text.replace('_', "");
    let lower = cleaned.to_ascii_lowercase();
    match lower.as_str() {
        ".nan" => return Some(f64::NAN),
        ".inf" | "+.inf" => return Some(f64::INFINITY),
        "-.inf" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    // "1.e5" is valid YAML but not a valid Rust float literal
    let normalized = match lower.find('e') {
        Some(pos) if lower[..pos].ends_with('.') => {
            format!("{}0{}", &lower[..pos], &lower[pos..])
        }
        _ => lower,
    };
    normalized.parse::<f64>().ok()
}

/// Plain text form: strings raw, null as the empty string, collections
/// as flow YAML. This is what `$name` substitution and export insert.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(n) => write!(f, "{}", dumper::format_float(*n)),
            Value::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", dumper::dump(other, Style::Flow)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl From<Odict> for Value {
    fn from(m: Odict) -> Self {
        Value::Mapping(m)
    }
}

impl From<IndexSet<String>> for Value {
    fn from(s: IndexSet<String>) -> Self {
        Value::Set(s)
    }
}
