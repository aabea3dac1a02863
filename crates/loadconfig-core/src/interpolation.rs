//! `$name` interpolation
//!
//! Templates understand:
//! - `$name` and `${name}` - substituted from the top-level keys
//! - `$$` - a literal `$`
//!
//! Names are `[_A-Za-z][_A-Za-z0-9]*`. Substitution is always safe: an
//! unknown name, or a `$` not followed by a name, is left as written.

use crate::odict::Odict;
use crate::value::Value;

/// Maximum number of substitution passes over a mapping
pub const EXPAND_MAX: usize = 5;

/// A parsed piece of a template
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Text copied as-is (escapes already applied)
    Literal(String),
    /// A `$name` or `${name}` reference
    Variable {
        /// The referenced key
        name: String,
        /// Whether the reference was written `${name}`
        braced: bool,
    },
}

impl Segment {
    /// The text this segment stands for when its variable is unknown
    fn source_text(&self) -> String {
        match self {
            Segment::Literal(s) => s.clone(),
            Segment::Variable { name, braced: true } => format!("${{{}}}", name),
            Segment::Variable { name, braced: false } => format!("${}", name),
        }
    }
}

/// Parser for `$` templates
pub struct TemplateParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TemplateParser<'a> {
    /// Create a new parser for the given input
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Parse the entire input string
    pub fn parse(&mut self) -> Vec<Segment> {
        let mut parts = Vec::new();

        while !self.is_eof() {
            if self.check_escape() {
                // $$ -> literal $
                self.advance();
                self.advance();
                parts.push(Segment::Literal("$".to_string()));
            } else if self.current() == Some('$') {
                parts.push(self.parse_variable());
            } else {
                let literal = self.collect_literal();
                if !literal.is_empty() {
                    parts.push(Segment::Literal(literal));
                }
            }
        }

        merge_adjacent_literals(parts)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current() {
            self.pos += c.len_utf8();
        }
    }

    /// Check if we're at an escaped dollar ($$)
    fn check_escape(&self) -> bool {
        self.current() == Some('$') && self.peek() == Some('$')
    }

    /// Collect literal text up to the next `$`
    fn collect_literal(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.current() {
            if c == '$' {
                break;
            }
            self.advance();
        }
        self.input[start..self.pos].to_string()
    }

    /// Parse a reference starting at `$`. Anything that is not a valid
    /// reference yields the bare `$` as a literal.
    fn parse_variable(&mut self) -> Segment {
        self.advance(); // $

        match self.current() {
            Some('{') => {
                let rest = &self.input[self.pos + 1..];
                let name_len = identifier_len(rest);
                if name_len > 0 && rest[name_len..].starts_with('}') {
                    let name = rest[..name_len].to_string();
                    self.pos += name_len + 2;
                    Segment::Variable { name, braced: true }
                } else {
                    Segment::Literal("$".to_string())
                }
            }
            Some(_) => {
                let name_len = identifier_len(&self.input[self.pos..]);
                if name_len == 0 {
                    return Segment::Literal("$".to_string());
                }
                let name = self.input[self.pos..self.pos + name_len].to_string();
                self.pos += name_len;
                Segment::Variable {
                    name,
                    braced: false,
                }
            }
            None => Segment::Literal("$".to_string()),
        }
    }
}

/// Length in bytes of the identifier at the start of `s`, 0 if none
fn identifier_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(*c == '_' || c.is_ascii_alphanumeric()))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Merge adjacent literal parts
fn merge_adjacent_literals(parts: Vec<Segment>) -> Vec<Segment> {
    let mut result = Vec::new();
    let mut current_literal = String::new();

    for part in parts {
        match part {
            Segment::Literal(s) => {
                current_literal.push_str(&s);
            }
            other => {
                if !current_literal.is_empty() {
                    result.push(Segment::Literal(current_literal));
                    current_literal = String::new();
                }
                result.push(other);
            }
        }
    }

    if !current_literal.is_empty() {
        result.push(Segment::Literal(current_literal));
    }

    result
}

/// Parse a template string
pub fn parse(input: &str) -> Vec<Segment> {
    TemplateParser::new(input).parse()
}

/// Check if a string may still need substitution
pub fn needs_processing(input: &str) -> bool {
    input.contains('$')
}

fn render_segments<F>(segments: &[Segment], lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Variable { name, .. } => match lookup(name) {
                Some(value) => out.push_str(&value),
                None => out.push_str(&segment.source_text()),
            },
        }
    }
    out
}

/// Safe substitution with a custom lookup
pub fn render_with<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    render_segments(&parse(template), &lookup)
}

/// Safe substitution from the top-level keys of `vars`
pub fn render(template: &str, vars: &Odict) -> String {
    render_with(template, |name| vars.get(name).map(Value::to_string))
}

/// Substitute `$name` references throughout `map` until nothing changes,
/// no `$` is left, or `EXPAND_MAX` passes ran. Returns the passes run.
///
/// Each pass reads from a snapshot of the mapping taken before it
/// started. A string that is exactly one reference to a non-string value
/// becomes a copy of that value. Any other changed string is re-typed as
/// a plain scalar, so `$year` with `year: 2015` yields the integer.
pub fn expand(map: &mut Odict) -> usize {
    let mut passes = 0;
    while passes < EXPAND_MAX && mapping_needs_processing(map) {
        let snapshot = map.clone();
        let changed = substitute_mapping(map, &snapshot);
        passes += 1;
        log::trace!("interpolation pass {} (changed: {})", passes, changed);
        if !changed {
            return passes;
        }
    }
    if passes == EXPAND_MAX && mapping_needs_processing(map) {
        log::warn!(
            "interpolation stopped after {} passes with references left",
            EXPAND_MAX
        );
    }
    passes
}

fn mapping_needs_processing(map: &Odict) -> bool {
    map.iter()
        .any(|(key, value)| needs_processing(key) || value_needs_processing(value))
}

fn value_needs_processing(value: &Value) -> bool {
    match value {
        Value::String(s) => needs_processing(s),
        Value::Sequence(items) => items.iter().any(value_needs_processing),
        Value::Set(items) => items.iter().any(|s| needs_processing(s)),
        Value::Mapping(map) => mapping_needs_processing(map),
        _ => false,
    }
}

fn lookup(vars: &Odict) -> impl Fn(&str) -> Option<String> + '_ {
    move |name| vars.get(name).map(Value::to_string)
}

fn substitute_mapping(map: &mut Odict, vars: &Odict) -> bool {
    let mut changed = false;
    for (key, mut value) in std::mem::take(map) {
        let key = if needs_processing(&key) {
            let rendered = render_segments(&parse(&key), &lookup(vars));
            changed |= rendered != key;
            rendered
        } else {
            key
        };
        changed |= substitute(&mut value, vars);
        map.set(key, value);
    }
    changed
}

fn substitute(value: &mut Value, vars: &Odict) -> bool {
    match value {
        Value::String(s) => {
            if !needs_processing(s) {
                return false;
            }
            let segments = parse(s);
            if let [Segment::Variable { name, .. }] = segments.as_slice() {
                if let Some(found) = vars.get(name).filter(|v| !v.is_string()) {
                    *value = found.clone();
                    return true;
                }
            }
            let rendered = render_segments(&segments, &lookup(vars));
            if rendered == *s {
                return false;
            }
            *value = Value::from_plain_scalar(&rendered);
            true
        }
        Value::Sequence(items) => items
            .iter_mut()
            .fold(false, |changed, item| substitute(item, vars) | changed),
        Value::Set(items) => {
            let mut changed = false;
            *items = std::mem::take(items)
                .into_iter()
                .map(|item| {
                    let rendered = render_segments(&parse(&item), &lookup(vars));
                    changed |= rendered != item;
                    rendered
                })
                .collect();
            changed
        }
        Value::Mapping(map) => substitute_mapping(map, vars),
        _ => false,
    }
}
