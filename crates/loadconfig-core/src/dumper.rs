//! YAML dumper
//!
//! Two layouts: flow (`{a: 1, b: [x, y]}`, single line) and block
//! (indented, one key per line). Output never has anchors or a trailing
//! newline, and block sequences are always indented under their key.

use crate::odict::Odict;
use crate::value::Value;

/// Output layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// Compact single-line form
    Flow,
    /// Indented multi-line form
    Block,
}

const INDENT: usize = 2;

/// Serialize any value
pub fn dump(value: &Value, style: Style) -> String {
    match (style, value) {
        (Style::Block, Value::Mapping(map)) => dump_mapping(map, Style::Block),
        (Style::Block, Value::Sequence(items)) if !items.is_empty() => {
            let mut lines = Vec::new();
            block_sequence(items, 0, &mut lines);
            lines.join("\n")
        }
        (Style::Block, Value::String(s)) => scalar_string(s, false),
        _ => {
            let mut out = String::new();
            flow(value, &mut out);
            out
        }
    }
}

/// Serialize a mapping
pub fn dump_mapping(map: &Odict, style: Style) -> String {
    if style == Style::Flow || map.is_empty() {
        let mut out = String::new();
        flow_mapping(map, &mut out);
        return out;
    }
    let mut lines = Vec::new();
    block_mapping(map, 0, &mut lines);
    lines.join("\n")
}

/// YAML text for a float: always carries a `.` so it reads back as a float
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return ".nan".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { ".inf".into() } else { "-.inf".into() };
    }
    let text = f.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn flow(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&format_float(*f)),
        Value::String(s) => out.push_str(&scalar_string(s, true)),
        Value::Sequence(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                flow(item, out);
            }
            out.push(']');
        }
        Value::Set(items) => {
            out.push_str("!!set {");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&scalar_string(item, true));
                out.push_str(": null");
            }
            out.push('}');
        }
        Value::Mapping(map) => flow_mapping(map, out),
    }
}

fn flow_mapping(map: &Odict, out: &mut String) {
    out.push('{');
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&scalar_string(key, true));
        out.push_str(": ");
        flow(value, out);
    }
    out.push('}');
}

fn pad(indent: usize) -> String {
    " ".repeat(indent)
}

/// A value that fits on its key's line in block layout
fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => scalar_string(s, false),
        other => {
            let mut out = String::new();
            flow(other, &mut out);
            out
        }
    }
}

fn block_mapping(map: &Odict, indent: usize, lines: &mut Vec<String>) {
    for (key, value) in map {
        let head = format!("{}{}:", pad(indent), scalar_string(key, false));
        match value {
            Value::Mapping(m) if !m.is_empty() => {
                lines.push(head);
                block_mapping(m, indent + INDENT, lines);
            }
            Value::Sequence(items) if !items.is_empty() => {
                lines.push(head);
                block_sequence(items, indent + INDENT, lines);
            }
            Value::String(s) if literal_block_ok(s) => {
                lines.push(format!("{} |-", head));
                literal_lines(s, indent + INDENT, lines);
            }
            other => lines.push(format!("{} {}", head, inline(other))),
        }
    }
}

fn block_sequence(items: &[Value], indent: usize, lines: &mut Vec<String>) {
    let inner = indent + INDENT;
    for item in items {
        let mut nested = Vec::new();
        match item {
            Value::Mapping(m) if !m.is_empty() => block_mapping(m, inner, &mut nested),
            Value::Sequence(s) if !s.is_empty() => block_sequence(s, inner, &mut nested),
            Value::String(s) if literal_block_ok(s) => {
                nested.push(format!("{}|-", pad(inner)));
                literal_lines(s, inner, &mut nested);
            }
            other => nested.push(format!("{}{}", pad(inner), inline(other))),
        }

        // The first nested line shares the "- " marker line
        let mut nested = nested.into_iter();
        if let Some(first) = nested.next() {
            lines.push(format!("{}- {}", pad(indent), &first[inner..]));
        }
        lines.extend(nested);
    }
}

/// Multi-line strings without a trailing newline go out as `|-` blocks
fn literal_block_ok(s: &str) -> bool {
    s.contains('\n')
        && !s.ends_with('\n')
        && !s.starts_with([' ', '\n'])
        && !s.chars().any(|c| c.is_control() && c != '\n')
        && !s.split('\n').any(|line| !line.is_empty() && line.trim().is_empty())
}

fn literal_lines(s: &str, indent: usize, lines: &mut Vec<String>) {
    for line in s.split('\n') {
        if line.is_empty() {
            lines.push(String::new());
        } else {
            lines.push(format!("{}{}", pad(indent), line));
        }
    }
}

/// Render a string scalar, quoting only when a plain scalar would not
/// read back as the same string.
fn scalar_string(s: &str, in_flow: bool) -> String {
    if s.chars().any(char::is_control) {
        double_quote(s)
    } else if is_plain_safe(s, in_flow) {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "''"))
    }
}

fn is_plain_safe(s: &str, in_flow: bool) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let second = chars.next();

    if !matches!(Value::from_plain_scalar(s), Value::String(_)) || s == "<<" {
        return false;
    }
    if matches!(
        first,
        ',' | '[' | ']' | '{' | '}' | '#' | '&' | '*' | '!' | '|' | '>' | '\'' | '"' | '%' | '@' | '`' | '?' | ':'
    ) {
        return false;
    }
    if first == '-' && second.is_none_or(char::is_whitespace) {
        return false;
    }
    if s.starts_with("---") || s.starts_with("...") {
        return false;
    }
    if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
        return false;
    }
    if s.contains(": ") || s.contains(" #") || s.ends_with(':') {
        return false;
    }
    if in_flow && s.contains([',', '[', ']', '{', '}']) {
        return false;
    }
    true
}

fn double_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
