//! Tagged YAML loader
//!
//! Loading happens in two distinct phases:
//!
//! 1. **Bare-line splice.** A line consisting only of `!include <path>` is
//!    replaced by the file's text before any parsing happens.
//! 2. **Tag pass.** The spliced text is parsed from yaml-rust2 events and
//!    the custom tags are resolved in document order:
//!    - `!env name` becomes `{name: $NAME}` (empty string when unset)
//!    - `!read path` becomes the file's text
//!    - `!include path[:key:...]` loads another document, remembers it as
//!      the include root and yields the addressed node (`&` yields nothing)
//!    - `!expand key[:...]` addresses the most recent include root
//!
//! Tag failures (missing file, missing key) never abort the load: they
//! degrade to an empty string.

use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, TScalarStyle};
use yaml_rust2::ScanError;

use crate::dumper;
use crate::error::{Error, Result, SourceLocation};
use crate::odict::Odict;
use crate::value::Value;

/// Upper bound on bare-line `!include` splices per document
pub const PRE_INCLUDE_MAX: usize = 100;

/// Upper bound on nested tag-form includes
pub const INCLUDE_DEPTH_MAX: usize = 32;

const CORE_TAG_PREFIX: &str = "tag:yaml.org,2002:";

/// Tag resolution failures. These are logged and degraded to an empty
/// value, never returned to the caller.
#[derive(Debug, Error)]
enum TagError {
    #[error("cannot read '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    #[error("include depth limit ({limit}) reached at '{path}'")]
    TooDeep { path: String, limit: usize },

    #[error("no !include root registered before !expand {key}")]
    NoIncludeRoot { key: String },
}

static BARE_INCLUDE_RE: OnceLock<Regex> = OnceLock::new();

fn bare_include_re() -> &'static Regex {
    BARE_INCLUDE_RE.get_or_init(|| {
        Regex::new(r#"(?m)^!include[ \t]+["']?([\w/.~-]+)["']?[ \t]*$"#)
            .expect("bare include pattern is valid")
    })
}

fn try_read(path: &str) -> std::result::Result<String, TagError> {
    fs::read_to_string(path).map_err(|e| TagError::Unreadable {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Read a whole file as text, empty on any I/O error
pub fn read_file(path: &str) -> String {
    try_read(path).unwrap_or_else(|e| {
        log::debug!("{}", e);
        String::new()
    })
}

/// Read a configuration file given to `-C=`. A directory stands for its
/// `config.conf`. Returns `None` when nothing could be read.
pub fn read_config_file(path: &str) -> Option<String> {
    let path = Path::new(path);
    let path = if path.is_dir() {
        path.join("config.conf")
    } else {
        path.to_path_buf()
    };
    match fs::read_to_string(&path) {
        Ok(text) => Some(text),
        Err(e) => {
            log::debug!("cannot read config file '{}': {}", path.display(), e);
            None
        }
    }
}

/// Replace every line that is exactly `!include <path>` with the file's
/// text (trailing newlines trimmed, empty if unreadable).
pub fn pre_include(text: &str) -> String {
    let re = bare_include_re();
    let mut text = text.to_string();

    for _ in 0..PRE_INCLUDE_MAX {
        let found = re
            .captures(&text)
            .and_then(|caps| Some((caps.get(0)?.range(), caps.get(1)?.as_str().to_string())));
        let Some((range, path)) = found else {
            return text;
        };
        log::debug!("splicing bare !include {}", path);
        let content = read_file(&path);
        text.replace_range(range, content.trim_end_matches('\n'));
    }

    if re.is_match(&text) {
        log::warn!(
            "bare !include splicing stopped after {} iterations",
            PRE_INCLUDE_MAX
        );
    }
    text
}

/// YAML loader resolving loadconfig's custom tags
#[derive(Debug, Clone)]
pub struct Loader {
    origin: String,
    depth: usize,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Create a loader for inline text
    pub fn new() -> Self {
        Self {
            origin: "<config>".into(),
            depth: 0,
        }
    }

    fn nested(&self, path: &str) -> Self {
        Self {
            origin: path.to_string(),
            depth: self.depth + 1,
        }
    }

    /// Load a single YAML document. An empty document loads as null.
    pub fn load(&self, text: &str) -> Result<Value> {
        let text = pre_include(text);
        let mut parser = Parser::new_from_str(&text);
        let mut builder = Builder::new(self);

        parser
            .load(&mut builder, false)
            .map_err(|e| self.scan_error(&e))?;

        builder.result()
    }

    fn location(&self, marker: &Marker) -> SourceLocation {
        SourceLocation {
            file: self.origin.clone(),
            line: Some(marker.line()),
            column: Some(marker.col() + 1),
        }
    }

    fn scan_error(&self, err: &ScanError) -> Error {
        Error::parse(err.info().to_string()).with_source_location(self.location(err.marker()))
    }
}

/// How a node was tagged
enum NodeTag {
    None,
    /// `!name`
    Local(String),
    /// `!!name`
    Core(String),
    Other(String),
}

impl NodeTag {
    fn classify(tag: Option<Tag>) -> Self {
        let Some(tag) = tag else {
            return NodeTag::None;
        };
        match tag.handle.as_str() {
            "!" | "" => NodeTag::Local(tag.suffix),
            "!!" | CORE_TAG_PREFIX => NodeTag::Core(tag.suffix),
            handle => NodeTag::Other(format!("{}{}", handle, tag.suffix)),
        }
    }

    fn describe(&self) -> String {
        match self {
            NodeTag::None => String::new(),
            NodeTag::Local(s) => format!("!{}", s),
            NodeTag::Core(s) => format!("!!{}", s),
            NodeTag::Other(s) => s.clone(),
        }
    }
}

enum MapKey {
    /// `<<` merge key
    Merge,
    Key(String),
}

/// A collection under construction
enum BuildNode {
    Sequence {
        anchor: usize,
        tag: NodeTag,
        items: Vec<Value>,
    },
    Mapping {
        anchor: usize,
        tag: NodeTag,
        marker: Marker,
        entries: Vec<(MapKey, Option<Value>)>,
    },
}

/// Event receiver building `Value` trees
struct Builder<'a> {
    loader: &'a Loader,
    stack: Vec<BuildNode>,
    root: Option<Value>,
    anchors: HashMap<usize, Value>,
    include_root: Option<Value>,
    error: Option<Error>,
}

impl<'a> Builder<'a> {
    fn new(loader: &'a Loader) -> Self {
        Self {
            loader,
            stack: Vec::new(),
            root: None,
            anchors: HashMap::new(),
            include_root: None,
            error: None,
        }
    }

    fn result(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.root.unwrap_or_default()),
        }
    }

    fn fail(&mut self, err: Error, marker: &Marker) {
        let err = if err.source_location.is_none() {
            err.with_source_location(self.loader.location(marker))
        } else {
            err
        };
        self.error = Some(err);
    }

    fn expecting_key(&self) -> bool {
        match self.stack.last() {
            Some(BuildNode::Mapping { entries, .. }) => {
                entries.last().is_none_or(|(_, value)| value.is_some())
            }
            _ => false,
        }
    }

    fn push_complete(&mut self, node: Value, anchor: usize) -> Result<()> {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }

        let key_expected = self.expecting_key();
        match self.stack.last_mut() {
            None => self.root = Some(node),
            Some(BuildNode::Sequence { items, .. }) => items.push(node),
            Some(BuildNode::Mapping { entries, .. }) => {
                if key_expected {
                    entries.push((MapKey::Key(key_text(&node)?), None));
                } else if let Some((_, value)) = entries.last_mut() {
                    *value = Some(node);
                }
            }
        }
        Ok(())
    }

    fn scalar(&mut self, text: String, style: TScalarStyle, tag: NodeTag) -> Result<Value> {
        let plain = matches!(style, TScalarStyle::Plain);
        let value = match &tag {
            NodeTag::None if plain => Value::from_plain_scalar(&text),
            NodeTag::None => Value::String(text),
            NodeTag::Local(name) => match name.as_str() {
                "env" => env_tag(text.trim()),
                "read" => Value::String(read_file(text.trim())),
                "include" => self.include(text.trim())?,
                "expand" => self.expand(text.trim()),
                "" => Value::String(text),
                _ => return Err(unknown_tag(&tag)),
            },
            NodeTag::Core(name) => core_scalar(name, text).ok_or_else(|| unknown_tag(&tag))??,
            NodeTag::Other(_) => return Err(unknown_tag(&tag)),
        };
        Ok(value)
    }

    fn include(&mut self, spec: &str) -> Result<Value> {
        let (path, key) = spec.split_once(':').unwrap_or((spec, ""));
        let path = path.trim();

        let root = if self.loader.depth >= INCLUDE_DEPTH_MAX {
            log::debug!(
                "{}",
                TagError::TooDeep {
                    path: path.to_string(),
                    limit: INCLUDE_DEPTH_MAX,
                }
            );
            Value::Null
        } else {
            match try_read(path) {
                Ok(text) => {
                    log::debug!("!include {} (key '{}')", path, key);
                    self.loader.nested(path).load(&text)?
                }
                Err(e) => {
                    log::debug!("{}", e);
                    Value::Null
                }
            }
        };

        let value = root.subkey(key);
        self.include_root = Some(root);
        Ok(value)
    }

    fn expand(&self, key: &str) -> Value {
        match &self.include_root {
            Some(root) => root.subkey(key),
            None => {
                log::debug!(
                    "{}",
                    TagError::NoIncludeRoot {
                        key: key.to_string(),
                    }
                );
                Value::String(String::new())
            }
        }
    }

    fn finish_mapping(
        &self,
        tag: NodeTag,
        entries: Vec<(MapKey, Option<Value>)>,
    ) -> Result<Value> {
        let mut merged = Odict::new();
        let mut own = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let value = value.unwrap_or_default();
            match key {
                MapKey::Merge => merge_into(&mut merged, value)?,
                MapKey::Key(k) => own.push((k, value)),
            }
        }
        // Explicit keys win over merged ones
        for (key, value) in own {
            merged.set(key, value);
        }

        match &tag {
            NodeTag::None => Ok(Value::Mapping(merged)),
            NodeTag::Core(name) if name == "map" => Ok(Value::Mapping(merged)),
            NodeTag::Core(name) if name == "set" => {
                Ok(Value::Set(merged.keys().cloned().collect()))
            }
            _ => Err(unknown_tag(&tag)),
        }
    }

    fn handle(&mut self, ev: Event, marker: Marker) -> Result<()> {
        match ev {
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}

            Event::Scalar(text, style, anchor, tag) => {
                let tag = NodeTag::classify(tag);
                if matches!(tag, NodeTag::None)
                    && matches!(style, TScalarStyle::Plain)
                    && text == "<<"
                    && self.expecting_key()
                {
                    if let Some(BuildNode::Mapping { entries, .. }) = self.stack.last_mut() {
                        entries.push((MapKey::Merge, None));
                    }
                    return Ok(());
                }
                let node = self.scalar(text, style, tag)?;
                self.push_complete(node, anchor)?;
            }

            Event::SequenceStart(anchor, tag) => {
                self.stack.push(BuildNode::Sequence {
                    anchor,
                    tag: NodeTag::classify(tag),
                    items: Vec::new(),
                });
            }

            Event::SequenceEnd => match self.stack.pop() {
                Some(BuildNode::Sequence { anchor, tag, items }) => {
                    let node = match &tag {
                        NodeTag::None => Value::Sequence(items),
                        NodeTag::Core(name) if name == "seq" => Value::Sequence(items),
                        _ => return Err(unknown_tag(&tag)),
                    };
                    self.push_complete(node, anchor)?;
                }
                _ => return Err(Error::internal("sequence end without a sequence")),
            },

            Event::MappingStart(anchor, tag) => {
                self.stack.push(BuildNode::Mapping {
                    anchor,
                    tag: NodeTag::classify(tag),
                    marker,
                    entries: Vec::new(),
                });
            }

            Event::MappingEnd => match self.stack.pop() {
                Some(BuildNode::Mapping {
                    anchor,
                    tag,
                    marker: start,
                    entries,
                }) => {
                    let node = self.finish_mapping(tag, entries).map_err(|e| {
                        e.with_source_location(self.loader.location(&start))
                    })?;
                    self.push_complete(node, anchor)?;
                }
                _ => return Err(Error::internal("mapping end without a mapping")),
            },

            Event::Alias(id) => {
                // Aliases are expanded into independent copies
                let node = self
                    .anchors
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| Error::parse(format!("unknown anchor id {}", id)))?;
                self.push_complete(node, 0)?;
            }
        }
        Ok(())
    }
}

impl MarkedEventReceiver for Builder<'_> {
    fn on_event(&mut self, ev: Event, marker: Marker) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.handle(ev, marker) {
            self.fail(err, &marker);
        }
    }
}

fn env_tag(name: &str) -> Value {
    let value = std::env::var(name.to_uppercase()).unwrap_or_default();
    log::debug!("!env {} -> {} chars", name, value.len());
    let mut map = Odict::new();
    map.set(name, value);
    Value::Mapping(map)
}

/// `Some(Ok)` for a recognised core scalar tag, `None` for unknown ones
fn core_scalar(name: &str, text: String) -> Option<Result<Value>> {
    let typed = |expected: &str, value: Value| -> Result<Value> {
        Err(Error::parse(format!(
            "cannot read '{}' as !!{} (looks like a {})",
            text,
            expected,
            value.type_name()
        )))
    };
    let result = match name {
        "str" => Ok(Value::String(text.clone())),
        "null" => Ok(Value::Null),
        "int" => match Value::from_plain_scalar(text.trim()) {
            v @ Value::Integer(_) => Ok(v),
            other => typed("int", other),
        },
        "float" => match Value::from_plain_scalar(text.trim()) {
            v @ Value::Float(_) => Ok(v),
            Value::Integer(i) => Ok(Value::Float(i as f64)),
            other => typed("float", other),
        },
        "bool" => match Value::from_plain_scalar(text.trim()) {
            v @ Value::Bool(_) => Ok(v),
            other => typed("bool", other),
        },
        _ => return None,
    };
    Some(result)
}

fn unknown_tag(tag: &NodeTag) -> Error {
    Error::parse(format!(
        "could not determine a constructor for the tag '{}'",
        tag.describe()
    ))
    .with_help("Supported tags: !env, !read, !include, !expand and the core !! tags")
}

fn key_text(key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok("null".into()),
        Value::Bool(_) | Value::Integer(_) | Value::Float(_) => Ok(key.to_string()),
        other => Err(Error::parse(format!(
            "a {} cannot be used as a mapping key: {}",
            other.type_name(),
            dumper::dump(other, dumper::Style::Flow)
        ))),
    }
}

/// Apply a `<<` merge value: a mapping or a list of mappings, earlier
/// ones taking precedence.
fn merge_into(target: &mut Odict, value: Value) -> Result<()> {
    match value {
        Value::Mapping(map) => {
            for (key, value) in map {
                target.set(key, value);
            }
            Ok(())
        }
        Value::Sequence(items) => {
            for item in items.into_iter().rev() {
                match item {
                    Value::Mapping(_) => merge_into(target, item)?,
                    other => {
                        return Err(Error::parse(format!(
                            "expected a mapping for merging, found a {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(())
        }
        other => Err(Error::parse(format!(
            "expected a mapping or list of mappings for merging, found a {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn load(text: &str) -> Value {
        Loader::new().load(text).unwrap()
    }

    fn flow(value: &Value) -> String {
        dumper::dump(value, dumper::Style::Flow)
    }

    fn temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_plain_and_quoted_scalars() {
        let v = load("year: 2015\nquoted: '2015'\nflag: yes\nname: Kim");
        assert_eq!(flow(&v), "{year: 2015, quoted: '2015', flag: true, name: Kim}");
    }

    #[test]
    fn test_nested_mappings_keep_order() {
        let v = load("z: 1\na:\n  y: 2\n  b: 3");
        assert_eq!(flow(&v), "{z: 1, a: {y: 2, b: 3}}");
    }

    #[test]
    fn test_anchors_expand_to_copies() {
        let v = load("name: &dancers [Zeela, Kim]\nteam: *dancers");
        assert_eq!(flow(&v), "{name: [Zeela, Kim], team: [Zeela, Kim]}");
    }

    #[test]
    fn test_merge_key() {
        let v = load("base: &b {x: 1, y: 2}\nother:\n  <<: *b\n  y: 3\n  z: 4");
        assert_eq!(flow(&v.subkey("other")), "{x: 1, y: 3, z: 4}");
    }

    #[test]
    fn test_set_tag() {
        let v = load("dancers: !!set {Zeela, Kim}\nempty: !!set {}");
        let dancers = v.subkey("dancers");
        let mut names: Vec<_> = dancers.as_set().unwrap().iter().cloned().collect();
        names.sort();
        assert_eq!(names, vec!["Kim", "Zeela"]);
        assert_eq!(v.subkey("empty:").as_set().map(|s| s.len()), Some(0));
    }

    #[test]
    fn test_core_scalar_tags() {
        let v = load("a: !!str 12\nb: !!float 3\nc: !!int '7'");
        assert_eq!(flow(&v), "{a: '12', b: 3.0, c: 7}");
        assert!(Loader::new().load("a: !!int nope").is_err());
    }

    #[test]
    fn test_unknown_tag_is_error() {
        let err = Loader::new().load("a: !secret x").unwrap_err();
        assert!(err.to_string().contains("'!secret'"));
    }

    #[test]
    fn test_syntax_error_has_location() {
        let err = Loader::new().load("a: 1\nb: [1, 2\n").unwrap_err();
        let loc = err.source_location.unwrap();
        assert_eq!(loc.file, "<config>");
        assert!(loc.line.is_some());
    }

    #[test]
    fn test_empty_document_is_null() {
        assert_eq!(load(""), Value::Null);
    }

    #[test]
    fn test_env_tag() {
        std::env::set_var("LOADCONFIG_TEST_HOME_DIR", "/home/kim");
        let v = load("_: !env loadconfig_test_home_dir");
        assert_eq!(flow(&v), "{_: {loadconfig_test_home_dir: /home/kim}}");

        let v = load("x: !env loadconfig_test_unset_var");
        assert_eq!(flow(&v), "{x: {loadconfig_test_unset_var: ''}}");
    }

    #[test]
    fn test_read_tag() {
        let file = temp_file("line one\nline two\n");
        let v = load(&format!("text: !read {}", file.path().display()));
        assert_eq!(v.subkey("text"), Value::from("line one\nline two\n"));

        let v = load("text: !read /nonexistent/loadconfig/file");
        assert_eq!(v.subkey("text:"), Value::from(""));
    }

    #[test]
    fn test_include_whole_document() {
        let file = temp_file("a: 1\nb: 2\n");
        let v = load(&format!("inc: !include {}", file.path().display()));
        assert_eq!(flow(&v), "{inc: {a: 1, b: 2}}");
    }

    #[test]
    fn test_include_subkey() {
        let file = temp_file("field: [magnetic, electric]\nnested: {deep: {x: 1}}\n");
        let path = file.path().display();

        let v = load(&format!("photon: !include {}:field", path));
        assert_eq!(flow(&v), "{photon: [magnetic, electric]}");

        let v = load(&format!("x: !include {}:nested:deep:x", path));
        assert_eq!(flow(&v), "{x: 1}");

        let v = load(&format!("photon: !include {}:unknown", path));
        assert_eq!(flow(&v), "{photon: ''}");
    }

    #[test]
    fn test_include_missing_file() {
        let v = load("{_: !include /nonexistent/loadconfig.yaml, test: hi}");
        assert_eq!(flow(&v), "{_: '', test: hi}");
    }

    #[test]
    fn test_include_root_then_expand() {
        let file = temp_file("field: [magnetic, electric]\nother: 1\n");
        let v = load(&format!(
            "_: !include {}:&\nphoton: !expand field\nmissing: !expand nope",
            file.path().display()
        ));
        assert_eq!(
            flow(&v),
            "{_: '', photon: [magnetic, electric], missing: ''}"
        );
    }

    #[test]
    fn test_expand_without_include_root() {
        let v = load("photon: !expand field");
        assert_eq!(flow(&v), "{photon: ''}");
    }

    #[test]
    fn test_nested_include() {
        let inner = temp_file("leaf: green\n");
        let outer = temp_file(&format!("branch: !include {}\n", inner.path().display()));
        let v = load(&format!("tree: !include {}:branch:leaf", outer.path().display()));
        assert_eq!(flow(&v), "{tree: green}");
    }

    #[test]
    fn test_include_parse_error_names_file() {
        let bad = temp_file("a: [1, 2\n");
        let path = bad.path().display().to_string();
        let err = Loader::new()
            .load(&format!("x: !include {}", path))
            .unwrap_err();
        assert_eq!(err.source_location.unwrap().file, path);
    }

    #[test]
    fn test_self_include_stops_at_depth_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loop.yaml");
        fs::write(&path, format!("me: !include {}\n", path.display())).unwrap();
        let v = load(&format!("start: !include {}", path.display()));
        assert!(v.is_mapping());
    }

    #[test]
    fn test_pre_include_splice() {
        let file = temp_file("x: {a: 1, b: 2}\n");
        let v = load(&format!("y: [3, 4]\n!include {}\n", file.path().display()));
        assert_eq!(flow(&v), "{y: [3, 4], x: {a: 1, b: 2}}");
    }

    #[test]
    fn test_pre_include_quoted_and_missing() {
        let file = temp_file("x: 1\n");
        let text = format!("!include '{}'\n!include /nonexistent/file\ny: 2", file.path().display());
        assert_eq!(pre_include(&text), "x: 1\n\ny: 2");
    }

    #[test]
    fn test_pre_include_is_bounded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("self.yaml");
        fs::write(&path, format!("!include {}\n", path.display())).unwrap();
        let spliced = pre_include(&format!("!include {}", path.display()));
        assert!(spliced.starts_with("!include"));
    }

    #[test]
    fn test_read_config_file_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.conf"), "a: 1\n").unwrap();

        let text = read_config_file(&dir.path().display().to_string());
        assert_eq!(text.as_deref(), Some("a: 1\n"));
        assert_eq!(read_config_file("/nonexistent/loadconfig.conf"), None);
    }

    #[test]
    fn test_non_string_keys() {
        let v = load("1: one\ntrue: yes");
        assert_eq!(flow(&v), "{'1': one, 'true': true}");
        assert!(Loader::new().load("? [a, b]\n: c").is_err());
    }
}
