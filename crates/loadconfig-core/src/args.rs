//! Command line parsing from a declarative `clg` schema
//!
//! A configuration can describe its own command line under the `clg` key:
//!
//! ```yaml
//! clg:
//!   description: Build the image
//!   default_cmd: build
//!   options:
//!     version: {short: v, action: version, version: dbuild 0.4.3}
//!     extra_config: {short: e, help: extra config file}
//!   args:
//!     host: {help: target host}
//!   subparsers:
//!     build: {help: build it}
//!     push: {help: push it}
//! ```
//!
//! The schema is compiled into a [`clap::Command`]. Parsed values come back
//! as an [`Odict`] keyed by option/argument name in declaration order, with
//! the selected subcommand at each depth stored as `command0`, `command1`...
//! Help, version and usage output surface as [`ErrorKind::Exit`] errors
//! carrying the rendered text.
//!
//! [`ErrorKind::Exit`]: crate::error::ErrorKind::Exit

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use clap::builder::PossibleValuesParser;
use clap::error::ErrorKind as ClapErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::error::{Error, Result};
use crate::odict::Odict;
use crate::value::Value;

/// Key holding the command line schema
pub const SCHEMA_KEY: &str = "clg";

/// Exit statuses used when argument parsing stops early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliSettings {
    /// Status for help and version output
    pub info_exit_code: i32,
    /// Status for usage errors
    pub error_exit_code: i32,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            info_exit_code: 1,
            error_exit_code: 2,
        }
    }
}

/// Converts a raw command line string into a typed value
pub trait ArgType: Send + Sync {
    /// Convert the raw text, or reject it with a message
    fn convert(&self, raw: &str) -> std::result::Result<Value, String>;

    /// Get the name the schema's `type` key refers to
    fn name(&self) -> &str;
}

/// A simple function-based argument type
pub struct FnArgType<F>
where
    F: Fn(&str) -> std::result::Result<Value, String> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnArgType<F>
where
    F: Fn(&str) -> std::result::Result<Value, String> + Send + Sync,
{
    /// Create a new function-based argument type
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> ArgType for FnArgType<F>
where
    F: Fn(&str) -> std::result::Result<Value, String> + Send + Sync,
{
    fn convert(&self, raw: &str) -> std::result::Result<Value, String> {
        (self.func)(raw)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Registry of argument types available to `type:` in a schema
#[derive(Clone)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<dyn ArgType>>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.types.keys().collect();
        names.sort();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Create a registry with the built-in `str`, `int` and `float` types
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_fn("str", |raw| Ok(Value::String(raw.to_string())));
        registry.register_fn("int", |raw| {
            raw.trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("invalid int value: '{}'", raw))
        });
        registry.register_fn("float", |raw| {
            raw.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("invalid float value: '{}'", raw))
        });
        registry
    }

    /// Register an argument type, replacing one with the same name
    pub fn register(&mut self, arg_type: Arc<dyn ArgType>) {
        self.types.insert(arg_type.name().to_string(), arg_type);
    }

    /// Register a function as an argument type
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&str) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnArgType::new(name, func)));
    }

    /// Get an argument type by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ArgType>> {
        self.types.get(name)
    }

    /// Check if an argument type is registered
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Layer another registry's types over this one
    pub fn extend(&mut self, other: &TypeRegistry) {
        for (name, arg_type) in &other.types {
            self.types.insert(name.clone(), arg_type.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Store,
    StoreTrue,
    StoreFalse,
    Count,
    Append,
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nargs {
    One,
    Optional,
    ZeroOrMore,
    OneOrMore,
    Exactly(usize),
}

/// How to read one argument back out of the matches
#[derive(Debug, Clone)]
struct ArgDecl {
    id: String,
    positional: bool,
    action: Action,
    nargs: Nargs,
    type_name: Option<String>,
    default: Value,
}

/// Argument declarations for one command level
#[derive(Debug, Default)]
struct Layout {
    decls: Vec<ArgDecl>,
    version: Option<String>,
    commands: HashMap<String, Layout>,
}

impl Layout {
    /// Version text of the deepest command named on the command line
    fn version_for(&self, rest: &[String]) -> Option<&str> {
        let mut layout = self;
        let mut version = self.version.as_deref();
        for token in rest {
            if let Some(sub) = layout.commands.get(token.as_str()) {
                layout = sub;
                version = layout.version.as_deref().or(version);
            }
        }
        version
    }
}

/// Argument ids and flags already in use at one command level
struct Claimed {
    ids: HashSet<String>,
    shorts: HashSet<char>,
    longs: HashSet<String>,
}

impl Claimed {
    /// clap always adds `-h`/`--help`
    fn new() -> Self {
        Self {
            ids: HashSet::from(["help".to_string()]),
            shorts: HashSet::from(['h']),
            longs: HashSet::from(["help".to_string()]),
        }
    }

    fn claim(&mut self, arg: &Arg, path: &str) -> Result<()> {
        let id = arg.get_id().as_str();
        if !self.ids.insert(id.to_string()) {
            return Err(Error::schema(path, format!("argument name '{}' is already taken", id)));
        }
        if let Some(short) = arg.get_short() {
            if !self.shorts.insert(short) {
                let message = format!("short flag '-{}' is already taken", short);
                return Err(Error::schema(path, message));
            }
        }
        if let Some(long) = arg.get_long() {
            if !self.longs.insert(long.to_string()) {
                return Err(Error::schema(path, format!("long flag '--{}' is already taken", long)));
            }
        }
        Ok(())
    }
}

/// Parse `args` against a `clg` schema.
///
/// `args[0]` is the program name; its file name is used as `prog` when the
/// schema has none (falling back to the running executable). When parsing
/// fails with a usage error, no help flag was given and the schema names a
/// `default_cmd`, parsing is retried with that command inserted in front of
/// the remaining arguments.
pub fn parse_args(
    schema: &Value,
    args: &[String],
    types: &TypeRegistry,
    settings: &CliSettings,
) -> Result<Odict> {
    let mut schema = schema
        .as_mapping()
        .cloned()
        .ok_or_else(|| Error::schema(SCHEMA_KEY, "expected a mapping"))?;
    let default_cmd = schema
        .remove("default_cmd")
        .ok()
        .filter(|v| !v.is_blank())
        .map(|v| v.to_string());

    let prog = text(&schema, "prog")
        .or_else(|| args.first().map(|arg0| program_name(arg0)))
        .filter(|prog| !prog.is_empty())
        .or_else(|| std::env::args().next().map(|arg0| program_name(&arg0)))
        .unwrap_or_default();
    let rest = args.get(1..).unwrap_or_default();

    let (mut command, layout) = compile(&prog, &schema, SCHEMA_KEY, types)?;
    let err = match run(&mut command, &layout, &prog, rest, types) {
        Ok(parsed) => return Ok(parsed),
        Err(err) => err,
    };
    let exit = |err: clap::Error, argv: &[String]| {
        exit_error(err, settings, layout.version_for(argv))
    };

    let asked_for_help = rest.iter().any(|a| a == "-h" || a == "--help");
    match default_cmd {
        Some(cmd) if is_usage_error(&err) && !asked_for_help => {
            log::debug!("retrying command line with default command '{}'", cmd);
            let retry: Vec<String> = std::iter::once(cmd).chain(rest.iter().cloned()).collect();
            let (mut command, layout) = compile(&prog, &schema, SCHEMA_KEY, types)?;
            run(&mut command, &layout, &prog, &retry, types).map_err(|e| exit(e, &retry[..]))
        }
        _ => Err(exit(err, rest)),
    }
}

fn program_name(arg0: &str) -> String {
    Path::new(arg0)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| arg0.to_string())
}

fn run(
    command: &mut Command,
    layout: &Layout,
    prog: &str,
    rest: &[String],
    types: &TypeRegistry,
) -> std::result::Result<Odict, clap::Error> {
    let argv = std::iter::once(prog.to_string()).chain(rest.iter().cloned());
    let matches = command.try_get_matches_from_mut(argv)?;
    let mut parsed = Odict::new();
    collect(&matches, layout, 0, types, &mut parsed)
        .map_err(|message| command.error(ClapErrorKind::ValueValidation, message))?;
    Ok(parsed)
}

fn is_usage_error(err: &clap::Error) -> bool {
    !matches!(
        err.kind(),
        ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
    )
}

/// Version output is the schema's text as written, without clap's
/// `<prog> ` prefix.
fn exit_error(err: clap::Error, settings: &CliSettings, version: Option<&str>) -> Error {
    if let (ClapErrorKind::DisplayVersion, Some(version)) = (err.kind(), version) {
        return Error::exit(settings.info_exit_code, version);
    }
    let code = if is_usage_error(&err) {
        settings.error_exit_code
    } else {
        settings.info_exit_code
    };
    let rendered = err.render().to_string();
    Error::exit(code, rendered.trim_end())
}

fn collect(
    matches: &ArgMatches,
    layout: &Layout,
    depth: usize,
    types: &TypeRegistry,
    parsed: &mut Odict,
) -> std::result::Result<(), String> {
    for decl in &layout.decls {
        parsed.set(decl.id.clone(), decl.extract(matches, types)?);
    }
    if let Some((name, sub_matches)) = matches.subcommand() {
        parsed.set(format!("command{}", depth), name);
        if let Some(sub_layout) = layout.commands.get(name) {
            collect(sub_matches, sub_layout, depth + 1, types, parsed)?;
        }
    }
    Ok(())
}

impl ArgDecl {
    fn extract(&self, matches: &ArgMatches, types: &TypeRegistry) -> std::result::Result<Value, String> {
        match self.action {
            Action::StoreTrue | Action::StoreFalse => Ok(Value::Bool(matches.get_flag(&self.id))),
            Action::Count => match matches.get_count(&self.id) {
                0 => Ok(self.default.clone()),
                n => Ok(Value::Integer(i64::from(n))),
            },
            Action::Version => Ok(Value::Null),
            Action::Store | Action::Append => {
                let given: Option<Vec<String>> = matches
                    .get_many::<String>(&self.id)
                    .map(|values| values.cloned().collect());
                match given {
                    None => self.absent(types),
                    Some(values) if self.is_multiple() => values
                        .iter()
                        .map(|raw| self.convert(raw, types))
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map(Value::Sequence),
                    Some(values) => match values.last() {
                        Some(raw) => self.convert(raw, types),
                        None => Ok(Value::Null),
                    },
                }
            }
        }
    }

    fn absent(&self, types: &TypeRegistry) -> std::result::Result<Value, String> {
        match &self.default {
            Value::Null if self.positional && self.nargs == Nargs::ZeroOrMore => {
                Ok(Value::Sequence(Vec::new()))
            }
            Value::String(raw) if self.type_name.is_some() => self.convert(raw, types),
            other => Ok(other.clone()),
        }
    }

    fn is_multiple(&self) -> bool {
        self.action == Action::Append
            || matches!(
                self.nargs,
                Nargs::ZeroOrMore | Nargs::OneOrMore | Nargs::Exactly(_)
            )
    }

    fn convert(&self, raw: &str, types: &TypeRegistry) -> std::result::Result<Value, String> {
        let Some(type_name) = &self.type_name else {
            return Ok(Value::String(raw.to_string()));
        };
        let arg_type = types
            .get(type_name)
            .ok_or_else(|| format!("unknown type '{}'", type_name))?;
        arg_type
            .convert(raw)
            .map_err(|message| format!("argument {}: {}", self.display_name(), message))
    }

    fn is_required(&self) -> bool {
        !matches!(self.nargs, Nargs::Optional | Nargs::ZeroOrMore)
    }

    /// More than one value per occurrence
    fn takes_many(&self) -> bool {
        match self.nargs {
            Nargs::ZeroOrMore | Nargs::OneOrMore => true,
            Nargs::Exactly(n) => n > 1,
            Nargs::One | Nargs::Optional => false,
        }
    }

    fn display_name(&self) -> String {
        if self.positional {
            self.id.clone()
        } else {
            format!("--{}", self.id.replace('_', "-"))
        }
    }
}

/// Build the clap command for one schema level
fn compile(name: &str, node: &Odict, path: &str, types: &TypeRegistry) -> Result<(Command, Layout)> {
    let mut command = Command::new(name.to_string()).disable_version_flag(true);
    if let Some(about) = text(node, "description").or_else(|| text(node, "help")) {
        command = command.about(about);
    }
    if let Some(epilog) = text(node, "epilog") {
        command = command.after_help(epilog);
    }
    if let Some(usage) = text(node, "usage") {
        command = command.override_usage(usage);
    }

    let mut layout = Layout::default();
    let mut claimed = Claimed::new();
    for (section, positional) in [("options", false), ("args", true)] {
        let here = format!("{}.{}", path, section);
        let entries = match node.get(section) {
            None | Some(Value::Null) => continue,
            Some(Value::Mapping(entries)) => entries,
            Some(other) => {
                return Err(Error::schema(here, format!("expected a mapping, found a {}", other.type_name())))
            }
        };
        for (id, spec) in entries {
            let arg_path = format!("{}.{}", here, id);
            let (arg, decl) = declare(id, spec, &arg_path, positional, types)?;
            claimed.claim(&arg, &arg_path)?;
            if decl.action == Action::Version {
                let version = version_text(spec);
                command = command.version(version.clone());
                layout.version = Some(version);
            } else {
                layout.decls.push(decl);
            }
            command = command.arg(arg);
        }
    }
    if check_positionals(&layout.decls, &format!("{}.args", path))? {
        command = command.allow_missing_positional(true);
    }

    if let Some(subparsers) = node.get("subparsers") {
        let here = format!("{}.subparsers", path);
        let subparsers = subparsers
            .as_mapping()
            .ok_or_else(|| Error::schema(here.clone(), "expected a mapping"))?;
        let (parsers, here) = match subparsers.get("parsers") {
            Some(Value::Mapping(parsers)) => (parsers, format!("{}.parsers", here)),
            _ => (subparsers, here),
        };
        for (sub_name, sub_node) in parsers {
            let sub_node = match sub_node {
                Value::Mapping(m) => m.clone(),
                Value::Null => Odict::new(),
                other => {
                    return Err(Error::schema(
                        format!("{}.{}", here, sub_name),
                        format!("expected a mapping, found a {}", other.type_name()),
                    ))
                }
            };
            let (sub_command, sub_layout) = compile(sub_name, &sub_node, &format!("{}.{}", here, sub_name), types)?;
            command = command.subcommand(sub_command);
            layout.commands.insert(sub_name.clone(), sub_layout);
        }
        let required = subparsers.attr("required").as_bool().unwrap_or(true);
        command = command.subcommand_required(required);
    }

    Ok((command, layout))
}

/// Declare one option or positional argument
fn declare(
    id: &str,
    spec: &Value,
    path: &str,
    positional: bool,
    types: &TypeRegistry,
) -> Result<(Arg, ArgDecl)> {
    let spec = match spec {
        Value::Mapping(m) => m.clone(),
        Value::Null => Odict::new(),
        other => {
            return Err(Error::schema(
                path,
                format!("expected a mapping, found a {}", other.type_name()),
            ))
        }
    };

    let action = match text(&spec, "action").as_deref() {
        None | Some("store") => Action::Store,
        Some("store_true") => Action::StoreTrue,
        Some("store_false") => Action::StoreFalse,
        Some("count") => Action::Count,
        Some("append") => Action::Append,
        Some("version") => Action::Version,
        Some(other) => return Err(Error::schema(path, format!("unknown action '{}'", other))),
    };
    if positional && action != Action::Store {
        return Err(Error::schema(path, "positional arguments only support the store action"));
    }
    let nargs = parse_nargs(spec.get("nargs"), path)?;

    let type_name = text(&spec, "type");
    if let Some(t) = &type_name {
        if !types.contains(t) {
            return Err(Error::schema(path, format!("unknown type '{}'", t))
                .with_help("Register the type in ConfigOptions::types"));
        }
    }
    let default = spec.get("default").cloned().unwrap_or_default();

    let mut arg = Arg::new(id.to_string());
    if !positional {
        arg = arg.long(id.replace('_', "-"));
        if let Some(short) = text(&spec, "short") {
            let mut chars = short.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => arg = arg.short(c),
                _ => return Err(Error::schema(path, format!("short flag '{}' must be one character", short))),
            }
        }
    }
    if let Some(help) = text(&spec, "help") {
        arg = arg.help(help.replace("__DEFAULT__", &default.to_string()));
    }
    if let Some(metavar) = text(&spec, "metavar") {
        arg = arg.value_name(metavar);
    }
    if spec.attr("required").as_bool() == Some(true) {
        arg = arg.required(true);
    }
    if let Some(choices) = spec.get("choices") {
        let choices = choices
            .as_sequence()
            .ok_or_else(|| Error::schema(path, "choices must be a list"))?
            .iter()
            .map(|choice| choice.to_string())
            .collect::<Vec<_>>();
        arg = arg.value_parser(PossibleValuesParser::new(choices));
    }

    arg = match action {
        Action::StoreTrue => arg.action(ArgAction::SetTrue),
        Action::StoreFalse => arg.action(ArgAction::SetFalse),
        Action::Count => arg.action(ArgAction::Count),
        Action::Version => arg.action(ArgAction::Version),
        Action::Append => arg.action(ArgAction::Append).num_args(value_count(nargs)),
        Action::Store if positional => match nargs {
            Nargs::One | Nargs::OneOrMore | Nargs::Exactly(_) => {
                arg.action(ArgAction::Set).num_args(value_count(nargs)).required(true)
            }
            Nargs::Optional => arg.action(ArgAction::Set).required(false),
            Nargs::ZeroOrMore => arg.action(ArgAction::Set).num_args(value_count(nargs)).required(false),
        },
        Action::Store => arg.action(ArgAction::Set).num_args(value_count(nargs)),
    };

    let decl = ArgDecl {
        id: id.to_string(),
        positional,
        action,
        nargs,
        type_name,
        default,
    };
    Ok((arg, decl))
}

fn value_count(nargs: Nargs) -> clap::builder::ValueRange {
    match nargs {
        Nargs::One => 1usize.into(),
        Nargs::Optional => (0..=1usize).into(),
        Nargs::ZeroOrMore => (0usize..).into(),
        Nargs::OneOrMore => (1usize..).into(),
        Nargs::Exactly(n) => n.into(),
    }
}

fn parse_nargs(value: Option<&Value>, path: &str) -> Result<Nargs> {
    let invalid = || Error::schema(path, "nargs must be '?', '*', '+' or a positive count");
    match value {
        None | Some(Value::Null) => Ok(Nargs::One),
        Some(Value::Integer(n)) if *n > 0 => Ok(Nargs::Exactly(*n as usize)),
        Some(Value::String(s)) => match s.as_str() {
            "?" => Ok(Nargs::Optional),
            "*" => Ok(Nargs::ZeroOrMore),
            "+" => Ok(Nargs::OneOrMore),
            digits => match digits.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Nargs::Exactly(n)),
                _ => Err(invalid()),
            },
        },
        Some(_) => Err(invalid()),
    }
}

fn version_text(spec: &Value) -> String {
    spec.as_mapping()
        .map(|m| m.attr("version").to_string())
        .unwrap_or_default()
}

/// Reject positional layouts clap cannot parse.
///
/// Optional positionals go after the required ones, with one exception:
/// the second to last may be optional (`?` or `*`) when the last one is
/// required. Returns whether that exception is in use. A multi-valued
/// positional is only allowed last, or second to last in front of a
/// required single value.
fn check_positionals(decls: &[ArgDecl], path: &str) -> Result<bool> {
    let positionals: Vec<&ArgDecl> = decls.iter().filter(|d| d.positional).collect();
    let Some((last, init)) = positionals.split_last() else {
        return Ok(false);
    };
    let before_last = init.len().checked_sub(1);
    let mut allow_missing = false;

    for (i, decl) in init.iter().enumerate() {
        let second_to_last = Some(i) == before_last;
        let reject = |message: &str| {
            Err(Error::schema(
                format!("{}.{}", path, decl.id),
                format!("positional '{}' {}", decl.id, message),
            ))
        };
        if decl.takes_many() && !(second_to_last && last.is_required() && !last.takes_many()) {
            return reject("takes several values but is not last");
        }
        let required_after = positionals[i + 1..].iter().any(|d| d.is_required());
        if !decl.is_required() && required_after {
            if !second_to_last {
                return reject("is optional but comes before a required one");
            }
            allow_missing = true;
        }
    }
    Ok(allow_missing)
}

fn text(node: &Odict, key: &str) -> Option<String> {
    match node.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim_end().to_string()),
        Some(other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn schema(yaml: &str) -> Value {
        Value::Mapping(Odict::parse(yaml).unwrap())
    }

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn parse(yaml: &str, items: &[&str]) -> Result<Odict> {
        parse_args(
            &schema(yaml),
            &argv(items),
            &TypeRegistry::with_builtins(),
            &CliSettings::default(),
        )
    }

    const DBUILD: &str = "
        prog: dbuild
        options:
          version: {short: v, action: version, version: dbuild 0.4.3}
          extra_config: {short: e, help: extra config file}
          verbose: {action: count}
          dry_run: {short: n, action: store_true}
        args:
          host: {help: target host}
    ";

    #[test]
    fn test_options_and_positionals() {
        let parsed = parse(DBUILD, &["dbuild", "leon", "-e", "sasha.conf", "-n"]).unwrap();
        assert_eq!(
            parsed.to_flow_yaml(),
            "{extra_config: sasha.conf, verbose: null, dry_run: true, host: leon}"
        );
    }

    #[test]
    fn test_long_flag_uses_dashes() {
        let parsed = parse(DBUILD, &["dbuild", "--extra-config", "x.conf", "leon"]).unwrap();
        assert_eq!(parsed["extra_config"], Value::from("x.conf"));
        assert_eq!(parsed["dry_run"], Value::Bool(false));
    }

    #[test]
    fn test_count_action() {
        let parsed = parse(DBUILD, &["dbuild", "--verbose", "--verbose", "leon"]).unwrap();
        assert_eq!(parsed["verbose"], Value::Integer(2));
    }

    #[test]
    fn test_version_exits_with_info_code() {
        let err = parse(DBUILD, &["dbuild", "-v"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Exit { code: 1 });
        assert_eq!(err.message(), Some("dbuild 0.4.3"));
    }

    #[test]
    fn test_help_exits_with_info_code() {
        let err = parse(DBUILD, &["dbuild", "--help"]).unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        let text = err.to_string();
        assert!(text.contains("Usage: dbuild"));
        assert!(text.contains("extra config file"));
    }

    #[test]
    fn test_usage_error_exit_code() {
        let err = parse(DBUILD, &["dbuild"]).unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        assert!(err.to_string().contains("<host>"));

        let settings = CliSettings {
            info_exit_code: 0,
            error_exit_code: 64,
        };
        let err = parse_args(
            &schema(DBUILD),
            &argv(&["dbuild", "--bogus", "leon"]),
            &TypeRegistry::with_builtins(),
            &settings,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), Some(64));
    }

    #[test]
    fn test_prog_defaults_to_program_basename() {
        let yaml = "options: {version: {action: version, version: '1.2'}}";
        let err = parse(yaml, &["/usr/local/bin/tool", "--help"]).unwrap_err();
        assert!(err.to_string().contains("Usage: tool"));
    }

    #[test]
    fn test_version_printed_as_written() {
        let yaml = "options: {version: {action: version, version: '1.2'}}";
        let err = parse(yaml, &["/usr/local/bin/tool", "--version"]).unwrap_err();
        assert_eq!(err.message(), Some("1.2"));

        let yaml = "
            subparsers:
              build:
                options: {version: {short: v, action: version, version: build 2.0}}
        ";
        let err = parse(yaml, &["tool", "build", "-v"]).unwrap_err();
        assert_eq!(err.message(), Some("build 2.0"));
    }

    #[test]
    fn test_types_and_defaults() {
        let yaml = "
            options:
              port: {type: int, default: '8080'}
              ratio: {type: float}
        ";
        let parsed = parse(yaml, &["app", "--ratio", "0.5"]).unwrap();
        assert_eq!(parsed["port"], Value::Integer(8080));
        assert_eq!(parsed["ratio"], Value::Float(0.5));

        let err = parse(yaml, &["app", "--port", "eighty"]).unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        assert!(err.to_string().contains("invalid int value: 'eighty'"));
    }

    #[test]
    fn test_custom_type() {
        let mut types = TypeRegistry::with_builtins();
        types.register_fn("upper", |raw| Ok(Value::String(raw.to_uppercase())));
        let parsed = parse_args(
            &schema("args: {name: {type: upper}}"),
            &argv(&["app", "kim"]),
            &types,
            &CliSettings::default(),
        )
        .unwrap();
        assert_eq!(parsed["name"], Value::from("KIM"));
    }

    #[test]
    fn test_unknown_type_is_schema_error() {
        let err = parse("args: {name: {type: port}}", &["app", "x"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Schema);
        assert_eq!(err.path.as_deref(), Some("clg.args.name"));
    }

    #[test]
    fn test_nargs() {
        let yaml = "
            options:
              tag: {action: append}
            args:
              files: {nargs: '*'}
        ";
        let parsed = parse(yaml, &["app"]).unwrap();
        assert_eq!(parsed.to_flow_yaml(), "{tag: null, files: []}");

        let parsed = parse(yaml, &["app", "a", "b", "--tag", "x", "--tag", "y"]).unwrap();
        assert_eq!(parsed.to_flow_yaml(), "{tag: [x, y], files: [a, b]}");
    }

    #[test]
    fn test_choices() {
        let yaml = "options: {mode: {choices: [fast, slow], default: fast}}";
        assert_eq!(parse(yaml, &["app"]).unwrap()["mode"], Value::from("fast"));
        assert_eq!(
            parse(yaml, &["app", "--mode", "slow"]).unwrap()["mode"],
            Value::from("slow")
        );
        assert!(parse(yaml, &["app", "--mode", "medium"]).is_err());
    }

    #[test]
    fn test_subcommands() {
        let yaml = "
            options:
              debug: {action: store_true}
            subparsers:
              install: {help: install it, args: {target: {}}}
              remote:
                subparsers:
                  add: {args: {url: {}}}
                  list: {}
        ";
        let parsed = parse(yaml, &["app", "install", "here"]).unwrap();
        assert_eq!(
            parsed.to_flow_yaml(),
            "{debug: false, command0: install, target: here}"
        );

        let parsed = parse(yaml, &["app", "--debug", "remote", "add", "git://x"]).unwrap();
        assert_eq!(parsed["command0"], Value::from("remote"));
        assert_eq!(parsed["command1"], Value::from("add"));
        assert_eq!(parsed["url"], Value::from("git://x"));

        assert!(parse(yaml, &["app"]).is_err());
    }

    #[test]
    fn test_default_command_retry() {
        let yaml = "
            default_cmd: build
            subparsers:
              build: {options: {fast: {action: store_true}}}
              push: {}
        ";
        let parsed = parse(yaml, &["app", "--fast"]).unwrap();
        assert_eq!(parsed["command0"], Value::from("build"));
        assert_eq!(parsed["fast"], Value::Bool(true));

        let parsed = parse(yaml, &["app", "push"]).unwrap();
        assert_eq!(parsed["command0"], Value::from("push"));

        // Help is never rerouted to the default command
        let err = parse(yaml, &["app", "--help"]).unwrap_err();
        assert!(err.to_string().contains("push"));
    }

    #[test]
    fn test_help_default_placeholder() {
        let yaml = "options: {level: {default: 3, help: 'level (default: __DEFAULT__)'}}";
        let err = parse(yaml, &["app", "-h"]).unwrap_err();
        assert!(err.to_string().contains("level (default: 3)"));
    }

    #[test]
    fn test_bad_schema() {
        assert_eq!(parse("options: [a]", &["app"]).unwrap_err().kind, ErrorKind::Schema);
        assert_eq!(
            parse("options: {x: {short: xy}}", &["app"]).unwrap_err().kind,
            ErrorKind::Schema
        );
        assert_eq!(
            parse("options: {x: {action: explode}}", &["app"]).unwrap_err().kind,
            ErrorKind::Schema
        );
        assert!(parse_args(
            &Value::from("nope"),
            &argv(&["app"]),
            &TypeRegistry::with_builtins(),
            &CliSettings::default()
        )
        .is_err());
    }

    #[test]
    fn test_optional_positional_before_required() {
        let yaml = "args: {files: {nargs: '*'}, host: {}}";
        assert_eq!(
            parse(yaml, &["app", "a", "h"]).unwrap().to_flow_yaml(),
            "{files: [a], host: h}"
        );
        assert_eq!(
            parse(yaml, &["app", "a", "b", "h"]).unwrap().to_flow_yaml(),
            "{files: [a, b], host: h}"
        );
        assert_eq!(
            parse(yaml, &["app", "h"]).unwrap().to_flow_yaml(),
            "{files: [], host: h}"
        );

        let yaml = "args: {src: {nargs: '?'}, dest: {}}";
        assert_eq!(
            parse(yaml, &["app", "x"]).unwrap().to_flow_yaml(),
            "{src: null, dest: x}"
        );
        assert_eq!(
            parse(yaml, &["app", "x", "y"]).unwrap().to_flow_yaml(),
            "{src: x, dest: y}"
        );
    }

    #[test]
    fn test_unparseable_positional_order() {
        let err = parse("args: {files: {nargs: '*'}, host: {}, port: {}}", &["app", "a", "b"])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Schema);
        assert_eq!(err.path.as_deref(), Some("clg.args.files"));

        let err = parse("args: {files: {nargs: '+'}, rest: {nargs: '*'}}", &["app", "a"])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Schema);

        let parsed = parse("args: {mode: {nargs: '?'}, files: {nargs: '*'}}", &["app"]).unwrap();
        assert_eq!(parsed.to_flow_yaml(), "{mode: null, files: []}");
    }

    #[test]
    fn test_name_clashes_are_schema_errors() {
        let err = parse("options: {host: {short: h}}", &["app"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Schema);
        assert_eq!(err.path.as_deref(), Some("clg.options.host"));

        let err = parse("options: {help: {action: store_true}}", &["app"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Schema);

        let err = parse("options: {host: {}}\nargs: {host: {}}", &["app", "x"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Schema);
        assert_eq!(err.path.as_deref(), Some("clg.args.host"));

        let yaml = "options: {dry_run: {short: n}, verbose: {short: n}}";
        let err = parse(yaml, &["app"]).unwrap_err();
        assert!(err.to_string().contains("short flag '-n' is already taken"));
    }

    #[test]
    fn test_type_registry_extend() {
        let mut extra = TypeRegistry::new();
        extra.register_fn("upper", |raw| Ok(Value::String(raw.to_uppercase())));
        extra.register_fn("int", |raw| Ok(Value::String(format!("#{}", raw))));

        let mut types = TypeRegistry::with_builtins();
        types.extend(&extra);
        assert!(types.contains("upper"));
        assert!(types.contains("float"));
        assert_eq!(
            types.get("int").unwrap().convert("7").unwrap(),
            Value::from("#7")
        );
    }

    #[test]
    fn test_type_registry_debug() {
        assert_eq!(
            format!("{:?}", TypeRegistry::with_builtins()),
            r#"TypeRegistry { types: ["float", "int", "str"] }"#
        );
    }
}
