//! Main Config type for loadconfig
//!
//! A `Config` is built once per program invocation. Construction runs in a
//! fixed order:
//!
//! 1. the inline data is merged and interpolated;
//! 2. every `-E=<yaml>` and `-C=<path>` argument is merged, in order, and
//!    removed from the argument list;
//! 3. when the merged data carries a `clg` schema, the remaining arguments
//!    are parsed against it and the result merged;
//! 4. validators named by `checkconfig` run.
//!
//! Afterwards the `clg` and `checkconfig` keys are gone and the config is
//! ready to export.

use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::args::{self, CliSettings, TypeRegistry, SCHEMA_KEY};
use crate::error::{Error, Result};
use crate::export;
use crate::interpolation;
use crate::loader::read_config_file;
use crate::odict::{Odict, Source};
use crate::validator::{ValidatorRegistry, CHECKCONFIG_KEY};
use crate::value::Value;

/// Options for building a config
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    /// Program arguments, `args[0]` being the program name
    pub args: Option<Vec<String>>,
    /// Stored as the `version` key before any data is merged
    pub version: Option<String>,
    /// Argument types available to the `clg` schema
    pub types: TypeRegistry,
    /// Validators available to `checkconfig`
    pub validators: ValidatorRegistry,
    /// Exit statuses for help, version and usage errors
    pub cli: CliSettings,
}

/// A command handler for [`Config::run`]
pub type Handler<'a, T> = (&'a str, &'a dyn Fn(&Config) -> T);

/// Fully resolved program configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    data: Odict,
}

enum CliOption<'a> {
    Extra(&'a str),
    File(&'a str),
}

impl Config {
    /// Create an empty config
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from YAML text without arguments
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::with_options(yaml, ConfigOptions::default())
    }

    /// Build a config from data and program arguments
    pub fn construct(data: impl Into<Source>, args: Option<Vec<String>>) -> Result<Self> {
        Self::with_options(
            data,
            ConfigOptions {
                args,
                ..Default::default()
            },
        )
    }

    /// Build a config with custom options
    pub fn with_options(data: impl Into<Source>, options: ConfigOptions) -> Result<Self> {
        let mut config = Self::new();
        let source = data.into();
        if is_empty_source(&source) && options.args.is_none() {
            return Ok(config);
        }

        if let Some(version) = &options.version {
            config.data.set("version", version.as_str());
        }
        let args = options.args.as_deref();
        config.merge_layer(source.into_odict()?, args)?;
        let remaining = config.load_options(args)?;
        config.load_cli(remaining.as_deref(), &options)?;
        config.checkconfig(&options.validators)?;
        Ok(config)
    }

    /// Merge `source` and interpolate `$name` references
    pub fn expand_keys(&mut self, source: impl Into<Source>) -> Result<()> {
        self.data.update(source)?;
        interpolation::expand(&mut self.data);
        Ok(())
    }

    /// Substitute `$name` references in `template` from this config
    pub fn render(&self, template: &str) -> String {
        interpolation::render(template, &self.data)
    }

    /// Shell `export` lines for every key
    pub fn export(&self) -> String {
        export::export(&self.data)
    }

    /// The selected top-level subcommand, null when there is none
    pub fn command(&self) -> &Value {
        self.data.attr("command0")
    }

    /// Dispatch the selected subcommand to the handler of the same name
    pub fn run<T>(&self, handlers: &[Handler<'_, T>]) -> Result<T> {
        let command = self.command().to_string();
        let (_, handler) = handlers
            .iter()
            .find(|(name, _)| *name == command)
            .ok_or_else(|| Error::unknown_command(&command))?;
        log::debug!("running command '{}'", command);
        Ok(handler(self))
    }

    /// Consume the config, keeping only its data
    pub fn into_odict(self) -> Odict {
        self.data
    }

    /// A layer carrying a `clg` schema names the program after `args[0]`
    /// unless a `prog` is already known.
    fn merge_layer(&mut self, layer: Odict, args: Option<&[String]>) -> Result<()> {
        if layer.contains_key(SCHEMA_KEY) && !self.data.contains_key("prog") {
            if let Some(arg0) = args.and_then(|args| args.first()) {
                self.data.set("prog", arg0.as_str());
            }
        }
        self.expand_keys(layer)
    }

    /// Apply `-E=` and `-C=` arguments, returning the others
    fn load_options(&mut self, args: Option<&[String]>) -> Result<Option<Vec<String>>> {
        let Some(args) = args else {
            return Ok(None);
        };

        let mut remaining = Vec::with_capacity(args.len());
        for arg in args {
            let layer = match split_option(arg) {
                None => {
                    remaining.push(arg.clone());
                    continue;
                }
                Some(CliOption::Extra(text)) => Odict::parse(text)?,
                Some(CliOption::File(path)) => {
                    let path = self.render(path);
                    log::debug!("loading config file '{}'", path);
                    let text = read_config_file(&path)
                        .ok_or_else(|| Error::config_file_not_found(&path))?;
                    Odict::parse(&text).map_err(|err| in_file(err, &path))?
                }
            };
            self.merge_layer(layer, Some(args))?;
        }
        Ok(Some(remaining))
    }

    /// Parse arguments against the `clg` schema, which never survives
    fn load_cli(&mut self, args: Option<&[String]>, options: &ConfigOptions) -> Result<()> {
        let Some(schema) = self.data.remove(SCHEMA_KEY).ok() else {
            return Ok(());
        };
        let Some(args) = args.filter(|args| !args.is_empty()) else {
            log::debug!("no arguments to parse, dropping the '{}' schema", SCHEMA_KEY);
            return Ok(());
        };

        log::info!("parsing {} arguments", args.len().saturating_sub(1));
        let parsed = args::parse_args(&schema, args, &options.types, &options.cli)?;
        self.expand_keys(parsed)
    }

    fn checkconfig(&mut self, validators: &ValidatorRegistry) -> Result<()> {
        let Some(names) = self.data.get(CHECKCONFIG_KEY).cloned() else {
            return Ok(());
        };
        validators.check(&names, &self.data)?;
        self.expand_keys(Odict::new())?;
        self.data.remove(CHECKCONFIG_KEY)?;
        Ok(())
    }
}

fn is_empty_source(source: &Source) -> bool {
    match source {
        Source::Yaml(text) => text.is_empty(),
        Source::Mapping(map) => map.is_empty(),
    }
}

/// Recognise `-E=<yaml>` and `-C=<path>`, stripping one pair of quotes
fn split_option(arg: &str) -> Option<CliOption<'_>> {
    if let Some(value) = arg.strip_prefix("-E=") {
        Some(CliOption::Extra(unquote(value)))
    } else {
        arg.strip_prefix("-C=")
            .map(|value| CliOption::File(unquote(value)))
    }
}

fn unquote(value: &str) -> &str {
    match value.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let mut inner = value[quote.len_utf8()..].chars();
            inner.next_back();
            inner.as_str()
        }
        _ => value,
    }
}

fn in_file(mut err: Error, path: &str) -> Error {
    if let Some(location) = err.source_location.as_mut() {
        location.file = path.to_string();
    }
    err
}

impl Deref for Config {
    type Target = Odict;

    fn deref(&self) -> &Odict {
        &self.data
    }
}

impl DerefMut for Config {
    fn deref_mut(&mut self) -> &mut Odict {
        &mut self.data
    }
}

impl PartialEq<Odict> for Config {
    fn eq(&self, other: &Odict) -> bool {
        &self.data == other
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.data, f)
    }
}
