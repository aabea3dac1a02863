//! loadconfig-core: layered YAML configuration for programs
//!
//! This crate merges configuration from inline YAML, `-E=`/`-C=` arguments
//! and a declarative command line schema into one ordered mapping, expands
//! `$name` references, and exports the result as shell variables.
//!
//! # Example
//!
//! ```rust
//! use loadconfig_core::{Config, Value};
//!
//! let config = Config::construct(
//!     "data_path: /data, data_file: $data_path/data.txt",
//!     Some(vec!["prog".into(), "-E=\"user: kim\"".into()]),
//! )
//! .unwrap();
//!
//! assert_eq!(config["data_file"], Value::from("/data/data.txt"));
//! assert_eq!(config["user"].as_str(), Some("kim"));
//! assert_eq!(
//!     config.export(),
//!     "export DATA_PATH=\"/data\"\nexport DATA_FILE=\"/data/data.txt\"\nexport USER=\"kim\""
//! );
//! ```

pub mod args;
pub mod dumper;
pub mod error;
pub mod export;
pub mod interpolation;
pub mod loader;
pub mod odict;
pub mod validator;
pub mod value;

mod config;

pub use args::{ArgType, CliSettings, FnArgType, TypeRegistry};
pub use config::{Config, ConfigOptions, Handler};
pub use error::{Error, ErrorKind, Result};
pub use odict::{Odict, Source};
pub use validator::{FnValidator, Validator, ValidatorRegistry};
pub use value::Value;
