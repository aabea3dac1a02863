//! Named configuration validators
//!
//! A document's `checkconfig` key names one or more validators that the
//! embedding application registered up front. Each runs against the fully
//! merged and interpolated configuration; the first failure aborts the
//! construction with the validator's own message.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::odict::Odict;
use crate::value::Value;

/// Key naming the validators to run
pub const CHECKCONFIG_KEY: &str = "checkconfig";

/// A check over a resolved configuration
pub trait Validator: Send + Sync {
    /// Accept the configuration, or reject it with a message
    fn validate(&self, config: &Odict) -> std::result::Result<(), String>;

    /// Get the name of this validator
    fn name(&self) -> &str;
}

/// A simple function-based validator
pub struct FnValidator<F>
where
    F: Fn(&Odict) -> std::result::Result<(), String> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&Odict) -> std::result::Result<(), String> + Send + Sync,
{
    /// Create a new function-based validator
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Odict) -> std::result::Result<(), String> + Send + Sync,
{
    fn validate(&self, config: &Odict) -> std::result::Result<(), String> {
        (self.func)(config)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Registry of available validators
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn Validator>>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.validators.keys().collect();
        names.sort();
        f.debug_struct("ValidatorRegistry")
            .field("validators", &names)
            .finish()
    }
}

impl ValidatorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator, replacing one with the same name
    pub fn register(&mut self, validator: Arc<dyn Validator>) {
        self.validators
            .insert(validator.name().to_string(), validator);
    }

    /// Register a validator with optional force overwrite.
    ///
    /// Returns an error if `force` is false and the name is taken.
    pub fn register_with_force(&mut self, validator: Arc<dyn Validator>, force: bool) -> Result<()> {
        let name = validator.name().to_string();
        if !force && self.validators.contains_key(&name) {
            return Err(Error::already_registered(&name));
        }
        self.validators.insert(name, validator);
        Ok(())
    }

    /// Register a function as a validator
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&Odict) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnValidator::new(name, func)));
    }

    /// Get a validator by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Validator>> {
        self.validators.get(name)
    }

    /// Check if a validator is registered
    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    /// Run one validator by name
    pub fn validate(&self, name: &str, config: &Odict) -> Result<()> {
        let validator = self
            .validators
            .get(name)
            .ok_or_else(|| Error::unknown_validator(name))?;
        log::info!("running validator '{}'", name);
        validator
            .validate(config)
            .map_err(|message| Error::validation(name, message))
    }

    /// Run every validator a `checkconfig` value names, in order
    pub fn check(&self, names: &Value, config: &Odict) -> Result<()> {
        for name in validator_names(names)? {
            self.validate(&name, config)?;
        }
        Ok(())
    }
}

/// Read a `checkconfig` value: a name, a list of names, or nothing
pub fn validator_names(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s.trim().to_string()]),
        Value::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(not_a_name(other)),
            })
            .collect(),
        other => Err(not_a_name(other)),
    }
}

fn not_a_name(value: &Value) -> Error {
    Error::parse(format!(
        "expected a validator name or a list of names, found a {}",
        value.type_name()
    ))
    .with_path(CHECKCONFIG_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn registry() -> ValidatorRegistry {
        let mut registry = ValidatorRegistry::new();
        registry.register_fn("has_host", |config| {
            if config.attr("host").is_blank() {
                Err("host is required".into())
            } else {
                Ok(())
            }
        });
        registry.register_fn("always", |_| Ok(()));
        registry
    }

    #[test]
    fn test_validate_ok_and_failure() {
        let registry = registry();
        let good = Odict::parse("host: leon").unwrap();
        let bad = Odict::parse("port: 80").unwrap();

        assert!(registry.validate("has_host", &good).is_ok());

        let err = registry.validate("has_host", &bad).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Validation {
                validator: "has_host".into()
            }
        );
        assert_eq!(err.message(), Some("host is required"));
    }

    #[test]
    fn test_unknown_validator() {
        let err = registry()
            .validate("nope", &Odict::new())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownValidator { name: "nope".into() });
    }

    #[test]
    fn test_register_with_force() {
        let mut registry = registry();
        let replacement = Arc::new(FnValidator::new("always", |_: &Odict| Err("no".to_string())));

        let err = registry
            .register_with_force(replacement.clone(), false)
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::AlreadyRegistered {
                name: "always".into()
            }
        );

        registry.register_with_force(replacement, true).unwrap();
        assert!(registry.validate("always", &Odict::new()).is_err());
    }

    #[test]
    fn test_validator_names() {
        assert_eq!(validator_names(&Value::Null).unwrap(), Vec::<String>::new());
        assert_eq!(validator_names(&Value::from(" a ")).unwrap(), vec!["a"]);
        assert_eq!(
            validator_names(&Value::from(vec!["a", "b"])).unwrap(),
            vec!["a", "b"]
        );
        assert!(validator_names(&Value::Integer(1)).is_err());
    }

    #[test]
    fn test_check_runs_in_order() {
        let registry = registry();
        let config = Odict::new();
        let names = Value::from(vec!["always", "has_host", "nope"]);
        let err = registry.check(&names, &config).unwrap_err();
        // Stops at the first failure
        assert_eq!(err.message(), Some("host is required"));
    }

    #[test]
    fn test_contains_and_debug() {
        let registry = registry();
        assert!(registry.contains("always"));
        assert!(registry.get("missing").is_none());
        assert_eq!(
            format!("{:?}", registry),
            r#"ValidatorRegistry { validators: ["always", "has_host"] }"#
        );
    }
}
