//! Ordered field validation.
//!
//! A [`Schema`] maps field names to ordered lists of [`Validator`]s. Fields
//! are checked in insertion order; within a field the first failing
//! validator wins and the rest are skipped.

use std::{borrow::Cow, rc::Rc};

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// The full set of values being validated, keyed by field name.
pub type Values = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(String),
}

impl Verdict {
    pub fn invalid(message: impl Into<String>) -> Self {
        Verdict::Invalid(message.into())
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

impl From<Result<(), String>> for Verdict {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Verdict::Valid,
            Err(message) => Verdict::Invalid(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("validator `{validator}` on `{field}` needs the full value set")]
    MissingValues {
        validator: Cow<'static, str>,
        field: String,
    },
}

type Check = dyn Fn(&Value, Option<&Values>) -> Result<Verdict, SchemaError>;

/// A single check on one field value. Cloning shares the check.
#[derive(educe::Educe, Clone)]
#[educe(Debug)]
pub struct Validator {
    name: Cow<'static, str>,
    #[educe(Debug(ignore))]
    check: Rc<Check>,
}

impl Validator {
    /// A custom validator. `all` is the full value set when one is available.
    pub fn new(f: impl Fn(&Value, Option<&Values>) -> Verdict + 'static) -> Self {
        Self {
            name: Cow::Borrowed("custom"),
            check: Rc::new(move |value, all| Ok(f(value, all))),
        }
    }

    /// A validator that can report misuse, such as a missing value set.
    pub fn fallible(
        f: impl Fn(&Value, Option<&Values>) -> Result<Verdict, SchemaError> + 'static,
    ) -> Self {
        Self {
            name: Cow::Borrowed("custom"),
            check: Rc::new(f),
        }
    }

    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, value: &Value, all: Option<&Values>) -> Result<Verdict, SchemaError> {
        (self.check)(value, all)
    }
}

/// Outcome of [`Schema::validate`]. Errors are keyed by `<field>Err`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub success: bool,
    pub errors: IndexMap<String, String>,
}

impl ValidationReport {
    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(&error_key(field)).map(String::as_str)
    }
}

pub(crate) fn error_key(field: &str) -> String {
    format!("{field}Err")
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: IndexMap<String, Vec<Validator>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `field`, or appends to its validators if it already exists.
    pub fn field(
        mut self,
        name: impl Into<String>,
        validators: impl IntoIterator<Item = Validator>,
    ) -> Self {
        self.fields
            .entry(name.into())
            .or_default()
            .extend(validators);
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn validators(&self, field: &str) -> Option<&[Validator]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn validate(&self, values: &Values) -> Result<ValidationReport, SchemaError> {
        let mut errors = IndexMap::new();
        for name in self.fields.keys() {
            if let Some(message) = self.validate_field(name, values)? {
                errors.insert(error_key(name), message);
            }
        }
        Ok(ValidationReport {
            success: errors.is_empty(),
            errors,
        })
    }

    /// Checks one field against `values`, returning the first failure.
    pub fn validate_field(
        &self,
        field: &str,
        values: &Values,
    ) -> Result<Option<String>, SchemaError> {
        let Some(validators) = self.fields.get(field) else {
            return Ok(None);
        };
        let value = values.get(field).unwrap_or(&Value::Null);
        for validator in validators {
            if let Verdict::Invalid(message) = validator.check(value, Some(values))? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Combines two schemas. For a field present in both, `other`'s
    /// validators replace ours when `override_existing` is set, otherwise
    /// they run after ours.
    pub fn extend(&self, other: &Schema, override_existing: bool) -> Schema {
        let mut fields = self.fields.clone();
        for (name, validators) in &other.fields {
            match fields.get_mut(name) {
                Some(existing) if !override_existing => {
                    existing.extend(validators.iter().cloned());
                }
                _ => {
                    fields.insert(name.clone(), validators.clone());
                }
            }
        }
        Schema { fields }
    }

    /// A schema with only the named fields. Unknown names are ignored.
    pub fn pick<S: AsRef<str>>(&self, keys: &[S]) -> Schema {
        let fields = self
            .fields
            .iter()
            .filter(|(name, _)| keys.iter().any(|key| key.as_ref() == name.as_str()))
            .map(|(name, validators)| (name.clone(), validators.clone()))
            .collect();
        Schema { fields }
    }
}

fn text_len(value: &Value) -> Option<usize> {
    match value {
        Value::Null => Some(0),
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fails on null, blank strings and empty arrays.
pub fn required(message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _| {
        let missing = match value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if missing {
            Verdict::invalid(message.clone())
        } else {
            Verdict::Valid
        }
    })
    .named("required")
}

pub fn min_length(min: usize, message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _| match text_len(value) {
        Some(len) if len < min => Verdict::invalid(message.clone()),
        _ => Verdict::Valid,
    })
    .named("min_length")
}

pub fn max_length(max: usize, message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _| match text_len(value) {
        Some(len) if len > max => Verdict::invalid(message.clone()),
        _ => Verdict::Valid,
    })
    .named("max_length")
}

/// Numbers and numeric strings at least `min`.
pub fn min(min: f64, message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _| match as_number(value) {
        Some(n) if n >= min => Verdict::Valid,
        _ => Verdict::invalid(message.clone()),
    })
    .named("min")
}

pub fn max(max: f64, message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _| match as_number(value) {
        Some(n) if n <= max => Verdict::Valid,
        _ => Verdict::invalid(message.clone()),
    })
    .named("max")
}

pub fn email(message: impl Into<String>) -> Validator {
    let message = message.into();
    Validator::new(move |value, _| {
        if value.as_str().is_some_and(looks_like_email) {
            Verdict::Valid
        } else {
            Verdict::invalid(message.clone())
        }
    })
    .named("email")
}

fn looks_like_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split_once('.').is_some_and(|(host, rest)| {
            !host.is_empty() && !rest.is_empty() && !rest.ends_with('.')
        })
}

pub fn one_of(options: impl IntoIterator<Item = Value>, message: impl Into<String>) -> Validator {
    let options: Vec<Value> = options.into_iter().collect();
    let message = message.into();
    Validator::new(move |value, _| {
        if options.contains(value) {
            Verdict::Valid
        } else {
            Verdict::invalid(message.clone())
        }
    })
    .named("one_of")
}

/// Equal to the value of `other`, e.g. a password confirmation.
pub fn match_field(other: impl Into<String>, message: impl Into<String>) -> Validator {
    let other = other.into();
    let message = message.into();
    Validator::fallible(move |value, all| {
        let all = all.ok_or_else(|| SchemaError::MissingValues {
            validator: Cow::Borrowed("match_field"),
            field: other.clone(),
        })?;
        if all.get(&other).unwrap_or(&Value::Null) == value {
            Ok(Verdict::Valid)
        } else {
            Ok(Verdict::invalid(message.clone()))
        }
    })
    .named("match_field")
}
