use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde_json::Value;
use storekit_reactive::{batch, RwSignal, SignalGet, SignalUpdate, SignalWith};

use crate::schema::{error_key, Schema, SchemaError, ValidationReport, Values};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormOptions {
    /// Re-validate a field every time [`Form::set_value`] writes it.
    #[serde(default)]
    pub validate_on_change: bool,
}

/// Reactive form state checked against a [`Schema`].
///
/// `values`, `errors` and `touched` are signals, so effects reading them
/// re-run as the form changes. Errors are keyed like
/// [`ValidationReport::errors`], `<field>Err`.
#[derive(Debug, Clone)]
pub struct Form {
    initial: Values,
    schema: Schema,
    options: FormOptions,
    values: RwSignal<Values>,
    errors: RwSignal<IndexMap<String, String>>,
    touched: RwSignal<FxHashSet<String>>,
}

impl Form {
    pub fn new(initial: Values, schema: Schema, options: FormOptions) -> Self {
        Self {
            values: RwSignal::new(initial.clone()),
            errors: RwSignal::new(IndexMap::new()),
            touched: RwSignal::new(FxHashSet::default()),
            initial,
            schema,
            options,
        }
    }

    pub fn values(&self) -> RwSignal<Values> {
        self.values
    }

    pub fn errors(&self) -> RwSignal<IndexMap<String, String>> {
        self.errors
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values.with(|values| values.get(key).cloned())
    }

    pub fn error(&self, key: &str) -> Option<String> {
        self.errors.with(|errors| errors.get(&error_key(key)).cloned())
    }

    pub fn is_touched(&self, key: &str) -> bool {
        self.touched.with(|touched| touched.contains(key))
    }

    pub fn set_value(&self, key: impl Into<String>, value: Value) -> Result<(), SchemaError> {
        let key = key.into();
        batch(|| {
            self.values.update(|values| {
                values.insert(key.clone(), value);
            });
            if !self.is_touched_untracked(&key) {
                self.touched.update(|touched| {
                    touched.insert(key.clone());
                });
            }
            if self.options.validate_on_change {
                self.validate_field(&key)?;
            }
            Ok(())
        })
    }

    /// Checks one field and records its error, or clears it.
    pub fn validate_field(&self, key: &str) -> Result<Option<String>, SchemaError> {
        let message = self
            .values
            .with_untracked(|values| self.schema.validate_field(key, values))?;
        let err_key = error_key(key);
        let changed = self
            .errors
            .with_untracked(|errors| errors.get(&err_key) != message.as_ref());
        if changed {
            self.errors.update(|errors| match &message {
                Some(message) => {
                    errors.insert(err_key, message.clone());
                }
                None => {
                    errors.shift_remove(&err_key);
                }
            });
        }
        Ok(message)
    }

    /// Validates every field, marks them all touched and stores the errors.
    pub fn validate(&self) -> Result<ValidationReport, SchemaError> {
        let report = self
            .values
            .with_untracked(|values| self.schema.validate(values))?;
        batch(|| {
            self.touched.update(|touched| {
                touched.extend(self.schema.field_names().map(str::to_string));
            });
            self.errors.set(report.errors.clone());
        });
        Ok(report)
    }

    /// Values back to their initial state, errors and touched cleared.
    pub fn reset(&self) {
        batch(|| {
            self.values.set(self.initial.clone());
            self.errors.set(IndexMap::new());
            self.touched.set(FxHashSet::default());
        });
    }

    pub fn is_dirty(&self) -> bool {
        self.values.with(|values| *values != self.initial)
    }

    /// Validates, then hands the values to `f` when they pass.
    pub fn submit(&self, f: impl FnOnce(&Values)) -> Result<ValidationReport, SchemaError> {
        let report = self.validate()?;
        if report.success {
            let values = self.values.get_untracked();
            f(&values);
        }
        Ok(report)
    }

    fn is_touched_untracked(&self, key: &str) -> bool {
        self.touched.with_untracked(|touched| touched.contains(key))
    }
}
