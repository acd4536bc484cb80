//! Named reactive fields.
//!
//! A [`Field`] is a named [`RwSignal`] with a setter that takes either a
//! replacement value or a transform of the previous one. A field built with
//! `reset: true` snaps back to its initial value as soon as nothing observes
//! it anymore.

use std::{fmt, rc::Rc};

use storekit_reactive::{RwSignal, Scope, SignalGet, SignalUpdate, SignalWith};

/// Options for [`FieldBuilder::with_options`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
pub struct FieldOptions {
    /// Restore the initial value when the field stops being observed.
    #[serde(default)]
    pub reset: bool,
}

/// Starts a reactive field holding `initial`. Finish it with
/// [`named`](FieldBuilder::named) or [`with_options`](FieldBuilder::with_options).
///
/// ```rust
/// use storekit::reactive_field;
///
/// let count = reactive_field(0).named("count");
/// count.set(2);
/// count.set_with(|prev| prev + 1);
/// assert_eq!(count.get_untracked(), 3);
/// ```
pub fn reactive_field<T: Clone + 'static>(initial: T) -> FieldBuilder<T> {
    FieldBuilder { initial }
}

pub struct FieldBuilder<T> {
    initial: T,
}

impl<T: Clone + 'static> FieldBuilder<T> {
    pub fn named(self, name: impl Into<String>) -> Field<T> {
        self.with_options(name, FieldOptions::default())
    }

    pub fn with_options(self, name: impl Into<String>, options: FieldOptions) -> Field<T> {
        let signal = RwSignal::new(self.initial.clone());
        let initial = Rc::new(self.initial);
        if options.reset {
            let initial = initial.clone();
            signal.on_unobserved(move || signal.set((*initial).clone()));
        }
        Field {
            name: Rc::from(name.into()),
            signal,
            initial,
            options,
        }
    }
}

/// A named observable value.
///
/// Cloning a field clones the handle; both clones read and write the same
/// value.
pub struct Field<T: 'static> {
    name: Rc<str>,
    signal: RwSignal<T>,
    initial: Rc<T>,
    options: FieldOptions,
}

impl<T: 'static> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            signal: self.signal,
            initial: self.initial.clone(),
            options: self.options,
        }
    }
}

impl<T: 'static> PartialEq for Field<T> {
    fn eq(&self, other: &Self) -> bool {
        self.signal == other.signal
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Field");
        s.field("name", &self.name);
        self.signal.try_with_untracked(|value| {
            if let Some(value) = value {
                s.field("value", value);
            }
        });
        s.field("reset", &self.options.reset);
        s.finish()
    }
}

impl<T: 'static> Field<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the generated setter, `set` + the capitalized field name.
    pub fn setter_name(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => format!("set{}{}", first.to_uppercase(), chars.as_str()),
            None => "set".to_string(),
        }
    }

    pub fn initial(&self) -> &T {
        &self.initial
    }

    pub fn signal(&self) -> RwSignal<T> {
        self.signal
    }

    pub fn with<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        self.signal.with(f)
    }

    pub fn with_untracked<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        self.signal.with_untracked(f)
    }

    /// Replace the value.
    pub fn set(&self, value: T) {
        self.signal.set(value);
    }

    /// Replace the value with a function of the previous one.
    pub fn set_with(&self, f: impl FnOnce(&T) -> T) {
        self.signal.update(|value| *value = f(value));
    }

    /// Mutate the value in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.signal.update(f);
    }

    pub fn is_observed(&self) -> bool {
        self.signal.is_observed()
    }

    /// Run `f` with the current value now and on every change until the
    /// returned [`Observer`] is dropped.
    pub fn observe(&self, f: impl Fn(&T) + 'static) -> Observer {
        let scope = Scope::new();
        let signal = self.signal;
        scope.create_effect(move |_| signal.with(|value| f(value)));
        Observer { scope }
    }
}

impl<T: Clone + 'static> Field<T> {
    pub fn get(&self) -> T {
        self.signal.get()
    }

    pub fn get_untracked(&self) -> T {
        self.signal.get_untracked()
    }

    /// Put the initial value back.
    pub fn reset(&self) {
        self.signal.set((*self.initial).clone());
    }
}

/// Keeps a [`Field::observe`] subscription alive.
#[must_use = "the observation ends when the Observer is dropped"]
#[derive(Debug)]
pub struct Observer {
    scope: Scope,
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.scope.dispose();
    }
}
