use std::{cell::RefCell, rc::Rc};

use serde_json::Value;
use storekit_reactive::{untrack, Scope, SignalGet};

use super::{FetchError, FetchHandle, FetchStatus};

type OnSuccess = Box<dyn FnOnce(&Value)>;
type OnError = Box<dyn FnOnce(&FetchError)>;
type Guard = Box<dyn Fn(&Value) -> bool>;

/// Runs a callback once, on the next settlement of a handle's primary fetch.
///
/// The status present when [`listen`](Self::listen) is called is ignored.
/// The next `Fulfilled` whose data passes the guard calls `on_success`; the
/// next `Rejected` calls `on_error`. Either way the handler then disposes
/// itself.
pub struct SettleHandler {
    handle: FetchHandle,
    on_success: OnSuccess,
    on_error: Option<OnError>,
    guard: Option<Guard>,
}

impl SettleHandler {
    pub fn new(handle: &FetchHandle, on_success: impl FnOnce(&Value) + 'static) -> Self {
        Self {
            handle: handle.clone(),
            on_success: Box::new(on_success),
            on_error: None,
            guard: None,
        }
    }

    pub fn on_error(mut self, f: impl FnOnce(&FetchError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// A fulfilled result whose data fails `guard` is skipped and the handler
    /// keeps waiting.
    pub fn guard(mut self, guard: impl Fn(&Value) -> bool + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    pub fn listen(self) -> HandlerDisposer {
        let Self {
            handle,
            on_success,
            on_error,
            guard,
        } = self;
        let status = handle.0.status;
        let data = handle.0.data;
        let error = handle.0.error;

        let callbacks = Rc::new(RefCell::new(Some((on_success, on_error))));
        let scope = Scope::new();
        scope.create_effect(move |registered: Option<()>| {
            let current = status.get();
            if registered.is_none() {
                return;
            }
            match current {
                FetchStatus::Fulfilled => {
                    let data = data.get_untracked().unwrap_or(Value::Null);
                    if guard.as_ref().is_some_and(|guard| !guard(&data)) {
                        return;
                    }
                    let taken = callbacks.borrow_mut().take();
                    if let Some((on_success, _)) = taken {
                        scope.dispose();
                        untrack(|| on_success(&data));
                    }
                }
                FetchStatus::Rejected => {
                    let taken = callbacks.borrow_mut().take();
                    if let Some((_, on_error)) = taken {
                        scope.dispose();
                        if let (Some(on_error), Some(err)) = (on_error, error.get_untracked()) {
                            untrack(|| on_error(&err));
                        }
                    }
                }
                FetchStatus::Idle | FetchStatus::Pending => {}
            }
        });
        HandlerDisposer { scope }
    }
}

/// Stops a [`SettleHandler`] early. Dropping it leaves the handler running.
#[derive(Debug, Clone, Copy)]
pub struct HandlerDisposer {
    scope: Scope,
}

impl HandlerDisposer {
    pub fn dispose(&self) {
        self.scope.dispose();
    }
}
