use std::{
    any::Any,
    cell::{Cell, RefCell},
    collections::HashSet,
    marker::PhantomData,
    rc::Rc,
};

use crate::{
    id::Id,
    runtime::RUNTIME,
    scope::{with_scope, Scope},
};

pub(crate) trait EffectTrait {
    fn id(&self) -> Id;
    fn run(&self) -> bool;
    fn add_observer(&self, id: Id);
    fn observers(&self) -> HashSet<Id>;
    fn clear_observers(&self);
    fn is_disposed(&self) -> bool;
    fn dispose(&self);
}

struct Effect<T, F>
where
    T: 'static,
    F: Fn(Option<T>) -> T,
{
    id: Id,
    f: F,
    value: Rc<RefCell<dyn Any>>,
    ty: PhantomData<T>,
    observers: RefCell<HashSet<Id>>,
    disposed: Cell<bool>,
}

impl<T, F> Drop for Effect<T, F>
where
    T: 'static,
    F: Fn(Option<T>) -> T,
{
    fn drop(&mut self) {
        if RUNTIME.try_with(|_| ()).is_ok() {
            self.id.dispose();
        }
    }
}

/// Create an Effect that runs the given function whenever the Signals that subscribed
/// to it in the function.
///
/// The given function will be run immediately once, and tracks all the signals that
/// subscribed in that run. And when these Signals update, it will rerun the function.
/// And the effect re-tracks the signals in each run, so that it will only be re-run
/// by the Signals that actually ran in the last effect run.
///
/// The effect lives until the Scope it was created in is disposed.
pub fn create_effect<T>(f: impl Fn(Option<T>) -> T + 'static)
where
    T: Any + 'static,
{
    let id = Id::next();
    let effect: Rc<dyn EffectTrait> = Rc::new(Effect {
        id,
        f,
        value: Rc::new(RefCell::new(None::<T>)),
        ty: PhantomData,
        observers: RefCell::new(HashSet::new()),
        disposed: Cell::new(false),
    });
    id.set_scope();
    RUNTIME.with(|runtime| {
        runtime
            .effects
            .borrow_mut()
            .insert(id, Rc::downgrade(&effect))
    });

    run_effect(effect);
}

/// Signals that's wrapped this untrack will not subscribe to any effect
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let prev_effect = RUNTIME.with(|runtime| runtime.current_effect.borrow_mut().take());
    let result = f();
    RUNTIME.with(|runtime| {
        *runtime.current_effect.borrow_mut() = prev_effect;
    });
    result
}

/// Run the closure with effects deferred. Every effect touched inside runs once
/// when the outermost batch ends.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    let already_batching = RUNTIME.with(|runtime| runtime.batching.replace(true));
    let result = f();
    if !already_batching {
        RUNTIME.with(|runtime| {
            runtime.batching.set(false);
            runtime.run_pending_effects();
            runtime.flush_unobserved();
        });
    }
    result
}

pub(crate) fn run_effect(effect: Rc<dyn EffectTrait>) {
    if effect.is_disposed() {
        return;
    }

    // anything created in the last run belongs to that run only
    effect.id().dispose_children();

    observer_clean_up(&effect);

    let prev_effect = RUNTIME.with(|runtime| {
        runtime.running.set(runtime.running.get() + 1);
        runtime.current_effect.borrow_mut().replace(effect.clone())
    });

    with_scope(Scope(effect.id()), || {
        effect.run();
    });

    RUNTIME.with(|runtime| {
        *runtime.current_effect.borrow_mut() = prev_effect;
        runtime.running.set(runtime.running.get() - 1);
    });

    // disposed from inside its own run
    if effect.is_disposed() {
        observer_clean_up(&effect);
    }

    RUNTIME.with(|runtime| runtime.flush_unobserved());
}

/// Do a observer clean up at the beginning of each effect run. It clears the effect
/// from all the Signals that this effect subscribes to, and clears all the signals
/// that's stored in this effect, so that the next effect run can re-track signals.
pub(crate) fn observer_clean_up(effect: &Rc<dyn EffectTrait>) {
    for id in effect.observers() {
        unsubscribe(id, effect.id());
    }
    effect.clear_observers();
}

/// Remove one subscriber from a signal, queueing the unobserved check when it
/// was the last one.
fn unsubscribe(signal_id: Id, effect_id: Id) {
    let Some(signal) = signal_id.signal() else {
        return;
    };
    let (removed, now_empty) = {
        let mut subscribers = signal.subscribers.borrow_mut();
        let removed = subscribers.remove(&effect_id);
        let now_empty = removed.is_some() && subscribers.is_empty();
        (removed, now_empty)
    };
    drop(removed);
    if now_empty {
        RUNTIME.with(|runtime| runtime.mark_unobserved(signal_id));
    }
}

impl<T, F> EffectTrait for Effect<T, F>
where
    T: 'static,
    F: Fn(Option<T>) -> T,
{
    fn id(&self) -> Id {
        self.id
    }

    fn run(&self) -> bool {
        let curr_value = {
            // downcast value
            let mut value = self.value.borrow_mut();
            let value = value
                .downcast_mut::<Option<T>>()
                .expect("to downcast effect value");
            value.take()
        };

        // run the effect
        let new_value = (self.f)(curr_value);

        // set new value
        let mut value = self.value.borrow_mut();
        let value = value
            .downcast_mut::<Option<T>>()
            .expect("to downcast effect value");
        *value = Some(new_value);

        true
    }

    fn add_observer(&self, id: Id) {
        self.observers.borrow_mut().insert(id);
    }

    fn observers(&self) -> HashSet<Id> {
        self.observers.borrow().clone()
    }

    fn clear_observers(&self) {
        self.observers.borrow_mut().clear();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        for id in self.observers() {
            unsubscribe(id, self.id);
        }
        self.clear_observers();
    }
}
