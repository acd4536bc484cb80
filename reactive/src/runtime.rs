use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    rc::{Rc, Weak},
};

use smallvec::SmallVec;

use crate::{
    effect::{run_effect, EffectTrait},
    id::Id,
    signal::Signal,
};

thread_local! {
    pub(crate) static RUNTIME: Runtime = Runtime::new();
}

/// The internal reactive Runtime which stores all the reactive system states in a
/// thread local
pub(crate) struct Runtime {
    pub(crate) current_effect: RefCell<Option<Rc<dyn EffectTrait>>>,
    pub(crate) current_scope: RefCell<Id>,
    pub(crate) children: RefCell<HashMap<Id, HashSet<Id>>>,
    pub(crate) signals: RefCell<HashMap<Id, Signal>>,
    pub(crate) effects: RefCell<HashMap<Id, Weak<dyn EffectTrait>>>,
    pub(crate) batching: Cell<bool>,
    pub(crate) pending_effects: RefCell<SmallVec<[Rc<dyn EffectTrait>; 10]>>,
    /// How many effect runs are currently on the stack.
    pub(crate) running: Cell<usize>,
    /// Signals that lost their last subscriber and wait for the
    /// unobserved check.
    pub(crate) unobserved: RefCell<SmallVec<[Id; 4]>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub(crate) fn new() -> Self {
        Self {
            current_effect: RefCell::new(None),
            current_scope: RefCell::new(Id::next()),
            children: RefCell::new(HashMap::new()),
            signals: Default::default(),
            effects: Default::default(),
            batching: Cell::new(false),
            pending_effects: RefCell::new(SmallVec::new()),
            running: Cell::new(0),
            unobserved: RefCell::new(SmallVec::new()),
        }
    }

    pub(crate) fn add_pending_effect(&self, effect: Rc<dyn EffectTrait>) {
        let has_effect = self
            .pending_effects
            .borrow()
            .iter()
            .any(|e| e.id() == effect.id());
        if !has_effect {
            self.pending_effects.borrow_mut().push(effect);
        }
    }

    pub(crate) fn run_pending_effects(&self) {
        let pending_effects = self.pending_effects.take();
        for effect in pending_effects {
            run_effect(effect);
        }
    }

    pub(crate) fn mark_unobserved(&self, id: Id) {
        let mut unobserved = self.unobserved.borrow_mut();
        if !unobserved.contains(&id) {
            unobserved.push(id);
        }
    }

    /// Fire the `on_unobserved` hooks of signals that still have no subscriber.
    ///
    /// This is deferred until no effect is running and no batch is open, so an
    /// effect re-subscribing during its own re-run doesn't count as a
    /// transition.
    pub(crate) fn flush_unobserved(&self) {
        if self.running.get() > 0 || self.batching.get() {
            return;
        }
        loop {
            let candidates = self.unobserved.take();
            if candidates.is_empty() {
                return;
            }
            for id in candidates {
                let signal = self.signals.borrow().get(&id).cloned();
                let Some(signal) = signal else {
                    continue;
                };
                if signal.subscribers.borrow().is_empty() {
                    let hook = signal.on_unobserved.borrow().clone();
                    if let Some(hook) = hook {
                        hook();
                    }
                }
            }
        }
    }
}
