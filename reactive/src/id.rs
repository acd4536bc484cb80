use std::sync::atomic::AtomicU64;

use crate::{runtime::RUNTIME, signal::Signal};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Hash)]
/// A stable identifier for a signal, an effect or a scope.
pub struct Id(u64);

impl Id {
    pub(crate) fn next() -> Id {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Id(COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }

    pub(crate) fn signal(&self) -> Option<Signal> {
        RUNTIME.with(|runtime| runtime.signals.borrow().get(self).cloned())
    }

    pub(crate) fn add_signal(&self, signal: Signal) {
        RUNTIME.with(|runtime| runtime.signals.borrow_mut().insert(*self, signal));
    }

    /// Put this id under the current Scope, so it's disposed with it.
    pub(crate) fn set_scope(&self) {
        RUNTIME.with(|runtime| {
            let scope = runtime.current_scope.borrow();
            let mut children = runtime.children.borrow_mut();
            let children = children.entry(*scope).or_default();
            children.insert(*self);
        });
    }

    /// Dispose everything created under this id, keeping the id itself.
    pub(crate) fn dispose_children(&self) {
        let children = RUNTIME.with(|runtime| runtime.children.borrow_mut().remove(self));
        if let Some(children) = children {
            for child in children {
                child.dispose();
            }
        }
    }

    /// Dispose the signal or effect behind this id together with everything
    /// created under it.
    pub(crate) fn dispose(&self) {
        self.dispose_children();

        let (signal, effect) = RUNTIME.with(|runtime| {
            (
                runtime.signals.borrow_mut().remove(self),
                runtime.effects.borrow_mut().remove(self),
            )
        });

        if let Some(effect) = effect.and_then(|effect| effect.upgrade()) {
            effect.dispose();
        }

        // The signal is gone, its hook can't be observed anymore.
        drop(signal);

        RUNTIME.with(|runtime| runtime.flush_unobserved());
    }
}
