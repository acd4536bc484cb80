//! Grouped, last-write-wins debouncing.
//!
//! Every action is registered under a group and a key. Registering again for
//! the same pair replaces the pending action and restarts its timer, so only
//! the most recent action runs. Timers are tasks on the current
//! [`tokio::task::LocalSet`]; calling the scheduling methods outside one
//! panics, like [`tokio::task::spawn_local`] does.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use rustc_hash::FxHashMap;
use storekit_reactive::batch;
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_GROUP: &str = "default";

/// Identity of one armed timer. A timer whose token no longer matches the
/// registry entry is stale and does nothing when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Hash)]
pub struct TimerToken(u64);

impl TimerToken {
    /// A token that does not correspond to any timer.
    pub const INVALID: TimerToken = TimerToken(0);

    pub fn next() -> TimerToken {
        static TIMER_COUNTER: AtomicU64 = AtomicU64::new(1);
        TimerToken(TIMER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

/// `group + "_" + key`
pub fn composite_key(group: &str, key: &str) -> String {
    format!("{group}_{key}")
}

#[derive(educe::Educe)]
#[educe(Debug)]
struct Pending {
    group: String,
    token: TimerToken,
    #[educe(Debug(ignore))]
    action: Box<dyn FnOnce()>,
    #[educe(Debug(ignore))]
    timer: Option<JoinHandle<()>>,
}

impl Pending {
    fn cancel(self) -> Box<dyn FnOnce()> {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        self.action
    }
}

type Registry = RefCell<FxHashMap<String, Pending>>;

/// Registry of pending debounced actions. Clones share the registry.
#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    pending: Rc<Registry>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Debounces `action` under `key` in the default group with the default
    /// delay.
    pub fn debounced_action(&self, key: &str, action: impl FnOnce() + 'static) -> TimerToken {
        self.debounced_action_in(DEFAULT_GROUP, key, DEFAULT_DELAY, action)
    }

    /// Arms (or re-arms) the timer for `group`/`key`. The previously
    /// registered action for the pair, if any, is dropped without running.
    pub fn debounced_action_in(
        &self,
        group: &str,
        key: &str,
        delay: Duration,
        action: impl FnOnce() + 'static,
    ) -> TimerToken {
        let composite = composite_key(group, key);
        let token = TimerToken::next();

        let timer = tokio::task::spawn_local({
            let registry = Rc::downgrade(&self.pending);
            let composite = composite.clone();
            async move {
                tokio::time::sleep(delay).await;
                fire(&registry, &composite, token);
            }
        });

        let replaced = self.pending.borrow_mut().insert(
            composite,
            Pending {
                group: group.to_string(),
                token,
                action: Box::new(action),
                timer: Some(timer),
            },
        );
        if let Some(replaced) = replaced {
            drop(replaced.cancel());
        }
        token
    }

    /// Runs the pending action for `group`/`key` now and disarms its timer.
    /// Returns whether anything ran.
    pub fn flush_debounced_actions(&self, key: &str, group: &str) -> bool {
        let removed = self.pending.borrow_mut().remove(&composite_key(group, key));
        match removed {
            Some(pending) => {
                debug!(group, key, "debounce flush");
                let action = pending.cancel();
                batch(action);
                true
            }
            None => false,
        }
    }

    /// Drops the pending action for `group`/`key` without running it.
    pub fn cancel_debounced_actions(&self, key: &str, group: &str) -> bool {
        let removed = self.pending.borrow_mut().remove(&composite_key(group, key));
        removed.map(Pending::cancel).is_some()
    }

    /// Drops every pending action registered under `group`.
    pub fn cancel_debounced_actions_by_group(&self, group: &str) -> usize {
        let removed: Vec<Pending> = {
            let mut pending = self.pending.borrow_mut();
            let keys: Vec<String> = pending
                .iter()
                .filter(|(_, p)| p.group == group)
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter().filter_map(|k| pending.remove(k)).collect()
        };
        let count = removed.len();
        removed.into_iter().for_each(|p| drop(p.cancel()));
        count
    }

    pub fn cancel_all_debounced_actions(&self) -> usize {
        let removed: Vec<Pending> = self.pending.borrow_mut().drain().map(|(_, p)| p).collect();
        let count = removed.len();
        removed.into_iter().for_each(|p| drop(p.cancel()));
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_pending(&self, key: &str, group: &str) -> bool {
        self.pending.borrow().contains_key(&composite_key(group, key))
    }
}

fn fire(registry: &Weak<Registry>, composite: &str, token: TimerToken) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    let pending = {
        let mut pending = registry.borrow_mut();
        match pending.get(composite) {
            Some(p) if p.token == token => pending.remove(composite),
            _ => None,
        }
    };
    if let Some(pending) = pending {
        debug!(key = composite, "debounce fired");
        // the timer is this task, nothing to abort
        batch(pending.action);
    }
}
