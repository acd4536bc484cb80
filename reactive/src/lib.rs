//! Fine-grained reactive core for storekit.
//!
//! Signals hold values, effects re-run when the signals they read change,
//! `batch` coalesces effect runs, and `Scope` ties lifetimes together. On top
//! of the usual primitives a Signal can report when it stops being observed,
//! see [`RwSignal::on_unobserved`].

mod effect;
mod id;
mod read;
mod runtime;
mod scope;
mod signal;
mod write;

pub use effect::{batch, create_effect, untrack};
pub use id::Id as ReactiveId;
pub use read::{SignalGet, SignalWith};
pub use scope::{with_scope, Scope};
pub use signal::{create_rw_signal, create_signal, ReadSignal, RwSignal, WriteSignal};
pub use write::SignalUpdate;
