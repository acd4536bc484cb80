//! # storekit
//!
//! Helpers for building reactive stores on top of [`storekit_reactive`].
//!
//! - [`reactive_field`] declares a named observable value, optionally reset
//!   to its initial value when nothing observes it anymore.
//! - [`NestedUpdater`] writes into nested fields of one item of a keyed
//!   collection through a parsed [`DataPath`].
//! - [`Schema`] and [`Form`] validate input with ordered, short-circuiting
//!   validators.
//! - [`Debouncer`] runs the last action registered for a group and key once
//!   things go quiet.
//! - [`FetchCache`] and [`FetchHandle`] keep observable fetch state per id,
//!   including scroll driven pagination in both directions with a sliding
//!   window of loaded items.
//!
//! ## Fetching
//!
//! Everything is single threaded. Fetches and debounce timers are spawned on
//! the current [`tokio::task::LocalSet`]:
//!
//! ```rust
//! use serde_json::json;
//! use storekit::{FetchCache, FetchOptions, FetchSource, FetchStatus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let local = tokio::task::LocalSet::new();
//! local
//!     .run_until(async {
//!         let cache = FetchCache::new();
//!         let feed = cache
//!             .fetch(
//!                 FetchSource::once(async { Ok(json!({ "items": [1, 2] })) }),
//!                 FetchOptions::new().id("feed"),
//!             )
//!             .unwrap();
//!         assert_eq!(feed.status(), FetchStatus::Pending);
//!
//!         while feed.status() == FetchStatus::Pending {
//!             tokio::task::yield_now().await;
//!         }
//!         assert_eq!(feed.status(), FetchStatus::Fulfilled);
//!         assert_eq!(feed.data(), Some(json!({ "items": [1, 2] })));
//!     })
//!     .await;
//! # }
//! ```
//!
//! Admission rejections never surface as errors. They are logged with
//! `tracing` and recorded in [`FetchHandle::last_rejection`]. Failures of the
//! fetch itself land in the status and error signals of the axis they
//! belong to.

pub mod debounce;
pub mod fetch;
pub mod field;
pub mod form;
pub mod path;
pub mod schema;
pub mod update;

pub use debounce::{Debouncer, TimerToken};
pub use fetch::{
    AddTo, AdmissionRejection, CacheSystem, DataScope, FetchAddTo, FetchCache, FetchError,
    FetchHandle, FetchOptions, FetchOutcome, FetchRequest, FetchSource, FetchStatus, FetchType,
    HandlerDisposer, RejectReason, ResolvedOptions, ScrollDispatch, ScrollMetrics, SettleHandler,
    StartFrom, UsageError,
};
pub use field::{reactive_field, Field, FieldBuilder, FieldOptions, Observer};
pub use form::{Form, FormOptions};
pub use path::{DataPath, PathError, PathMode, Segment, MAX_PADDING};
pub use schema::{
    email, match_field, max, max_length, min, min_length, one_of, required, Schema, SchemaError,
    ValidationReport, Validator, Values, Verdict,
};
pub use update::NestedUpdater;

pub use storekit_reactive as reactive;
