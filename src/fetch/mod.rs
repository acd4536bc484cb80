//! Observable fetch state with bidirectional, scroll driven pagination.
//!
//! A [`FetchHandle`] tracks three independent axes: the primary fetch, and
//! the top and bottom pagination fetches started from scroll events. Each
//! axis has its own status and error signal. Results are merged into `data`
//! according to [`FetchAddTo`], and a sliding window moves the oldest items
//! into `scroll_cached_data` once pagination has moved far enough from the
//! scroll origin.
//!
//! Everything here is single threaded. Fetches started by the library (the
//! cache and scroll triggers) are spawned with [`tokio::task::spawn_local`]
//! and need a [`tokio::task::LocalSet`].

mod cache;
mod error;
mod handler;
mod merge;
mod options;
mod scroll;

use std::{
    cell::{Cell, RefCell},
    fmt,
    future::Future,
    rc::Rc,
};

use futures::{future::LocalBoxFuture, FutureExt};
use serde_json::Value;
use storekit_reactive::{
    batch, with_scope, RwSignal, Scope, SignalGet, SignalUpdate, SignalWith,
};
use tracing::{debug, warn};

pub use cache::FetchCache;
pub use error::{FetchError, UsageError};
pub use handler::{HandlerDisposer, SettleHandler};
pub use options::{
    AddTo, CacheSystem, DataScope, FetchAddTo, FetchOptions, FetchType, ResolvedOptions,
    StartFrom,
};
pub use scroll::{ScrollDispatch, ScrollMetrics};

use crate::field::{reactive_field, Field};
use merge::{MergeContext, MergePlan};

pub type FetchFuture = LocalBoxFuture<'static, Result<Value, FetchError>>;
type Thunk = Rc<dyn Fn() -> FetchFuture>;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FetchStatus {
    /// Nothing started yet on this axis.
    #[default]
    Idle,
    Pending,
    Fulfilled,
    Rejected,
}

/// Which axis a fetch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FetchRequest {
    Primary,
    ScrollTop,
    ScrollBottom,
}

/// Why a fetch was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    /// A primary fetch is in flight and `fetch_if_pending` is off.
    AlreadyPending,
    /// Data is present and `fetch_if_have_data` is off.
    HasData,
    NoMoreTop,
    NoMoreBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionRejection {
    pub request: FetchRequest,
    pub reason: RejectReason,
}

/// How a started fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fulfilled,
    Failed(FetchError),
    NotAdmitted(RejectReason),
}

/// The operation behind a fetch: either repeatable, so scroll pagination
/// can call it again, or a single future.
pub struct FetchSource {
    kind: SourceKind,
}

enum SourceKind {
    Repeatable(Thunk),
    Once(FetchFuture),
}

impl FetchSource {
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + 'static,
    {
        Self {
            kind: SourceKind::Repeatable(Rc::new(move || f().boxed_local())),
        }
    }

    pub fn once(future: impl Future<Output = Result<Value, FetchError>> + 'static) -> Self {
        Self {
            kind: SourceKind::Once(future.boxed_local()),
        }
    }

    pub fn is_repeatable(&self) -> bool {
        matches!(self.kind, SourceKind::Repeatable(_))
    }

    fn thunk(&self) -> Option<Thunk> {
        match &self.kind {
            SourceKind::Repeatable(thunk) => Some(thunk.clone()),
            SourceKind::Once(_) => None,
        }
    }

    fn start(self) -> FetchFuture {
        match self.kind {
            SourceKind::Repeatable(thunk) => thunk(),
            SourceKind::Once(future) => future,
        }
    }
}

impl fmt::Debug for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SourceKind::Repeatable(_) => "repeatable",
            SourceKind::Once(_) => "once",
        };
        f.debug_struct("FetchSource").field("kind", &kind).finish()
    }
}

struct FetchInstance {
    scope: Scope,
    options: RefCell<FetchOptions>,
    source: RefCell<Option<Thunk>>,
    primary_in_flight: Cell<usize>,

    status: RwSignal<FetchStatus>,
    data: RwSignal<Option<Value>>,
    error: RwSignal<Option<FetchError>>,
    fetched_count: RwSignal<u64>,
    added_to_start_count: RwSignal<u64>,
    added_to_end_count: RwSignal<u64>,

    top_status: RwSignal<FetchStatus>,
    top_error: RwSignal<Option<FetchError>>,
    is_have_more_top: Field<bool>,

    bot_status: RwSignal<FetchStatus>,
    bot_error: RwSignal<Option<FetchError>>,
    is_have_more_bot: Field<bool>,

    scroll_progress: RwSignal<u8>,
    getted_to_top: RwSignal<i64>,
    scroll_cached_data: Field<Vec<Value>>,
    /// Set by an eviction, cleared once pagination is back inside the window.
    window_evicted: Cell<bool>,

    last_rejection: RwSignal<Option<AdmissionRejection>>,
}

impl Drop for FetchInstance {
    fn drop(&mut self) {
        self.scope.dispose();
    }
}

/// Shared handle to one fetch instance. Clones point at the same state.
#[derive(Clone)]
pub struct FetchHandle(Rc<FetchInstance>);

impl PartialEq for FetchHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FetchHandle {}

impl fmt::Debug for FetchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("FetchHandle");
        s.field("id", &self.id());
        s.field("status", &self.0.status.get_untracked());
        s.field("top_status", &self.0.top_status.get_untracked());
        s.field("bot_status", &self.0.bot_status.get_untracked());
        s.finish()
    }
}

impl FetchHandle {
    pub fn new(options: FetchOptions) -> Self {
        let scope = Scope::new();
        let instance = with_scope(scope, move || FetchInstance {
            scope,
            options: RefCell::new(options),
            source: RefCell::new(None),
            primary_in_flight: Cell::new(0),
            status: RwSignal::new(FetchStatus::Idle),
            data: RwSignal::new(None),
            error: RwSignal::new(None),
            fetched_count: RwSignal::new(0),
            added_to_start_count: RwSignal::new(0),
            added_to_end_count: RwSignal::new(0),
            top_status: RwSignal::new(FetchStatus::Idle),
            top_error: RwSignal::new(None),
            is_have_more_top: reactive_field(true).named("isHaveMoreTop"),
            bot_status: RwSignal::new(FetchStatus::Idle),
            bot_error: RwSignal::new(None),
            is_have_more_bot: reactive_field(true).named("isHaveMoreBot"),
            scroll_progress: RwSignal::new(0),
            getted_to_top: RwSignal::new(0),
            scroll_cached_data: reactive_field(Vec::new()).named("scrollCachedData"),
            window_evicted: Cell::new(false),
            last_rejection: RwSignal::new(None),
        });
        Self(Rc::new(instance))
    }

    /// A detached, already fulfilled handle holding `data`.
    pub(crate) fn snapshot(options: FetchOptions, data: Value) -> Self {
        let handle = Self::new(options);
        handle.0.status.set(FetchStatus::Fulfilled);
        handle.0.data.set(Some(data));
        handle
    }

    pub fn id(&self) -> Option<String> {
        self.0.options.borrow().id.clone()
    }

    pub fn options(&self) -> FetchOptions {
        self.0.options.borrow().clone()
    }

    /// Layers `newer` over the stored options.
    pub fn merge_options(&self, newer: &FetchOptions) {
        let merged = self.0.options.borrow().merge(newer);
        *self.0.options.borrow_mut() = merged;
    }

    pub fn status(&self) -> FetchStatus {
        self.0.status.get()
    }

    pub fn data(&self) -> Option<Value> {
        self.0.data.get()
    }

    pub fn with_data<O>(&self, f: impl FnOnce(Option<&Value>) -> O) -> O {
        self.0.data.with(|data| f(data.as_ref()))
    }

    pub fn error(&self) -> Option<FetchError> {
        self.0.error.get()
    }

    pub fn fetched_count(&self) -> u64 {
        self.0.fetched_count.get()
    }

    pub fn added_to_start_count(&self) -> u64 {
        self.0.added_to_start_count.get()
    }

    pub fn added_to_end_count(&self) -> u64 {
        self.0.added_to_end_count.get()
    }

    pub fn top_status(&self) -> FetchStatus {
        self.0.top_status.get()
    }

    pub fn top_error(&self) -> Option<FetchError> {
        self.0.top_error.get()
    }

    pub fn is_have_more_top(&self) -> bool {
        self.0.is_have_more_top.get()
    }

    pub fn bot_status(&self) -> FetchStatus {
        self.0.bot_status.get()
    }

    pub fn bot_error(&self) -> Option<FetchError> {
        self.0.bot_error.get()
    }

    pub fn is_have_more_bot(&self) -> bool {
        self.0.is_have_more_bot.get()
    }

    pub fn scroll_progress(&self) -> u8 {
        self.0.scroll_progress.get()
    }

    pub fn getted_to_top(&self) -> i64 {
        self.0.getted_to_top.get()
    }

    pub fn scroll_cached_data(&self) -> Vec<Value> {
        self.0.scroll_cached_data.get()
    }

    /// The most recent fetch attempt that was turned away.
    pub fn last_rejection(&self) -> Option<AdmissionRejection> {
        self.0.last_rejection.get()
    }

    pub fn has_stored_source(&self) -> bool {
        self.0.source.borrow().is_some()
    }

    /// Starts a fetch on the `request` axis.
    ///
    /// Admission and the pending transition happen before this returns; the
    /// returned future drives `source` and commits its result. `overrides`
    /// apply to this call only and are layered over the stored options.
    /// A repeatable `source` is kept for later scroll fetches.
    pub fn fetch(
        &self,
        request: FetchRequest,
        source: FetchSource,
        overrides: &FetchOptions,
    ) -> Result<LocalBoxFuture<'static, FetchOutcome>, UsageError> {
        let mut options = self.0.options.borrow().merge(overrides).resolve()?;
        match request {
            FetchRequest::Primary => {}
            FetchRequest::ScrollTop => {
                options.add_to = AddTo::Start;
                options.is_set_data = true;
            }
            FetchRequest::ScrollBottom => {
                options.add_to = AddTo::End;
                options.is_set_data = true;
            }
        }

        if let Some(thunk) = source.thunk() {
            *self.0.source.borrow_mut() = Some(thunk);
        }

        if let Err(reason) = self.admit(request, &options) {
            warn!(id = ?options.id, %request, %reason, "fetch not admitted");
            self.0
                .last_rejection
                .set(Some(AdmissionRejection { request, reason }));
            return Ok(futures::future::ready(FetchOutcome::NotAdmitted(reason)).boxed_local());
        }

        self.begin(request, &options);
        let future = source.start();
        let handle = self.clone();
        Ok(async move {
            let result = future.await;
            handle.settle(request, &options, result)
        }
        .boxed_local())
    }

    /// Repeats the stored source on the `request` axis.
    pub fn refetch(
        &self,
        request: FetchRequest,
    ) -> Result<LocalBoxFuture<'static, FetchOutcome>, UsageError> {
        let thunk = self.0.source.borrow().clone().ok_or(UsageError::NoStoredFetch)?;
        self.fetch(
            request,
            FetchSource {
                kind: SourceKind::Repeatable(thunk),
            },
            &FetchOptions::default(),
        )
    }

    fn admit(&self, request: FetchRequest, options: &ResolvedOptions) -> Result<(), RejectReason> {
        let instance = &self.0;
        match request {
            FetchRequest::Primary => {
                if instance.primary_in_flight.get() > 0 && !options.fetch_if_pending {
                    return Err(RejectReason::AlreadyPending);
                }
                let has_data = instance
                    .data
                    .with_untracked(|data| data.as_ref().is_some_and(|v| !v.is_null()));
                if has_data && !options.fetch_if_have_data {
                    return Err(RejectReason::HasData);
                }
            }
            FetchRequest::ScrollTop => {
                if !instance.is_have_more_top.get_untracked() {
                    return Err(RejectReason::NoMoreTop);
                }
            }
            FetchRequest::ScrollBottom => {
                if !instance.is_have_more_bot.get_untracked() {
                    return Err(RejectReason::NoMoreBottom);
                }
            }
        }
        Ok(())
    }

    fn begin(&self, request: FetchRequest, options: &ResolvedOptions) {
        let instance = &self.0;
        debug!(id = ?options.id, %request, "fetch started");
        batch(|| match request {
            FetchRequest::Primary => {
                instance.primary_in_flight.set(instance.primary_in_flight.get() + 1);
                if options.need_pending {
                    instance.status.set(FetchStatus::Pending);
                } else if instance.status.get_untracked() == FetchStatus::Idle {
                    instance.status.set(FetchStatus::Fulfilled);
                }
                instance.error.set(None);
            }
            FetchRequest::ScrollTop => {
                instance.top_status.set(FetchStatus::Pending);
                instance.top_error.set(None);
            }
            FetchRequest::ScrollBottom => {
                instance.bot_status.set(FetchStatus::Pending);
                instance.bot_error.set(None);
            }
        });
    }

    fn settle(
        &self,
        request: FetchRequest,
        options: &ResolvedOptions,
        result: Result<Value, FetchError>,
    ) -> FetchOutcome {
        let instance = &self.0;
        if request == FetchRequest::Primary {
            instance
                .primary_in_flight
                .set(instance.primary_in_flight.get().saturating_sub(1));
        }

        batch(|| match result {
            Ok(value) => {
                debug!(id = ?options.id, %request, "fetch fulfilled");
                self.commit(request, options, value);
                FetchOutcome::Fulfilled
            }
            Err(err) => {
                debug!(id = ?options.id, %request, error = %err, "fetch rejected");
                let (status, error) = match request {
                    FetchRequest::Primary => (instance.status, instance.error),
                    FetchRequest::ScrollTop => (instance.top_status, instance.top_error),
                    FetchRequest::ScrollBottom => (instance.bot_status, instance.bot_error),
                };
                status.set(FetchStatus::Rejected);
                error.set(Some(err.clone()));
                FetchOutcome::Failed(err)
            }
        })
    }

    fn commit(&self, request: FetchRequest, options: &ResolvedOptions, value: Value) {
        let instance = &self.0;

        let (status, have_more) = match request {
            FetchRequest::Primary => (instance.status, &instance.is_have_more_bot),
            FetchRequest::ScrollTop => (instance.top_status, &instance.is_have_more_top),
            FetchRequest::ScrollBottom => (instance.bot_status, &instance.is_have_more_bot),
        };
        status.set(FetchStatus::Fulfilled);
        if let Some(more) = options
            .is_have_more_res_key
            .as_deref()
            .and_then(|key| value.get(key))
            .and_then(Value::as_bool)
        {
            have_more.set(more);
        }
        instance.fetched_count.update(|count| *count += 1);

        let ctx = MergeContext {
            request,
            options,
            getted_to_top: instance.getted_to_top.get_untracked(),
            previous_array: options
                .set_array
                .as_ref()
                .filter(|_| options.is_set_prev_arr)
                .map(Field::get_untracked),
            window_evicted: instance.window_evicted.get(),
        };
        let plan = instance
            .data
            .with_untracked(|data| merge::plan(data.as_ref(), value, &ctx));
        self.apply(plan, options);

        let up = options.is_fetch_up || request == FetchRequest::ScrollTop;
        if options.fetch_type == FetchType::Pagination && !up {
            if let Some(page) = &options.page {
                page.set_with(|page| page + 1);
            }
        }
    }

    fn apply(&self, plan: MergePlan, options: &ResolvedOptions) {
        let instance = &self.0;
        if plan.added_to_start {
            instance.added_to_start_count.update(|count| *count += 1);
        }
        if plan.added_to_end {
            instance.added_to_end_count.update(|count| *count += 1);
        }
        if !plan.evicted.is_empty() {
            instance.window_evicted.set(true);
            debug!(id = ?options.id, evicted = plan.evicted.len(), "moved items to scroll cache");
            instance
                .scroll_cached_data
                .update(|cached| cached.extend(plan.evicted));
        }
        match plan.reopened {
            Some(StartFrom::Top) => instance.is_have_more_top.set(true),
            Some(StartFrom::Bot) => instance.is_have_more_bot.set(true),
            None => {}
        }
        if let Some(data) = plan.data {
            instance.data.set(Some(data));
        }
        if let (Some(items), Some(target)) = (plan.set_array, &options.set_array) {
            target.set(items);
        }
        if let (Some(items), Some(cache)) = (plan.cache, &options.cache) {
            cache.set(items);
        }
    }
}
