use std::{cell::Cell, cell::RefCell, rc::Rc, time::Duration};

use serde_json::{json, Value};
use storekit::{
    reactive::Scope,
    reactive_field, CacheSystem, FetchAddTo, FetchCache, FetchError, FetchHandle, FetchOptions,
    FetchOutcome, FetchRequest, FetchSource, FetchStatus, FetchType, RejectReason, SettleHandler,
};
use tokio::{task::LocalSet, time::sleep};

const LATENCY: Duration = Duration::from_millis(100);

/// A repeatable source answering `response` after [`LATENCY`], counting calls.
fn slow_source(calls: Rc<Cell<usize>>, response: Value) -> FetchSource {
    FetchSource::from_fn(move || {
        calls.set(calls.get() + 1);
        let response = response.clone();
        async move {
            sleep(LATENCY).await;
            Ok(response)
        }
    })
}

async fn settle() {
    sleep(LATENCY * 2).await;
}

#[tokio::test(start_paused = true)]
async fn same_id_returns_same_instance() {
    LocalSet::new()
        .run_until(async {
            let cache = FetchCache::new();
            let calls = Rc::new(Cell::new(0));
            let first = cache
                .fetch(
                    slow_source(calls.clone(), json!({ "n": 1 })),
                    FetchOptions::new().id("feed"),
                )
                .unwrap();
            settle().await;

            let second = cache
                .fetch(
                    slow_source(calls.clone(), json!({ "n": 2 })),
                    FetchOptions::new().id("feed"),
                )
                .unwrap();
            assert_eq!(first, second);
            assert_eq!(cache.len(), 1);

            settle().await;
            // the second fetch is visible through the first handle
            assert_eq!(first.data(), Some(json!({ "n": 2 })));
            assert_eq!(first.fetched_count(), 2);
            assert_eq!(calls.get(), 2);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn pending_primary_blocks_another_primary() {
    LocalSet::new()
        .run_until(async {
            let cache = FetchCache::new();
            let calls = Rc::new(Cell::new(0));
            let handle = cache
                .fetch(
                    slow_source(calls.clone(), json!({ "ok": true })),
                    FetchOptions::new().id("profile"),
                )
                .unwrap();
            assert_eq!(handle.status(), FetchStatus::Pending);
            assert_eq!(calls.get(), 1);

            let again = cache
                .fetch(
                    slow_source(calls.clone(), json!({ "ok": false })),
                    FetchOptions::new().id("profile"),
                )
                .unwrap();
            assert_eq!(again, handle);
            assert_eq!(calls.get(), 1);
            assert_eq!(handle.status(), FetchStatus::Pending);
            assert_eq!(handle.data(), None);
            assert_eq!(handle.error(), None);
            let rejection = handle.last_rejection().unwrap();
            assert_eq!(rejection.request, FetchRequest::Primary);
            assert_eq!(rejection.reason, RejectReason::AlreadyPending);

            settle().await;
            assert_eq!(handle.status(), FetchStatus::Fulfilled);
            assert_eq!(handle.data(), Some(json!({ "ok": true })));
            assert_eq!(calls.get(), 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn fetch_if_pending_allows_overlap() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(Cell::new(0));
            let handle = FetchHandle::new(FetchOptions::new().fetch_if_pending(true));
            let first = handle
                .fetch(
                    FetchRequest::Primary,
                    slow_source(calls.clone(), json!(1)),
                    &FetchOptions::default(),
                )
                .unwrap();
            let second = handle
                .fetch(
                    FetchRequest::Primary,
                    slow_source(calls.clone(), json!(2)),
                    &FetchOptions::default(),
                )
                .unwrap();
            assert_eq!(calls.get(), 2);
            assert_eq!(first.await, FetchOutcome::Fulfilled);
            assert_eq!(second.await, FetchOutcome::Fulfilled);
            assert_eq!(handle.data(), Some(json!(2)));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn no_pending_state_keeps_the_guard() {
    LocalSet::new()
        .run_until(async {
            let handle = FetchHandle::new(FetchOptions::new().need_pending(false));
            let seen = Rc::new(RefCell::new(Vec::new()));
            let scope = Scope::new();
            scope.create_effect({
                let handle = handle.clone();
                let seen = seen.clone();
                move |_| seen.borrow_mut().push(handle.status())
            });

            let calls = Rc::new(Cell::new(0));
            let fetch = handle
                .fetch(
                    FetchRequest::Primary,
                    slow_source(calls.clone(), json!([])),
                    &FetchOptions::default(),
                )
                .unwrap();
            let blocked = handle
                .fetch(
                    FetchRequest::Primary,
                    slow_source(calls.clone(), json!([])),
                    &FetchOptions::default(),
                )
                .unwrap();
            assert_eq!(
                blocked.await,
                FetchOutcome::NotAdmitted(RejectReason::AlreadyPending)
            );
            fetch.await;

            assert_eq!(calls.get(), 1);
            assert!(!seen.borrow().contains(&FetchStatus::Pending));
            assert_eq!(handle.status(), FetchStatus::Fulfilled);
            scope.dispose();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn existing_data_blocks_when_asked() {
    LocalSet::new()
        .run_until(async {
            let calls = Rc::new(Cell::new(0));
            let handle = FetchHandle::new(FetchOptions::new().fetch_if_have_data(false));
            handle
                .fetch(
                    FetchRequest::Primary,
                    slow_source(calls.clone(), json!({ "v": 1 })),
                    &FetchOptions::default(),
                )
                .unwrap()
                .await;

            let outcome = handle
                .fetch(
                    FetchRequest::Primary,
                    slow_source(calls.clone(), json!({ "v": 2 })),
                    &FetchOptions::default(),
                )
                .unwrap()
                .await;
            assert_eq!(outcome, FetchOutcome::NotAdmitted(RejectReason::HasData));
            assert_eq!(handle.data(), Some(json!({ "v": 1 })));
            assert_eq!(calls.get(), 1);

            // a per-call override lets it through
            let outcome = handle
                .fetch(
                    FetchRequest::Primary,
                    slow_source(calls.clone(), json!({ "v": 2 })),
                    &FetchOptions::new().fetch_if_have_data(true),
                )
                .unwrap()
                .await;
            assert_eq!(outcome, FetchOutcome::Fulfilled);
            assert_eq!(handle.data(), Some(json!({ "v": 2 })));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn failure_is_stored_and_cleared_by_the_next_fetch() {
    LocalSet::new()
        .run_until(async {
            let handle = FetchHandle::new(FetchOptions::new());
            let failure = FetchError::Status {
                code: 503,
                message: "unavailable".into(),
            };
            let outcome = handle
                .fetch(
                    FetchRequest::Primary,
                    FetchSource::once({
                        let failure = failure.clone();
                        async move { Err(failure) }
                    }),
                    &FetchOptions::default(),
                )
                .unwrap()
                .await;
            assert_eq!(outcome, FetchOutcome::Failed(failure.clone()));
            assert_eq!(handle.status(), FetchStatus::Rejected);
            assert_eq!(handle.error(), Some(failure));

            let retry = handle
                .fetch(
                    FetchRequest::Primary,
                    FetchSource::once(async { Ok(json!("ok")) }),
                    &FetchOptions::default(),
                )
                .unwrap();
            assert_eq!(handle.status(), FetchStatus::Pending);
            assert_eq!(handle.error(), None);
            retry.await;
            assert_eq!(handle.status(), FetchStatus::Fulfilled);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn pagination_bumps_linked_page() {
    LocalSet::new()
        .run_until(async {
            let page = reactive_field(1u64).named("page");
            let handle = FetchHandle::new(
                FetchOptions::new()
                    .fetch_type(FetchType::Pagination)
                    .page(page.clone())
                    .fetch_add_to(FetchAddTo::new().path("items").add_to(storekit::AddTo::End))
                    .data_scope(storekit::DataScope::new().is_have_more_res_key("hasMore")),
            );
            let calls = Rc::new(Cell::new(0));
            let source = || slow_source(calls.clone(), json!({ "items": [1], "hasMore": false }));

            handle
                .fetch(FetchRequest::Primary, source(), &FetchOptions::default())
                .unwrap()
                .await;
            handle
                .fetch(FetchRequest::Primary, source(), &FetchOptions::default())
                .unwrap()
                .await;
            assert_eq!(page.get_untracked(), 3);
            assert_eq!(handle.data(), Some(json!({ "items": [1, 1], "hasMore": false })));
            assert_eq!(handle.added_to_end_count(), 1);
            assert!(!handle.is_have_more_bot());

            handle
                .fetch(
                    FetchRequest::Primary,
                    source(),
                    &FetchOptions::new().is_fetch_up(true),
                )
                .unwrap()
                .await;
            assert_eq!(page.get_untracked(), 3);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn cached_window_is_served_without_fetching() {
    LocalSet::new()
        .run_until(async {
            let cache_items = reactive_field((1..=5).map(Value::from).collect::<Vec<_>>())
                .named("messages");
            let cache = FetchCache::new();
            let calls = Rc::new(Cell::new(0));

            let snapshot = cache
                .fetch(
                    slow_source(calls.clone(), json!({ "items": [] })),
                    FetchOptions::new()
                        .id("chat")
                        .cache_system(CacheSystem::new().limit(3).cache(cache_items.clone()))
                        .fetch_add_to(FetchAddTo::new().path("items")),
                )
                .unwrap();
            assert_eq!(calls.get(), 0);
            assert_eq!(snapshot.status(), FetchStatus::Fulfilled);
            assert_eq!(snapshot.data(), Some(json!({ "items": [3, 4, 5] })));

            let live = cache.get("chat").unwrap();
            assert_ne!(live, snapshot);
            assert_eq!(live.status(), FetchStatus::Idle);
            assert_eq!(live.data(), None);

            // too few cached items: fetch for real
            cache_items.set(vec![json!(1)]);
            let handle = cache
                .fetch(
                    slow_source(calls.clone(), json!({ "items": [9] })),
                    FetchOptions::new().id("chat"),
                )
                .unwrap();
            assert_eq!(handle, live);
            assert_eq!(calls.get(), 1);
            settle().await;
            assert_eq!(live.data(), Some(json!({ "items": [9] })));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn clear_forgets_instances() {
    LocalSet::new()
        .run_until(async {
            let cache = FetchCache::new();
            let calls = Rc::new(Cell::new(0));
            let a = cache
                .fetch(slow_source(calls.clone(), json!(1)), FetchOptions::new().id("a"))
                .unwrap();
            cache
                .fetch(slow_source(calls.clone(), json!(2)), FetchOptions::new().id("b"))
                .unwrap();
            let anonymous = cache
                .fetch(slow_source(calls.clone(), json!(3)), FetchOptions::new())
                .unwrap();
            assert_eq!(cache.len(), 2);
            assert_eq!(anonymous.id(), None);

            assert_eq!(cache.clear("a"), Some(a.clone()));
            assert!(cache.get("a").is_none());
            let fresh = cache
                .fetch(slow_source(calls.clone(), json!(4)), FetchOptions::new().id("a"))
                .unwrap();
            assert_ne!(fresh, a);

            cache.clear_all();
            assert!(cache.is_empty());

            // in-flight fetches still complete on the handles given out
            settle().await;
            assert_eq!(a.data(), Some(json!(1)));
            assert_eq!(anonymous.data(), Some(json!(3)));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn handler_fires_once_on_next_success() {
    LocalSet::new()
        .run_until(async {
            let handle = FetchHandle::new(FetchOptions::new());
            handle
                .fetch(
                    FetchRequest::Primary,
                    FetchSource::once(async { Ok(json!("first")) }),
                    &FetchOptions::default(),
                )
                .unwrap()
                .await;

            let received = Rc::new(RefCell::new(Vec::new()));
            SettleHandler::new(&handle, {
                let received = received.clone();
                move |data| received.borrow_mut().push(data.clone())
            })
            .listen();
            // the state at registration is ignored
            assert!(received.borrow().is_empty());

            for value in ["second", "third"] {
                handle
                    .fetch(
                        FetchRequest::Primary,
                        FetchSource::once(async move { Ok(json!(value)) }),
                        &FetchOptions::default(),
                    )
                    .unwrap()
                    .await;
            }
            assert_eq!(received.borrow().as_slice(), [json!("second")]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn handler_reports_errors_and_respects_guard() {
    LocalSet::new()
        .run_until(async {
            let handle = FetchHandle::new(FetchOptions::new());
            let successes = Rc::new(Cell::new(0));
            let errors = Rc::new(RefCell::new(None));

            SettleHandler::new(&handle, {
                let successes = successes.clone();
                move |_| successes.set(successes.get() + 1)
            })
            .guard(|data| data.get("ready") == Some(&json!(true)))
            .on_error({
                let errors = errors.clone();
                move |err| *errors.borrow_mut() = Some(err.clone())
            })
            .listen();

            handle
                .fetch(
                    FetchRequest::Primary,
                    FetchSource::once(async { Ok(json!({ "ready": false })) }),
                    &FetchOptions::default(),
                )
                .unwrap()
                .await;
            assert_eq!(successes.get(), 0);

            handle
                .fetch(
                    FetchRequest::Primary,
                    FetchSource::once(async { Err(FetchError::Failed("offline".into())) }),
                    &FetchOptions::default(),
                )
                .unwrap()
                .await;
            assert_eq!(*errors.borrow(), Some(FetchError::Failed("offline".into())));

            handle
                .fetch(
                    FetchRequest::Primary,
                    FetchSource::once(async { Ok(json!({ "ready": true })) }),
                    &FetchOptions::default(),
                )
                .unwrap()
                .await;
            assert_eq!(successes.get(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn disposed_handler_never_fires() {
    LocalSet::new()
        .run_until(async {
            let handle = FetchHandle::new(FetchOptions::new());
            let fired = Rc::new(Cell::new(false));
            let disposer = SettleHandler::new(&handle, {
                let fired = fired.clone();
                move |_| fired.set(true)
            })
            .listen();
            disposer.dispose();

            handle
                .fetch(
                    FetchRequest::Primary,
                    FetchSource::once(async { Ok(json!(1)) }),
                    &FetchOptions::default(),
                )
                .unwrap()
                .await;
            assert!(!fired.get());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn invalid_path_is_a_usage_error() {
    LocalSet::new()
        .run_until(async {
            let cache = FetchCache::new();
            let err = cache
                .fetch(
                    FetchSource::once(async { Ok(json!(null)) }),
                    FetchOptions::new()
                        .id("bad")
                        .fetch_add_to(FetchAddTo::new().path("items[")),
                )
                .unwrap_err();
            assert!(matches!(err, storekit::UsageError::InvalidPath(_)));
            assert!(cache.is_empty());
        })
        .await;
}
