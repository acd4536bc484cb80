//! How a successful result joins the data already held by an instance.
//!
//! [`plan`] is pure: it looks at the current data and the incoming result
//! and describes every write the commit has to make. The instance applies
//! the plan inside one batch.

use serde_json::Value;

use super::{
    options::{AddTo, ResolvedOptions, StartFrom},
    FetchRequest,
};

pub(crate) struct MergeContext<'a> {
    pub(crate) request: FetchRequest,
    pub(crate) options: &'a ResolvedOptions,
    /// Displacement after the trigger of this fetch adjusted it.
    pub(crate) getted_to_top: i64,
    /// Current value of the `set_array` target, needed when prepending.
    pub(crate) previous_array: Option<Vec<Value>>,
    /// Whether this excursion past the window already evicted.
    pub(crate) window_evicted: bool,
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct MergePlan {
    /// Replacement for `data`; `None` leaves it untouched.
    pub(crate) data: Option<Value>,
    pub(crate) added_to_start: bool,
    pub(crate) added_to_end: bool,
    /// Items moved out of the live list, in list order.
    pub(crate) evicted: Vec<Value>,
    /// Origin side that has items to load again after an eviction.
    pub(crate) reopened: Option<StartFrom>,
    pub(crate) set_array: Option<Vec<Value>>,
    pub(crate) cache: Option<Vec<Value>>,
}

pub(crate) fn plan(existing: Option<&Value>, mut incoming: Value, ctx: &MergeContext) -> MergePlan {
    let options = ctx.options;

    if let Some(path) = &options.path {
        let current = existing
            .and_then(|data| path.get(data))
            .and_then(Value::as_array);
        let grows = path.get(&incoming).is_some_and(Value::is_array);
        if let (Some(current), Some(data), true) = (current, existing, grows) {
            let new_items = match path.get_mut(&mut incoming).map(Value::take) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            let mut plan = MergePlan::default();
            let list = grow(current.clone(), new_items, ctx, &mut plan);

            let mut next = data.clone();
            if let Some(slot) = path.get_mut(&mut next) {
                *slot = Value::Array(list.clone());
            }
            if options.is_set_data {
                plan.data = Some(next);
            }
            if options.set_array.is_some() {
                plan.set_array = Some(list);
            }
            return plan;
        }
    }

    whole(incoming, ctx)
}

fn grow(
    mut list: Vec<Value>,
    mut new_items: Vec<Value>,
    ctx: &MergeContext,
    plan: &mut MergePlan,
) -> Vec<Value> {
    let options = ctx.options;

    if let (Some(origin), Some(limit)) = (options.start_from, options.limit) {
        let away = matches!(
            (origin, ctx.request),
            (StartFrom::Top, FetchRequest::ScrollBottom)
                | (StartFrom::Bot, FetchRequest::ScrollTop)
        );
        let window = u64::from(options.how_much_getted_to_top);
        let past_window = ctx.getted_to_top.unsigned_abs() > window;
        if away && past_window && !ctx.window_evicted {
            let count = limit.min(list.len());
            plan.evicted = match origin {
                StartFrom::Top => list.drain(..count).collect(),
                StartFrom::Bot => list.split_off(list.len() - count),
            };
            if count > 0 {
                plan.reopened = Some(origin);
            }
        }
    }

    if options.is_set_reversed_arr {
        new_items.reverse();
    }
    match options.add_to {
        AddTo::Start => {
            plan.added_to_start = true;
            new_items.extend(list);
            new_items
        }
        AddTo::End => {
            plan.added_to_end = true;
            list.extend(new_items);
            list
        }
        AddTo::Reset => new_items,
    }
}

fn whole(incoming: Value, ctx: &MergeContext) -> MergePlan {
    let options = ctx.options;
    let mut plan = MergePlan::default();

    if options.set_array.is_some() {
        let items = options
            .path
            .as_ref()
            .and_then(|path| path.get(&incoming))
            .unwrap_or(&incoming)
            .as_array()
            .cloned();
        if let Some(mut items) = items {
            if options.is_set_reversed_arr {
                items.reverse();
            }
            if let (Some(limit), Some(_)) = (options.limit, &options.cache) {
                if limit > 0 && items.len() >= limit {
                    plan.cache = Some(items.clone());
                }
            }
            if options.is_set_prev_arr {
                items.extend(ctx.previous_array.iter().flatten().cloned());
            }
            plan.set_array = Some(items);
        }
    }

    if options.is_set_data {
        plan.data = Some(incoming);
    }
    plan
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        field::reactive_field,
        fetch::options::{CacheSystem, DataScope, FetchAddTo, FetchOptions},
    };

    fn ctx(
        request: FetchRequest,
        options: &ResolvedOptions,
        getted_to_top: i64,
    ) -> MergeContext<'_> {
        MergeContext {
            request,
            options,
            getted_to_top,
            previous_array: None,
            window_evicted: false,
        }
    }

    fn items(range: std::ops::RangeInclusive<i64>) -> Vec<Value> {
        range.map(Value::from).collect()
    }

    #[test]
    fn prepends_in_order() {
        let options = FetchOptions::new()
            .fetch_add_to(FetchAddTo::new().path("items").add_to(AddTo::Start))
            .resolve()
            .unwrap();
        let existing = json!({ "items": [3, 4], "total": 4 });
        let plan = plan(
            Some(&existing),
            json!({ "items": [1, 2] }),
            &ctx(FetchRequest::Primary, &options, 0),
        );
        assert_eq!(plan.data, Some(json!({ "items": [1, 2, 3, 4], "total": 4 })));
        assert!(plan.added_to_start);
        assert!(!plan.added_to_end);
        assert!(plan.evicted.is_empty());
    }

    #[test]
    fn appends_reversed_and_resets() {
        let options = FetchOptions::new()
            .fetch_add_to(
                FetchAddTo::new()
                    .path("page.rows")
                    .add_to(AddTo::End)
                    .reversed(true),
            )
            .resolve()
            .unwrap();
        let existing = json!({ "page": { "rows": [1] } });
        let appended = plan(
            Some(&existing),
            json!({ "page": { "rows": [2, 3] } }),
            &ctx(FetchRequest::Primary, &options, 0),
        );
        assert_eq!(appended.data, Some(json!({ "page": { "rows": [1, 3, 2] } })));
        assert!(appended.added_to_end);

        let mut reset = options.clone();
        reset.add_to = AddTo::Reset;
        reset.is_set_reversed_arr = false;
        let replaced = plan(
            Some(&existing),
            json!({ "page": { "rows": [9] } }),
            &ctx(FetchRequest::Primary, &reset, 0),
        );
        assert_eq!(replaced.data, Some(json!({ "page": { "rows": [9] } })));
    }

    fn window_options(start_from: StartFrom, add_to: AddTo) -> ResolvedOptions {
        FetchOptions::new()
            .cache_system(CacheSystem::new().limit(10))
            .data_scope(
                DataScope::new()
                    .start_from(start_from)
                    .how_much_getted_to_top(2),
            )
            .fetch_add_to(FetchAddTo::new().path("items").add_to(add_to))
            .resolve()
            .unwrap()
    }

    #[test]
    fn evicts_oldest_from_the_top_past_the_window() {
        let options = window_options(StartFrom::Top, AddTo::End);
        let existing = json!({ "items": items(1..=30) });
        let incoming = json!({ "items": items(31..=40) });

        let inside = plan(
            Some(&existing),
            incoming.clone(),
            &ctx(FetchRequest::ScrollBottom, &options, -2),
        );
        assert!(inside.evicted.is_empty());
        assert_eq!(inside.reopened, None);

        let past = plan(
            Some(&existing),
            incoming,
            &ctx(FetchRequest::ScrollBottom, &options, -3),
        );
        assert_eq!(past.evicted, items(1..=10));
        assert_eq!(past.reopened, Some(StartFrom::Top));
        assert_eq!(past.data, Some(json!({ "items": items(11..=40) })));
    }

    #[test]
    fn evicts_once_per_excursion() {
        let options = window_options(StartFrom::Top, AddTo::End);
        let existing = json!({ "items": items(11..=60) });
        let further = plan(
            Some(&existing),
            json!({ "items": items(61..=70) }),
            &MergeContext {
                window_evicted: true,
                ..ctx(FetchRequest::ScrollBottom, &options, -4)
            },
        );
        assert!(further.evicted.is_empty());
        assert_eq!(further.reopened, None);
        assert_eq!(further.data, Some(json!({ "items": items(11..=70) })));
    }

    #[test]
    fn evicts_from_the_end_when_origin_is_bottom() {
        let options = window_options(StartFrom::Bot, AddTo::Start);
        let existing = json!({ "items": items(11..=40) });
        let plan = plan(
            Some(&existing),
            json!({ "items": items(1..=10) }),
            &ctx(FetchRequest::ScrollTop, &options, 3),
        );
        assert_eq!(plan.evicted, items(31..=40));
        assert_eq!(plan.reopened, Some(StartFrom::Bot));
        assert_eq!(plan.data, Some(json!({ "items": items(1..=30) })));
    }

    #[test]
    fn growth_towards_origin_never_evicts() {
        let options = window_options(StartFrom::Top, AddTo::Start);
        let existing = json!({ "items": items(11..=40) });
        let plan = plan(
            Some(&existing),
            json!({ "items": items(1..=10) }),
            &ctx(FetchRequest::ScrollTop, &options, -5),
        );
        assert!(plan.evicted.is_empty());
    }

    #[test]
    fn unset_data_still_delivers_the_list() {
        let target = reactive_field(Vec::new()).named("rows");
        let options = FetchOptions::new()
            .is_set_data(false)
            .fetch_add_to(
                FetchAddTo::new()
                    .path("items")
                    .add_to(AddTo::End)
                    .set_array(target),
            )
            .resolve()
            .unwrap();
        let existing = json!({ "items": [1] });
        let plan = plan(
            Some(&existing),
            json!({ "items": [2] }),
            &ctx(FetchRequest::Primary, &options, 0),
        );
        assert_eq!(plan.data, None);
        assert_eq!(plan.set_array, Some(items(1..=2)));
    }

    #[test]
    fn whole_result_feeds_set_array() {
        let target = reactive_field(Vec::new()).named("rows");
        let cache = reactive_field(Vec::new()).named("cache");
        let options = FetchOptions::new()
            .cache_system(CacheSystem::new().limit(3).cache(cache))
            .fetch_add_to(
                FetchAddTo::new()
                    .path("items")
                    .reversed(true)
                    .prepend_to_previous(true)
                    .set_array(target),
            )
            .resolve()
            .unwrap();
        let mut context = ctx(FetchRequest::Primary, &options, 0);
        context.previous_array = Some(vec![json!("old")]);

        let result = json!({ "items": [1, 2, 3] });
        let plan = plan(None, result.clone(), &context);
        assert_eq!(plan.data, Some(result));
        assert_eq!(plan.cache, Some(items(1..=3).into_iter().rev().collect()));
        assert_eq!(
            plan.set_array,
            Some(vec![json!(3), json!(2), json!(1), json!("old")])
        );
    }

    #[test]
    fn non_sequence_result_replaces_data() {
        let options = FetchOptions::new()
            .fetch_add_to(FetchAddTo::new().path("items").add_to(AddTo::End))
            .resolve()
            .unwrap();
        let existing = json!({ "items": [1] });
        let plan = plan(
            Some(&existing),
            json!({ "error": null }),
            &ctx(FetchRequest::Primary, &options, 0),
        );
        assert_eq!(plan.data, Some(json!({ "error": null })));
        assert!(!plan.added_to_end);
    }
}
