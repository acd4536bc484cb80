use std::{cell::Cell, rc::Rc};

use storekit_reactive::{
    batch, create_effect, untrack, RwSignal, Scope, SignalGet, SignalUpdate, SignalWith,
};

#[test]
fn batch_simple() {
    let name = RwSignal::new("John");
    let age = RwSignal::new(20);

    let count = Rc::new(Cell::new(0));

    create_effect({
        let count = count.clone();
        move |_| {
            name.track();
            age.track();

            count.set(count.get() + 1);
        }
    });

    // The effect runs once immediately
    assert_eq!(count.get(), 1);

    // Setting each signal once will trigger the effect
    name.set("Mary");
    assert_eq!(count.get(), 2);

    age.set(21);
    assert_eq!(count.get(), 3);

    // Batching will only update once
    batch(|| {
        name.set("John");
        age.set(20);
    });
    assert_eq!(count.get(), 4);
}

#[test]
fn batch_batch() {
    let name = RwSignal::new("John");
    let age = RwSignal::new(20);

    let count = Rc::new(Cell::new(0));

    create_effect({
        let count = count.clone();
        move |_| {
            name.track();
            age.track();

            count.set(count.get() + 1);
        }
    });

    assert_eq!(count.get(), 1);

    // Batching within another batch should be equivalent to batching them all together
    batch(|| {
        name.set("Mary");
        age.set(21);
        batch(|| {
            name.set("John");
            age.set(20);
        });
    });

    assert_eq!(count.get(), 2);
}

#[test]
fn pending_effects_are_deduped() {
    let signal = RwSignal::new(0);
    let counter = Rc::new(Cell::new(0));

    create_effect({
        let counter = counter.clone();
        move |_| {
            signal.track();
            counter.set(counter.get() + 1);
        }
    });

    batch(|| {
        signal.set(1);
        signal.set(2);
        signal.set(3);
    });

    assert_eq!(counter.get(), 2);
    assert_eq!(signal.get_untracked(), 3);
}

#[test]
fn untracked_read_does_not_subscribe() {
    let signal = RwSignal::new(0);
    let tracked_runs = Rc::new(Cell::new(0));
    let untracked_runs = Rc::new(Cell::new(0));

    create_effect({
        let tracked_runs = tracked_runs.clone();
        move |_| {
            signal.get();
            tracked_runs.set(tracked_runs.get() + 1);
        }
    });

    create_effect({
        let untracked_runs = untracked_runs.clone();
        move |_| {
            untrack(|| signal.get());
            untracked_runs.set(untracked_runs.get() + 1);
        }
    });

    signal.set(1);

    assert_eq!(tracked_runs.get(), 2, "tracked effect reruns");
    assert_eq!(untracked_runs.get(), 1, "untracked read should not subscribe");
}

#[test]
fn effect_receives_previous_value() {
    let signal = RwSignal::new(1);
    let seen = Rc::new(Cell::new(None));

    create_effect({
        let seen = seen.clone();
        move |prev: Option<i32>| {
            seen.set(prev);
            signal.get()
        }
    });

    assert_eq!(seen.get(), None);
    signal.set(7);
    assert_eq!(seen.get(), Some(1));
    signal.set(9);
    assert_eq!(seen.get(), Some(7));
}

#[test]
fn disposed_scope_stops_effect() {
    let signal = RwSignal::new(0);
    let runs = Rc::new(Cell::new(0));
    let scope = Scope::new();

    scope.create_effect({
        let runs = runs.clone();
        move |_| {
            signal.with(|_| ());
            runs.set(runs.get() + 1);
        }
    });

    signal.set(1);
    assert_eq!(runs.get(), 2);

    scope.dispose();
    signal.set(2);
    assert_eq!(runs.get(), 2);
    assert_eq!(signal.observer_count(), 0);
}

#[test]
fn effect_can_dispose_its_own_scope() {
    let signal = RwSignal::new(0);
    let runs = Rc::new(Cell::new(0));
    let scope = Scope::new();

    scope.create_effect({
        let runs = runs.clone();
        move |_| {
            let value = signal.get();
            runs.set(runs.get() + 1);
            if value == 1 {
                scope.dispose();
            }
        }
    });

    signal.set(1);
    signal.set(2);
    assert_eq!(runs.get(), 2);
    assert!(!signal.is_observed());
}
