//! Call registry behavior: merging, accumulation, terminal observers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use promptrun::run::{CallRegistry, RunMetadata, RunUpdate};
use promptrun::types::RunStatus;
use uuid::Uuid;

fn meta() -> RunMetadata {
    RunMetadata {
        prompt_id: Uuid::new_v4(),
        thread_id: None,
        model: Some("gpt-5".into()),
    }
}

#[test]
fn register_starts_queued_and_enumerates() {
    let registry = CallRegistry::new();
    let a = registry.register(meta());
    let b = registry.register(meta());
    assert_ne!(a, b);
    assert_eq!(registry.len(), 2);

    let snap = registry.snapshot(a).unwrap();
    assert_eq!(snap.status, RunStatus::Queued);
    assert_eq!(snap.model.as_deref(), Some("gpt-5"));
    assert!(registry.active_runs().iter().any(|s| s.run_id == b));
}

#[test]
fn update_merges_partial_fields() {
    let registry = CallRegistry::new();
    let id = registry.register(meta());

    registry.update(id, RunUpdate::status(RunStatus::InProgress));
    registry.update(id, RunUpdate::response_id(Some("r1".into())));
    registry.update(
        id,
        RunUpdate {
            thread_id: Some("t1".into()),
            ..Default::default()
        },
    );

    let snap = registry.snapshot(id).unwrap();
    assert_eq!(snap.status, RunStatus::InProgress);
    assert_eq!(snap.remote_response_id.as_deref(), Some("r1"));
    assert_eq!(snap.thread_id.as_deref(), Some("t1"));

    registry.update(id, RunUpdate::response_id(None));
    assert!(registry.snapshot(id).unwrap().remote_response_id.is_none());
}

#[test]
fn appends_preserve_arrival_order_per_run() {
    let registry = CallRegistry::new();
    let a = registry.register(meta());
    let b = registry.register(meta());

    registry.append_output(a, "Hel");
    registry.append_output(b, "other ");
    registry.append_output(a, "lo");
    registry.append_reasoning(a, "think");
    registry.append_output(b, "run");

    assert_eq!(registry.snapshot(a).unwrap().output_text, "Hello");
    assert_eq!(registry.snapshot(a).unwrap().reasoning_text, "think");
    assert_eq!(registry.snapshot(b).unwrap().output_text, "other run");
}

#[test]
fn token_counters_only_accumulate() {
    let registry = CallRegistry::new();
    let id = registry.register(meta());
    registry.increment_output_tokens(id, 5);
    registry.increment_output_tokens(id, 7);
    registry.increment_input_tokens(id, 100);
    let usage = registry.snapshot(id).unwrap().usage;
    assert_eq!(usage.output_tokens, 12);
    assert_eq!(usage.input_tokens, 100);
}

#[test]
fn remove_is_idempotent_and_silent() {
    let registry = CallRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_cb = fired.clone();
    registry.on_run_terminal(Arc::new(move |_, _| {
        fired_cb.fetch_add(1, Ordering::SeqCst);
    }));

    let id = registry.register(meta());
    registry.remove(id);
    registry.remove(id);
    assert!(registry.is_empty());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn finish_notifies_observers_exactly_once() {
    let registry = CallRegistry::new();
    let seen: Arc<std::sync::Mutex<Vec<RunStatus>>> = Arc::default();
    let seen_cb = seen.clone();
    registry.on_run_terminal(Arc::new(move |_, status| {
        seen_cb.lock().unwrap().push(status);
    }));

    let id = registry.register(meta());
    registry.finish(id, RunStatus::Completed);
    // Entry already gone; a late finish must not re-fire.
    registry.finish(id, RunStatus::Cancelled);

    assert_eq!(*seen.lock().unwrap(), vec![RunStatus::Completed]);
    assert!(registry.snapshot(id).is_none());
}

#[test]
fn operations_on_unknown_ids_are_ignored() {
    let registry = CallRegistry::new();
    let ghost = Uuid::new_v4();
    registry.update(ghost, RunUpdate::status(RunStatus::Completed));
    registry.append_output(ghost, "x");
    registry.increment_output_tokens(ghost, 1);
    assert!(registry.snapshot(ghost).is_none());
}
