//! Tests for the diagnostic events emitted under the `tracing` feature.

#![cfg(all(feature = "tracing", feature = "persistent", feature = "avl"))]

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use ordered_maps::avl::AvlTreeMap;
use ordered_maps::btree::{BTreeMap, MAX_ENTRIES, PersistentBTreeMap};
use ordered_maps::error::NodeError;
use parking_lot::Mutex;
use rstest::rstest;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer, Registry};

// =============================================================================
// Event Recorder
// =============================================================================

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for Recorder {
    fn on_event(&self, event: &Event<'_>, _context: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.events.lock().push((*event.metadata().level(), visitor.0));
    }
}

fn record<R>(action: impl FnOnce() -> R) -> (R, Vec<(Level, String)>) {
    let recorder = Recorder::default();
    let subscriber = Registry::default()
        .with(EnvFilter::new("ordered_maps=trace"))
        .with(recorder.clone());
    let result = tracing::subscriber::with_default(subscriber, action);
    let events = recorder.events.lock().clone();
    (result, events)
}

fn count(events: &[(Level, String)], level: Level, fragment: &str) -> usize {
    events
        .iter()
        .filter(|(event_level, message)| *event_level == level && message.contains(fragment))
        .count()
}

// =============================================================================
// Tests
// =============================================================================

#[rstest]
fn test_root_split_and_collapse_are_traced() {
    let ((), events) = record(|| {
        let mut map = BTreeMap::new();
        for key in 0..=MAX_ENTRIES {
            map.set(key, key);
        }
        for key in 0..=MAX_ENTRIES {
            map.delete(&key);
        }
        assert!(map.is_empty());
    });

    assert_eq!(count(&events, Level::TRACE, "root split"), 1);
    assert!(count(&events, Level::TRACE, "root collapsed") >= 1);
}

#[rstest]
fn test_small_map_emits_no_structural_events() {
    let ((), events) = record(|| {
        let mut map = BTreeMap::new();
        for key in 0..10 {
            map.set(key, ());
        }
        for key in 0..9 {
            map.delete(&key);
        }
    });

    assert_eq!(count(&events, Level::TRACE, "root split"), 0);
    assert_eq!(count(&events, Level::TRACE, "root collapsed"), 0);
}

#[rstest]
fn test_persistent_publish_and_clone_are_traced() {
    let ((), events) = record(|| {
        let map = PersistentBTreeMap::new();
        map.set(1, "one");
        map.set(2, "two");
        map.delete(&3);
        let fork = map.clone();
        assert_eq!(fork.len(), 2);
    });

    assert_eq!(count(&events, Level::TRACE, "root published"), 2);
    assert_eq!(count(&events, Level::DEBUG, "cloned"), 1);
}

#[rstest]
fn test_try_erase_is_silent() {
    let (result, events) = record(|| {
        let mut owner = AvlTreeMap::new();
        let handle = owner.insert(1, 1);
        let mut other: AvlTreeMap<i32, i32> = AvlTreeMap::new();
        other.try_erase(handle)
    });

    assert_eq!(result, Err(NodeError::ForeignNode));
    assert_eq!(count(&events, Level::ERROR, ""), 0);
}

#[rstest]
fn test_rejected_erase_logs_error_before_panicking() {
    let (outcome, events) = record(|| {
        let mut owner = AvlTreeMap::new();
        let handle = owner.insert(1, 1);
        owner.erase(handle);
        panic::catch_unwind(AssertUnwindSafe(|| owner.erase(handle)))
    });

    assert!(outcome.is_err());
    assert_eq!(count(&events, Level::ERROR, "erase rejected"), 1);
}
