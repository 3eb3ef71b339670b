//! Integration tests: run the profiler's background thread against real
//! shadow stacks and synthetic sources, then query what it recorded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tprofile_core::{
    CallTree, CallTreeNode, FrameSource, MAX_STACK_DEPTH, Profiler, ProfilerConfig,
    SourceLocation, StackFrame, ThreadStack,
};

fn other_thread() -> thread::ThreadId {
    thread::spawn(|| thread::current().id())
        .join()
        .expect("id thread panicked")
}

fn fast_config(trigger_ms: u64, cycle_ms: u64) -> ProfilerConfig {
    ProfilerConfig::default()
        .with_trigger_interval(Duration::from_millis(trigger_ms))
        .with_cycle_interval(Duration::from_millis(cycle_ms))
}

fn well_formed(node: &CallTreeNode) -> bool {
    let mut seen = std::collections::HashSet::new();
    node.children()
        .all(|child| seen.insert(child.location.clone()) && child.count <= node.count && well_formed(child))
}

#[test]
fn sleeping_thread_shows_up_in_history() {
    let mut profiler = Profiler::start_with(fast_config(10, 50))
        .expect("failed to start profiler");
    {
        let _scope = tprofile_core::scope!("sleep");
        thread::sleep(Duration::from_millis(200));
    }
    profiler.stop();

    let history = profiler.history();
    assert!(
        (3..=5).contains(&history.len()),
        "expected 3..=5 cycles, got {}",
        history.len()
    );
    let merged = CallTree::merge_all(history.iter().map(|e| e.tree.as_ref()));
    let sleep = merged.find("sleep");
    assert!(sleep.is_some_and(|n| n.count > 0), "no sleep node in {merged:?}");

    let timestamps: Vec<f64> = history.iter().map(|e| e.timestamp).collect();
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn synthetic_source_counts_every_tick() {
    let ticks = Arc::new(AtomicU64::new(0));
    let worker = other_thread();
    let counter = Arc::clone(&ticks);
    let source = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        vec![ThreadStack {
            thread: worker,
            frames: Some(vec![
                StackFrame::new(SourceLocation::new("main", "app.rs", 1)),
                StackFrame::new(SourceLocation::new("serve", "app.rs", 20)),
            ]),
        }]
    };

    let mut profiler = Profiler::new(fast_config(2, 25), source)
        .expect("valid config rejected");
    profiler
        .start()
        .expect("failed to start profiler");
    thread::sleep(Duration::from_millis(120));
    profiler.stop();

    let profile = profiler.get_profile(None, None);
    let ticks = ticks.load(Ordering::SeqCst);
    assert!(ticks > 0);
    assert_eq!(profile.count(), ticks);
    assert_eq!(profile.node_count(), 2);
    assert_eq!(profile.find("serve").map(|n| n.count), Some(ticks));

    let meta = profiler.get_profile_metadata(None, None);
    assert_eq!(meta.total(), ticks);
    assert_eq!(meta.counts.len(), profiler.history_len() + 1);

    let reader = profiler.reader();
    let frozen: u64 = reader.history().iter().map(|e| e.tree.count()).sum();
    assert_eq!(frozen + reader.recent_count(), ticks);
}

#[test]
fn history_window_queries_split_the_run() {
    let worker = other_thread();
    let source = move || {
        vec![ThreadStack {
            thread: worker,
            frames: Some(vec![StackFrame::new(SourceLocation::new("loop", "w.rs", 5))]),
        }]
    };
    let mut profiler = Profiler::new(fast_config(2, 20), source)
        .expect("valid config rejected");
    let _ = profiler.start();
    thread::sleep(Duration::from_millis(150));
    profiler.stop();

    let history = profiler.history();
    assert!(history.len() >= 3);
    let pivot = history[history.len() / 2].timestamp;

    let total = profiler.get_profile(None, None).count();
    let before = profiler.get_profile(None, Some(pivot)).count();
    let after = profiler.get_profile(Some(pivot), None).count();
    assert_eq!(before + after, total);
    assert!(profiler.get_profile(Some(pivot), Some(pivot - 1.0)).is_empty());
}

/// Every path in `before` is still present in `after` with at least the
/// same count.
fn only_grew(before: &CallTreeNode, after: &CallTreeNode) -> bool {
    after.count >= before.count
        && before.children().all(|child| {
            after
                .child(&child.location)
                .is_some_and(|grown| only_grew(child, grown))
        })
}

fn rotating_source(stacks: Vec<Vec<StackFrame>>) -> impl FrameSource {
    let worker = other_thread();
    let tick = AtomicUsize::new(0);
    move || {
        let i = tick.fetch_add(1, Ordering::Relaxed);
        vec![ThreadStack {
            thread: worker,
            frames: Some(stacks[i % stacks.len()].clone()),
        }]
    }
}

fn frames(names: &[&str]) -> Vec<StackFrame> {
    names
        .iter()
        .map(|n| StackFrame::new(SourceLocation::new(*n, "svc.rs", 1)))
        .collect()
}

#[test]
fn concurrent_readers_never_see_a_node_shrink() {
    let source = rotating_source(vec![
        frames(&["main", "accept"]),
        frames(&["main", "handle", "parse"]),
        frames(&["main", "handle", "write"]),
        frames(&["gc"]),
    ]);
    let mut profiler =
        Profiler::new(fast_config(1, 5), source).expect("valid config rejected");
    profiler.start().expect("failed to start profiler");
    let reader = profiler.reader();

    thread::scope(|s| {
        let mut readers = Vec::new();
        for _ in 0..4 {
            let reader = reader.clone();
            readers.push(s.spawn(move || {
                let mut previous = CallTree::new();
                for _ in 0..25 {
                    let profile = reader.get_profile(None, None);
                    assert!(well_formed(profile.root()), "malformed tree {profile:?}");
                    assert!(
                        only_grew(previous.root(), profile.root()),
                        "a node shrank between reads:\n{previous:?}\n{profile:?}"
                    );
                    previous = profile;
                    thread::sleep(Duration::from_micros(500));
                }
            }));
        }
        for handle in readers {
            assert!(handle.join().is_ok(), "reader panicked");
        }
    });

    profiler.stop();
    let profile = profiler.get_profile(None, None);
    assert!(profile.find("parse").is_some());
    assert!(profiler.history_len() > 0);
}

#[test]
fn shadow_stack_workers_show_up_while_readers_query() {
    let mut profiler = Profiler::start_with(fast_config(1, 5)).expect("failed to start profiler");
    let reader = profiler.reader();

    thread::scope(|s| {
        for i in 0..3 {
            s.spawn(move || {
                let name = format!("busy_{i}");
                let _outer = tprofile_core::scope!("worker");
                for _ in 0..40 {
                    let _inner =
                        tprofile_core::enter(SourceLocation::new(name.as_str(), "busy.rs", 7));
                    thread::sleep(Duration::from_millis(1));
                }
            });
        }
        for _ in 0..25 {
            assert!(well_formed(reader.get_profile(None, None).root()));
            thread::yield_now();
        }
    });

    profiler.stop();
    assert!(profiler.get_profile(None, None).find("worker").is_some());
}

#[test]
fn very_deep_stacks_can_be_queried_on_a_default_stack_thread() {
    let deep: Vec<StackFrame> = (0..10_000u32)
        .map(|line| StackFrame::new(SourceLocation::new("rec", "deep.rs", line)))
        .collect();
    let source = rotating_source(vec![deep]);
    let mut profiler = Profiler::new(fast_config(1, 10), source).expect("valid config rejected");
    profiler.start().expect("failed to start profiler");
    thread::sleep(Duration::from_millis(40));
    let reader = profiler.reader();

    let depth = thread::spawn(move || {
        let profile = reader.get_profile(None, None);
        let json = serde_json::to_string(&profile).expect("profile serializes");
        assert!(!json.is_empty());
        (profile.depth(), profile.count())
    })
    .join()
    .expect("querying a deep profile overflowed or panicked");

    profiler.stop();
    let (depth, count) = depth;
    assert!(count > 0);
    assert_eq!(depth, MAX_STACK_DEPTH + 1);
}

#[test]
fn stopped_profiler_reports_open_cycle_in_metadata() {
    let profiler = Profiler::with_shadow_stacks(ProfilerConfig::default())
        .expect("valid config rejected");
    let meta = profiler.get_profile_metadata(None, None);
    assert_eq!(meta.counts.len(), 1);
    assert_eq!(meta.total(), 0);
    assert!(profiler.get_profile(None, None).is_empty());
}
