//! Profiler lifecycle, shared sampling state and time-windowed queries.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tprofile_protocol::{CountPoint, ProfileMetadata, Timestamp};
use tracing::{debug, error, trace};

use crate::clock::Clock;
use crate::config::ProfilerConfig;
use crate::error::{ConfigError, ProfilerError};
use crate::model::{CallTree, History, HistoryEntry};
use crate::scheduler::{self, Housekeeping};
use crate::source::{FrameSource, ShadowStackSource};

struct State {
    /// The only tree that is ever mutated.
    recent: CallTree,
    history: History,
}

struct Shared {
    state: Mutex<State>,
    source: Box<dyn FrameSource>,
    clock: Clock,
}

impl Shared {
    fn cycle_at(&self, now: Timestamp) {
        let mut state = self.state.lock();
        let tree = std::mem::take(&mut state.recent);
        let samples = tree.count();
        let evicted = state.history.push(now, Arc::new(tree));
        let entries = state.history.len();
        drop(state);
        // `evicted` is freed here, outside the lock.
        debug!(
            timestamp = now,
            samples,
            entries,
            evicted = evicted.is_some(),
            "cycled recent profile into history"
        );
    }

    fn profile_at(
        &self,
        now: Timestamp,
        start: Option<Timestamp>,
        stop: Option<Timestamp>,
    ) -> CallTree {
        if let (Some(start), Some(stop)) = (start, stop)
            && stop < start
        {
            return CallTree::new();
        }
        let include_recent = stop.is_none_or(|s| s > now) && start.is_none_or(|s| s < now);

        let (trees, recent) = {
            let state = self.state.lock();
            let trees: Vec<Arc<CallTree>> = state
                .history
                .range(start, stop)
                .map(|entry| Arc::clone(&entry.tree))
                .collect();
            let recent = include_recent.then(|| state.recent.clone());
            (trees, recent)
        };

        let mut profile = CallTree::merge_all(trees.iter().map(Arc::as_ref));
        if let Some(recent) = &recent {
            profile.absorb(recent);
        }
        profile
    }

    fn metadata_at(
        &self,
        now: Timestamp,
        start: Option<Timestamp>,
        stop: Option<Timestamp>,
    ) -> ProfileMetadata {
        let lower = start.unwrap_or(f64::NEG_INFINITY);
        let upper = stop.unwrap_or(now);
        let state = self.state.lock();
        let mut counts: Vec<CountPoint> = state
            .history
            .between(lower, upper)
            .map(|entry| CountPoint::new(entry.timestamp, entry.tree.count()))
            .collect();
        if stop.is_none() {
            counts.push(CountPoint::new(now, state.recent.count()));
        }
        ProfileMetadata { counts }
    }
}

impl Housekeeping for Shared {
    fn sample(&self) {
        let me = thread::current().id();
        let stacks = match panic::catch_unwind(AssertUnwindSafe(|| self.source.current_stacks())) {
            Ok(stacks) => stacks,
            Err(_) => {
                error!("frame source panicked; skipping sample");
                return;
            }
        };

        let mut sampled = 0usize;
        let mut state = self.state.lock();
        for stack in &stacks {
            if stack.thread == me {
                continue;
            }
            let Some(frames) = stack.frames.as_deref() else {
                continue;
            };
            if !frames.is_empty() {
                state.recent.add_stack(frames);
                sampled += 1;
            }
        }
        drop(state);
        trace!(threads = stacks.len(), sampled, "sample tick");
    }

    fn cycle(&self) {
        self.cycle_at(self.clock.now());
    }
}

/// Cloneable read-only handle for querying a profiler from other threads.
///
/// Queries copy what they need under a short lock and merge outside it, so
/// they never observe a tree while the sampler is writing to it.
#[derive(Clone)]
pub struct ProfileReader {
    shared: Arc<Shared>,
}

impl ProfileReader {
    /// Merged call tree for history cycles with `start <= t < stop`, plus the
    /// still-open cycle when the window reaches the present.
    ///
    /// `None` bounds are open. An inverted window (`stop < start`) yields an
    /// empty tree.
    pub fn get_profile(&self, start: Option<Timestamp>, stop: Option<Timestamp>) -> CallTree {
        self.shared.profile_at(self.shared.clock.now(), start, stop)
    }

    /// Per-cycle sample counts for cycles with `start < t < stop`.
    ///
    /// With no `stop`, the window ends now and a final point for the
    /// still-open cycle is appended.
    pub fn get_profile_metadata(
        &self,
        start: Option<Timestamp>,
        stop: Option<Timestamp>,
    ) -> ProfileMetadata {
        self.shared.metadata_at(self.shared.clock.now(), start, stop)
    }

    /// Snapshot of the frozen cycles, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.shared.state.lock().history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.shared.state.lock().history.len()
    }

    /// Samples in the still-open cycle.
    pub fn recent_count(&self) -> u64 {
        self.shared.state.lock().recent.count()
    }

    /// The profiler's current time, in the same scale as history timestamps.
    pub fn now(&self) -> Timestamp {
        self.shared.clock.now()
    }
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Statistical stack-sampling profiler.
///
/// Once started, a background thread samples every thread's stack each
/// trigger interval into the current tree, and every cycle interval freezes
/// that tree into a bounded history. Stopping joins the thread; dropping the
/// profiler stops it.
pub struct Profiler {
    config: ProfilerConfig,
    reader: ProfileReader,
    worker: Option<Worker>,
}

impl Profiler {
    pub fn new(config: ProfilerConfig, source: impl FrameSource) -> Result<Self, ConfigError> {
        config.validate()?;
        let shared = Shared {
            state: Mutex::new(State {
                recent: CallTree::new(),
                history: History::new(config.history_capacity),
            }),
            source: Box::new(source),
            clock: Clock::new(),
        };
        Ok(Self {
            config,
            reader: ProfileReader {
                shared: Arc::new(shared),
            },
            worker: None,
        })
    }

    /// A profiler reading the shadow stacks published with
    /// [`scope!`](crate::scope).
    pub fn with_shadow_stacks(config: ProfilerConfig) -> Result<Self, ConfigError> {
        Self::new(config, ShadowStackSource)
    }

    /// Validate `config`, build a shadow-stack profiler and start it.
    pub fn start_with(config: ProfilerConfig) -> Result<Self, ProfilerError> {
        let mut profiler = Self::with_shadow_stacks(config)?;
        profiler.start()?;
        Ok(profiler)
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn start(&mut self) -> Result<(), ProfilerError> {
        if self.worker.is_some() {
            return Err(ProfilerError::AlreadyRunning);
        }
        let (stop, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let shared = Arc::clone(&self.reader.shared);
        let trigger_interval = self.config.trigger_interval();
        let cycle_interval = self.config.cycle_interval();
        let handle = thread::Builder::new()
            .name("tprofile".into())
            .spawn(move || scheduler::run(&*shared, trigger_interval, cycle_interval, &stop_rx))
            .map_err(ProfilerError::Spawn)?;
        self.worker = Some(Worker { stop, handle });
        debug!(
            trigger_ms = self.config.trigger_interval_ms,
            cycle_ms = self.config.cycle_interval_ms,
            capacity = self.config.history_capacity,
            "profiler started"
        );
        Ok(())
    }

    /// Stop sampling. No sample or cycle runs after this returns.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.stop.send(());
        if worker.handle.join().is_err() {
            error!("profiler thread panicked");
        }
        debug!(entries = self.reader.history_len(), "profiler stopped");
    }

    pub fn reader(&self) -> ProfileReader {
        self.reader.clone()
    }

    pub fn get_profile(&self, start: Option<Timestamp>, stop: Option<Timestamp>) -> CallTree {
        self.reader.get_profile(start, stop)
    }

    pub fn get_profile_metadata(
        &self,
        start: Option<Timestamp>,
        stop: Option<Timestamp>,
    ) -> ProfileMetadata {
        self.reader.get_profile_metadata(start, stop)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.reader.history()
    }

    pub fn history_len(&self) -> usize {
        self.reader.history_len()
    }

    pub fn now(&self) -> Timestamp {
        self.reader.now()
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        self.stop();
    }
}
