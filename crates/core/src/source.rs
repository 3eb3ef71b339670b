//! Where stacks come from.
//!
//! The sampler never walks threads itself: it asks a [`FrameSource`] for a
//! point-in-time copy of every live thread's stack. [`ShadowStackSource`] is
//! the built-in source, fed by threads that mark their own scopes with
//! [`enter`] or [`scope!`](crate::scope). Tests hand the profiler a closure
//! instead.

use std::cell::Cell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::model::StackFrame;

/// The stack of one thread at the moment of capture.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadStack {
    pub thread: ThreadId,
    /// Outermost frame first. `None` when the stack could not be read.
    pub frames: Option<Vec<StackFrame>>,
}

/// Point-in-time stack capture for all live threads.
///
/// Implementations must not pause or wait on the threads they read.
pub trait FrameSource: Send + Sync + 'static {
    fn current_stacks(&self) -> Vec<ThreadStack>;
}

impl<F> FrameSource for F
where
    F: Fn() -> Vec<ThreadStack> + Send + Sync + 'static,
{
    fn current_stacks(&self) -> Vec<ThreadStack> {
        self()
    }
}

struct OpenFrame {
    id: u64,
    frame: StackFrame,
}

struct ThreadSlot {
    thread: ThreadId,
    frames: Mutex<Vec<OpenFrame>>,
}

// Weak so that exited threads drop out of the registry.
static REGISTRY: Mutex<Vec<Weak<ThreadSlot>>> = parking_lot::const_mutex(Vec::new());

thread_local! {
    static SLOT: Arc<ThreadSlot> = register_current_thread();
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

fn register_current_thread() -> Arc<ThreadSlot> {
    let slot = Arc::new(ThreadSlot {
        thread: thread::current().id(),
        frames: Mutex::new(Vec::new()),
    });
    let mut registry = REGISTRY.lock();
    registry.retain(|slot| slot.strong_count() > 0);
    registry.push(Arc::downgrade(&slot));
    slot
}

/// Push `frame` onto the calling thread's shadow stack until the returned
/// guard drops.
pub fn enter(frame: impl Into<StackFrame>) -> ScopeGuard {
    let frame = frame.into();
    let id = NEXT_ID.try_with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    let pushed = id.ok().and_then(|id| {
        SLOT.try_with(|slot| slot.frames.lock().push(OpenFrame { id, frame }))
            .ok()
            .map(|()| id)
    });
    ScopeGuard {
        id: pushed,
        _not_send: PhantomData,
    }
}

/// Frames pushed by the calling thread that are still open.
pub fn current_depth() -> usize {
    SLOT.with(|slot| slot.frames.lock().len())
}

/// Removes its own frame from the owning thread's shadow stack on drop,
/// even when guards are dropped out of order.
#[must_use = "the scope ends when the guard is dropped"]
pub struct ScopeGuard {
    id: Option<u64>,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let Some(id) = self.id else {
            return;
        };
        // Thread-local teardown may already have run; nothing left to pop then.
        let _ = SLOT.try_with(|slot| {
            let mut frames = slot.frames.lock();
            if let Some(index) = frames.iter().rposition(|open| open.id == id) {
                frames.remove(index);
            }
        });
    }
}

/// Open a shadow-stack scope named `$name` at the invocation site.
///
/// ```
/// let _scope = tprofile_core::scope!("load_config");
/// ```
#[macro_export]
macro_rules! scope {
    ($name:expr) => {
        $crate::source::enter($crate::StackFrame::new($crate::SourceLocation::new(
            $name,
            file!(),
            line!(),
        )))
    };
}

/// Reads the shadow stacks published through [`enter`].
///
/// Every lock involved is only ever `try_lock`ed here: if a thread is in the
/// middle of pushing or popping, its stack is reported as unavailable for
/// this capture instead of waiting for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShadowStackSource;

impl FrameSource for ShadowStackSource {
    fn current_stacks(&self) -> Vec<ThreadStack> {
        let Some(mut registry) = REGISTRY.try_lock() else {
            return Vec::new();
        };
        registry.retain(|slot| slot.strong_count() > 0);
        registry
            .iter()
            .filter_map(Weak::upgrade)
            .map(|slot| ThreadStack {
                thread: slot.thread,
                frames: slot
                    .frames
                    .try_lock()
                    .map(|open| open.iter().map(|o| o.frame.clone()).collect()),
            })
            .collect()
    }
}
