//! Low-overhead statistical stack-sampling profiler.
//!
//! A [`Profiler`] periodically captures every thread's stack through a
//! [`FrameSource`], folds the stacks into a [`CallTree`], and freezes that
//! tree into a bounded [`History`] once per cycle. Readers ask for the merged
//! tree or the per-cycle activity of any time window while sampling goes on.
//!
//! ```no_run
//! use std::time::Duration;
//! use tprofile_core::{Profiler, ProfilerConfig};
//!
//! let mut profiler = Profiler::start_with(ProfilerConfig::default())?;
//! {
//!     let _scope = tprofile_core::scope!("sleep");
//!     std::thread::sleep(Duration::from_millis(200));
//! }
//! profiler.stop();
//! print!("{}", profiler.get_profile(None, None).to_collapsed());
//! # Ok::<(), tprofile_core::ProfilerError>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod profiler;
mod scheduler;
pub mod source;

pub use clock::Clock;
pub use config::ProfilerConfig;
pub use error::{ConfigError, ProfilerError};
pub use model::{CallTree, CallTreeNode, History, HistoryEntry, MAX_STACK_DEPTH, StackFrame};
pub use profiler::{ProfileReader, Profiler};
pub use source::{FrameSource, ScopeGuard, ShadowStackSource, ThreadStack, enter};
pub use tprofile_protocol::{CountPoint, ProfileMetadata, SharedStr, SourceLocation, Timestamp};
