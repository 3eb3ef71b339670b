//! Types exchanged between the tprofile sampling engine and whatever renders
//! its output (dashboards, flame-graph viewers, a terminal).

pub mod activity;
pub mod location;
pub mod shared_str;

pub use activity::{CountPoint, ProfileMetadata, Timestamp};
pub use location::SourceLocation;
pub use shared_str::SharedStr;
