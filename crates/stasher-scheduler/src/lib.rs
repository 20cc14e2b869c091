//! # Stasher Scheduler
//!
//! The delegation scheduling engine: durable task model, window
//! consolidation, the per-task state machine and the incoming-grant detector.
//!
//! ## Architecture
//! ```text
//! PollLoop (tokio interval, one tick at a time)
//!   ├── SettingsStore: monitoring on?
//!   ├── GrantDetector (throttled): feed → new DelegationTasks
//!   ├── DelegationScheduler: consolidate → delegate / undelegate via gateway
//!   ├── TaskStore: save if anything changed
//!   └── notifications → NotifyRouter → dispatch (Telegram admins, webhook)
//! ```

pub mod detector;
pub mod dispatch;
pub mod engine;
pub mod merge;
pub mod notify;
pub mod poll;
pub mod settings;
pub mod store;
pub mod tasks;

#[cfg(test)]
mod testing;

pub use detector::{DetectOutcome, GrantDetector};
pub use dispatch::NotifyTarget;
pub use engine::{DelegationScheduler, TickOutcome};
pub use merge::{Interval, Phase, consolidate};
pub use notify::{Notification, NotifyPriority, NotifyRouter};
pub use poll::{PollLoop, run_poll_loop};
pub use settings::{Settings, SettingsStore};
pub use store::TaskStore;
pub use tasks::{DelegationTask, TaskState};
