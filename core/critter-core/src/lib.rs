//! # critter-core
//!
//! Lifecycle rules for a desktop pet fed by coding activity: commits keep it
//! alive and growing, neglect decays its health, and a commit brings a ghost
//! back as an egg.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime and no threads. The daemon owns the
//!   monitors and serializes every call into [`PetEngine`].
//! - **Not thread-safe**: Callers provide their own synchronization.
//! - **Derived state is never stored**: stage and mood are computed from
//!   health and evolution level on every read.
//! - **Untrusted input is sanitized, not rejected**: a corrupted save restores
//!   field by field rather than failing.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use critter_core::{ActivityLog, PetEngine, entry_for_feed};
//!
//! let mut engine = PetEngine::new();
//! let mut log = ActivityLog::new();
//! let outcome = engine.feed_from_commit("abc1234", "fix parser", now_ms);
//! log.append(entry_for_feed(&outcome, "fix parser", now_ms));
//! ```

pub mod activity_log;
pub mod decay;
pub mod engine;
pub mod error;
pub mod path_filter;
pub mod snapshot;
pub mod storage;
pub mod vitals;

pub use activity_log::{entry_for_feed, ActivityLog, NewLogEntry};
pub use decay::{decay, hours_since};
pub use engine::{ExperienceOutcome, FeedOutcome, HealthOutcome, PetEngine};
pub use error::{CritterError, Result};
pub use path_filter::{is_ignored, PathFilter};
pub use snapshot::LoadReport;
pub use storage::StorageConfig;
pub use vitals::{Mood, PetVitals, Stage};
