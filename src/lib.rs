//! gridcast - Broadcast schedule day compiler
//!
//! Compiles layered channel programming plans into frozen, grid-aligned
//! schedule days ready for playout and EPG generation.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Channels, plans, zones, patterns, programs and catalog types
//! - [`scheduler`] - The compiler, overrides, validation and service entry points
//! - [`storage`] - Collaborator store traits, in-memory library, frozen day store
//! - [`clock`] - Injected clock, cancellation and deadlines
//! - [`metrics`] - Prometheus metrics
//! - [`error`] - Unified error type
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gridcast::scheduler::SchedulingService;
//! use gridcast::storage::{MemoryLibrary, ScheduleDayStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let library = Arc::new(MemoryLibrary::load_from_file("data/library.json").await?);
//!     let days = Arc::new(ScheduleDayStore::with_dir("data/schedules"));
//!     let service = SchedulingService::from_library(library, days);
//!     let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//!     let day = service.preview("ch1", date).await?;
//!     println!("{}", day.summary());
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{CancelToken, ClockSource, FixedClock, RunControl, SystemClock};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, GridcastErrorTrait, Result};
    pub use crate::models::{
        Asset, Channel, ContentType, EpisodePolicy, Pattern, Program, SchedulePlan, ScheduleTime,
        Series, VirtualAsset, Zone,
    };
    pub use crate::scheduler::{
        OverrideOp, OverrideRequest, ScheduleDay, ScheduleDayCompiler, ScheduleSlot,
        SchedulerError, SchedulerResult, SchedulingService,
    };
    pub use crate::storage::{MemoryLibrary, ScheduleDayStore};
}

// Direct re-exports for convenience
pub use models::{Channel, SchedulePlan, Zone};
pub use scheduler::{ScheduleDay, SchedulingService};
