//! Schedule Day compiler
//!
//! This module turns timeless, layered programming plans into a concrete,
//! frozen schedule for one channel on one broadcast date.
//!
//! # Overview
//!
//! A channel owns a time grid (block size, allowed start offsets, programming
//! day start, timezone). Plans own zones, zones reference patterns, patterns
//! list programs, and programs resolve to catalog assets. Compilation walks
//! that hierarchy once per `(channel, date)` and freezes the result as a
//! [`ScheduleDay`]: grid-aligned, non-overlapping slots plus the avails that
//! could not be filled.
//!
//! # Pipeline
//!
//! ```text
//!  PlanStore ──► PlanSelection ──► ZoneResolution ──► PatternExpansion ──► TimeProjection
//!                                   (ZoneResolver)    (PatternExpander,      (GridClock)
//!                                                      ProgramResolver)          │
//!                                                                                ▼
//!  ScheduleDayStore ◄── Freeze ◄── CarryReconciliation ◄─────────────────────────┘
//! ```
//!
//! Every phase is pure: the catalog and rotation history are captured into a
//! [`CatalogSnapshot`] up front, picks are seeded from `(date, channel, slot)`
//! and identifiers are UUID v5, so recompiling against an unchanged snapshot
//! reproduces the same day byte for byte.
//!
//! # Modules
//!
//! - [`grid`] - Broadcast-day clock, grid snapping and DST handling
//! - [`zones`] - Priority-layered zone timeline
//! - [`rotation`] - Seeded selection strategies and the rotation ledger
//! - [`snapshot`] - Catalog and rotation state frozen for one run
//! - [`program`] - Program to asset resolution, virtual package expansion
//! - [`pattern`] - Pattern expansion inside one effective zone interval
//! - [`compiler`] - The compilation state machine
//! - [`schedule`] - ScheduleDay aggregate, slots, avails and diagnostics
//! - [`overrides`] - Manual edits of frozen days
//! - [`validation`] - Authoring-time plan checks
//! - [`service`] - Compile, preview, override, validate and horizon entry points
//!
//! # Quick Start
//!
//! ```ignore
//! use gridcast::scheduler::SchedulingService;
//! use gridcast::storage::{MemoryLibrary, ScheduleDayStore};
//!
//! let library = Arc::new(MemoryLibrary::load_from_file("library.json").await?);
//! let service = SchedulingService::from_library(library, Arc::new(ScheduleDayStore::new()));
//!
//! let day = service.compile("ch1", date, false).await?;
//! println!("{}", day.summary());
//! ```

pub mod compiler;
pub mod error;
pub mod grid;
pub mod overrides;
pub mod pattern;
pub mod program;
pub mod rotation;
pub mod schedule;
pub mod service;
pub mod snapshot;
pub mod validation;
pub mod zones;

// Re-export main types
pub use compiler::{Compilation, CompilePhase, CompileRequest, ScheduleDayCompiler};
pub use error::{ErrorKind, SchedulerError, SchedulerResult};
pub use grid::{GridClock, SnapDirection, ZoneWindow};
pub use overrides::{OverrideApplier, OverrideOp, OverrideRequest};
pub use rotation::{selection_seed, AiringRecord, RotationLedger};
pub use schedule::{
    Avail, AvailReason, CarrySegment, Diagnostic, DiagnosticCode, ScheduleDay, ScheduleSlot,
    ScheduleSummary, Severity,
};
pub use service::{Collaborators, HorizonEntry, HorizonOutcome, SchedulingService};
pub use snapshot::CatalogSnapshot;
pub use validation::{validate_plan, IssueCode, IssueSeverity, ValidationIssue};
pub use zones::{ZoneResolver, ZoneSegment};
