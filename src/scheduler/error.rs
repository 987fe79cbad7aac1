//! Error types for the scheduler module

use chrono::NaiveDate;
use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Coarse classification used to decide how a failure propagates.
///
/// Per-slot kinds ([`ErrorKind::ResolutionGap`], [`ErrorKind::EmptyPattern`])
/// are converted into avails plus a diagnostic; everything else aborts the
/// compilation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid zone/pattern/grid configuration
    Configuration,
    /// No eligible content for a slot
    ResolutionGap,
    /// Pattern without programs
    EmptyPattern,
    /// Idempotency guard on `(channel_id, date)`
    AlreadyCompiled,
    /// Zone cannot be realised on a DST transition day
    DstConflict,
    /// Manual override collides with another slot
    OverlapConflict,
    /// Optimistic lock failure or missing row
    Concurrency,
    /// Run cancelled or deadline exceeded
    Cancelled,
    /// Persistence and serialization failures
    Storage,
}

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// Offset cannot be placed on the channel grid
    InvalidGridAlignment { offset_minutes: i64, reason: String },

    /// Zone definition is structurally invalid
    ZoneValidation { zone_id: String, reason: String },

    /// Two zones with the same plan priority overlap
    ZoneConflict {
        first: String,
        second: String,
        priority: i32,
    },

    /// Zone duration changes on a DST transition day and policy is `reject`
    DstConflict {
        zone_id: String,
        declared_minutes: i64,
        actual_minutes: i64,
    },

    /// No eligible episode/asset for a program
    NoEligibleContent { program_id: String, reason: String },

    /// Pattern has no programs
    EmptyPattern { pattern_id: String },

    /// A ScheduleDay already exists for this channel and date
    AlreadyCompiled { channel_id: String, date: NaiveDate },

    /// Schedule not found
    ScheduleNotFound { key: String },

    /// Slot not found on a schedule day
    SlotNotFound { slot_id: String },

    /// Override collides with an adjacent slot
    OverlapConflict { slot_id: String, conflicting: String },

    /// Slot is read-only (carried in from the previous day)
    ReadOnlySlot { slot_id: String },

    /// Optimistic version check failed
    VersionConflict { expected: u32, actual: u32 },

    /// Compilation was cancelled or ran past its deadline
    Cancelled { reason: String },

    /// Invalid timezone or unresolvable local time
    InvalidTimezone { tz: String },

    /// Channel not found
    ChannelNotFound { channel_id: String },

    /// Plan not found
    PlanNotFound { plan_id: String },

    /// Generic configuration error
    Configuration { reason: String },

    /// Serialization/deserialization error
    SerializationError { reason: String },

    /// IO error
    IoError { operation: String, reason: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGridAlignment {
                offset_minutes,
                reason,
            } => {
                write!(
                    f,
                    "Invalid grid alignment at offset {}m: {}",
                    offset_minutes, reason
                )
            }
            Self::ZoneValidation { zone_id, reason } => {
                write!(f, "Zone '{}' is invalid: {}", zone_id, reason)
            }
            Self::ZoneConflict {
                first,
                second,
                priority,
            } => {
                write!(
                    f,
                    "Zones '{}' and '{}' overlap at equal priority {}",
                    first, second, priority
                )
            }
            Self::DstConflict {
                zone_id,
                declared_minutes,
                actual_minutes,
            } => {
                write!(
                    f,
                    "Zone '{}' declares {} minutes but spans {} minutes on this DST transition day",
                    zone_id, declared_minutes, actual_minutes
                )
            }
            Self::NoEligibleContent { program_id, reason } => {
                write!(f, "No eligible content for program '{}': {}", program_id, reason)
            }
            Self::EmptyPattern { pattern_id } => {
                write!(f, "Pattern '{}' has no programs", pattern_id)
            }
            Self::AlreadyCompiled { channel_id, date } => {
                write!(
                    f,
                    "Schedule day for channel '{}' on {} is already compiled",
                    channel_id, date
                )
            }
            Self::ScheduleNotFound { key } => {
                write!(f, "Schedule not found: {}", key)
            }
            Self::SlotNotFound { slot_id } => {
                write!(f, "Slot not found: {}", slot_id)
            }
            Self::OverlapConflict {
                slot_id,
                conflicting,
            } => {
                write!(f, "Slot '{}' overlaps slot '{}'", slot_id, conflicting)
            }
            Self::ReadOnlySlot { slot_id } => {
                write!(f, "Slot '{}' is carried in and cannot be modified", slot_id)
            }
            Self::VersionConflict { expected, actual } => {
                write!(
                    f,
                    "Version conflict: expected {}, found {}",
                    expected, actual
                )
            }
            Self::Cancelled { reason } => {
                write!(f, "Compilation cancelled: {}", reason)
            }
            Self::InvalidTimezone { tz } => {
                write!(f, "Invalid timezone: {}", tz)
            }
            Self::ChannelNotFound { channel_id } => {
                write!(f, "Channel not found: {}", channel_id)
            }
            Self::PlanNotFound { plan_id } => {
                write!(f, "Plan not found: {}", plan_id)
            }
            Self::Configuration { reason } => {
                write!(f, "Configuration error: {}", reason)
            }
            Self::SerializationError { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
            Self::IoError { operation, reason } => {
                write!(f, "IO error during '{}': {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl SchedulerError {
    /// Create a grid alignment error
    pub fn grid(offset_minutes: i64, reason: impl Into<String>) -> Self {
        Self::InvalidGridAlignment {
            offset_minutes,
            reason: reason.into(),
        }
    }

    /// Create a zone validation error
    pub fn zone(zone_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ZoneValidation {
            zone_id: zone_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a no-eligible-content error
    pub fn no_content(program_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoEligibleContent {
            program_id: program_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a generic configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a schedule not found error
    pub fn schedule_not_found(key: impl Into<String>) -> Self {
        Self::ScheduleNotFound { key: key.into() }
    }

    /// Create a slot not found error
    pub fn slot_not_found(slot_id: impl ToString) -> Self {
        Self::SlotNotFound {
            slot_id: slot_id.to_string(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create an IO error with context
    pub fn io_error(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IoError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Map this error onto the failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidGridAlignment { .. }
            | Self::ZoneValidation { .. }
            | Self::ZoneConflict { .. }
            | Self::InvalidTimezone { .. }
            | Self::ChannelNotFound { .. }
            | Self::PlanNotFound { .. }
            | Self::Configuration { .. } => ErrorKind::Configuration,
            Self::NoEligibleContent { .. } => ErrorKind::ResolutionGap,
            Self::EmptyPattern { .. } => ErrorKind::EmptyPattern,
            Self::AlreadyCompiled { .. } => ErrorKind::AlreadyCompiled,
            Self::DstConflict { .. } => ErrorKind::DstConflict,
            Self::OverlapConflict { .. } | Self::ReadOnlySlot { .. } => {
                ErrorKind::OverlapConflict
            }
            Self::ScheduleNotFound { .. }
            | Self::SlotNotFound { .. }
            | Self::VersionConflict { .. } => ErrorKind::Concurrency,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::SerializationError { .. } | Self::IoError { .. } => ErrorKind::Storage,
        }
    }

    /// Per-slot failures become avails instead of aborting the run
    pub fn is_slot_local(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ResolutionGap | ErrorKind::EmptyPattern
        )
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::Cancelled { .. } | Self::IoError { .. }
        )
    }
}
