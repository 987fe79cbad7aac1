//! Compiled schedule day structures
//!
//! A [`ScheduleDay`] is the frozen output of one compilation for a
//! `(channel_id, date)` pair: ordered slots with wall-clock instants and
//! provenance, the avails between them, and the diagnostics gathered while
//! resolving. It is only ever replaced wholesale (force recompile) or
//! mutated through the override applier.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use super::error::{SchedulerError, SchedulerResult};

/// Namespace for deterministic schedule identifiers
const SCHEDULE_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_4c2e_9d3b_5e80_b7a4_2f61_c0d9_8e13);

/// Stable id of the schedule day for a channel and date
pub fn day_id(channel_id: &str, date: NaiveDate) -> Uuid {
    Uuid::new_v5(
        &SCHEDULE_NAMESPACE,
        format!("{}/{}", channel_id, date).as_bytes(),
    )
}

/// Stable id of a compiled slot
pub fn slot_id(day_id: &Uuid, position: usize) -> Uuid {
    Uuid::new_v5(day_id, format!("slot/{}", position).as_bytes())
}

/// Stable id of a slot inserted by an override
pub fn override_slot_id(day_id: &Uuid, version: u32, index: usize) -> Uuid {
    Uuid::new_v5(day_id, format!("override/{}/{}", version, index).as_bytes())
}

// ============================================================================
// Slot
// ============================================================================

/// One resolved asset placed on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    /// Slot identifier
    pub id: Uuid,

    /// Concrete asset to air
    pub asset_ref: String,

    /// Program the asset was resolved from
    #[serde(default)]
    pub program_id: Option<String>,

    /// Frame start (grid aligned)
    pub start_utc: DateTime<Utc>,

    /// Frame end (grid aligned)
    pub end_utc: DateTime<Utc>,

    /// Natural content runtime
    #[serde(default)]
    pub duration_secs: u32,

    /// Originating zone
    #[serde(default)]
    pub zone_id: Option<String>,

    /// Originating plan
    #[serde(default)]
    pub plan_id: Option<String>,

    /// Index of the program within its pattern
    #[serde(default)]
    pub pattern_position: Option<usize>,

    /// Index within an expanded virtual package
    #[serde(default)]
    pub package_index: Option<usize>,

    /// Commercial break type copied from the program
    #[serde(default)]
    pub comm_type: Option<String>,

    /// Tail of the previous broadcast day, read-only
    #[serde(default)]
    pub carried_in: bool,

    /// Touched by a manual override
    #[serde(default)]
    pub is_manual_override: bool,

    /// Asset before a manual replacement
    #[serde(default)]
    pub original_asset_ref: Option<String>,
}

impl ScheduleSlot {
    /// Create a slot with no provenance
    pub fn new(id: Uuid, asset_ref: impl Into<String>, start_utc: DateTime<Utc>, end_utc: DateTime<Utc>) -> Self {
        Self {
            id,
            asset_ref: asset_ref.into(),
            program_id: None,
            start_utc,
            end_utc,
            duration_secs: 0,
            zone_id: None,
            plan_id: None,
            pattern_position: None,
            package_index: None,
            comm_type: None,
            carried_in: false,
            is_manual_override: false,
            original_asset_ref: None,
        }
    }

    /// Frame length in minutes
    pub fn frame_minutes(&self) -> i64 {
        (self.end_utc - self.start_utc).num_minutes()
    }

    /// Check whether two half-open frames intersect
    pub fn overlaps(&self, other: &ScheduleSlot) -> bool {
        self.start_utc < other.end_utc && other.start_utc < self.end_utc
    }

    /// Check whether an instant lies inside the frame
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_utc <= at && at < self.end_utc
    }
}

// ============================================================================
// Avail & Diagnostics
// ============================================================================

/// Why a stretch of the timeline has no content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailReason {
    /// Pattern ran out before the zone ended
    ZoneUnderfill,
    /// Zone references a pattern with no programs
    EmptyPattern,
    /// Every program of the pattern failed to resolve
    ResolutionGap,
    /// No zone covers this time
    Uncovered,
    /// Content removed or moved by a manual override
    Released,
}

impl AvailReason {
    pub fn id(&self) -> &'static str {
        match self {
            Self::ZoneUnderfill => "zone_underfill",
            Self::EmptyPattern => "empty_pattern",
            Self::ResolutionGap => "resolution_gap",
            Self::Uncovered => "uncovered",
            Self::Released => "released",
        }
    }
}

/// Unfilled schedule time, left for filler or commercials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Avail {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    #[serde(default)]
    pub zone_id: Option<String>,
    pub reason: AvailReason,
}

impl Avail {
    /// Length in minutes
    pub fn minutes(&self) -> i64 {
        (self.end_utc - self.start_utc).num_minutes()
    }
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// Diagnostic category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    EmptyPattern,
    ResolutionGap,
    DstAdjusted,
    ZoneDeferred,
    CarryIn,
    CarryOut,
    SlotLimit,
    ManualOverride,
}

/// Non-fatal observation attached to a compiled day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
    pub message: String,
}

impl Diagnostic {
    /// Create a warning
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            zone_id: None,
            program_id: None,
            message: message.into(),
        }
    }

    /// Create an informational note
    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            ..Self::warning(code, message)
        }
    }

    /// Attach the zone
    pub fn in_zone(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }

    /// Attach the program
    pub fn for_program(mut self, program_id: impl Into<String>) -> Self {
        self.program_id = Some(program_id.into());
        self
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

/// A slot crossing the end of its broadcast day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrySegment {
    pub slot_id: Uuid,
    pub asset_ref: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    /// Minutes played past the boundary
    pub overrun_minutes: i64,
}

// ============================================================================
// Schedule Day
// ============================================================================

/// Frozen resolution of one channel on one broadcast date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDay {
    /// Day identifier
    pub id: Uuid,

    pub channel_id: String,

    /// Broadcast date
    pub date: NaiveDate,

    /// Broadcast day start instant
    pub anchor_utc: DateTime<Utc>,

    /// Next broadcast day start instant
    pub day_end_utc: DateTime<Utc>,

    /// Ordered, non-overlapping slots
    pub slots: Vec<ScheduleSlot>,

    /// Gaps between slots
    #[serde(default)]
    pub avails: Vec<Avail>,

    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,

    /// Plans that contributed zones
    #[serde(default)]
    pub plan_ids: Vec<String>,

    /// Set once any override was applied
    #[serde(default)]
    pub is_manual_override: bool,

    /// Optimistic lock counter
    pub version: u32,

    /// Instant reported by the injected clock at compile time
    pub compiled_at: DateTime<Utc>,
}

impl ScheduleDay {
    /// Broadcast day length in minutes
    pub fn day_minutes(&self) -> i64 {
        (self.day_end_utc - self.anchor_utc).num_minutes()
    }

    /// Find a slot by id
    pub fn slot(&self, slot_id: &Uuid) -> Option<&ScheduleSlot> {
        self.slots.iter().find(|s| &s.id == slot_id)
    }

    /// Slot airing at an instant
    pub fn slot_at(&self, at: DateTime<Utc>) -> Option<&ScheduleSlot> {
        self.slots.iter().find(|s| s.contains(at))
    }

    /// Slots resolved by this day (excluding carry-in)
    pub fn own_slots(&self) -> impl Iterator<Item = &ScheduleSlot> {
        self.slots.iter().filter(|s| !s.carried_in)
    }

    /// Slots produced by a zone
    pub fn slots_for_zone<'a>(&'a self, zone_id: &'a str) -> impl Iterator<Item = &'a ScheduleSlot> {
        self.slots
            .iter()
            .filter(move |s| s.zone_id.as_deref() == Some(zone_id))
    }

    /// Last own slot overrunning the next broadcast day, picked up as carry-in
    pub fn carry_out(&self) -> Option<CarrySegment> {
        self.own_slots()
            .filter(|s| s.end_utc > self.day_end_utc)
            .max_by_key(|s| s.end_utc)
            .map(|s| CarrySegment {
                slot_id: s.id,
                asset_ref: s.asset_ref.clone(),
                start_utc: s.start_utc,
                end_utc: s.end_utc,
                overrun_minutes: (s.end_utc - self.day_end_utc).num_minutes(),
            })
    }

    /// Slots reaching past an instant, used as the next day's carry-in
    pub fn slots_ending_after(&self, at: DateTime<Utc>) -> Vec<&ScheduleSlot> {
        self.slots.iter().filter(|s| s.end_utc > at).collect()
    }

    /// Warnings only
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }

    /// First pair of overlapping slots, if any
    pub fn find_overlap(&self) -> Option<(&ScheduleSlot, &ScheduleSlot)> {
        let mut ordered: Vec<&ScheduleSlot> = self.slots.iter().collect();
        ordered.sort_by_key(|s| (s.start_utc, s.end_utc));
        ordered
            .windows(2)
            .find(|pair| pair[0].overlaps(pair[1]))
            .map(|pair| (pair[0], pair[1]))
    }

    /// Operator summary
    pub fn summary(&self) -> ScheduleSummary {
        ScheduleSummary {
            channel_id: self.channel_id.clone(),
            date: self.date,
            slots: self.slots.len(),
            carried_in: self.slots.iter().filter(|s| s.carried_in).count(),
            avails: self.avails.len(),
            avail_minutes: self.avails.iter().map(Avail::minutes).sum(),
            warnings: self.warnings().count(),
            version: self.version,
            is_manual_override: self.is_manual_override,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> SchedulerResult<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> SchedulerResult<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }

    /// Save to file
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> SchedulerResult<()> {
        let json = self.to_json()?;
        tokio::fs::write(path.as_ref(), json)
            .await
            .map_err(|e| SchedulerError::io_error("save_schedule_day", e.to_string()))?;
        Ok(())
    }

    /// Load from file
    pub async fn load_from_file(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let json = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| SchedulerError::io_error("load_schedule_day", e.to_string()))?;
        Self::from_json(&json)
    }
}

/// Counts surfaced to operators alongside a compiled day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub channel_id: String,
    pub date: NaiveDate,
    pub slots: usize,
    pub carried_in: usize,
    pub avails: usize,
    pub avail_minutes: i64,
    pub warnings: usize,
    pub version: u32,
    pub is_manual_override: bool,
}

impl fmt::Display for ScheduleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} slots resolved, {} avails, {} warning{}",
            self.slots,
            self.avails,
            self.warnings,
            if self.warnings == 1 { "" } else { "s" }
        )
    }
}

impl ScheduleSummary {
    /// Multi-line operator report
    pub fn display(&self) -> String {
        let mut output = format!("Schedule Day {} / {}\n", self.channel_id, self.date);
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("{}\n", self));
        output.push_str(&format!("Carried in: {}\n", self.carried_in));
        output.push_str(&format!("Avail minutes: {}\n", self.avail_minutes));
        output.push_str(&format!("Version: {}", self.version));
        if self.is_manual_override {
            output.push_str(" (manual override)");
        }
        output.push('\n');
        output
    }
}

// ============================================================================
// Tests
// ============================================================================
