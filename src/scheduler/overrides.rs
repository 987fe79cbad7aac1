//! Manual overrides of frozen schedule days
//!
//! Overrides edit an already compiled day in place of re-running resolution:
//! a slot's asset can be replaced, a slot can be inserted, or a slot can be
//! retimed. Every op in a request is applied before the overlap checks, so a
//! slot and its neighbour can be retimed together.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::error::{SchedulerError, SchedulerResult};
use super::grid::GridClock;
use super::schedule::{
    override_slot_id, Avail, AvailReason, Diagnostic, DiagnosticCode, ScheduleDay, ScheduleSlot,
};
use crate::models::Channel;

/// A single manual edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OverrideOp {
    /// Air a different asset in an existing frame
    ReplaceSlot {
        slot_id: Uuid,
        asset_ref: String,
        #[serde(default)]
        duration_secs: Option<u32>,
    },
    /// Add a new slot
    InsertSlot {
        asset_ref: String,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
        #[serde(default)]
        duration_secs: Option<u32>,
        #[serde(default)]
        zone_id: Option<String>,
    },
    /// Move or resize an existing slot
    RetimeSlot {
        slot_id: Uuid,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    },
}

/// A batch of edits against one version of a day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub day_id: Uuid,
    /// Version the operator read
    pub expected_version: u32,
    pub ops: Vec<OverrideOp>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
}

impl OverrideRequest {
    /// Create a request with a single op
    pub fn single(day: &ScheduleDay, op: OverrideOp) -> Self {
        Self {
            day_id: day.id,
            expected_version: day.version,
            ops: vec![op],
            reason: None,
            operator: None,
        }
    }

    /// Set the audit reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Applies overrides for one channel
pub struct OverrideApplier<'a> {
    channel: &'a Channel,
}

impl<'a> OverrideApplier<'a> {
    pub fn new(channel: &'a Channel) -> Self {
        Self { channel }
    }

    /// Apply one op, producing the next version of the day
    pub fn apply_override(&self, day: &ScheduleDay, op: OverrideOp) -> SchedulerResult<ScheduleDay> {
        self.apply_batch(day, &OverrideRequest::single(day, op))
    }

    /// Apply every op of a request, producing the next version of the day
    pub fn apply_batch(&self, day: &ScheduleDay, request: &OverrideRequest) -> SchedulerResult<ScheduleDay> {
        if request.day_id != day.id {
            return Err(SchedulerError::schedule_not_found(request.day_id.to_string()));
        }
        if request.expected_version != day.version {
            return Err(SchedulerError::VersionConflict {
                expected: request.expected_version,
                actual: day.version,
            });
        }

        let grid = GridClock::new(self.channel, day.date)?;
        let version = day.version + 1;
        let mut next = day.clone();

        for (index, op) in request.ops.iter().enumerate() {
            match op {
                OverrideOp::ReplaceSlot {
                    slot_id,
                    asset_ref,
                    duration_secs,
                } => {
                    let slot = editable_slot(&mut next, slot_id)?;
                    if slot.original_asset_ref.is_none() {
                        slot.original_asset_ref = Some(slot.asset_ref.clone());
                    }
                    slot.asset_ref = asset_ref.clone();
                    if let Some(secs) = duration_secs {
                        slot.duration_secs = *secs;
                    }
                    slot.is_manual_override = true;
                }
                OverrideOp::InsertSlot {
                    asset_ref,
                    start_utc,
                    end_utc,
                    duration_secs,
                    zone_id,
                } => {
                    check_frame(&grid, *start_utc, *end_utc)?;
                    let mut slot = ScheduleSlot::new(
                        override_slot_id(&day.id, version, index),
                        asset_ref.clone(),
                        *start_utc,
                        *end_utc,
                    );
                    slot.duration_secs = duration_secs
                        .unwrap_or_else(|| (*end_utc - *start_utc).num_seconds().max(0) as u32);
                    slot.zone_id = zone_id.clone();
                    slot.is_manual_override = true;
                    next.slots.push(slot);
                }
                OverrideOp::RetimeSlot {
                    slot_id,
                    start_utc,
                    end_utc,
                } => {
                    check_frame(&grid, *start_utc, *end_utc)?;
                    let slot = editable_slot(&mut next, slot_id)?;
                    slot.start_utc = *start_utc;
                    slot.end_utc = *end_utc;
                    slot.is_manual_override = true;
                }
            }
        }

        next.slots.sort_by_key(|s| (s.start_utc, s.end_utc));
        if let Some((a, b)) = next.find_overlap() {
            let (edited, other) = if b.is_manual_override && !a.is_manual_override {
                (b, a)
            } else {
                (a, b)
            };
            return Err(SchedulerError::OverlapConflict {
                slot_id: edited.id.to_string(),
                conflicting: other.id.to_string(),
            });
        }
        if let Some((edited, next_slot)) = content_overrun(&next) {
            return Err(SchedulerError::OverlapConflict {
                slot_id: edited.id.to_string(),
                conflicting: next_slot.id.to_string(),
            });
        }

        next.avails = recompute_avails(&next, &day.avails);
        next.is_manual_override = true;
        next.version = version;
        next.diagnostics.push(Diagnostic::info(
            DiagnosticCode::ManualOverride,
            format!(
                "v{}: {} op(s) by {}{}",
                version,
                request.ops.len(),
                request.operator.as_deref().unwrap_or("operator"),
                request
                    .reason
                    .as_deref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default()
            ),
        ));

        info!(
            day_id = %next.id,
            version = version,
            ops = request.ops.len(),
            "Applied manual override"
        );
        Ok(next)
    }
}

fn editable_slot<'d>(day: &'d mut ScheduleDay, slot_id: &Uuid) -> SchedulerResult<&'d mut ScheduleSlot> {
    let slot = day
        .slots
        .iter_mut()
        .find(|s| &s.id == slot_id)
        .ok_or_else(|| SchedulerError::slot_not_found(slot_id))?;
    if slot.carried_in {
        return Err(SchedulerError::ReadOnlySlot {
            slot_id: slot_id.to_string(),
        });
    }
    Ok(slot)
}

/// First edited slot whose content runs into the start of the slot after it
///
/// Slots must already be sorted by start.
fn content_overrun(day: &ScheduleDay) -> Option<(&ScheduleSlot, &ScheduleSlot)> {
    day.slots
        .windows(2)
        .find(|pair| {
            let content_end = pair[0].start_utc + Duration::seconds(i64::from(pair[0].duration_secs));
            pair[0].is_manual_override && content_end > pair[1].start_utc
        })
        .map(|pair| (&pair[0], &pair[1]))
}

fn check_frame(grid: &GridClock, start: DateTime<Utc>, end: DateTime<Utc>) -> SchedulerResult<()> {
    if end <= start {
        return Err(SchedulerError::configuration(format!(
            "slot end {} is not after start {}",
            end, start
        )));
    }
    if start < grid.anchor() {
        return Err(SchedulerError::grid(
            grid.utc_to_offset(start),
            "slot starts before the broadcast day",
        ));
    }
    for at in [start, end] {
        if !grid.is_on_grid_utc(at) {
            return Err(SchedulerError::grid(grid.utc_to_offset(at), "not a block start"));
        }
    }
    Ok(())
}

/// Gaps of the edited timeline, keeping the reasons of gaps that already existed
fn recompute_avails(day: &ScheduleDay, previous: &[Avail]) -> Vec<Avail> {
    let horizon = day
        .slots
        .iter()
        .map(|s| s.end_utc)
        .max()
        .map_or(day.day_end_utc, |end| end.max(day.day_end_utc));

    let mut gaps = Vec::new();
    let mut cursor = day.anchor_utc;
    for slot in &day.slots {
        if slot.start_utc > cursor {
            gaps.push((cursor, slot.start_utc));
        }
        cursor = cursor.max(slot.end_utc);
    }
    if cursor < horizon {
        gaps.push((cursor, horizon));
    }

    let mut avails = Vec::new();
    for (start, end) in gaps {
        let mut at = start;
        for old in previous.iter().filter(|a| a.start_utc < end && start < a.end_utc) {
            let from = old.start_utc.max(start);
            if from > at {
                avails.push(released(at, from));
            }
            avails.push(Avail {
                start_utc: from,
                end_utc: old.end_utc.min(end),
                zone_id: old.zone_id.clone(),
                reason: old.reason,
            });
            at = old.end_utc.min(end);
        }
        if at < end {
            avails.push(released(at, end));
        }
    }
    avails
}

fn released(start: DateTime<Utc>, end: DateTime<Utc>) -> Avail {
    Avail {
        start_utc: start,
        end_utc: end,
        zone_id: None,
        reason: AvailReason::Released,
    }
}
