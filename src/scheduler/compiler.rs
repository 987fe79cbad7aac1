//! Schedule day compilation
//!
//! One run walks a fixed sequence of phases:
//!
//! ```text
//! PlanSelection -> ZoneResolution -> PatternExpansionAndResolution
//!     -> TimeProjection -> CarryReconciliation -> Freeze
//! ```
//!
//! The run is synchronous and reads only its [`CompileRequest`]. Structural
//! failures abort it with no partial output; per-slot failures become avails
//! plus diagnostics on the resulting [`ScheduleDay`].

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

use super::error::{SchedulerError, SchedulerResult};
use super::grid::GridClock;
use super::pattern::{DayCursor, ExpansionState, PatternExpander, ProvisionalSlot};
use super::rotation::{AiringRecord, RotationLedger};
use super::schedule::{
    day_id, slot_id, Avail, AvailReason, Diagnostic, DiagnosticCode, ScheduleDay, ScheduleSlot,
};
use super::snapshot::CatalogSnapshot;
use super::zones::{ZoneCandidate, ZoneResolver};
use crate::clock::RunControl;
use crate::models::{Channel, SchedulePlan};

/// Default guard against pathological patterns
pub const DEFAULT_MAX_SLOTS_PER_DAY: usize = 2000;

/// Compilation state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilePhase {
    PlanSelection,
    ZoneResolution,
    PatternExpansionAndResolution,
    TimeProjection,
    CarryReconciliation,
    Freeze,
}

impl fmt::Display for CompilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PlanSelection => "plan_selection",
            Self::ZoneResolution => "zone_resolution",
            Self::PatternExpansionAndResolution => "pattern_expansion",
            Self::TimeProjection => "time_projection",
            Self::CarryReconciliation => "carry_reconciliation",
            Self::Freeze => "freeze",
        };
        write!(f, "{}", name)
    }
}

/// Immutable inputs of one compilation
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Channel configuration at the start of the run
    pub channel: Channel,
    pub date: NaiveDate,
    /// Candidate plans; inactive or non-matching plans are ignored
    pub plans: Vec<SchedulePlan>,
    /// Frozen day for `date - 1`, source of carry-in
    pub prior_day: Option<ScheduleDay>,
    pub snapshot: CatalogSnapshot,
    /// Instant from the injected clock
    pub compiled_at: DateTime<Utc>,
}

/// Output of a successful run
#[derive(Debug, Clone)]
pub struct Compilation {
    pub day: ScheduleDay,
    /// Airings to commit to rotation history, in broadcast order
    pub airings: Vec<AiringRecord>,
}

/// An interval that should be reported as avail where no slot covers it
struct GapSpan {
    start: i64,
    end: i64,
    zone_id: Option<String>,
    reason: AvailReason,
}

/// Compiles schedule days
#[derive(Debug, Clone)]
pub struct ScheduleDayCompiler {
    max_slots_per_day: usize,
}

impl Default for ScheduleDayCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleDayCompiler {
    pub fn new() -> Self {
        Self {
            max_slots_per_day: DEFAULT_MAX_SLOTS_PER_DAY,
        }
    }

    /// Set the per-day slot limit
    pub fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots_per_day = max_slots.max(1);
        self
    }

    /// Compile one channel and date
    pub fn compile(&self, request: &CompileRequest, control: &RunControl) -> SchedulerResult<Compilation> {
        let channel = &request.channel;
        let date = request.date;
        let grid = GridClock::new(channel, date)?;
        let mut diagnostics = Vec::new();

        // PlanSelection
        enter(CompilePhase::PlanSelection, channel, date);
        let mut plans: Vec<&SchedulePlan> = request
            .plans
            .iter()
            .filter(|p| p.channel_id == channel.id && p.matches(date))
            .collect();
        plans.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        if plans.is_empty() {
            info!(channel_id = %channel.id, date = %date, "No plans match, day will be all avail");
        }

        // ZoneResolution
        enter(CompilePhase::ZoneResolution, channel, date);
        let candidates = self.zone_candidates(&plans, &grid, &mut diagnostics)?;
        let segments = ZoneResolver::new().resolve(&candidates, grid.day_length())?;
        debug!(segments = segments.len(), "Resolved zone timeline");

        // Carry-in is read before expansion so the first zone can soft-start
        let carried = carry_in(request.prior_day.as_ref(), &grid);
        let mut cursor = DayCursor {
            busy_until: carried
                .iter()
                .map(|s| grid.utc_to_offset(s.end_utc))
                .max()
                .unwrap_or(0)
                .max(0),
            ..Default::default()
        };

        // PatternExpansionAndResolution
        enter(CompilePhase::PatternExpansionAndResolution, channel, date);
        let expander = PatternExpander::new(&grid, &request.snapshot, &channel.id, control)
            .with_max_slots(self.max_slots_per_day);
        let mut ledger = RotationLedger::new(request.snapshot.history_before(grid.anchor()));
        let mut states: HashMap<(String, String), ExpansionState> = HashMap::new();
        let mut provisional: Vec<ProvisionalSlot> = Vec::new();
        let mut gaps: Vec<GapSpan> = Vec::new();
        let mut contributing: BTreeSet<String> = BTreeSet::new();

        for segment in &segments {
            control.check()?;
            let Some(ref zone) = segment.zone else {
                gaps.push(GapSpan {
                    start: segment.start,
                    end: segment.end,
                    zone_id: None,
                    reason: AvailReason::Uncovered,
                });
                continue;
            };

            let pattern = plans
                .iter()
                .find(|p| p.id == zone.plan_id)
                .and_then(|p| p.pattern(&zone.pattern_id))
                .ok_or_else(|| SchedulerError::zone(&zone.zone_id, "pattern vanished during compilation"))?;
            contributing.insert(zone.plan_id.clone());

            let state = states
                .entry((zone.plan_id.clone(), zone.zone_id.clone()))
                .or_default();
            let outcome = expander.expand(
                zone,
                segment.start,
                segment.end,
                pattern,
                state,
                &mut cursor,
                &mut ledger,
            )?;

            gaps.push(GapSpan {
                start: segment.start,
                end: segment.end,
                zone_id: Some(zone.zone_id.clone()),
                reason: outcome.gap_reason,
            });
            diagnostics.extend(outcome.diagnostics);
            provisional.extend(outcome.slots);
        }

        // TimeProjection
        enter(CompilePhase::TimeProjection, channel, date);
        let id = day_id(&channel.id, date);
        let projected: Vec<ScheduleSlot> = provisional
            .into_iter()
            .map(|p| project(&grid, p))
            .collect();

        // CarryReconciliation
        enter(CompilePhase::CarryReconciliation, channel, date);
        if !carried.is_empty() {
            diagnostics.push(Diagnostic::info(
                DiagnosticCode::CarryIn,
                format!(
                    "{} slot(s) carried in from {}",
                    carried.len(),
                    request
                        .prior_day
                        .as_ref()
                        .map(|d| d.date.to_string())
                        .unwrap_or_default()
                ),
            ));
        }
        let mut slots = carried;
        let carry_count = slots.len();
        slots.extend(projected);
        for (position, slot) in slots.iter_mut().enumerate().skip(carry_count) {
            slot.id = slot_id(&id, position);
        }

        if let Some(last) = slots.iter().filter(|s| !s.carried_in).max_by_key(|s| s.end_utc) {
            if last.end_utc > grid.day_end() {
                let overrun = (last.end_utc - grid.day_end()).num_minutes();
                info!(asset_id = %last.asset_ref, overrun_minutes = overrun, "Slot carries out into the next day");
                diagnostics.push(Diagnostic::info(
                    DiagnosticCode::CarryOut,
                    format!("'{}' runs {} minutes into the next broadcast day", last.asset_ref, overrun),
                ));
            }
        }

        let avails = compute_avails(&grid, &gaps, &slots);

        // Freeze
        enter(CompilePhase::Freeze, channel, date);
        let day = ScheduleDay {
            id,
            channel_id: channel.id.clone(),
            date,
            anchor_utc: grid.anchor(),
            day_end_utc: grid.day_end(),
            slots,
            avails,
            diagnostics,
            plan_ids: contributing.into_iter().collect(),
            is_manual_override: false,
            version: 1,
            compiled_at: request.compiled_at,
        };

        if let Some((a, b)) = day.find_overlap() {
            return Err(SchedulerError::OverlapConflict {
                slot_id: a.id.to_string(),
                conflicting: b.id.to_string(),
            });
        }

        info!(
            channel_id = %day.channel_id,
            date = %day.date,
            summary = %day.summary(),
            "Compiled schedule day"
        );

        Ok(Compilation {
            day,
            airings: ledger.into_records(),
        })
    }

    /// Place every active zone of the selected plans on this day
    fn zone_candidates(
        &self,
        plans: &[&SchedulePlan],
        grid: &GridClock,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> SchedulerResult<Vec<ZoneCandidate>> {
        let mut candidates = Vec::new();

        for plan in plans {
            for zone in &plan.zones {
                if plan.pattern(&zone.pattern_id).is_none() {
                    return Err(SchedulerError::zone(
                        &zone.id,
                        format!("pattern '{}' does not belong to plan '{}'", zone.pattern_id, plan.id),
                    ));
                }
                if let Some(reason) = zone.inactive_reason(grid.date()) {
                    debug!(plan_id = %plan.id, zone_id = %zone.id, reason = ?reason, "Zone inactive");
                    continue;
                }

                let declared = i64::from(zone.declared_minutes());
                if declared % grid.block_minutes() != 0 {
                    return Err(SchedulerError::zone(
                        &zone.id,
                        format!("duration {} is not a multiple of the grid block", declared),
                    ));
                }

                let window = grid.zone_window(zone)?;
                if window.is_dst_adjusted() {
                    warn!(
                        zone_id = %zone.id,
                        declared = window.declared_minutes,
                        realised = window.end - window.start,
                        policy = ?zone.dst_policy,
                        "Zone length adjusted for DST"
                    );
                    diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticCode::DstAdjusted,
                            format!(
                                "declared {} minutes, realised {} under {:?}",
                                window.declared_minutes,
                                window.end - window.start,
                                zone.dst_policy
                            ),
                        )
                        .in_zone(&zone.id),
                    );
                }
                for offset in [window.start, window.end] {
                    if !grid.is_on_grid(offset) {
                        return Err(SchedulerError::grid(
                            offset,
                            format!("zone '{}' boundary is not a block start", zone.id),
                        ));
                    }
                }

                candidates.push(ZoneCandidate {
                    plan_id: plan.id.clone(),
                    zone_id: zone.id.clone(),
                    pattern_id: zone.pattern_id.clone(),
                    priority: plan.priority,
                    start: window.start,
                    end: window.end,
                });
            }
        }

        Ok(candidates)
    }
}

fn enter(phase: CompilePhase, channel: &Channel, date: NaiveDate) {
    info!(channel_id = %channel.id, date = %date, phase = %phase, "Entering phase");
}

/// Prior-day slots still playing at this day's anchor, clipped to it
fn carry_in(prior: Option<&ScheduleDay>, grid: &GridClock) -> Vec<ScheduleSlot> {
    let Some(prior) = prior else {
        return Vec::new();
    };
    prior
        .slots_ending_after(grid.anchor())
        .into_iter()
        .map(|slot| {
            let mut carried = slot.clone();
            carried.start_utc = carried.start_utc.max(grid.anchor());
            carried.carried_in = true;
            carried
        })
        .collect()
}

fn project(grid: &GridClock, slot: ProvisionalSlot) -> ScheduleSlot {
    let mut projected = ScheduleSlot::new(
        uuid::Uuid::nil(),
        slot.asset.asset_id,
        grid.schedule_offset_to_utc(slot.start),
        grid.schedule_offset_to_utc(slot.end),
    );
    projected.program_id = Some(slot.program_id);
    projected.duration_secs = slot.asset.duration_secs;
    projected.zone_id = Some(slot.zone_id);
    projected.plan_id = Some(slot.plan_id);
    projected.pattern_position = Some(slot.pattern_position);
    projected.package_index = slot.asset.package_index;
    projected.comm_type = slot.comm_type;
    projected
}

/// Parts of each gap span not covered by a slot
fn compute_avails(grid: &GridClock, gaps: &[GapSpan], slots: &[ScheduleSlot]) -> Vec<Avail> {
    let mut occupied: Vec<(i64, i64)> = slots
        .iter()
        .map(|s| (grid.utc_to_offset(s.start_utc), grid.utc_to_offset(s.end_utc)))
        .collect();
    occupied.sort_unstable();

    let mut avails = Vec::new();
    for gap in gaps {
        let mut cursor = gap.start;
        for &(start, end) in &occupied {
            if end <= cursor || start >= gap.end {
                continue;
            }
            if start > cursor {
                avails.push(make_avail(grid, cursor, start, gap));
            }
            cursor = cursor.max(end);
            if cursor >= gap.end {
                break;
            }
        }
        if cursor < gap.end {
            avails.push(make_avail(grid, cursor, gap.end, gap));
        }
    }
    avails
}

fn make_avail(grid: &GridClock, start: i64, end: i64, gap: &GapSpan) -> Avail {
    Avail {
        start_utc: grid.schedule_offset_to_utc(start),
        end_utc: grid.schedule_offset_to_utc(end),
        zone_id: gap.zone_id.clone(),
        reason: gap.reason,
    }
}
