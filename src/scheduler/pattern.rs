//! Cyclic pattern expansion
//!
//! Expansion and resolution run as co-routines: the expander asks the
//! resolver for the next program's content, frames it on the grid, and only
//! then knows where the following program starts. Rotation history is
//! updated as each slot is placed so later picks in the same day see it.

use tracing::{debug, warn};

use super::error::SchedulerResult;
use super::grid::{GridClock, SnapDirection};
use super::program::{ProgramResolver, ResolveContext, ResolvedAsset};
use super::rotation::RotationLedger;
use super::schedule::{AvailReason, Diagnostic, DiagnosticCode};
use super::snapshot::CatalogSnapshot;
use super::zones::EffectiveZone;
use crate::clock::RunControl;
use crate::models::{Pattern, Program};

/// A placed slot before projection to wall-clock time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalSlot {
    pub asset: ResolvedAsset,
    pub program_id: String,
    pub comm_type: Option<String>,
    pub zone_id: String,
    pub plan_id: String,
    pub pattern_position: usize,
    /// Frame in schedule offsets
    pub start: i64,
    pub end: i64,
}

/// Pattern cursor of one zone, shared by all of its pieces
#[derive(Debug, Clone, Default)]
pub struct ExpansionState {
    /// Next program index (not reduced modulo the pattern length)
    pub position: usize,
    /// Empty-pattern warning already emitted
    pub warned_empty: bool,
}

/// Day-wide progress shared across zones
#[derive(Debug, Clone, Default)]
pub struct DayCursor {
    /// Offset until which content is already playing
    pub busy_until: i64,
    /// Resolution attempts so far, used to seed random picks
    pub attempts: usize,
    /// Slots placed so far
    pub placed: usize,
}

/// Result of expanding one effective zone interval
#[derive(Debug, Clone)]
pub struct SegmentOutcome {
    pub slots: Vec<ProvisionalSlot>,
    /// Reason attached to any unfilled remainder of the interval
    pub gap_reason: AvailReason,
    pub diagnostics: Vec<Diagnostic>,
}

/// Expands patterns across effective zone intervals
pub struct PatternExpander<'a> {
    grid: &'a GridClock,
    resolver: ProgramResolver,
    snapshot: &'a CatalogSnapshot,
    channel_id: &'a str,
    control: &'a RunControl,
    max_slots: usize,
}

impl<'a> PatternExpander<'a> {
    pub fn new(
        grid: &'a GridClock,
        snapshot: &'a CatalogSnapshot,
        channel_id: &'a str,
        control: &'a RunControl,
    ) -> Self {
        Self {
            grid,
            resolver: ProgramResolver::new(),
            snapshot,
            channel_id,
            control,
            max_slots: usize::MAX,
        }
    }

    /// Stop placing slots once the day holds this many
    pub fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots = max_slots;
        self
    }

    /// Fill `[start, end)` of a zone with its pattern
    ///
    /// The first slot soft-starts after `cursor.busy_until`. A program that
    /// does not fit the remaining time is placed only when it is the first
    /// slot of the interval; otherwise the remainder is left as an avail.
    #[allow(clippy::too_many_arguments)]
    pub fn expand(
        &self,
        zone: &EffectiveZone,
        start: i64,
        end: i64,
        pattern: &Pattern,
        state: &mut ExpansionState,
        cursor: &mut DayCursor,
        ledger: &mut RotationLedger,
    ) -> SchedulerResult<SegmentOutcome> {
        let mut outcome = SegmentOutcome {
            slots: Vec::new(),
            gap_reason: AvailReason::ZoneUnderfill,
            diagnostics: Vec::new(),
        };

        if pattern.programs.is_empty() {
            outcome.gap_reason = AvailReason::EmptyPattern;
            if !state.warned_empty {
                state.warned_empty = true;
                warn!(zone_id = %zone.zone_id, pattern_id = %pattern.id, "Pattern has no programs, zone left as avail");
                outcome.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticCode::EmptyPattern,
                        format!("pattern '{}' has no programs", pattern.id),
                    )
                    .in_zone(&zone.zone_id),
                );
            }
            return Ok(outcome);
        }

        let mut t = self
            .grid
            .snap_to_grid(start.max(cursor.busy_until), SnapDirection::Ceil)?;
        if t > start {
            debug!(zone_id = %zone.zone_id, deferred_to = t, "Zone soft-starts after in-flight content");
            outcome.diagnostics.push(
                Diagnostic::info(
                    DiagnosticCode::ZoneDeferred,
                    format!("first slot deferred by {} minutes", t - start),
                )
                .in_zone(&zone.zone_id),
            );
        }

        let length = pattern.programs.len();
        let mut consecutive_failures = 0;

        while t < end {
            self.control.check()?;
            if cursor.placed >= self.max_slots {
                warn!(zone_id = %zone.zone_id, limit = self.max_slots, "Slot limit reached");
                outcome.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticCode::SlotLimit,
                        format!("stopped after {} slots", self.max_slots),
                    )
                    .in_zone(&zone.zone_id),
                );
                break;
            }

            let pattern_position = state.position % length;
            let program = &pattern.programs[pattern_position];
            let ctx = ResolveContext {
                date: self.grid.date(),
                channel_id: self.channel_id,
                slot_index: cursor.attempts,
                snapshot: self.snapshot,
            };
            cursor.attempts += 1;

            let assets = match self.resolver.resolve_many(program, &ctx, ledger) {
                Ok(assets) => assets,
                Err(err) if err.is_slot_local() => {
                    warn!(zone_id = %zone.zone_id, program_id = %program.id, error = %err, "Program skipped");
                    outcome.diagnostics.push(
                        Diagnostic::warning(DiagnosticCode::ResolutionGap, err.to_string())
                            .in_zone(&zone.zone_id)
                            .for_program(&program.id),
                    );
                    state.position += 1;
                    consecutive_failures += 1;
                    if consecutive_failures >= length {
                        outcome.gap_reason = AvailReason::ResolutionGap;
                        break;
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };
            consecutive_failures = 0;

            let frames = self.frame(program, &assets, t)?;
            let package_end = frames.last().map_or(t, |(_, e)| *e);
            if package_end > end && !outcome.slots.is_empty() {
                debug!(zone_id = %zone.zone_id, program_id = %program.id, "Program does not fit, leaving remainder");
                break;
            }

            for (asset, (slot_start, slot_end)) in assets.into_iter().zip(frames) {
                let aired_at = self.grid.schedule_offset_to_utc(slot_start);
                ledger.record(&asset.asset_id, aired_at);
                if let Some(ref series_id) = asset.series_id {
                    ledger.record(series_id, aired_at);
                }
                debug!(
                    zone_id = %zone.zone_id,
                    program_id = %program.id,
                    asset_id = %asset.asset_id,
                    start = slot_start,
                    end = slot_end,
                    "Placed slot"
                );
                outcome.slots.push(ProvisionalSlot {
                    asset,
                    program_id: program.id.clone(),
                    comm_type: program.comm_type.clone(),
                    zone_id: zone.zone_id.clone(),
                    plan_id: zone.plan_id.clone(),
                    pattern_position,
                    start: slot_start,
                    end: slot_end,
                });
                cursor.placed += 1;
            }

            state.position += 1;
            t = package_end;
            cursor.busy_until = cursor.busy_until.max(package_end);
        }

        Ok(outcome)
    }

    /// Consecutive grid frames for a program's assets starting at `t`
    fn frame(&self, program: &Program, assets: &[ResolvedAsset], mut t: i64) -> SchedulerResult<Vec<(i64, i64)>> {
        let units = if assets.len() == 1 { program.slot_units } else { None };
        let mut frames = Vec::with_capacity(assets.len());
        for asset in assets {
            let end = self.grid.frame_end(t, asset.duration_minutes(), units)?;
            frames.push((t, end));
            t = end;
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asset, Channel, SchedulePlan};
    use crate::storage::{LibraryData, MemoryLibrary};
    use chrono::NaiveDate;

    struct Fixture {
        grid: GridClock,
        snapshot: CatalogSnapshot,
        control: RunControl,
    }

    fn fixture(pattern: &Pattern) -> Fixture {
        let lib = MemoryLibrary::new(LibraryData {
            assets: vec![
                Asset::new("a", 30),
                Asset::new("b", 30),
                Asset::new("short", 22),
                Asset::new("movie", 150),
            ],
            ..Default::default()
        });
        let plan = SchedulePlan::new("plan", "ch", 10).with_pattern(pattern.clone());
        let channel = Channel::new("ch", chrono_tz::UTC);
        let grid = GridClock::new(&channel, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()).unwrap();
        Fixture {
            snapshot: CatalogSnapshot::capture(&[plan], &lib, &lib, &lib, grid.anchor()).unwrap(),
            grid,
            control: RunControl::default(),
        }
    }

    fn zone() -> EffectiveZone {
        EffectiveZone {
            plan_id: "plan".to_string(),
            zone_id: "prime".to_string(),
            pattern_id: "pat".to_string(),
            priority: 10,
            piece: 0,
            nominal_start: 780,
            nominal_end: 960,
        }
    }

    fn run(pattern: &Pattern, start: i64, end: i64, busy_until: i64) -> SegmentOutcome {
        let fx = fixture(pattern);
        let expander = PatternExpander::new(&fx.grid, &fx.snapshot, "ch", &fx.control);
        let mut cursor = DayCursor {
            busy_until,
            ..Default::default()
        };
        expander
            .expand(
                &zone(),
                start,
                end,
                pattern,
                &mut ExpansionState::default(),
                &mut cursor,
                &mut RotationLedger::default(),
            )
            .unwrap()
    }

    #[test]
    fn test_alternating_pattern_fills_exactly() {
        let pattern = Pattern::new("pat", vec![Program::asset("A", "a"), Program::asset("B", "b")]);
        let outcome = run(&pattern, 780, 960, 0);

        let ids: Vec<_> = outcome.slots.iter().map(|s| s.program_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "A", "B", "A", "B"]);
        assert_eq!(outcome.slots.last().unwrap().end, 960);
    }

    #[test]
    fn test_longform_leaves_underfill() {
        let pattern = Pattern::new("pat", vec![Program::asset("M", "movie")]);
        let outcome = run(&pattern, 780, 960, 0);

        assert_eq!(outcome.slots.len(), 1);
        assert_eq!((outcome.slots[0].start, outcome.slots[0].end), (780, 930));
        assert_eq!(outcome.gap_reason, AvailReason::ZoneUnderfill);
    }

    #[test]
    fn test_longform_overfills_when_first() {
        let pattern = Pattern::new("pat", vec![Program::asset("M", "movie")]);
        let outcome = run(&pattern, 780, 840, 0);
        assert_eq!(outcome.slots.len(), 1);
        assert_eq!(outcome.slots[0].end, 930);
    }

    #[test]
    fn test_soft_start_after_busy() {
        let pattern = Pattern::new("pat", vec![Program::asset("A", "a")]);
        let outcome = run(&pattern, 780, 960, 825);
        assert_eq!(outcome.slots[0].start, 840);
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::ZoneDeferred));
    }

    #[test]
    fn test_empty_pattern() {
        let pattern = Pattern::new("pat", vec![]);
        let outcome = run(&pattern, 780, 960, 0);
        assert!(outcome.slots.is_empty());
        assert_eq!(outcome.gap_reason, AvailReason::EmptyPattern);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_all_programs_failing() {
        let pattern = Pattern::new(
            "pat",
            vec![Program::asset("X", "missing"), Program::asset("Y", "also-missing")],
        );
        let outcome = run(&pattern, 780, 960, 0);
        assert!(outcome.slots.is_empty());
        assert_eq!(outcome.gap_reason, AvailReason::ResolutionGap);
        assert_eq!(outcome.diagnostics.len(), 2);
    }

    #[test]
    fn test_failed_program_is_skipped() {
        let pattern = Pattern::new("pat", vec![Program::asset("X", "missing"), Program::asset("A", "a")]);
        let outcome = run(&pattern, 780, 840, 0);
        let ids: Vec<_> = outcome.slots.iter().map(|s| s.program_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "A"]);
    }

    #[test]
    fn test_slot_units_extend_frame() {
        let pattern = Pattern::new("pat", vec![Program::asset("S", "short").with_slot_units(2)]);
        let outcome = run(&pattern, 780, 900, 0);
        assert_eq!(outcome.slots.len(), 2);
        assert_eq!(outcome.slots[0].end - outcome.slots[0].start, 60);
    }
}
