//! Broadcast-day time grid
//!
//! Schedule offsets are elapsed minutes from the broadcast-day anchor, the
//! instant at which `programming_day_start` occurs on the target date in the
//! channel's timezone. Elapsed minutes make the day 1380 or 1500 minutes long
//! across DST transitions, and every conversion between local labels and
//! offsets goes through the timezone database.
//!
//! Non-existent local times (spring-forward gap) resolve to the first instant
//! after the gap. Ambiguous local times (fall-back) resolve to the earliest
//! instant.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use tracing::debug;

use super::error::{SchedulerError, SchedulerResult};
use crate::models::{Channel, DstPolicy, ScheduleTime, Zone};

/// Longest gap skipped when resolving a non-existent local time
const MAX_GAP_MINUTES: i64 = 180;

/// Offsets beyond two broadcast days cannot be snapped
const MAX_OFFSET_MINUTES: i64 = 2 * 1500;

/// Snapping direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapDirection {
    /// Latest boundary at or before the offset
    Floor,
    /// Earliest boundary at or after the offset
    Ceil,
}

/// Resolved zone window on a specific broadcast day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneWindow {
    pub start: i64,
    pub end: i64,
    /// Length implied by the labels
    pub declared_minutes: i64,
    /// Elapsed length between the two local instants
    pub actual_minutes: i64,
}

impl ZoneWindow {
    /// Realised length differs from the declared one
    pub fn is_dst_adjusted(&self) -> bool {
        self.end - self.start != self.declared_minutes
    }
}

/// Resolve a local wall-clock time in a timezone
pub fn resolve_local(tz: &Tz, local: NaiveDateTime) -> SchedulerResult<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(a, b) => Ok(a.min(b).with_timezone(&Utc)),
        LocalResult::None => {
            for step in 1..=MAX_GAP_MINUTES {
                let candidate = local + Duration::minutes(step);
                if let Some(t) = tz.from_local_datetime(&candidate).earliest() {
                    debug!(local = %local, resolved = %candidate, "Local time falls in DST gap");
                    return Ok(t.with_timezone(&Utc));
                }
            }
            Err(SchedulerError::InvalidTimezone {
                tz: format!("{}: cannot resolve local time {}", tz.name(), local),
            })
        }
    }
}

/// Grid arithmetic for one channel on one broadcast date
#[derive(Debug, Clone)]
pub struct GridClock {
    tz: Tz,
    date: NaiveDate,
    day_start: ScheduleTime,
    block_minutes: i64,
    offsets: Vec<u32>,
    anchor: DateTime<Utc>,
    day_end: DateTime<Utc>,
}

impl GridClock {
    /// Build the grid for `date`, snapshotting the channel's grid policy
    pub fn new(channel: &Channel, date: NaiveDate) -> SchedulerResult<Self> {
        channel.validate()?;
        let tz = channel.timezone;
        let day_start = channel.programming_day_start;
        let next = date
            .succ_opt()
            .ok_or_else(|| SchedulerError::configuration(format!("date {} out of range", date)))?;

        let anchor = resolve_local(&tz, local_datetime(date, day_start))?;
        let day_end = resolve_local(&tz, local_datetime(next, day_start))?;

        Ok(Self {
            tz,
            date,
            day_start,
            block_minutes: i64::from(channel.grid_block_minutes),
            offsets: channel.block_start_offsets_minutes.clone(),
            anchor,
            day_end,
        })
    }

    /// Broadcast date
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Broadcast day start instant
    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    /// Next broadcast day start instant
    pub fn day_end(&self) -> DateTime<Utc> {
        self.day_end
    }

    /// Broadcast day length (1380, 1440 or 1500 on whole-hour DST zones)
    pub fn day_length(&self) -> i64 {
        (self.day_end - self.anchor).num_minutes()
    }

    /// Grid block size
    pub fn block_minutes(&self) -> i64 {
        self.block_minutes
    }

    /// Convert an offset to a UTC instant
    pub fn schedule_offset_to_utc(&self, offset_minutes: i64) -> DateTime<Utc> {
        self.anchor + Duration::minutes(offset_minutes)
    }

    /// Convert a UTC instant to an offset, flooring partial minutes
    pub fn utc_to_offset(&self, at: DateTime<Utc>) -> i64 {
        (at - self.anchor).num_seconds().div_euclid(60)
    }

    /// Channel-local wall clock at an offset
    pub fn local_time(&self, offset_minutes: i64) -> DateTime<Tz> {
        self.schedule_offset_to_utc(offset_minutes)
            .with_timezone(&self.tz)
    }

    /// Offset of a local label on this broadcast day
    ///
    /// Labels earlier than the day start belong to the next calendar date.
    /// `24:00` is midnight of the next calendar date.
    pub fn label_to_offset(&self, label: ScheduleTime) -> SchedulerResult<i64> {
        let at = resolve_local(&self.tz, self.label_datetime(label)?)?;
        Ok(self.utc_to_offset(at))
    }

    fn label_datetime(&self, label: ScheduleTime) -> SchedulerResult<NaiveDateTime> {
        let out_of_range =
            || SchedulerError::configuration(format!("date {} out of range", self.date));
        if label == ScheduleTime::END_OF_DAY {
            let next = self.date.succ_opt().ok_or_else(out_of_range)?;
            return Ok(local_datetime(next, ScheduleTime::MIDNIGHT));
        }
        let date = if label < self.day_start {
            self.date.succ_opt().ok_or_else(out_of_range)?
        } else {
            self.date
        };
        Ok(local_datetime(date, label))
    }

    /// Check whether an instant's local minute is an allowed start offset
    pub fn is_on_grid_utc(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.tz);
        local.second() == 0 && self.offsets.contains(&local.minute())
    }

    /// Check whether an offset is a grid boundary
    pub fn is_on_grid(&self, offset_minutes: i64) -> bool {
        self.is_on_grid_utc(self.schedule_offset_to_utc(offset_minutes))
    }

    /// Snap an offset to the nearest allowed start in the given direction
    pub fn snap_to_grid(&self, offset_minutes: i64, direction: SnapDirection) -> SchedulerResult<i64> {
        if !(-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&offset_minutes) {
            return Err(SchedulerError::grid(
                offset_minutes,
                "offset lies outside the broadcast horizon",
            ));
        }
        let minute = i64::from(self.local_time(offset_minutes).minute());
        let allowed = self.offsets.iter().map(|&o| i64::from(o));

        let delta = match direction {
            SnapDirection::Ceil => allowed
                .map(|o| if o >= minute { o - minute } else { o + 60 - minute })
                .min(),
            SnapDirection::Floor => allowed
                .map(|o| if o <= minute { o - minute } else { o - 60 - minute })
                .max(),
        }
        .ok_or_else(|| SchedulerError::grid(offset_minutes, "channel has no block offsets"))?;

        let snapped = offset_minutes + delta;
        if self.is_on_grid(snapped) {
            Ok(snapped)
        } else {
            Err(SchedulerError::grid(
                offset_minutes,
                format!("no valid boundary near local minute {}", minute),
            ))
        }
    }

    /// Whole blocks needed for a duration, rounding up
    pub fn duration_in_blocks(&self, minutes: i64) -> i64 {
        if minutes <= 0 {
            0
        } else {
            (minutes + self.block_minutes - 1) / self.block_minutes
        }
    }

    /// End of a slot frame starting at `start`
    ///
    /// The frame covers the larger of `slot_units` blocks and the natural
    /// runtime, and ends on the first boundary at or after that.
    pub fn frame_end(&self, start: i64, natural_minutes: i64, slot_units: Option<u32>) -> SchedulerResult<i64> {
        let blocks = self
            .duration_in_blocks(natural_minutes)
            .max(slot_units.map_or(0, i64::from))
            .max(1);
        self.snap_to_grid(start + blocks * self.block_minutes, SnapDirection::Ceil)
    }

    /// Resolve a zone's window on this day, applying its DST policy
    pub fn zone_window(&self, zone: &Zone) -> SchedulerResult<ZoneWindow> {
        let declared = i64::from(zone.declared_minutes());
        if zone.is_full_day() {
            let length = self.day_length();
            return Ok(ZoneWindow {
                start: 0,
                end: length,
                declared_minutes: declared,
                actual_minutes: length,
            });
        }

        let start_local = self.label_datetime(zone.start_time)?;
        let start_at = resolve_local(&self.tz, start_local)?;
        let end_at = resolve_local(&self.tz, start_local + Duration::minutes(declared))?;
        let start = self.utc_to_offset(start_at);
        let actual = (end_at - start_at).num_minutes();

        let realised = if actual == declared {
            declared
        } else {
            match zone.dst_policy {
                DstPolicy::Reject => {
                    return Err(SchedulerError::DstConflict {
                        zone_id: zone.id.clone(),
                        declared_minutes: declared,
                        actual_minutes: actual,
                    })
                }
                DstPolicy::ShrinkOneBlock => declared.min(actual),
                DstPolicy::ExpandOneBlock => declared.max(actual),
            }
        };

        Ok(ZoneWindow {
            start,
            end: start + realised,
            declared_minutes: declared,
            actual_minutes: actual,
        })
    }
}

fn local_datetime(date: NaiveDate, time: ScheduleTime) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(time.minutes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn utc_channel() -> Channel {
        Channel::new("ch", chrono_tz::UTC)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_regular_day() {
        let grid = GridClock::new(&utc_channel(), date(2024, 1, 15)).unwrap();
        assert_eq!(grid.day_length(), 1440);
        assert_eq!(
            grid.anchor(),
            Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap()
        );
        assert_eq!(grid.label_to_offset(ScheduleTime::hm(19, 0)).unwrap(), 780);
        assert_eq!(grid.label_to_offset(ScheduleTime::hm(2, 0)).unwrap(), 1200);
        assert_eq!(grid.label_to_offset(ScheduleTime::END_OF_DAY).unwrap(), 1080);
    }

    #[test]
    fn test_snap_to_grid() {
        let grid = GridClock::new(&utc_channel(), date(2024, 1, 15)).unwrap();
        assert_eq!(grid.snap_to_grid(95, SnapDirection::Floor).unwrap(), 90);
        assert_eq!(grid.snap_to_grid(95, SnapDirection::Ceil).unwrap(), 120);
        assert_eq!(grid.snap_to_grid(90, SnapDirection::Ceil).unwrap(), 90);
        assert!(grid.snap_to_grid(10_000, SnapDirection::Ceil).is_err());
    }

    #[test]
    fn test_snap_sparse_offsets() {
        let channel = utc_channel().with_grid(15, vec![0, 45]);
        let grid = GridClock::new(&channel, date(2024, 1, 15)).unwrap();
        assert_eq!(grid.snap_to_grid(20, SnapDirection::Ceil).unwrap(), 45);
        assert_eq!(grid.snap_to_grid(20, SnapDirection::Floor).unwrap(), 0);
        assert_eq!(grid.snap_to_grid(50, SnapDirection::Ceil).unwrap(), 60);
    }

    #[test]
    fn test_duration_in_blocks() {
        let grid = GridClock::new(&utc_channel(), date(2024, 1, 15)).unwrap();
        assert_eq!(grid.duration_in_blocks(0), 0);
        assert_eq!(grid.duration_in_blocks(22), 1);
        assert_eq!(grid.duration_in_blocks(30), 1);
        assert_eq!(grid.duration_in_blocks(31), 2);
    }

    #[test]
    fn test_frame_end() {
        let grid = GridClock::new(&utc_channel(), date(2024, 1, 15)).unwrap();
        assert_eq!(grid.frame_end(0, 22, None).unwrap(), 30);
        assert_eq!(grid.frame_end(0, 22, Some(2)).unwrap(), 60);
        assert_eq!(grid.frame_end(0, 150, Some(1)).unwrap(), 150);
        assert_eq!(grid.frame_end(0, 0, None).unwrap(), 30);
    }

    #[test]
    fn test_spring_forward_day() {
        // 06:00 on Mar 9 to 06:00 on Mar 10 contains the 02:00 jump
        let channel = Channel::new("ny", New_York);
        let grid = GridClock::new(&channel, date(2024, 3, 9)).unwrap();
        assert_eq!(grid.day_length(), 1380);
        let next = GridClock::new(&channel, date(2024, 3, 10)).unwrap();
        assert_eq!(next.day_length(), 1440);
    }

    #[test]
    fn test_fall_back_day() {
        let channel = Channel::new("ny", New_York);
        let grid = GridClock::new(&channel, date(2024, 11, 2)).unwrap();
        assert_eq!(grid.day_length(), 1500);
    }

    #[test]
    fn test_gap_resolves_forward() {
        let local = date(2024, 3, 10).and_hms_opt(2, 30, 0).unwrap();
        let resolved = resolve_local(&New_York, local).unwrap();
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_ambiguous_resolves_earliest() {
        let local = date(2024, 11, 3).and_hms_opt(1, 30, 0).unwrap();
        let resolved = resolve_local(&New_York, local).unwrap();
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap());
    }

    #[test]
    fn test_zone_window_dst_policies() {
        let channel = Channel::new("ny", New_York).with_day_start(ScheduleTime::hm(0, 0));
        let grid = GridClock::new(&channel, date(2024, 3, 10)).unwrap();
        let zone = Zone::new("night", ScheduleTime::hm(1, 0), ScheduleTime::hm(4, 0), "p");

        assert!(matches!(
            grid.zone_window(&zone),
            Err(SchedulerError::DstConflict {
                declared_minutes: 180,
                actual_minutes: 120,
                ..
            })
        ));

        let shrink = zone.clone().with_dst_policy(DstPolicy::ShrinkOneBlock);
        let window = grid.zone_window(&shrink).unwrap();
        assert_eq!((window.start, window.end), (60, 180));
        assert!(window.is_dst_adjusted());

        let expand = zone.with_dst_policy(DstPolicy::ExpandOneBlock);
        let window = grid.zone_window(&expand).unwrap();
        assert_eq!((window.start, window.end), (60, 240));
    }

    #[test]
    fn test_dst_policy_absorbs_whole_transition_on_fine_grid() {
        let channel = Channel::new("ny", New_York)
            .with_grid(15, vec![0, 15, 30, 45])
            .with_day_start(ScheduleTime::hm(0, 0));
        let zone = Zone::new("night", ScheduleTime::hm(1, 0), ScheduleTime::hm(4, 0), "p");

        let spring = GridClock::new(&channel, date(2024, 3, 10)).unwrap();
        let window = spring
            .zone_window(&zone.clone().with_dst_policy(DstPolicy::ShrinkOneBlock))
            .unwrap();
        assert_eq!(window.declared_minutes - (window.end - window.start), 4 * 15);
        assert!(spring.is_on_grid(window.end));

        let fall = GridClock::new(&channel, date(2024, 11, 3)).unwrap();
        let window = fall
            .zone_window(&zone.clone().with_dst_policy(DstPolicy::ExpandOneBlock))
            .unwrap();
        assert_eq!((window.start, window.end), (60, 300));
        assert!(fall.is_on_grid(window.end));

        let window = fall
            .zone_window(&zone.with_dst_policy(DstPolicy::ShrinkOneBlock))
            .unwrap();
        assert_eq!((window.start, window.end), (60, 240));
    }

    #[test]
    fn test_full_day_zone_window() {
        let channel = Channel::new("ny", New_York);
        let grid = GridClock::new(&channel, date(2024, 11, 2)).unwrap();
        let zone = Zone::new("all", ScheduleTime::MIDNIGHT, ScheduleTime::END_OF_DAY, "p");
        let window = grid.zone_window(&zone).unwrap();
        assert_eq!((window.start, window.end), (0, 1500));
    }
}
