//! Core data structures for channel programming
//!
//! Channels own the time grid. Plans, zones, patterns and programs describe
//! what should air and are authored by operators. Assets, series and virtual
//! assets form the catalog that programs resolve against. None of these types
//! carry placement information; that is produced by the compiler.

use chrono::{Datelike, NaiveDate, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::scheduler::error::{SchedulerError, SchedulerResult};

/// Minutes in a nominal broadcast day
pub const MINUTES_PER_DAY: u32 = 1440;

// ============================================================================
// Schedule Time
// ============================================================================

/// Local time-of-day label in minutes, `00:00` through `24:00` inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScheduleTime(u16);

impl ScheduleTime {
    /// Midnight
    pub const MIDNIGHT: Self = Self(0);
    /// End of day (`24:00`)
    pub const END_OF_DAY: Self = Self(MINUTES_PER_DAY as u16);

    /// Create from minutes since midnight
    pub fn from_minutes(minutes: u32) -> SchedulerResult<Self> {
        if minutes > MINUTES_PER_DAY {
            return Err(SchedulerError::configuration(format!(
                "schedule time {} minutes is past 24:00",
                minutes
            )));
        }
        Ok(Self(minutes as u16))
    }

    /// Create from hour and minute, saturating at `24:00`
    pub fn hm(hour: u32, minute: u32) -> Self {
        Self((hour * 60 + minute).min(MINUTES_PER_DAY) as u16)
    }

    /// Minutes since midnight
    pub fn minutes(&self) -> u32 {
        u32::from(self.0)
    }

    /// Hour component (24 for `24:00`)
    pub fn hour(&self) -> u32 {
        self.minutes() / 60
    }

    /// Minute-of-hour component
    pub fn minute(&self) -> u32 {
        self.minutes() % 60
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ScheduleTime {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchedulerError::configuration(format!("invalid time '{}', expected HH:MM", s));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        if minute >= 60 || hour > 24 || (hour == 24 && minute != 0) {
            return Err(invalid());
        }
        Ok(Self((hour * 60 + minute) as u16))
    }
}

impl Serialize for ScheduleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ScheduleTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Channel
// ============================================================================

/// A broadcast channel and its grid policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Grid block size (15, 30 or 60)
    pub grid_block_minutes: u32,

    /// Minutes within an hour at which content may start
    pub block_start_offsets_minutes: Vec<u32>,

    /// Local time-of-day at which the broadcast day begins
    pub programming_day_start: ScheduleTime,

    /// IANA timezone
    pub timezone: Tz,
}

impl Channel {
    /// Create a channel on a 30 minute grid starting its day at 06:00
    pub fn new(id: impl Into<String>, timezone: Tz) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            grid_block_minutes: 30,
            block_start_offsets_minutes: vec![0, 30],
            programming_day_start: ScheduleTime::hm(6, 0),
            timezone,
        }
    }

    /// Set grid block size and allowed start offsets
    pub fn with_grid(mut self, block_minutes: u32, offsets: Vec<u32>) -> Self {
        self.grid_block_minutes = block_minutes;
        self.block_start_offsets_minutes = offsets;
        self
    }

    /// Set the programming day start
    pub fn with_day_start(mut self, start: ScheduleTime) -> Self {
        self.programming_day_start = start;
        self
    }

    /// Check whether a minute-of-hour is an allowed start offset
    pub fn is_block_start(&self, minute_of_hour: u32) -> bool {
        self.block_start_offsets_minutes.contains(&minute_of_hour)
    }

    /// Validate grid invariants
    pub fn validate(&self) -> SchedulerResult<()> {
        if !matches!(self.grid_block_minutes, 15 | 30 | 60) {
            return Err(SchedulerError::configuration(format!(
                "channel '{}': grid_block_minutes must be 15, 30 or 60, got {}",
                self.id, self.grid_block_minutes
            )));
        }
        if self.block_start_offsets_minutes.is_empty() {
            return Err(SchedulerError::configuration(format!(
                "channel '{}': block_start_offsets_minutes is empty",
                self.id
            )));
        }
        let mut previous: Option<u32> = None;
        for &offset in &self.block_start_offsets_minutes {
            if offset >= 60 || offset % self.grid_block_minutes != 0 {
                return Err(SchedulerError::configuration(format!(
                    "channel '{}': offset {} is not a multiple of {} within the hour",
                    self.id, offset, self.grid_block_minutes
                )));
            }
            if previous.is_some_and(|p| p >= offset) {
                return Err(SchedulerError::configuration(format!(
                    "channel '{}': offsets must be sorted and unique",
                    self.id
                )));
            }
            previous = Some(offset);
        }
        if self.programming_day_start >= ScheduleTime::END_OF_DAY
            || !self.is_block_start(self.programming_day_start.minute())
        {
            return Err(SchedulerError::configuration(format!(
                "channel '{}': programming_day_start {} is not on a block start",
                self.id, self.programming_day_start
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Schedule Plan
// ============================================================================

/// Temporal validity predicate of a plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanValidity {
    /// Weekdays on which the plan applies (empty means every day)
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,

    /// First date the plan applies
    #[serde(default)]
    pub start_date: Option<NaiveDate>,

    /// Last date the plan applies (inclusive)
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl PlanValidity {
    /// Check whether the predicate matches a broadcast date
    pub fn matches(&self, date: NaiveDate) -> bool {
        within_range(date, self.start_date, self.end_date)
            && (self.days_of_week.is_empty() || self.days_of_week.contains(&date.weekday()))
    }
}

fn within_range(date: NaiveDate, from: Option<NaiveDate>, until: Option<NaiveDate>) -> bool {
    from.map_or(true, |f| date >= f) && until.map_or(true, |u| date <= u)
}

/// A reusable, timeless container of zones and patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePlan {
    /// Plan identifier
    pub id: String,

    /// Owning channel
    pub channel_id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Higher wins when zones overlap
    pub priority: i32,

    /// Archived plans are inactive
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// When the plan applies
    #[serde(default)]
    pub validity: PlanValidity,

    /// Zones owned by this plan
    #[serde(default)]
    pub zones: Vec<Zone>,

    /// Patterns owned by this plan
    #[serde(default)]
    pub patterns: Vec<Pattern>,
}

fn default_true() -> bool {
    true
}

impl SchedulePlan {
    /// Create an active, always-valid plan
    pub fn new(id: impl Into<String>, channel_id: impl Into<String>, priority: i32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            channel_id: channel_id.into(),
            priority,
            is_active: true,
            validity: PlanValidity::default(),
            zones: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Add a zone
    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zones.push(zone);
        self
    }

    /// Add a pattern
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Set the validity predicate
    pub fn with_validity(mut self, validity: PlanValidity) -> Self {
        self.validity = validity;
        self
    }

    /// Active and valid on the date
    pub fn matches(&self, date: NaiveDate) -> bool {
        self.is_active && self.validity.matches(date)
    }

    /// Find a pattern owned by this plan
    pub fn pattern(&self, pattern_id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == pattern_id)
    }

    /// Every program referenced by this plan's patterns
    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.patterns.iter().flat_map(|p| p.programs.iter())
    }
}

// ============================================================================
// Zone
// ============================================================================

/// What to do when a zone cannot keep its declared length on a DST day
///
/// The shrink and expand variants keep their configuration names, but they
/// absorb the whole wall-clock difference rather than a single grid block:
/// a one hour transition moves the zone end by four blocks on a 15 minute
/// grid. Both lengths are whole blocks on whole-hour timezones, so the
/// realised end stays on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Abort the compilation
    #[default]
    Reject,
    /// Realise the shorter of the declared and wall-clock lengths, by the full difference
    ShrinkOneBlock,
    /// Realise the longer of the declared and wall-clock lengths, by the full difference
    ExpandOneBlock,
}

/// Why a zone is not active on a date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneInactive {
    Disabled,
    OutsideEffectiveRange,
    DayFiltered,
}

/// A named time window referencing one pattern of the same plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Zone identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Window start (local label)
    pub start_time: ScheduleTime,

    /// Window end (local label); earlier than start wraps past 24:00
    pub end_time: ScheduleTime,

    /// Pattern expanded inside the window
    pub pattern_id: String,

    /// Weekdays on which the zone applies (empty means every day)
    #[serde(default)]
    pub day_filters: Vec<Weekday>,

    /// Disabled zones are skipped
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// First date the zone applies
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,

    /// Last date the zone applies (inclusive)
    #[serde(default)]
    pub effective_until: Option<NaiveDate>,

    /// DST transition handling
    #[serde(default)]
    pub dst_policy: DstPolicy,
}

impl Zone {
    /// Create an enabled zone with no filters
    pub fn new(
        id: impl Into<String>,
        start_time: ScheduleTime,
        end_time: ScheduleTime,
        pattern_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            start_time,
            end_time,
            pattern_id: pattern_id.into(),
            day_filters: Vec::new(),
            enabled: true,
            effective_from: None,
            effective_until: None,
            dst_policy: DstPolicy::default(),
        }
    }

    /// Set the DST policy
    pub fn with_dst_policy(mut self, policy: DstPolicy) -> Self {
        self.dst_policy = policy;
        self
    }

    /// Restrict to weekdays
    pub fn with_day_filters(mut self, days: Vec<Weekday>) -> Self {
        self.day_filters = days;
        self
    }

    /// Declared length from the labels; equal labels mean a full day
    pub fn declared_minutes(&self) -> u32 {
        let start = self.start_time.minutes();
        let end = self.end_time.minutes();
        if end > start {
            end - start
        } else {
            end + MINUTES_PER_DAY - start
        }
    }

    /// Whether the zone covers a whole broadcast day
    pub fn is_full_day(&self) -> bool {
        self.declared_minutes() >= MINUTES_PER_DAY
    }

    /// Evaluate activation fail-fast: enabled, effective range, day filter
    pub fn inactive_reason(&self, date: NaiveDate) -> Option<ZoneInactive> {
        if !self.enabled {
            return Some(ZoneInactive::Disabled);
        }
        if !within_range(date, self.effective_from, self.effective_until) {
            return Some(ZoneInactive::OutsideEffectiveRange);
        }
        if !self.day_filters.is_empty() && !self.day_filters.contains(&date.weekday()) {
            return Some(ZoneInactive::DayFiltered);
        }
        None
    }

    /// Active on the broadcast date
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.inactive_reason(date).is_none()
    }

    /// Nominal `[start, end)` in minutes after the day start, ignoring DST
    pub fn nominal_window(&self, day_start: ScheduleTime) -> (u32, u32) {
        let length = self.declared_minutes().min(MINUTES_PER_DAY);
        if self.is_full_day() {
            return (0, MINUTES_PER_DAY);
        }
        let start = (self.start_time.minutes() + MINUTES_PER_DAY - day_start.minutes())
            % MINUTES_PER_DAY;
        (start, start + length)
    }
}

// ============================================================================
// Pattern & Program
// ============================================================================

/// Ordered list of programs with no intrinsic duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Pattern identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Programs in airing order
    #[serde(default)]
    pub programs: Vec<Program>,
}

impl Pattern {
    /// Create a pattern
    pub fn new(id: impl Into<String>, programs: Vec<Program>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            programs,
        }
    }
}

/// How a program is resolved to content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Series,
    Asset,
    Rule,
    Random,
    VirtualPackage,
}

impl ContentType {
    /// Get type ID as string
    pub fn id(&self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Asset => "asset",
            Self::Rule => "rule",
            Self::Random => "random",
            Self::VirtualPackage => "virtual_package",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Strategy for picking one candidate out of many
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Next after the most recently aired
    #[default]
    Sequential,
    /// Seeded pseudo-random pick
    Random,
    /// Least recently aired, ties by id
    Lru,
    /// Next in the published syndication order
    Syndication,
}

/// Episode selection policy for series programs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpisodePolicy {
    #[default]
    Sequential,
    Random,
    Lru,
    /// Episodes tagged for the current calendar window, then `secondary`
    Seasonal {
        #[serde(default)]
        secondary: SelectionPolicy,
    },
    Syndication,
}

/// Catalog entry describing how to resolve content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Program identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Resolution strategy
    pub content_type: ContentType,

    /// Asset id, series id, rule JSON or virtual asset id
    #[serde(default)]
    pub content_ref: String,

    /// Episode policy for series
    #[serde(default)]
    pub episode_policy: Option<EpisodePolicy>,

    /// Explicit grid-block footprint
    #[serde(default)]
    pub slot_units: Option<u32>,

    /// Commercial break type
    #[serde(default, rename = "commType", alias = "comm_type")]
    pub comm_type: Option<String>,
}

impl Program {
    /// Create a program
    pub fn new(id: impl Into<String>, content_type: ContentType, content_ref: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            content_type,
            content_ref: content_ref.into(),
            episode_policy: None,
            slot_units: None,
            comm_type: None,
        }
    }

    /// Direct asset reference
    pub fn asset(id: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self::new(id, ContentType::Asset, asset_id)
    }

    /// Series reference with an episode policy
    pub fn series(id: impl Into<String>, series_id: impl Into<String>, policy: EpisodePolicy) -> Self {
        Self::new(id, ContentType::Series, series_id).with_episode_policy(policy)
    }

    /// Set the episode policy
    pub fn with_episode_policy(mut self, policy: EpisodePolicy) -> Self {
        self.episode_policy = Some(policy);
        self
    }

    /// Set slot units
    pub fn with_slot_units(mut self, units: u32) -> Self {
        self.slot_units = Some(units);
        self
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Month/day range, inclusive, may wrap past December 31
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarWindow {
    pub start_month: u32,
    pub start_day: u32,
    pub end_month: u32,
    pub end_day: u32,
}

impl CalendarWindow {
    /// Create a window
    pub fn new(start_month: u32, start_day: u32, end_month: u32, end_day: u32) -> Self {
        Self {
            start_month,
            start_day,
            end_month,
            end_day,
        }
    }

    /// Check whether the date falls inside the window
    pub fn contains(&self, date: NaiveDate) -> bool {
        let key = date.month() * 100 + date.day();
        let start = self.start_month * 100 + self.start_day;
        let end = self.end_month * 100 + self.end_day;
        if start <= end {
            key >= start && key <= end
        } else {
            key >= start || key <= end
        }
    }
}

/// A concrete playable asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset identifier
    pub id: String,

    /// Title
    #[serde(default)]
    pub title: String,

    /// Natural runtime
    pub duration_secs: u32,

    #[serde(default)]
    pub genre: Option<String>,

    #[serde(default)]
    pub rating: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Owning series for episodes
    #[serde(default)]
    pub series_id: Option<String>,

    #[serde(default)]
    pub season: Option<u32>,

    #[serde(default)]
    pub episode: Option<u32>,

    /// Seasonal airing windows
    #[serde(default)]
    pub calendar_windows: Vec<CalendarWindow>,
}

impl Asset {
    /// Create an asset with a runtime in minutes
    pub fn new(id: impl Into<String>, minutes: u32) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            duration_secs: minutes * 60,
            genre: None,
            rating: None,
            tags: Vec::new(),
            series_id: None,
            season: None,
            episode: None,
            calendar_windows: Vec::new(),
        }
    }

    /// Mark as an episode of a series
    pub fn episode_of(mut self, series_id: impl Into<String>, season: u32, episode: u32) -> Self {
        self.series_id = Some(series_id.into());
        self.season = Some(season);
        self.episode = Some(episode);
        self
    }

    /// Set the genre
    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add a seasonal window
    pub fn with_window(mut self, window: CalendarWindow) -> Self {
        self.calendar_windows.push(window);
        self
    }

    /// Runtime rounded up to whole minutes
    pub fn duration_minutes(&self) -> i64 {
        i64::from(self.duration_secs.div_ceil(60))
    }
}

/// A series with its episode ordering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Series identifier
    pub id: String,

    #[serde(default)]
    pub title: String,

    /// Published syndication rotation (episode ids); empty means episode order
    #[serde(default)]
    pub syndication_order: Vec<String>,
}

/// Catalog filter used by rule programs and rule-based virtual assets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleFilter {
    pub genre: Option<String>,
    /// All listed tags must be present
    pub tags: Vec<String>,
    /// Any of the listed ratings
    pub ratings: Vec<String>,
    pub min_duration_secs: Option<u32>,
    pub max_duration_secs: Option<u32>,
    pub series_id: Option<String>,
    /// How one match is picked
    pub rotation: SelectionPolicy,
}

impl RuleFilter {
    /// Parse filter JSON; an empty string is the unconstrained filter
    pub fn parse(json: &str) -> SchedulerResult<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
            .map_err(|e| SchedulerError::configuration(format!("invalid rule filter: {}", e)))
    }

    /// Canonical key for snapshot lookups
    pub fn key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Check whether an asset satisfies the filter
    pub fn matches(&self, asset: &Asset) -> bool {
        if let Some(ref genre) = self.genre {
            if !asset
                .genre
                .as_deref()
                .is_some_and(|g| g.eq_ignore_ascii_case(genre))
            {
                return false;
            }
        }
        if !self.tags.iter().all(|t| asset.tags.contains(t)) {
            return false;
        }
        if !self.ratings.is_empty()
            && !asset
                .rating
                .as_ref()
                .is_some_and(|r| self.ratings.contains(r))
        {
            return false;
        }
        if self.min_duration_secs.is_some_and(|min| asset.duration_secs < min) {
            return false;
        }
        if self.max_duration_secs.is_some_and(|max| asset.duration_secs > max) {
            return false;
        }
        if let Some(ref series) = self.series_id {
            if asset.series_id.as_ref() != Some(series) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Virtual Assets
// ============================================================================

/// One entry of a fixed virtual asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VirtualEntry {
    /// A concrete asset
    Asset { asset_id: String },
    /// Resolved at expansion time, e.g. "current episode"
    Dynamic { program: Program },
}

/// How a virtual asset expands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VirtualDefinition {
    /// Deterministic ordered list
    Fixed { entries: Vec<VirtualEntry> },
    /// Selection constraints evaluated at every expansion
    RuleBased {
        rule: RuleFilter,
        max_items: usize,
        #[serde(default)]
        max_total_secs: Option<u32>,
    },
}

/// A reusable container that always expands to concrete assets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualAsset {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub definition: VirtualDefinition,
}

impl VirtualAsset {
    /// Programs embedded as dynamic entries
    pub fn dynamic_programs(&self) -> Vec<&Program> {
        match &self.definition {
            VirtualDefinition::Fixed { entries } => entries
                .iter()
                .filter_map(|e| match e {
                    VirtualEntry::Dynamic { program } => Some(program),
                    VirtualEntry::Asset { .. } => None,
                })
                .collect(),
            VirtualDefinition::RuleBased { .. } => Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_time_parse() {
        assert_eq!("19:30".parse::<ScheduleTime>().unwrap().minutes(), 1170);
        assert_eq!("24:00".parse::<ScheduleTime>().unwrap(), ScheduleTime::END_OF_DAY);
        assert!("24:30".parse::<ScheduleTime>().is_err());
        assert!("7pm".parse::<ScheduleTime>().is_err());
        assert_eq!(ScheduleTime::hm(6, 0).to_string(), "06:00");
    }

    #[test]
    fn test_schedule_time_serde() {
        let t: ScheduleTime = serde_json::from_str("\"22:15\"").unwrap();
        assert_eq!(t, ScheduleTime::hm(22, 15));
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"22:15\"");
    }

    #[test]
    fn test_channel_validate() {
        let channel = Channel::new("ch", chrono_tz::UTC);
        assert!(channel.validate().is_ok());

        let bad_block = Channel::new("ch", chrono_tz::UTC).with_grid(20, vec![0, 20, 40]);
        assert!(bad_block.validate().is_err());

        let bad_offset = Channel::new("ch", chrono_tz::UTC).with_grid(30, vec![0, 15]);
        assert!(bad_offset.validate().is_err());

        let bad_start = Channel::new("ch", chrono_tz::UTC)
            .with_grid(60, vec![0])
            .with_day_start(ScheduleTime::hm(6, 30));
        assert!(bad_start.validate().is_err());
    }

    #[test]
    fn test_zone_declared_minutes() {
        let evening = Zone::new("z", ScheduleTime::hm(19, 0), ScheduleTime::hm(22, 0), "p");
        assert_eq!(evening.declared_minutes(), 180);

        let overnight = Zone::new("z", ScheduleTime::hm(22, 0), ScheduleTime::hm(2, 0), "p");
        assert_eq!(overnight.declared_minutes(), 240);

        let full = Zone::new("z", ScheduleTime::MIDNIGHT, ScheduleTime::END_OF_DAY, "p");
        assert!(full.is_full_day());
        assert_eq!(full.nominal_window(ScheduleTime::hm(6, 0)), (0, 1440));
    }

    #[test]
    fn test_zone_nominal_window() {
        let zone = Zone::new("z", ScheduleTime::hm(19, 0), ScheduleTime::hm(22, 0), "p");
        assert_eq!(zone.nominal_window(ScheduleTime::hm(6, 0)), (780, 960));

        let spill = Zone::new("z", ScheduleTime::hm(5, 0), ScheduleTime::hm(7, 0), "p");
        assert_eq!(spill.nominal_window(ScheduleTime::hm(6, 0)), (1380, 1500));
    }

    #[test]
    fn test_zone_activation_order() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(); // Monday
        let mut zone = Zone::new("z", ScheduleTime::hm(19, 0), ScheduleTime::hm(22, 0), "p")
            .with_day_filters(vec![Weekday::Tue]);
        assert_eq!(zone.inactive_reason(date), Some(ZoneInactive::DayFiltered));

        zone.effective_from = NaiveDate::from_ymd_opt(2024, 2, 1);
        assert_eq!(
            zone.inactive_reason(date),
            Some(ZoneInactive::OutsideEffectiveRange)
        );

        zone.enabled = false;
        assert_eq!(zone.inactive_reason(date), Some(ZoneInactive::Disabled));
    }

    #[test]
    fn test_plan_validity() {
        let validity = PlanValidity {
            days_of_week: vec![Weekday::Sat, Weekday::Sun],
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            end_date: None,
        };
        assert!(validity.matches(NaiveDate::from_ymd_opt(2024, 1, 13).unwrap()));
        assert!(!validity.matches(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
        assert!(!validity.matches(NaiveDate::from_ymd_opt(2023, 12, 30).unwrap()));
    }

    #[test]
    fn test_calendar_window_wraps_year() {
        let winter = CalendarWindow::new(12, 1, 2, 28);
        assert!(winter.contains(NaiveDate::from_ymd_opt(2024, 12, 24).unwrap()));
        assert!(winter.contains(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()));
        assert!(!winter.contains(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()));
    }

    #[test]
    fn test_rule_filter_matches() {
        let filter = RuleFilter::parse(r#"{"genre": "Comedy", "max_duration_secs": 1800}"#).unwrap();
        assert!(filter.matches(&Asset::new("a", 22).with_genre("comedy")));
        assert!(!filter.matches(&Asset::new("b", 45).with_genre("comedy")));
        assert!(!filter.matches(&Asset::new("c", 22).with_genre("drama")));
        assert!(RuleFilter::parse("{not json").is_err());
        assert_eq!(RuleFilter::parse("").unwrap(), RuleFilter::default());
    }

    #[test]
    fn test_episode_policy_serde() {
        let policy: EpisodePolicy =
            serde_json::from_str(r#"{"kind": "seasonal", "secondary": "lru"}"#).unwrap();
        assert_eq!(
            policy,
            EpisodePolicy::Seasonal {
                secondary: SelectionPolicy::Lru
            }
        );
    }

    #[test]
    fn test_program_comm_type_alias() {
        let program: Program = serde_json::from_str(
            r#"{"id": "p", "content_type": "asset", "content_ref": "a1", "commType": "local"}"#,
        )
        .unwrap();
        assert_eq!(program.comm_type.as_deref(), Some("local"));
    }
}
