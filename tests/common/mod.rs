//! Common test utilities

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

use gridcast::clock::{FixedClock, RunControl};
use gridcast::models::{Asset, Channel, Pattern, Program, SchedulePlan, ScheduleTime, Zone};
use gridcast::scheduler::{
    CatalogSnapshot, Compilation, CompileRequest, GridClock, ScheduleDay, ScheduleDayCompiler,
    SchedulerResult,
};
use gridcast::storage::{LibraryData, MemoryLibrary};

/// Monday 2024-01-15
pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

/// Fixed compile instant
pub fn compiled_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// UTC channel on a 30 minute grid, day starting 06:00
pub fn utc_channel() -> Channel {
    Channel::new("ch1", chrono_tz::UTC)
}

/// UTC instant on `date` at `h:m`
pub fn at(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(h, m, 0).unwrap())
}

pub fn hm(h: u32, m: u32) -> ScheduleTime {
    ScheduleTime::hm(h, m)
}

/// Plan with one zone over one pattern
pub fn plan(id: &str, priority: i32, zone: Zone, programs: Vec<Program>) -> SchedulePlan {
    let pattern_id = zone.pattern_id.clone();
    SchedulePlan::new(id, "ch1", priority)
        .with_pattern(Pattern::new(pattern_id, programs))
        .with_zone(zone)
}

pub fn zone(id: &str, start: ScheduleTime, end: ScheduleTime) -> Zone {
    Zone::new(id, start, end, format!("{}-pattern", id))
}

/// The assets most scenarios draw from
pub fn catalog() -> Vec<Asset> {
    vec![
        Asset::new("a", 30),
        Asset::new("b", 30),
        Asset::new("x", 30),
        Asset::new("y", 60),
        Asset::new("y-long", 75),
        Asset::new("movie", 150),
        Asset::new("promo", 2).with_tag("promo"),
        Asset::new("ep1", 22).episode_of("show", 1, 1),
        Asset::new("ep2", 22).episode_of("show", 1, 2),
        Asset::new("ep3", 22).episode_of("show", 1, 3),
    ]
}

pub fn library(channel: Channel, plans: Vec<SchedulePlan>) -> Arc<MemoryLibrary> {
    Arc::new(MemoryLibrary::new(LibraryData {
        channels: vec![channel],
        plans,
        assets: catalog(),
        ..Default::default()
    }))
}

/// Compile straight through the compiler, bypassing the service
pub fn compile_with(
    channel: &Channel,
    date: NaiveDate,
    plans: Vec<SchedulePlan>,
    lib: &MemoryLibrary,
    prior_day: Option<ScheduleDay>,
) -> SchedulerResult<Compilation> {
    let anchor = GridClock::new(channel, date)?.anchor();
    let snapshot = CatalogSnapshot::capture(&plans, lib, lib, lib, anchor)?;
    let request = CompileRequest {
        channel: channel.clone(),
        date,
        plans,
        prior_day,
        snapshot,
        compiled_at: compiled_at(),
    };
    let control = RunControl::new(Arc::new(FixedClock::new(compiled_at())));
    ScheduleDayCompiler::new().compile(&request, &control)
}

/// Compile `plans` on the UTC channel for `date()`
pub fn compile(plans: Vec<SchedulePlan>) -> ScheduleDay {
    let lib = library(utc_channel(), plans.clone());
    compile_with(&utc_channel(), date(), plans, &lib, None)
        .unwrap()
        .day
}
