//! SchedulingService tests: freezing, rotation commits, overrides, horizon

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::*;
use gridcast::clock::{CancelToken, FixedClock};
use gridcast::models::{EpisodePolicy, Program, SchedulePlan};
use gridcast::scheduler::{
    AiringRecord, Collaborators, HorizonOutcome, OverrideOp, OverrideRequest, ScheduleDay,
    SchedulerError, SchedulerResult, SchedulingService,
};
use gridcast::storage::{MemoryLibrary, RotationStateStore, ScheduleDayStore};

fn prime_plan() -> SchedulePlan {
    plan(
        "prime",
        10,
        zone("evening", hm(19, 0), hm(22, 0)),
        vec![Program::asset("A", "a"), Program::asset("B", "b")],
    )
}

fn movie_plan() -> SchedulePlan {
    plan(
        "late",
        10,
        zone("late", hm(5, 0), hm(6, 0)),
        vec![Program::asset("M", "movie")],
    )
}

fn series_plan(end: u32, end_minute: u32) -> SchedulePlan {
    plan(
        "prime",
        10,
        zone("evening", hm(19, 0), hm(end, end_minute)),
        vec![Program::series("S", "show", EpisodePolicy::Sequential)],
    )
}

fn asset_refs(day: &ScheduleDay) -> Vec<&str> {
    day.slots.iter().map(|s| s.asset_ref.as_str()).collect()
}

/// Rotation store that reads from a library but refuses every write
struct FailingRotation(Arc<MemoryLibrary>);

impl RotationStateStore for FailingRotation {
    fn last_aired(&self, content_id: &str) -> SchedulerResult<Option<DateTime<Utc>>> {
        self.0.last_aired(content_id)
    }

    fn last_aired_before(
        &self,
        content_id: &str,
        before: DateTime<Utc>,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        self.0.last_aired_before(content_id, before)
    }

    fn record_aired(&self, _content_id: &str, _aired_at: DateTime<Utc>) -> SchedulerResult<()> {
        Err(SchedulerError::io_error("rotation_commit", "store offline"))
    }

    fn replace_window(
        &self,
        _from: DateTime<Utc>,
        _until: DateTime<Utc>,
        _records: &[AiringRecord],
    ) -> SchedulerResult<()> {
        Err(SchedulerError::io_error("rotation_commit", "store offline"))
    }
}

fn failing_service(lib: Arc<MemoryLibrary>, days: Arc<ScheduleDayStore>) -> SchedulingService {
    let stores = Collaborators {
        channels: lib.clone(),
        plans: lib.clone(),
        catalog: lib.clone(),
        rotation: Arc::new(FailingRotation(lib.clone())),
        virtuals: lib,
    };
    SchedulingService::new(stores, days).with_clock(Arc::new(FixedClock::new(compiled_at())))
}

fn service_with(plans: Vec<SchedulePlan>, days: ScheduleDayStore) -> (SchedulingService, Arc<MemoryLibrary>) {
    let lib = library(utc_channel(), plans);
    let service = SchedulingService::from_library(lib.clone(), Arc::new(days))
        .with_clock(Arc::new(FixedClock::new(compiled_at())));
    (service, lib)
}

fn service(plans: Vec<SchedulePlan>) -> (SchedulingService, Arc<MemoryLibrary>) {
    service_with(plans, ScheduleDayStore::new())
}

#[tokio::test]
async fn test_compile_freezes_day_and_records_airings() {
    let (service, lib) = service(vec![prime_plan()]);

    let day = service.compile("ch1", date(), false).await.unwrap();
    assert_eq!(day.version, 1);
    assert_eq!(day.slots.len(), 6);

    let frozen = service.schedule_day("ch1", date()).await.unwrap();
    assert_eq!(frozen, day);
    assert_eq!(lib.rotation_writes(), 1);
    assert_eq!(lib.last_aired("a").unwrap(), Some(at(date(), 21, 0)));
    assert_eq!(lib.last_aired("b").unwrap(), Some(at(date(), 21, 30)));
}

#[tokio::test]
async fn test_recompile_needs_force_and_keeps_identity() {
    let (service, _) = service(vec![prime_plan()]);
    let first = service.compile("ch1", date(), false).await.unwrap();

    let err = service.compile("ch1", date(), false).await.unwrap_err();
    assert!(matches!(err, SchedulerError::AlreadyCompiled { .. }));

    let forced = service.compile("ch1", date(), true).await.unwrap();
    assert_eq!(forced.id, first.id);
    assert_eq!(forced.slots, first.slots);
}

#[tokio::test]
async fn test_preview_leaves_stores_untouched() {
    let (service, lib) = service(vec![prime_plan()]);

    let preview = service.preview("ch1", date()).await.unwrap();
    assert_eq!(preview.slots.len(), 6);
    assert_eq!(lib.rotation_writes(), 0);
    assert!(lib.last_aired("a").unwrap().is_none());
    assert!(matches!(
        service.schedule_day("ch1", date()).await,
        Err(SchedulerError::ScheduleNotFound { .. })
    ));

    let compiled = service.compile("ch1", date(), false).await.unwrap();
    assert_eq!(compiled.slots, preview.slots);
}

#[tokio::test]
async fn test_override_bumps_version_and_rejects_stale_writes() {
    let (service, _) = service(vec![prime_plan()]);
    let day = service.compile("ch1", date(), false).await.unwrap();
    let target = day.slots[0].id;

    let request = OverrideRequest::single(
        &day,
        OverrideOp::ReplaceSlot {
            slot_id: target,
            asset_ref: "x".to_string(),
            duration_secs: None,
        },
    )
    .with_reason("breaking news");
    let edited = service.override_day(&request).await.unwrap();

    assert_eq!(edited.version, 2);
    assert!(edited.is_manual_override);
    let slot = edited.slot(&target).unwrap();
    assert_eq!(slot.asset_ref, "x");
    assert!(slot.is_manual_override);
    assert_eq!(service.schedule_day("ch1", date()).await.unwrap(), edited);

    // Same request again carries the version it read: 1
    let stale = service.override_day(&request).await.unwrap_err();
    assert!(matches!(
        stale,
        SchedulerError::VersionConflict {
            expected: 1,
            actual: 2
        }
    ));
}

#[tokio::test]
async fn test_override_overlap_is_rejected_without_commit() {
    let (service, _) = service(vec![prime_plan()]);
    let day = service.compile("ch1", date(), false).await.unwrap();

    let request = OverrideRequest::single(
        &day,
        OverrideOp::InsertSlot {
            asset_ref: "x".to_string(),
            start_utc: at(date(), 19, 30),
            end_utc: at(date(), 20, 0),
            duration_secs: None,
            zone_id: None,
        },
    );
    let err = service.override_day(&request).await.unwrap_err();
    assert!(matches!(err, SchedulerError::OverlapConflict { .. }));
    assert_eq!(service.schedule_day("ch1", date()).await.unwrap().version, 1);
}

#[tokio::test]
async fn test_horizon_carries_overrun_into_next_day() {
    let (service, _) = service(vec![movie_plan()]);

    let entries = service
        .compile_horizon(&["ch1".to_string()], date(), 2, false)
        .await;
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .all(|e| matches!(e.outcome, HorizonOutcome::Compiled { .. })));

    let next = date() + Duration::days(1);
    let second = service.schedule_day("ch1", next).await.unwrap();
    let carried = &second.slots[0];
    assert!(carried.carried_in);
    assert_eq!(carried.asset_ref, "movie");
    assert_eq!(carried.start_utc, second.anchor_utc);
    assert_eq!(carried.end_utc, at(next, 7, 30));
}

#[tokio::test]
async fn test_horizon_reports_failures_per_date() {
    let (service, _) = service(vec![prime_plan()]);
    let entries = service
        .compile_horizon(&["ch1".to_string(), "missing".to_string()], date(), 2, false)
        .await;

    assert_eq!(entries.len(), 4);
    let failed: Vec<_> = entries
        .iter()
        .filter(|e| matches!(e.outcome, HorizonOutcome::Failed { .. }))
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|e| e.channel_id == "missing"));
}

#[tokio::test]
async fn test_cancelled_run_writes_nothing() {
    let token = CancelToken::new();
    let (service, lib) = service(vec![prime_plan()]);
    let service = service.with_cancel_token(token.clone());
    token.cancel();

    let err = service.compile("ch1", date(), false).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Cancelled { .. }));
    assert_eq!(lib.rotation_writes(), 0);
    assert!(service.days().is_empty().await);
}

#[tokio::test]
async fn test_frozen_days_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _) = service_with(vec![prime_plan()], ScheduleDayStore::with_dir(dir.path()));
    let day = service.compile("ch1", date(), false).await.unwrap();

    let reopened = ScheduleDayStore::with_dir(dir.path());
    assert_eq!(reopened.load().await.unwrap(), 1);
    assert_eq!(reopened.get("ch1", date()).await.unwrap(), day);
    assert_eq!(reopened.get_by_id(&day.id).await.unwrap().version, 1);
}

#[tokio::test]
async fn test_forced_recompile_of_series_is_stable() {
    let (service, lib) = service(vec![series_plan(20, 30)]);

    let first = service.compile("ch1", date(), false).await.unwrap();
    assert_eq!(asset_refs(&first), vec!["ep1", "ep2", "ep3"]);

    let forced = service.compile("ch1", date(), true).await.unwrap();
    assert_eq!(forced.slots, first.slots);
    assert_eq!(lib.last_aired("ep1").unwrap(), Some(at(date(), 19, 0)));
}

#[tokio::test]
async fn test_out_of_order_compile_matches_in_order() {
    let next: NaiveDate = date() + Duration::days(1);

    let (in_order, _) = service(vec![series_plan(20, 0)]);
    let day = in_order.compile("ch1", date(), false).await.unwrap();
    let following = in_order.compile("ch1", next, false).await.unwrap();
    assert_eq!(asset_refs(&day), vec!["ep1", "ep2"]);
    assert_eq!(asset_refs(&following), vec!["ep3", "ep1"]);

    let (reversed, lib) = service(vec![series_plan(20, 0)]);
    let early = reversed.compile("ch1", next, false).await.unwrap();
    assert_eq!(asset_refs(&early), vec!["ep1", "ep2"]);

    // Airings of a later day never leak into an earlier one
    let day_again = reversed.compile("ch1", date(), false).await.unwrap();
    assert_eq!(day_again.slots, day.slots);

    let following_again = reversed.compile("ch1", next, true).await.unwrap();
    assert_eq!(following_again.slots, following.slots);
    assert_eq!(lib.last_aired("ep2").unwrap(), Some(at(date(), 19, 30)));
}

#[tokio::test]
async fn test_failed_rotation_commit_leaves_no_frozen_day() {
    let lib = library(utc_channel(), vec![prime_plan()]);
    let days = Arc::new(ScheduleDayStore::new());
    let service = failing_service(lib.clone(), days.clone());

    let err = service.compile("ch1", date(), false).await.unwrap_err();
    assert!(matches!(err, SchedulerError::IoError { .. }));
    assert!(!service.days().contains("ch1", date()).await);
    assert_eq!(lib.rotation_writes(), 0);

    // A forced recompile that fails keeps the day that was frozen before it
    let healthy = SchedulingService::from_library(lib.clone(), days.clone())
        .with_clock(Arc::new(FixedClock::new(compiled_at())));
    let frozen = healthy.compile("ch1", date(), false).await.unwrap();
    let err = service.compile("ch1", date(), true).await.unwrap_err();
    assert!(matches!(err, SchedulerError::IoError { .. }));
    assert_eq!(days.get("ch1", date()).await.unwrap(), frozen);
}
