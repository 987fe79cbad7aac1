//! Operational entry points
//!
//! `SchedulingService` wires the collaborator stores, the frozen-day store and
//! the compiler together. Compilation itself is CPU-bound and synchronous, so
//! it runs on the blocking pool; the only shared mutable state it touches is
//! the commit step, which freezes the day and writes rotation history under
//! one lock.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::compiler::{Compilation, CompileRequest, ScheduleDayCompiler};
use super::error::{SchedulerError, SchedulerResult};
use super::grid::GridClock;
use super::overrides::{OverrideApplier, OverrideRequest};
use super::schedule::{ScheduleDay, ScheduleSummary};
use super::snapshot::CatalogSnapshot;
use super::validation::{self, ValidationIssue};
use crate::clock::{CancelToken, ClockSource, RunControl, SystemClock};
use crate::metrics;
use crate::storage::{
    CatalogStore, ChannelStore, MemoryLibrary, PlanStore, RotationStateStore, ScheduleDayStore,
    VirtualAssetStore,
};

/// The read and write stores a service runs against
#[derive(Clone)]
pub struct Collaborators {
    pub channels: Arc<dyn ChannelStore>,
    pub plans: Arc<dyn PlanStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub rotation: Arc<dyn RotationStateStore>,
    pub virtuals: Arc<dyn VirtualAssetStore>,
}

impl Collaborators {
    /// Use one in-memory library for every role
    pub fn from_library(library: Arc<MemoryLibrary>) -> Self {
        Self {
            channels: library.clone(),
            plans: library.clone(),
            catalog: library.clone(),
            rotation: library.clone(),
            virtuals: library,
        }
    }
}

/// Result of one date in a horizon run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HorizonOutcome {
    Compiled { summary: ScheduleSummary },
    /// A frozen day already existed and `force` was off
    Skipped,
    Failed { error: String },
}

/// One `(channel, date)` of a horizon run
#[derive(Debug, Clone, Serialize)]
pub struct HorizonEntry {
    pub channel_id: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub outcome: HorizonOutcome,
}

/// Compile, preview, override and validate schedule days
#[derive(Clone)]
pub struct SchedulingService {
    stores: Collaborators,
    days: Arc<ScheduleDayStore>,
    clock: Arc<dyn ClockSource>,
    compiler: ScheduleDayCompiler,
    deadline: Option<Duration>,
    token: CancelToken,
    parallel_channels: bool,
    commit_lock: Arc<Mutex<()>>,
}

impl SchedulingService {
    /// Create a service over the given stores
    pub fn new(stores: Collaborators, days: Arc<ScheduleDayStore>) -> Self {
        Self {
            stores,
            days,
            clock: Arc::new(SystemClock),
            compiler: ScheduleDayCompiler::new(),
            deadline: None,
            token: CancelToken::new(),
            parallel_channels: true,
            commit_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create a service backed by one in-memory library
    pub fn from_library(library: Arc<MemoryLibrary>, days: Arc<ScheduleDayStore>) -> Self {
        Self::new(Collaborators::from_library(library), days)
    }

    /// Inject the clock used for `compiled_at` and deadlines
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Abort any single compilation running longer than `deadline`
    pub fn with_deadline(mut self, deadline: std::time::Duration) -> Self {
        self.deadline = Some(Duration::milliseconds(deadline.as_millis() as i64));
        self
    }

    /// Share a cancellation token with every run
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.token = token;
        self
    }

    /// Use a custom compiler (slot limit)
    pub fn with_compiler(mut self, compiler: ScheduleDayCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Compile horizon channels one after another instead of concurrently
    pub fn with_parallel_channels(mut self, parallel: bool) -> Self {
        self.parallel_channels = parallel;
        self
    }

    /// Frozen day store
    pub fn days(&self) -> &ScheduleDayStore {
        &self.days
    }

    // ========================================================================
    // Compile & preview
    // ========================================================================

    /// Compile and freeze a day, then commit its rotation writes
    ///
    /// Without `force`, an existing frozen day fails with `AlreadyCompiled`.
    pub async fn compile(&self, channel_id: &str, date: NaiveDate, force: bool) -> SchedulerResult<ScheduleDay> {
        let _timer = metrics::start_compile_timer("compile");

        if !force && self.days.contains(channel_id, date).await {
            metrics::record_compilation("compile", "already_compiled");
            return Err(SchedulerError::AlreadyCompiled {
                channel_id: channel_id.to_string(),
                date,
            });
        }

        let Compilation { day, airings } = self.run("compile", channel_id, date).await?;

        {
            let _guard = self.commit_lock.lock().await;
            let previous = self.days.get(channel_id, date).await;
            self.days.insert(day.clone(), force).await?;

            let (from, until) = airing_window(&day);
            if let Err(e) = self.stores.rotation.replace_window(from, until, &airings) {
                error!(channel_id = %channel_id, date = %date, error = %e, "Rotation commit failed");
                if let Err(restore_err) = self.days.restore(channel_id, date, previous).await {
                    error!(
                        channel_id = %channel_id,
                        date = %date,
                        error = %restore_err,
                        "Failed to roll back frozen schedule day"
                    );
                }
                metrics::record_compilation("compile", "rotation_failed");
                return Err(e);
            }
        }

        metrics::record_compilation("compile", "success");
        metrics::record_schedule_day(&day);
        info!(
            channel_id = %channel_id,
            date = %date,
            airings = airings.len(),
            "Committed schedule day: {}",
            day.summary()
        );
        Ok(day)
    }

    /// Compile without freezing or touching rotation history
    pub async fn preview(&self, channel_id: &str, date: NaiveDate) -> SchedulerResult<ScheduleDay> {
        let _timer = metrics::start_compile_timer("preview");
        let Compilation { day, airings } = self.run("preview", channel_id, date).await?;
        metrics::record_compilation("preview", "success");
        debug!(
            channel_id = %channel_id,
            date = %date,
            discarded_airings = airings.len(),
            "Preview compiled"
        );
        Ok(day)
    }

    async fn run(&self, mode: &'static str, channel_id: &str, date: NaiveDate) -> SchedulerResult<Compilation> {
        let prior_day = match date.pred_opt() {
            Some(previous) => self.days.get(channel_id, previous).await,
            None => None,
        };

        let this = self.clone();
        let owned_id = channel_id.to_string();
        let result = tokio::task::spawn_blocking(move || this.compile_blocking(&owned_id, date, prior_day))
            .await
            .map_err(|e| SchedulerError::io_error("compile_task", e.to_string()))
            .and_then(|r| r);

        if let Err(ref e) = result {
            metrics::record_compilation(mode, &format!("{:?}", e.kind()).to_lowercase());
            warn!(channel_id = %channel_id, date = %date, error = %e, "Compilation failed");
        }
        result
    }

    fn compile_blocking(
        &self,
        channel_id: &str,
        date: NaiveDate,
        prior_day: Option<ScheduleDay>,
    ) -> SchedulerResult<Compilation> {
        let channel = self
            .stores
            .channels
            .channel(channel_id)?
            .ok_or_else(|| SchedulerError::ChannelNotFound {
                channel_id: channel_id.to_string(),
            })?;
        let plans = self.stores.plans.active_plans(channel_id, date)?;
        let anchor = GridClock::new(&channel, date)?.anchor();
        let snapshot = CatalogSnapshot::capture(
            &plans,
            self.stores.catalog.as_ref(),
            self.stores.virtuals.as_ref(),
            self.stores.rotation.as_ref(),
            anchor,
        )?;

        let request = CompileRequest {
            channel,
            date,
            plans,
            prior_day,
            snapshot,
            compiled_at: self.clock.now_utc(),
        };
        self.compiler.compile(&request, &self.run_control())
    }

    fn run_control(&self) -> RunControl {
        let control = RunControl::new(self.clock.clone()).with_token(self.token.clone());
        match self.deadline {
            Some(budget) => control.with_budget(budget),
            None => control,
        }
    }

    // ========================================================================
    // Overrides, validation, lookup
    // ========================================================================

    /// Apply an override batch to a frozen day
    pub async fn override_day(&self, request: &OverrideRequest) -> SchedulerResult<ScheduleDay> {
        let day = self
            .days
            .get_by_id(&request.day_id)
            .await
            .ok_or_else(|| SchedulerError::schedule_not_found(request.day_id.to_string()))?;
        let channel = self
            .stores
            .channels
            .channel(&day.channel_id)?
            .ok_or_else(|| SchedulerError::ChannelNotFound {
                channel_id: day.channel_id.clone(),
            })?;

        let _guard = self.commit_lock.lock().await;
        let result = match OverrideApplier::new(&channel).apply_batch(&day, request) {
            Ok(next) => self
                .days
                .commit_override(next.clone(), request.expected_version)
                .await
                .map(|_| next),
            Err(e) => Err(e),
        };

        match result {
            Ok(next) => {
                metrics::record_override("applied");
                info!(day_id = %next.id, version = next.version, "Override committed");
                Ok(next)
            }
            Err(e) => {
                metrics::record_override("rejected");
                warn!(day_id = %request.day_id, error = %e, "Override rejected");
                Err(e)
            }
        }
    }

    /// Validate a stored plan against its channel and sibling plans
    pub fn validate_plan(&self, plan_id: &str) -> SchedulerResult<Vec<ValidationIssue>> {
        let plan = self
            .stores
            .plans
            .plan(plan_id)?
            .ok_or_else(|| SchedulerError::PlanNotFound {
                plan_id: plan_id.to_string(),
            })?;
        let channel = self
            .stores
            .channels
            .channel(&plan.channel_id)?
            .ok_or_else(|| SchedulerError::ChannelNotFound {
                channel_id: plan.channel_id.clone(),
            })?;
        let siblings = self.stores.plans.plans_for_channel(&plan.channel_id)?;

        let issues = validation::validate_plan(&plan, &channel, &siblings, self.stores.virtuals.as_ref());
        debug!(plan_id = %plan_id, issues = issues.len(), "Validated plan");
        Ok(issues)
    }

    /// Frozen day for a channel and date
    pub async fn schedule_day(&self, channel_id: &str, date: NaiveDate) -> SchedulerResult<ScheduleDay> {
        self.days
            .get(channel_id, date)
            .await
            .ok_or_else(|| SchedulerError::schedule_not_found(format!("{}/{}", channel_id, date)))
    }

    // ========================================================================
    // Horizon
    // ========================================================================

    /// Compile `days` consecutive dates for each channel
    ///
    /// Dates of one channel run in broadcast order so carry-in and rotation
    /// writes follow the air schedule. Channels run concurrently unless
    /// disabled.
    pub async fn compile_horizon(
        &self,
        channel_ids: &[String],
        start: NaiveDate,
        days: u32,
        force: bool,
    ) -> Vec<HorizonEntry> {
        info!(channels = channel_ids.len(), start = %start, days = days, "Compiling horizon");

        if self.parallel_channels {
            join_all(
                channel_ids
                    .iter()
                    .map(|id| self.compile_channel_horizon(id, start, days, force)),
            )
            .await
            .into_iter()
            .flatten()
            .collect()
        } else {
            let mut entries = Vec::new();
            for id in channel_ids {
                entries.extend(self.compile_channel_horizon(id, start, days, force).await);
            }
            entries
        }
    }

    async fn compile_channel_horizon(
        &self,
        channel_id: &str,
        start: NaiveDate,
        days: u32,
        force: bool,
    ) -> Vec<HorizonEntry> {
        let mut entries = Vec::with_capacity(days as usize);
        for date in start.iter_days().take(days as usize) {
            let outcome = match self.compile(channel_id, date, force).await {
                Ok(day) => HorizonOutcome::Compiled {
                    summary: day.summary(),
                },
                Err(SchedulerError::AlreadyCompiled { .. }) => HorizonOutcome::Skipped,
                Err(e) => HorizonOutcome::Failed { error: e.to_string() },
            };
            entries.push(HorizonEntry {
                channel_id: channel_id.to_string(),
                date,
                outcome,
            });
        }
        entries
    }
}

/// Air-time range whose rotation history a frozen day owns
///
/// Runs from the anchor to the later of the day end and the end of the
/// day's own last slot, so overnight spans and carry-out stay with the day.
fn airing_window(day: &ScheduleDay) -> (DateTime<Utc>, DateTime<Utc>) {
    let until = day
        .own_slots()
        .map(|s| s.end_utc)
        .max()
        .map_or(day.day_end_utc, |end| end.max(day.day_end_utc));
    (day.anchor_utc, until)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{Asset, Channel, Pattern, Program, SchedulePlan, ScheduleTime, Zone};
    use crate::storage::LibraryData;
    use chrono::{TimeZone, Utc};

    fn service() -> (SchedulingService, Arc<MemoryLibrary>) {
        let library = Arc::new(MemoryLibrary::new(LibraryData {
            channels: vec![Channel::new("ch1", chrono_tz::UTC)],
            plans: vec![SchedulePlan::new("prime", "ch1", 10)
                .with_pattern(Pattern::new(
                    "pat",
                    vec![Program::asset("a", "news"), Program::asset("b", "drama")],
                ))
                .with_zone(Zone::new(
                    "evening",
                    ScheduleTime::hm(19, 0),
                    ScheduleTime::hm(22, 0),
                    "pat",
                ))],
            assets: vec![Asset::new("news", 30), Asset::new("drama", 30)],
            ..Default::default()
        }));
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let service = SchedulingService::from_library(library.clone(), Arc::new(ScheduleDayStore::new()))
            .with_clock(clock);
        (service, library)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn test_compile_commits_rotation() {
        let (service, library) = service();
        let day = service.compile("ch1", date(), false).await.unwrap();
        assert_eq!(day.own_slots().count(), 6);
        assert_eq!(library.rotation_writes(), 1);
        assert!(library.last_aired("news").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_compile_twice_requires_force() {
        let (service, _) = service();
        service.compile("ch1", date(), false).await.unwrap();
        let again = service.compile("ch1", date(), false).await;
        assert!(matches!(again, Err(SchedulerError::AlreadyCompiled { .. })));
        assert!(service.compile("ch1", date(), true).await.is_ok());
    }

    #[tokio::test]
    async fn test_preview_never_writes() {
        let (service, library) = service();
        let day = service.preview("ch1", date()).await.unwrap();
        assert_eq!(day.own_slots().count(), 6);
        assert_eq!(library.rotation_writes(), 0);
        assert!(service.days().is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_channel_and_plan() {
        let (service, _) = service();
        assert!(matches!(
            service.preview("nope", date()).await,
            Err(SchedulerError::ChannelNotFound { .. })
        ));
        assert!(matches!(
            service.validate_plan("nope"),
            Err(SchedulerError::PlanNotFound { .. })
        ));
        assert!(service.validate_plan("prime").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_horizon_skips_frozen_days() {
        let (service, _) = service();
        service.compile("ch1", date(), false).await.unwrap();
        let entries = service
            .compile_horizon(&["ch1".to_string()], date(), 3, false)
            .await;
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[0].outcome, HorizonOutcome::Skipped));
        assert!(matches!(entries[1].outcome, HorizonOutcome::Compiled { .. }));
        assert_eq!(entries[2].date, NaiveDate::from_ymd_opt(2024, 1, 17).unwrap());
    }
}
