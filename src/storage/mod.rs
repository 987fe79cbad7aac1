//! Collaborator interfaces and their in-process implementations
//!
//! The compiler consumes channels, plans, catalog and rotation history
//! through the narrow traits below. Everything it needs is read once into a
//! snapshot before expansion starts, so implementations are free to back
//! these with a database; the crate ships a JSON-backed in-memory library and
//! a file-backed store for frozen schedule days.

pub mod memory;
pub mod schedule_store;

pub use memory::{LibraryData, MemoryLibrary};
pub use schedule_store::ScheduleDayStore;

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{Asset, Channel, RuleFilter, SchedulePlan, Series, VirtualAsset};
use crate::scheduler::error::SchedulerResult;
use crate::scheduler::rotation::AiringRecord;

/// Channel configuration lookup
pub trait ChannelStore: Send + Sync {
    fn channel(&self, channel_id: &str) -> SchedulerResult<Option<Channel>>;

    /// Every known channel id, sorted
    fn channel_ids(&self) -> SchedulerResult<Vec<String>>;
}

/// Schedule plan lookup
pub trait PlanStore: Send + Sync {
    /// Every plan owned by a channel, including archived ones
    fn plans_for_channel(&self, channel_id: &str) -> SchedulerResult<Vec<SchedulePlan>>;

    fn plan(&self, plan_id: &str) -> SchedulerResult<Option<SchedulePlan>>;

    /// Active plans whose validity predicate matches `date`, zones and patterns loaded
    fn active_plans(&self, channel_id: &str, date: NaiveDate) -> SchedulerResult<Vec<SchedulePlan>> {
        Ok(self
            .plans_for_channel(channel_id)?
            .into_iter()
            .filter(|plan| plan.matches(date))
            .collect())
    }
}

/// Asset and series catalog
pub trait CatalogStore: Send + Sync {
    fn lookup_asset(&self, asset_id: &str) -> SchedulerResult<Option<Asset>>;

    fn lookup_series(&self, series_id: &str) -> SchedulerResult<Option<Series>>;

    /// Episodes of a series in catalog order (season, episode, id)
    fn query_series_episodes(&self, series_id: &str, filter: Option<&RuleFilter>) -> SchedulerResult<Vec<Asset>>;

    /// Assets matching rule JSON, sorted by id; an empty rule matches everything
    fn query_by_rule(&self, rule_json: &str) -> SchedulerResult<Vec<Asset>>;
}

/// Airing history used by rotation policies
///
/// History is keyed by air time, not by when it was written: a day compiled
/// out of order only ever sees airings that precede its anchor.
pub trait RotationStateStore: Send + Sync {
    /// Latest airing regardless of time
    fn last_aired(&self, content_id: &str) -> SchedulerResult<Option<DateTime<Utc>>>;

    /// Latest airing strictly before `before`
    fn last_aired_before(
        &self,
        content_id: &str,
        before: DateTime<Utc>,
    ) -> SchedulerResult<Option<DateTime<Utc>>>;

    fn record_aired(&self, content_id: &str, aired_at: DateTime<Utc>) -> SchedulerResult<()>;

    /// Commit a compilation's airings; implementations should apply them atomically
    fn record_many(&self, records: &[AiringRecord]) -> SchedulerResult<()> {
        for record in records {
            self.record_aired(&record.content_id, record.aired_at)?;
        }
        Ok(())
    }

    /// Drop every airing in `[from, until)` and record `records` in its place
    ///
    /// Used when a day is frozen, so a forced recompile replaces the airings
    /// of the row it discards instead of adding to them.
    fn replace_window(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        records: &[AiringRecord],
    ) -> SchedulerResult<()>;
}

/// Virtual asset definitions
pub trait VirtualAssetStore: Send + Sync {
    fn lookup_virtual(&self, virtual_id: &str) -> SchedulerResult<Option<VirtualAsset>>;
}
