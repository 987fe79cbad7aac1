//! Frozen schedule day store
//!
//! Enforces the `(channel_id, date)` uniqueness constraint, hands out the
//! version counter used for optimistic override locking, and optionally
//! mirrors every row to a JSON file so compiled days survive restarts.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::scheduler::error::{SchedulerError, SchedulerResult};
use crate::scheduler::schedule::ScheduleDay;

type DayKey = (String, NaiveDate);

/// Thread-safe store of compiled schedule days
#[derive(Debug, Default)]
pub struct ScheduleDayStore {
    days: RwLock<BTreeMap<DayKey, ScheduleDay>>,

    /// Directory mirrored with one JSON file per day (optional)
    dir: Option<PathBuf>,
}

impl ScheduleDayStore {
    /// Create an in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store persisting to a directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            days: RwLock::new(BTreeMap::new()),
            dir: Some(dir.into()),
        }
    }

    /// File backing a day
    pub fn file_path(&self, channel_id: &str, date: NaiveDate) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}_{}.json", channel_id, date)))
    }

    /// Freeze a compiled day
    ///
    /// Without `force`, an existing row for the same channel and date fails
    /// with `AlreadyCompiled`. With `force` the previous row is discarded.
    pub async fn insert(&self, day: ScheduleDay, force: bool) -> SchedulerResult<()> {
        let key = (day.channel_id.clone(), day.date);
        let mut days = self.days.write().await;

        if days.contains_key(&key) {
            if !force {
                return Err(SchedulerError::AlreadyCompiled {
                    channel_id: day.channel_id.clone(),
                    date: day.date,
                });
            }
            warn!(channel_id = %day.channel_id, date = %day.date, "Discarding frozen schedule day");
        }

        self.persist(&day).await?;
        days.insert(key, day);
        Ok(())
    }

    /// Replace a day after an override, checking the version it was read at
    pub async fn commit_override(&self, day: ScheduleDay, expected_version: u32) -> SchedulerResult<()> {
        let key = (day.channel_id.clone(), day.date);
        let mut days = self.days.write().await;

        let current = days
            .get(&key)
            .ok_or_else(|| SchedulerError::schedule_not_found(day.id.to_string()))?;
        if current.version != expected_version {
            return Err(SchedulerError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        self.persist(&day).await?;
        debug!(day_id = %day.id, version = day.version, "Committed override");
        days.insert(key, day);
        Ok(())
    }

    /// Check whether a day exists
    pub async fn contains(&self, channel_id: &str, date: NaiveDate) -> bool {
        self.days
            .read()
            .await
            .contains_key(&(channel_id.to_string(), date))
    }

    /// Get the day for a channel and date
    pub async fn get(&self, channel_id: &str, date: NaiveDate) -> Option<ScheduleDay> {
        self.days
            .read()
            .await
            .get(&(channel_id.to_string(), date))
            .cloned()
    }

    /// Get a day by its id
    pub async fn get_by_id(&self, day_id: &Uuid) -> Option<ScheduleDay> {
        self.days
            .read()
            .await
            .values()
            .find(|d| &d.id == day_id)
            .cloned()
    }

    /// Put back the row a failed commit replaced, or drop the row if there was none
    pub async fn restore(
        &self,
        channel_id: &str,
        date: NaiveDate,
        previous: Option<ScheduleDay>,
    ) -> SchedulerResult<()> {
        let key = (channel_id.to_string(), date);
        let mut days = self.days.write().await;

        match previous {
            Some(day) => {
                self.persist(&day).await?;
                days.insert(key, day);
            }
            None => {
                if let Some(path) = self.file_path(channel_id, date) {
                    if path.exists() {
                        tokio::fs::remove_file(&path)
                            .await
                            .map_err(|e| SchedulerError::io_error("remove_schedule_day", e.to_string()))?;
                    }
                }
                days.remove(&key);
            }
        }
        warn!(channel_id = %channel_id, date = %date, "Rolled back frozen schedule day");
        Ok(())
    }

    /// Days of one channel in date order
    pub async fn list(&self, channel_id: &str) -> Vec<ScheduleDay> {
        self.days
            .read()
            .await
            .iter()
            .filter(|((channel, _), _)| channel == channel_id)
            .map(|(_, day)| day.clone())
            .collect()
    }

    /// Number of stored days
    pub async fn len(&self) -> usize {
        self.days.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.days.read().await.is_empty()
    }

    /// Load every JSON file from the backing directory
    pub async fn load(&self) -> SchedulerResult<usize> {
        let Some(ref dir) = self.dir else {
            return Ok(0);
        };
        if !dir.exists() {
            return Ok(0);
        }

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| SchedulerError::io_error("read_schedule_dir", e.to_string()))?;
        let mut loaded = BTreeMap::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SchedulerError::io_error("read_schedule_dir", e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let day = ScheduleDay::load_from_file(&path).await?;
            loaded.insert((day.channel_id.clone(), day.date), day);
        }

        let count = loaded.len();
        self.days.write().await.extend(loaded);
        info!(dir = %dir.display(), days = count, "Loaded schedule days");
        Ok(count)
    }

    async fn persist(&self, day: &ScheduleDay) -> SchedulerResult<()> {
        if let Some(path) = self.file_path(&day.channel_id, day.date) {
            ensure_parent(&path).await?;
            day.save_to_file(&path).await?;
        }
        Ok(())
    }
}

async fn ensure_parent(path: &Path) -> SchedulerResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SchedulerError::io_error("create_schedule_dir", e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::schedule::day_id;
    use chrono::{Duration, TimeZone, Utc};

    fn day(channel: &str, date: NaiveDate) -> ScheduleDay {
        let anchor = Utc.from_utc_datetime(&date.and_hms_opt(6, 0, 0).unwrap());
        ScheduleDay {
            id: day_id(channel, date),
            channel_id: channel.to_string(),
            date,
            anchor_utc: anchor,
            day_end_utc: anchor + Duration::days(1),
            slots: vec![],
            avails: vec![],
            diagnostics: vec![],
            plan_ids: vec![],
            is_manual_override: false,
            version: 1,
            compiled_at: anchor,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[tokio::test]
    async fn test_insert_is_unique() {
        let store = ScheduleDayStore::new();
        store.insert(day("ch1", date()), false).await.unwrap();

        let again = store.insert(day("ch1", date()), false).await;
        assert!(matches!(again, Err(SchedulerError::AlreadyCompiled { .. })));

        store.insert(day("ch1", date()), true).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_commit_override_checks_version() {
        let store = ScheduleDayStore::new();
        store.insert(day("ch1", date()), false).await.unwrap();

        let mut updated = day("ch1", date());
        updated.version = 2;
        let stale = store.commit_override(updated.clone(), 3).await;
        assert!(matches!(
            stale,
            Err(SchedulerError::VersionConflict {
                expected: 3,
                actual: 1
            })
        ));

        store.commit_override(updated, 1).await.unwrap();
        assert_eq!(store.get("ch1", date()).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_get_by_id_and_list() {
        let store = ScheduleDayStore::new();
        let next = date().succ_opt().unwrap();
        store.insert(day("ch1", next), false).await.unwrap();
        store.insert(day("ch1", date()), false).await.unwrap();
        store.insert(day("ch2", date()), false).await.unwrap();

        let listed: Vec<_> = store.list("ch1").await.into_iter().map(|d| d.date).collect();
        assert_eq!(listed, vec![date(), next]);
        assert!(store.get_by_id(&day_id("ch2", date())).await.is_some());
    }

    #[tokio::test]
    async fn test_restore_drops_or_reinstates_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleDayStore::with_dir(dir.path());
        store.insert(day("ch1", date()), false).await.unwrap();
        store.restore("ch1", date(), None).await.unwrap();
        assert!(!store.contains("ch1", date()).await);
        assert!(!store.file_path("ch1", date()).unwrap().exists());

        let original = day("ch1", date());
        store.insert(original.clone(), false).await.unwrap();
        let mut replacement = day("ch1", date());
        replacement.version = 7;
        store.insert(replacement, true).await.unwrap();
        store.restore("ch1", date(), Some(original)).await.unwrap();
        assert_eq!(store.get("ch1", date()).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleDayStore::with_dir(dir.path().join("days"));
        store.insert(day("ch1", date()), false).await.unwrap();

        let reloaded = ScheduleDayStore::with_dir(dir.path().join("days"));
        assert_eq!(reloaded.load().await.unwrap(), 1);
        assert!(reloaded.contains("ch1", date()).await);
    }
}
