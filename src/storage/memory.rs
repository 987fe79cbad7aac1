//! JSON-backed in-memory library
//!
//! Holds channels, plans, the content catalog, virtual assets and rotation
//! history in one document. Used by the CLI and by tests; the write counter
//! lets tests assert that previews never touch rotation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use super::{CatalogStore, ChannelStore, PlanStore, RotationStateStore, VirtualAssetStore};
use crate::models::{Asset, Channel, RuleFilter, SchedulePlan, Series, VirtualAsset};
use crate::scheduler::error::{SchedulerError, SchedulerResult};
use crate::scheduler::rotation::AiringRecord;

/// Serialized library document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryData {
    pub channels: Vec<Channel>,
    pub plans: Vec<SchedulePlan>,
    pub assets: Vec<Asset>,
    pub series: Vec<Series>,
    pub virtual_assets: Vec<VirtualAsset>,
    /// Content id to every recorded airing
    pub rotation: BTreeMap<String, BTreeSet<DateTime<Utc>>>,
}

/// Thread-safe in-memory implementation of every collaborator trait
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    data: RwLock<LibraryData>,
    rotation_writes: AtomicUsize,
}

impl MemoryLibrary {
    /// Create from a library document
    pub fn new(data: LibraryData) -> Self {
        Self {
            data: RwLock::new(data),
            rotation_writes: AtomicUsize::new(0),
        }
    }

    /// Load a library document from disk
    pub async fn load_from_file(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let json = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| SchedulerError::io_error("load_library", e.to_string()))?;
        let data: LibraryData = serde_json::from_str(&json)?;
        info!(
            path = %path.as_ref().display(),
            channels = data.channels.len(),
            plans = data.plans.len(),
            assets = data.assets.len(),
            "Loaded library"
        );
        Ok(Self::new(data))
    }

    /// Write the library document, including rotation history
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> SchedulerResult<()> {
        let json = serde_json::to_string_pretty(&*self.read())?;
        tokio::fs::write(path.as_ref(), json)
            .await
            .map_err(|e| SchedulerError::io_error("save_library", e.to_string()))
    }

    /// Copy of the current document
    pub fn snapshot(&self) -> LibraryData {
        self.read().clone()
    }

    /// Add or replace a channel
    pub fn upsert_channel(&self, channel: Channel) {
        let mut data = self.write();
        data.channels.retain(|c| c.id != channel.id);
        data.channels.push(channel);
    }

    /// Add or replace a plan
    pub fn upsert_plan(&self, plan: SchedulePlan) {
        let mut data = self.write();
        data.plans.retain(|p| p.id != plan.id);
        data.plans.push(plan);
    }

    /// Add or replace an asset
    pub fn upsert_asset(&self, asset: Asset) {
        let mut data = self.write();
        data.assets.retain(|a| a.id != asset.id);
        data.assets.push(asset);
    }

    /// Number of rotation write calls so far
    pub fn rotation_writes(&self) -> usize {
        self.rotation_writes.load(Ordering::SeqCst)
    }

    fn read(&self) -> RwLockReadGuard<'_, LibraryData> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LibraryData> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

type AiringLog = BTreeMap<String, BTreeSet<DateTime<Utc>>>;

fn apply_airing(rotation: &mut AiringLog, content_id: &str, aired_at: DateTime<Utc>) {
    rotation
        .entry(content_id.to_string())
        .or_default()
        .insert(aired_at);
}

impl ChannelStore for MemoryLibrary {
    fn channel(&self, channel_id: &str) -> SchedulerResult<Option<Channel>> {
        Ok(self.read().channels.iter().find(|c| c.id == channel_id).cloned())
    }

    fn channel_ids(&self) -> SchedulerResult<Vec<String>> {
        let mut ids: Vec<String> = self.read().channels.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

impl PlanStore for MemoryLibrary {
    fn plans_for_channel(&self, channel_id: &str) -> SchedulerResult<Vec<SchedulePlan>> {
        let mut plans: Vec<SchedulePlan> = self
            .read()
            .plans
            .iter()
            .filter(|p| p.channel_id == channel_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(plans)
    }

    fn plan(&self, plan_id: &str) -> SchedulerResult<Option<SchedulePlan>> {
        Ok(self.read().plans.iter().find(|p| p.id == plan_id).cloned())
    }
}

impl CatalogStore for MemoryLibrary {
    fn lookup_asset(&self, asset_id: &str) -> SchedulerResult<Option<Asset>> {
        Ok(self.read().assets.iter().find(|a| a.id == asset_id).cloned())
    }

    fn lookup_series(&self, series_id: &str) -> SchedulerResult<Option<Series>> {
        Ok(self.read().series.iter().find(|s| s.id == series_id).cloned())
    }

    fn query_series_episodes(&self, series_id: &str, filter: Option<&RuleFilter>) -> SchedulerResult<Vec<Asset>> {
        let mut episodes: Vec<Asset> = self
            .read()
            .assets
            .iter()
            .filter(|a| a.series_id.as_deref() == Some(series_id))
            .filter(|a| filter.map_or(true, |f| f.matches(a)))
            .cloned()
            .collect();
        episodes.sort_by(|a, b| {
            (a.season, a.episode, &a.id).cmp(&(b.season, b.episode, &b.id))
        });
        Ok(episodes)
    }

    fn query_by_rule(&self, rule_json: &str) -> SchedulerResult<Vec<Asset>> {
        let filter = RuleFilter::parse(rule_json)?;
        let mut matches: Vec<Asset> = self
            .read()
            .assets
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }
}

impl RotationStateStore for MemoryLibrary {
    fn last_aired(&self, content_id: &str) -> SchedulerResult<Option<DateTime<Utc>>> {
        Ok(self
            .read()
            .rotation
            .get(content_id)
            .and_then(|log| log.last().copied()))
    }

    fn last_aired_before(
        &self,
        content_id: &str,
        before: DateTime<Utc>,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        Ok(self
            .read()
            .rotation
            .get(content_id)
            .and_then(|log| log.range(..before).next_back().copied()))
    }

    fn record_aired(&self, content_id: &str, aired_at: DateTime<Utc>) -> SchedulerResult<()> {
        self.rotation_writes.fetch_add(1, Ordering::SeqCst);
        apply_airing(&mut self.write().rotation, content_id, aired_at);
        Ok(())
    }

    fn record_many(&self, records: &[AiringRecord]) -> SchedulerResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.rotation_writes.fetch_add(1, Ordering::SeqCst);
        let mut data = self.write();
        for record in records {
            apply_airing(&mut data.rotation, &record.content_id, record.aired_at);
        }
        debug!(records = records.len(), "Committed rotation history");
        Ok(())
    }

    fn replace_window(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        records: &[AiringRecord],
    ) -> SchedulerResult<()> {
        self.rotation_writes.fetch_add(1, Ordering::SeqCst);
        let mut data = self.write();
        let mut dropped = 0;
        for log in data.rotation.values_mut() {
            let before = log.len();
            log.retain(|at| *at < from || *at >= until);
            dropped += before - log.len();
        }
        data.rotation.retain(|_, log| !log.is_empty());
        for record in records {
            apply_airing(&mut data.rotation, &record.content_id, record.aired_at);
        }
        debug!(
            dropped = dropped,
            records = records.len(),
            from = %from,
            until = %until,
            "Replaced rotation window"
        );
        Ok(())
    }
}

impl VirtualAssetStore for MemoryLibrary {
    fn lookup_virtual(&self, virtual_id: &str) -> SchedulerResult<Option<VirtualAsset>> {
        Ok(self
            .read()
            .virtual_assets
            .iter()
            .find(|v| v.id == virtual_id)
            .cloned())
    }
}
