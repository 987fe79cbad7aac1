//! Immutable working set for one compilation
//!
//! Everything the resolver may read is fetched from the collaborator stores
//! before expansion begins: assets, series episodes, rule matches, virtual
//! asset definitions and the rotation history of every candidate. The
//! compile itself never calls back into a store.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::error::SchedulerResult;
use crate::models::{
    Asset, ContentType, Program, SchedulePlan, Series, VirtualAsset, VirtualDefinition,
    VirtualEntry,
};
use crate::storage::{CatalogStore, RotationStateStore, VirtualAssetStore};

/// Catalog and rotation state frozen for a single run
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    assets: HashMap<String, Asset>,
    series: HashMap<String, Series>,
    /// Series id to episode ids in catalog order
    episodes: HashMap<String, Vec<String>>,
    /// Rule JSON to matching asset ids
    rule_matches: HashMap<String, Vec<String>>,
    virtuals: HashMap<String, VirtualAsset>,
    history: HashMap<String, DateTime<Utc>>,
}

impl CatalogSnapshot {
    /// Capture everything reachable from the programs of `plans`
    ///
    /// Rotation history is read as it stood at `as_of`, the anchor of the day
    /// being compiled; airings at or after it belong to this day or later.
    pub fn capture(
        plans: &[SchedulePlan],
        catalog: &dyn CatalogStore,
        virtuals: &dyn VirtualAssetStore,
        rotation: &dyn RotationStateStore,
        as_of: DateTime<Utc>,
    ) -> SchedulerResult<Self> {
        let mut snapshot = Self::default();
        let mut pending: Vec<Program> = plans.iter().flat_map(|p| p.programs().cloned()).collect();
        let mut seen_virtuals: HashSet<String> = HashSet::new();

        while let Some(program) = pending.pop() {
            match program.content_type {
                ContentType::Asset => snapshot.fetch_asset(catalog, &program.content_ref)?,
                ContentType::Series => snapshot.fetch_series(catalog, &program.content_ref)?,
                ContentType::Rule | ContentType::Random => {
                    snapshot.fetch_rule(catalog, &program.content_ref)?
                }
                ContentType::VirtualPackage => {
                    if !seen_virtuals.insert(program.content_ref.clone()) {
                        continue;
                    }
                    let Some(definition) = virtuals.lookup_virtual(&program.content_ref)? else {
                        continue;
                    };
                    match &definition.definition {
                        VirtualDefinition::Fixed { entries } => {
                            for entry in entries {
                                match entry {
                                    VirtualEntry::Asset { asset_id } => {
                                        snapshot.fetch_asset(catalog, asset_id)?
                                    }
                                    VirtualEntry::Dynamic { program } => {
                                        pending.push(program.clone())
                                    }
                                }
                            }
                        }
                        VirtualDefinition::RuleBased { rule, .. } => {
                            snapshot.fetch_rule(catalog, &rule.key())?
                        }
                    }
                    snapshot.virtuals.insert(definition.id.clone(), definition);
                }
            }
        }

        let ids: Vec<String> = snapshot
            .assets
            .keys()
            .chain(snapshot.episodes.keys())
            .cloned()
            .collect();
        for id in ids {
            if let Some(at) = rotation.last_aired_before(&id, as_of)? {
                snapshot.history.insert(id, at);
            }
        }

        debug!(
            assets = snapshot.assets.len(),
            series = snapshot.episodes.len(),
            rules = snapshot.rule_matches.len(),
            virtual_assets = snapshot.virtuals.len(),
            history = snapshot.history.len(),
            as_of = %as_of,
            "Captured catalog snapshot"
        );
        Ok(snapshot)
    }

    fn fetch_asset(&mut self, catalog: &dyn CatalogStore, asset_id: &str) -> SchedulerResult<()> {
        if !self.assets.contains_key(asset_id) {
            if let Some(asset) = catalog.lookup_asset(asset_id)? {
                self.assets.insert(asset.id.clone(), asset);
            }
        }
        Ok(())
    }

    fn fetch_series(&mut self, catalog: &dyn CatalogStore, series_id: &str) -> SchedulerResult<()> {
        if self.episodes.contains_key(series_id) {
            return Ok(());
        }
        if let Some(series) = catalog.lookup_series(series_id)? {
            self.series.insert(series.id.clone(), series);
        }
        let episodes = catalog.query_series_episodes(series_id, None)?;
        let ids = episodes.iter().map(|e| e.id.clone()).collect();
        for episode in episodes {
            self.assets.insert(episode.id.clone(), episode);
        }
        self.episodes.insert(series_id.to_string(), ids);
        Ok(())
    }

    fn fetch_rule(&mut self, catalog: &dyn CatalogStore, rule_json: &str) -> SchedulerResult<()> {
        if self.rule_matches.contains_key(rule_json) {
            return Ok(());
        }
        let matches = catalog.query_by_rule(rule_json)?;
        let ids = matches.iter().map(|a| a.id.clone()).collect();
        for asset in matches {
            self.assets.insert(asset.id.clone(), asset);
        }
        self.rule_matches.insert(rule_json.to_string(), ids);
        Ok(())
    }

    /// Add an asset directly
    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.insert(asset.id.clone(), asset);
        self
    }

    pub fn asset(&self, asset_id: &str) -> Option<&Asset> {
        self.assets.get(asset_id)
    }

    pub fn series(&self, series_id: &str) -> Option<&Series> {
        self.series.get(series_id)
    }

    /// Episodes of a series in catalog order
    pub fn episodes(&self, series_id: &str) -> Vec<&Asset> {
        self.resolve_ids(self.episodes.get(series_id))
    }

    /// Assets matching a rule, in catalog order
    pub fn rule_matches(&self, rule_json: &str) -> Vec<&Asset> {
        self.resolve_ids(self.rule_matches.get(rule_json))
    }

    pub fn virtual_asset(&self, virtual_id: &str) -> Option<&VirtualAsset> {
        self.virtuals.get(virtual_id)
    }

    /// Rotation history at capture time
    pub fn history(&self) -> &HashMap<String, DateTime<Utc>> {
        &self.history
    }

    /// Captured history restricted to airings strictly before `at`
    pub fn history_before(&self, at: DateTime<Utc>) -> HashMap<String, DateTime<Utc>> {
        self.history
            .iter()
            .filter(|(_, aired)| **aired < at)
            .map(|(id, aired)| (id.clone(), *aired))
            .collect()
    }

    fn resolve_ids(&self, ids: Option<&Vec<String>>) -> Vec<&Asset> {
        ids.map(|ids| ids.iter().filter_map(|id| self.assets.get(id)).collect())
            .unwrap_or_default()
    }
}
