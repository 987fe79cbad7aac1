//! Program resolution
//!
//! Turns a program reference into concrete assets. Series pick an episode
//! through their episode policy, rules and random programs pick from catalog
//! matches, and virtual packages expand into one asset per entry.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;

use super::error::{SchedulerError, SchedulerResult};
use super::rotation::{select, select_episode, selection_seed, RotationLedger};
use super::snapshot::CatalogSnapshot;
use crate::models::{
    Asset, ContentType, Program, RuleFilter, SelectionPolicy, VirtualDefinition, VirtualEntry,
};

/// Nesting limit for virtual packages referencing other packages
const MAX_PACKAGE_DEPTH: usize = 8;

/// A concrete asset chosen for a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub asset_id: String,
    pub duration_secs: u32,
    /// Series the asset belongs to, for rotation bookkeeping
    pub series_id: Option<String>,
    /// Index within an expanded virtual package
    pub package_index: Option<usize>,
}

impl ResolvedAsset {
    fn from_asset(asset: &Asset) -> Self {
        Self {
            asset_id: asset.id.clone(),
            duration_secs: asset.duration_secs,
            series_id: asset.series_id.clone(),
            package_index: None,
        }
    }

    /// Runtime rounded up to whole minutes
    pub fn duration_minutes(&self) -> i64 {
        i64::from(self.duration_secs.div_ceil(60))
    }
}

/// Inputs shared by every resolution of one run
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub date: NaiveDate,
    pub channel_id: &'a str,
    /// Day-level sequence number of this resolution attempt
    pub slot_index: usize,
    pub snapshot: &'a CatalogSnapshot,
}

impl ResolveContext<'_> {
    fn seed(&self, sub_index: usize) -> u64 {
        selection_seed(self.date, self.channel_id, self.slot_index).wrapping_add(sub_index as u64)
    }
}

/// Resolves programs against a catalog snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramResolver;

impl ProgramResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a program to exactly one asset
    ///
    /// Virtual packages yield their first entry; use [`Self::resolve_many`]
    /// to place the whole package.
    pub fn resolve(&self, program: &Program, ctx: &ResolveContext<'_>, ledger: &RotationLedger) -> SchedulerResult<ResolvedAsset> {
        self.resolve_many(program, ctx, ledger)?
            .into_iter()
            .next()
            .ok_or_else(|| SchedulerError::no_content(&program.id, "package expanded to nothing"))
    }

    /// Resolve a program to one or more assets
    pub fn resolve_many(
        &self,
        program: &Program,
        ctx: &ResolveContext<'_>,
        ledger: &RotationLedger,
    ) -> SchedulerResult<Vec<ResolvedAsset>> {
        match program.content_type {
            ContentType::VirtualPackage => {
                let mut scratch = ledger.clone();
                let mut visiting = HashSet::new();
                let assets = self.expand_package(program, ctx, &mut scratch, &mut visiting, 0)?;
                Ok(assets
                    .into_iter()
                    .enumerate()
                    .map(|(index, asset)| ResolvedAsset {
                        package_index: Some(index),
                        ..asset
                    })
                    .collect())
            }
            _ => Ok(vec![self.resolve_single(program, ctx, ledger, 0)?]),
        }
    }

    fn resolve_single(
        &self,
        program: &Program,
        ctx: &ResolveContext<'_>,
        ledger: &RotationLedger,
        sub_index: usize,
    ) -> SchedulerResult<ResolvedAsset> {
        let snapshot = ctx.snapshot;
        let picked = match program.content_type {
            ContentType::Asset => snapshot.asset(&program.content_ref).ok_or_else(|| {
                SchedulerError::no_content(
                    &program.id,
                    format!("asset '{}' is not in the catalog", program.content_ref),
                )
            })?,
            ContentType::Series => {
                let episodes = snapshot.episodes(&program.content_ref);
                if episodes.is_empty() {
                    return Err(SchedulerError::no_content(
                        &program.id,
                        format!("series '{}' has no episodes", program.content_ref),
                    ));
                }
                let policy = program.episode_policy.unwrap_or_default();
                select_episode(
                    policy,
                    snapshot.series(&program.content_ref),
                    &episodes,
                    ctx.date,
                    ledger,
                    ctx.seed(sub_index),
                )
                .ok_or_else(|| {
                    SchedulerError::no_content(
                        &program.id,
                        format!("no episode of '{}' eligible under {:?}", program.content_ref, policy),
                    )
                })?
            }
            ContentType::Rule | ContentType::Random => {
                let filter = RuleFilter::parse(&program.content_ref)?;
                let policy = if program.content_type == ContentType::Random {
                    SelectionPolicy::Random
                } else {
                    filter.rotation
                };
                let matches = snapshot.rule_matches(&program.content_ref);
                select(policy, &matches, ledger, ctx.seed(sub_index)).ok_or_else(|| {
                    SchedulerError::no_content(&program.id, "no catalog entries match the rule")
                })?
            }
            ContentType::VirtualPackage => {
                return Err(SchedulerError::configuration(format!(
                    "program '{}' is a package and must be expanded",
                    program.id
                )))
            }
        };
        Ok(ResolvedAsset::from_asset(picked))
    }

    /// Expand a package into its assets, picking distinct content per entry
    fn expand_package(
        &self,
        program: &Program,
        ctx: &ResolveContext<'_>,
        scratch: &mut RotationLedger,
        visiting: &mut HashSet<String>,
        depth: usize,
    ) -> SchedulerResult<Vec<ResolvedAsset>> {
        if depth >= MAX_PACKAGE_DEPTH || !visiting.insert(program.content_ref.clone()) {
            return Err(SchedulerError::configuration(format!(
                "virtual asset '{}' references itself",
                program.content_ref
            )));
        }

        let package = ctx.snapshot.virtual_asset(&program.content_ref).ok_or_else(|| {
            SchedulerError::no_content(
                &program.id,
                format!("virtual asset '{}' not found", program.content_ref),
            )
        })?;

        let mut assets = Vec::new();
        match &package.definition {
            VirtualDefinition::Fixed { entries } => {
                for (index, entry) in entries.iter().enumerate() {
                    match entry {
                        VirtualEntry::Asset { asset_id } => {
                            let asset = ctx.snapshot.asset(asset_id).ok_or_else(|| {
                                SchedulerError::no_content(
                                    &program.id,
                                    format!("package asset '{}' is not in the catalog", asset_id),
                                )
                            })?;
                            assets.push(ResolvedAsset::from_asset(asset));
                        }
                        VirtualEntry::Dynamic { program: inner } => {
                            if inner.content_type == ContentType::VirtualPackage {
                                assets.extend(self.expand_package(inner, ctx, scratch, visiting, depth + 1)?);
                            } else {
                                let resolved = self.resolve_single(inner, ctx, scratch, index)?;
                                note_pick(scratch, &resolved);
                                assets.push(resolved);
                            }
                        }
                    }
                }
            }
            VirtualDefinition::RuleBased {
                rule,
                max_items,
                max_total_secs,
            } => {
                let mut remaining = ctx.snapshot.rule_matches(&rule.key());
                let mut total_secs: u32 = 0;

                while assets.len() < *max_items {
                    let Some(picked) = select(rule.rotation, &remaining, scratch, ctx.seed(assets.len())) else {
                        break;
                    };
                    if max_total_secs.is_some_and(|max| total_secs + picked.duration_secs > max) {
                        break;
                    }
                    total_secs += picked.duration_secs;
                    let resolved = ResolvedAsset::from_asset(picked);
                    note_pick(scratch, &resolved);
                    remaining.retain(|a| a.id != picked.id);
                    assets.push(resolved);
                }
            }
        }

        visiting.remove(&program.content_ref);
        if assets.is_empty() {
            return Err(SchedulerError::no_content(
                &program.id,
                format!("virtual asset '{}' expanded to nothing", program.content_ref),
            ));
        }
        Ok(assets)
    }
}

/// Mark a pick in the scratch ledger so later entries choose something else
fn note_pick(scratch: &mut RotationLedger, resolved: &ResolvedAsset) {
    scratch.record(&resolved.asset_id, DateTime::<Utc>::MAX_UTC);
}
