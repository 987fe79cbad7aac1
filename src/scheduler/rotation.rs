//! Deterministic content rotation
//!
//! Every pick made during a compilation is a pure function of the catalog
//! snapshot, the rotation history snapshot and a seed derived from
//! `(date, channel, slot_index)`. The same inputs always produce the same
//! episode, which keeps recompilation and previews reproducible.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::models::{Asset, EpisodePolicy, SelectionPolicy, Series};

/// Stable seed for a slot's random pick
pub fn selection_seed(date: NaiveDate, channel_id: &str, slot_index: usize) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(date.num_days_from_ce().to_be_bytes());
    hasher.update(channel_id.as_bytes());
    hasher.update((slot_index as u64).to_be_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

// ============================================================================
// Rotation Ledger
// ============================================================================

/// One airing committed to rotation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiringRecord {
    /// Asset or series id
    pub content_id: String,
    pub aired_at: DateTime<Utc>,
}

/// Rotation history as seen by one compilation
///
/// Starts from the snapshot taken before expansion and accumulates the
/// airings placed by the run itself, so a series advances within a day.
/// The first in-run airing of an id replaces its snapshot entry outright.
/// Nothing here is written back until the caller commits the records.
#[derive(Debug, Clone, Default)]
pub struct RotationLedger {
    last_aired: HashMap<String, DateTime<Utc>>,
    aired_in_run: HashSet<String>,
    pending: Vec<AiringRecord>,
}

impl RotationLedger {
    /// Create from a history snapshot
    pub fn new(history: HashMap<String, DateTime<Utc>>) -> Self {
        Self {
            last_aired: history,
            aired_in_run: HashSet::new(),
            pending: Vec::new(),
        }
    }

    /// Most recent airing of an asset or series
    pub fn last_aired(&self, content_id: &str) -> Option<DateTime<Utc>> {
        self.last_aired.get(content_id).copied()
    }

    /// Record an airing placed by this run
    pub fn record(&mut self, content_id: &str, aired_at: DateTime<Utc>) {
        if self.aired_in_run.insert(content_id.to_string()) {
            self.last_aired.insert(content_id.to_string(), aired_at);
        } else {
            let entry = self
                .last_aired
                .entry(content_id.to_string())
                .or_insert(aired_at);
            if aired_at > *entry {
                *entry = aired_at;
            }
        }
        self.pending.push(AiringRecord {
            content_id: content_id.to_string(),
            aired_at,
        });
    }

    /// Airings recorded by this run
    pub fn pending(&self) -> &[AiringRecord] {
        &self.pending
    }

    /// Airings recorded by this run, in broadcast order
    pub fn into_records(self) -> Vec<AiringRecord> {
        let mut records = self.pending;
        records.sort_by(|a, b| {
            a.aired_at
                .cmp(&b.aired_at)
                .then_with(|| a.content_id.cmp(&b.content_id))
        });
        records
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Pick one candidate according to a selection policy
///
/// `candidates` must already be in catalog order. Syndication order is
/// applied by the caller, after which it behaves like `Sequential`.
pub fn select<'a>(
    policy: SelectionPolicy,
    candidates: &[&'a Asset],
    ledger: &RotationLedger,
    seed: u64,
) -> Option<&'a Asset> {
    if candidates.is_empty() {
        return None;
    }

    match policy {
        SelectionPolicy::Sequential | SelectionPolicy::Syndication => {
            select_sequential(candidates, ledger)
        }
        SelectionPolicy::Lru => select_lru(candidates, ledger),
        SelectionPolicy::Random => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            candidates.choose(&mut rng).copied()
        }
    }
}

/// Next candidate after the most recently aired one, wrapping
fn select_sequential<'a>(candidates: &[&'a Asset], ledger: &RotationLedger) -> Option<&'a Asset> {
    let latest = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, asset)| ledger.last_aired(&asset.id).map(|at| (at, index)))
        .max();

    let next = match latest {
        Some((_, index)) => (index + 1) % candidates.len(),
        None => 0,
    };
    candidates.get(next).copied()
}

/// Least recently aired candidate; never-aired first, ties by id
fn select_lru<'a>(candidates: &[&'a Asset], ledger: &RotationLedger) -> Option<&'a Asset> {
    candidates
        .iter()
        .min_by(|a, b| {
            ledger
                .last_aired(&a.id)
                .cmp(&ledger.last_aired(&b.id))
                .then_with(|| a.id.cmp(&b.id))
        })
        .copied()
}

/// Reorder episodes by a series' published syndication rotation
///
/// Episodes missing from a non-empty rotation are not eligible.
pub fn syndication_order<'a>(series: Option<&Series>, episodes: &[&'a Asset]) -> Vec<&'a Asset> {
    match series {
        Some(series) if !series.syndication_order.is_empty() => series
            .syndication_order
            .iter()
            .filter_map(|id| episodes.iter().find(|e| &e.id == id).copied())
            .collect(),
        _ => episodes.to_vec(),
    }
}

/// Pick the episode of a series airing next
pub fn select_episode<'a>(
    policy: EpisodePolicy,
    series: Option<&Series>,
    episodes: &[&'a Asset],
    date: NaiveDate,
    ledger: &RotationLedger,
    seed: u64,
) -> Option<&'a Asset> {
    match policy {
        EpisodePolicy::Sequential => select(SelectionPolicy::Sequential, episodes, ledger, seed),
        EpisodePolicy::Random => select(SelectionPolicy::Random, episodes, ledger, seed),
        EpisodePolicy::Lru => select(SelectionPolicy::Lru, episodes, ledger, seed),
        EpisodePolicy::Syndication => {
            let ordered = syndication_order(series, episodes);
            select(SelectionPolicy::Syndication, &ordered, ledger, seed)
        }
        EpisodePolicy::Seasonal { secondary } => {
            let in_season: Vec<&Asset> = episodes
                .iter()
                .filter(|e| e.calendar_windows.iter().any(|w| w.contains(date)))
                .copied()
                .collect();
            let ordered = if secondary == SelectionPolicy::Syndication {
                syndication_order(series, &in_season)
            } else {
                in_season
            };
            select(secondary, &ordered, ledger, seed)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CalendarWindow;
    use chrono::TimeZone;

    fn episodes() -> Vec<Asset> {
        (1..=4)
            .map(|n| Asset::new(format!("ep{}", n), 22).episode_of("show", 1, n))
            .collect()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, hour, 0, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = selection_seed(date(), "ch1", 3);
        assert_eq!(a, selection_seed(date(), "ch1", 3));
        assert_ne!(a, selection_seed(date(), "ch1", 4));
        assert_ne!(a, selection_seed(date(), "ch2", 3));
    }

    #[test]
    fn test_sequential_advances() {
        let eps = episodes();
        let refs: Vec<&Asset> = eps.iter().collect();
        let mut ledger = RotationLedger::default();

        let first = select(SelectionPolicy::Sequential, &refs, &ledger, 0).unwrap();
        assert_eq!(first.id, "ep1");

        ledger.record("ep1", at(1));
        ledger.record("ep2", at(2));
        let next = select(SelectionPolicy::Sequential, &refs, &ledger, 0).unwrap();
        assert_eq!(next.id, "ep3");

        ledger.record("ep4", at(3));
        let wrapped = select(SelectionPolicy::Sequential, &refs, &ledger, 0).unwrap();
        assert_eq!(wrapped.id, "ep1");
    }

    #[test]
    fn test_lru_prefers_never_aired_then_id() {
        let eps = episodes();
        let refs: Vec<&Asset> = eps.iter().collect();
        let mut history = HashMap::new();
        history.insert("ep1".to_string(), at(5));
        history.insert("ep2".to_string(), at(1));
        history.insert("ep3".to_string(), at(3));
        let ledger = RotationLedger::new(history.clone());

        assert_eq!(select(SelectionPolicy::Lru, &refs, &ledger, 0).unwrap().id, "ep4");

        history.insert("ep4".to_string(), at(9));
        let ledger = RotationLedger::new(history);
        assert_eq!(select(SelectionPolicy::Lru, &refs, &ledger, 0).unwrap().id, "ep2");
    }

    #[test]
    fn test_random_is_seeded() {
        let eps = episodes();
        let refs: Vec<&Asset> = eps.iter().collect();
        let ledger = RotationLedger::default();
        let seed = selection_seed(date(), "ch1", 7);

        let a = select(SelectionPolicy::Random, &refs, &ledger, seed).unwrap();
        let b = select(SelectionPolicy::Random, &refs, &ledger, seed).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_syndication_order() {
        let eps = episodes();
        let refs: Vec<&Asset> = eps.iter().collect();
        let series = Series {
            id: "show".to_string(),
            title: String::new(),
            syndication_order: vec!["ep3".to_string(), "ep1".to_string()],
        };
        let mut ledger = RotationLedger::default();

        let first = select_episode(EpisodePolicy::Syndication, Some(&series), &refs, date(), &ledger, 0);
        assert_eq!(first.unwrap().id, "ep3");

        ledger.record("ep3", at(1));
        let second = select_episode(EpisodePolicy::Syndication, Some(&series), &refs, date(), &ledger, 0);
        assert_eq!(second.unwrap().id, "ep1");
    }

    #[test]
    fn test_seasonal_filters_window() {
        let mut eps = episodes();
        eps[2] = eps[2].clone().with_window(CalendarWindow::new(1, 1, 1, 31));
        let refs: Vec<&Asset> = eps.iter().collect();
        let ledger = RotationLedger::default();
        let policy = EpisodePolicy::Seasonal {
            secondary: SelectionPolicy::Sequential,
        };

        let picked = select_episode(policy, None, &refs, date(), &ledger, 0);
        assert_eq!(picked.unwrap().id, "ep3");

        let july = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert!(select_episode(policy, None, &refs, july, &ledger, 0).is_none());
    }

    #[test]
    fn test_ledger_prefers_in_run_airings_and_orders_records() {
        let mut ledger = RotationLedger::new(HashMap::from([("ep1".to_string(), at(9))]));
        ledger.record("ep1", at(4));
        assert_eq!(ledger.last_aired("ep1"), Some(at(4)));
        ledger.record("ep1", at(3));
        assert_eq!(ledger.last_aired("ep1"), Some(at(4)));

        ledger.record("ep2", at(2));
        let records = ledger.into_records();
        assert_eq!(records[0].content_id, "ep2");
        assert_eq!(records[1].aired_at, at(3));
        assert_eq!(records[2].aired_at, at(4));
    }
}
