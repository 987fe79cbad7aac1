//! Priority-based zone resolution
//!
//! Zones from every plan active on a date are laid onto one broadcast-day
//! timeline. Higher plan priority claims time first; lower-priority zones are
//! clipped or split around what is already claimed. Whatever remains
//! uncovered is represented explicitly as avail segments.

use std::collections::HashMap;

use super::error::{SchedulerError, SchedulerResult};

/// A zone placed on a specific broadcast day, before overlap resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneCandidate {
    pub plan_id: String,
    pub zone_id: String,
    pub pattern_id: String,
    pub priority: i32,
    /// Offset range on the broadcast day
    pub start: i64,
    pub end: i64,
}

impl ZoneCandidate {
    /// Key identifying the zone across its split pieces
    pub fn key(&self) -> (String, String) {
        (self.plan_id.clone(), self.zone_id.clone())
    }
}

/// The surviving part of a zone after higher-priority zones were carved out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveZone {
    pub plan_id: String,
    pub zone_id: String,
    pub pattern_id: String,
    pub priority: i32,
    /// Index of this piece among the zone's surviving pieces
    pub piece: usize,
    /// Window before clipping
    pub nominal_start: i64,
    pub nominal_end: i64,
}

/// One interval of the resolved timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSegment {
    pub start: i64,
    pub end: i64,
    /// `None` for uncovered time
    pub zone: Option<EffectiveZone>,
}

impl ZoneSegment {
    pub fn minutes(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_avail(&self) -> bool {
        self.zone.is_none()
    }
}

/// Collapses overlapping zones into a non-overlapping timeline
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneResolver;

impl ZoneResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve candidates into ordered segments covering `[0, max(day_length, last zone end))`
    ///
    /// Fails with `ZoneConflict` when two zones of equal priority overlap.
    pub fn resolve(&self, candidates: &[ZoneCandidate], day_length: i64) -> SchedulerResult<Vec<ZoneSegment>> {
        let mut ordered: Vec<&ZoneCandidate> = candidates
            .iter()
            .filter(|c| c.end > c.start)
            .collect();
        ordered.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.start.cmp(&b.start))
                .then_with(|| a.plan_id.cmp(&b.plan_id))
                .then_with(|| a.zone_id.cmp(&b.zone_id))
        });

        // (start, end, candidate) claimed so far, higher priority first
        let mut claimed: Vec<(i64, i64, &ZoneCandidate)> = Vec::new();
        let mut pieces: Vec<(i64, i64, &ZoneCandidate)> = Vec::new();

        for candidate in ordered {
            if let Some((_, _, other)) = claimed.iter().find(|(s, e, other)| {
                other.priority == candidate.priority && *s < candidate.end && candidate.start < *e
            }) {
                return Err(SchedulerError::ZoneConflict {
                    first: format!("{}/{}", other.plan_id, other.zone_id),
                    second: format!("{}/{}", candidate.plan_id, candidate.zone_id),
                    priority: candidate.priority,
                });
            }

            let remaining = subtract(candidate.start, candidate.end, &claimed);
            for (start, end) in remaining {
                pieces.push((start, end, candidate));
                claimed.push((start, end, candidate));
            }
        }

        pieces.sort_by_key(|(start, _, _)| *start);

        let horizon = pieces
            .iter()
            .map(|(_, end, _)| *end)
            .max()
            .unwrap_or(0)
            .max(day_length);

        let mut piece_counts: HashMap<(String, String), usize> = HashMap::new();
        let mut segments = Vec::with_capacity(pieces.len() * 2 + 1);
        let mut cursor = 0;

        for (start, end, candidate) in pieces {
            if start > cursor {
                segments.push(ZoneSegment {
                    start: cursor,
                    end: start,
                    zone: None,
                });
            }
            let counter = piece_counts.entry(candidate.key()).or_insert(0);
            segments.push(ZoneSegment {
                start,
                end,
                zone: Some(EffectiveZone {
                    plan_id: candidate.plan_id.clone(),
                    zone_id: candidate.zone_id.clone(),
                    pattern_id: candidate.pattern_id.clone(),
                    priority: candidate.priority,
                    piece: *counter,
                    nominal_start: candidate.start,
                    nominal_end: candidate.end,
                }),
            });
            *counter += 1;
            cursor = end;
        }

        if cursor < horizon {
            segments.push(ZoneSegment {
                start: cursor,
                end: horizon,
                zone: None,
            });
        }

        Ok(segments)
    }
}

/// Parts of `[start, end)` not covered by any claimed interval
fn subtract(start: i64, end: i64, claimed: &[(i64, i64, &ZoneCandidate)]) -> Vec<(i64, i64)> {
    let mut blockers: Vec<(i64, i64)> = claimed
        .iter()
        .filter(|(s, e, _)| *s < end && start < *e)
        .map(|(s, e, _)| (*s, *e))
        .collect();
    blockers.sort_unstable();

    let mut remaining = Vec::new();
    let mut cursor = start;
    for (s, e) in blockers {
        if s > cursor {
            remaining.push((cursor, s.min(end)));
        }
        cursor = cursor.max(e);
        if cursor >= end {
            break;
        }
    }
    if cursor < end {
        remaining.push((cursor, end));
    }
    remaining
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(plan: &str, zone: &str, priority: i32, start: i64, end: i64) -> ZoneCandidate {
        ZoneCandidate {
            plan_id: plan.to_string(),
            zone_id: zone.to_string(),
            pattern_id: format!("{}-pattern", zone),
            priority,
            start,
            end,
        }
    }

    fn zone_ids(segments: &[ZoneSegment]) -> Vec<Option<&str>> {
        segments
            .iter()
            .map(|s| s.zone.as_ref().map(|z| z.zone_id.as_str()))
            .collect()
    }

    #[test]
    fn test_empty_day_is_one_avail() {
        let segments = ZoneResolver::new().resolve(&[], 1440).unwrap();
        assert_eq!(segments.len(), 1);
        assert!(segments[0].is_avail());
        assert_eq!(segments[0].minutes(), 1440);
    }

    #[test]
    fn test_higher_priority_splits_lower() {
        let candidates = vec![
            candidate("base", "all", 10, 0, 1440),
            candidate("event", "prime", 20, 780, 840),
        ];
        let segments = ZoneResolver::new().resolve(&candidates, 1440).unwrap();

        assert_eq!(zone_ids(&segments), vec![Some("all"), Some("prime"), Some("all")]);
        assert_eq!((segments[0].start, segments[0].end), (0, 780));
        assert_eq!((segments[2].start, segments[2].end), (840, 1440));

        let pieces: Vec<usize> = segments
            .iter()
            .filter_map(|s| s.zone.as_ref())
            .filter(|z| z.zone_id == "all")
            .map(|z| z.piece)
            .collect();
        assert_eq!(pieces, vec![0, 1]);
    }

    #[test]
    fn test_gaps_become_avails() {
        let candidates = vec![candidate("p", "evening", 10, 780, 960)];
        let segments = ZoneResolver::new().resolve(&candidates, 1440).unwrap();
        assert_eq!(zone_ids(&segments), vec![None, Some("evening"), None]);
        assert_eq!(segments.last().unwrap().end, 1440);
    }

    #[test]
    fn test_overnight_span_extends_horizon() {
        let candidates = vec![candidate("p", "late", 10, 1380, 1500)];
        let segments = ZoneResolver::new().resolve(&candidates, 1440).unwrap();
        assert_eq!(segments.last().unwrap().end, 1500);
        assert!(!segments.last().unwrap().is_avail());
    }

    #[test]
    fn test_equal_priority_overlap_conflicts() {
        let candidates = vec![
            candidate("a", "z1", 10, 0, 600),
            candidate("b", "z2", 10, 300, 900),
        ];
        let result = ZoneResolver::new().resolve(&candidates, 1440);
        assert!(matches!(result, Err(SchedulerError::ZoneConflict { priority: 10, .. })));
    }

    #[test]
    fn test_equal_priority_adjacent_is_fine() {
        let candidates = vec![
            candidate("a", "z1", 10, 0, 600),
            candidate("b", "z2", 10, 600, 900),
        ];
        assert!(ZoneResolver::new().resolve(&candidates, 1440).is_ok());
    }

    #[test]
    fn test_three_layers() {
        let candidates = vec![
            candidate("base", "all", 1, 0, 1440),
            candidate("mid", "block", 5, 600, 900),
            candidate("top", "special", 9, 700, 750),
        ];
        let segments = ZoneResolver::new().resolve(&candidates, 1440).unwrap();
        assert_eq!(
            zone_ids(&segments),
            vec![Some("all"), Some("block"), Some("special"), Some("block"), Some("all")]
        );
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }
}
