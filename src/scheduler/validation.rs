//! Authoring-time plan validation
//!
//! Runs the structural checks a plan must pass before it is handed to the
//! compiler. Nothing here touches a broadcast date: zones are compared on
//! their nominal windows, and day filters only matter when they are disjoint.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::models::{
    Channel, ContentType, Program, RuleFilter, SchedulePlan, ScheduleTime, VirtualDefinition,
    VirtualEntry, Zone,
};
use crate::storage::VirtualAssetStore;

/// How serious a validation finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// The compiler would reject the plan
    Error,
    /// The plan compiles but yields avails
    Warning,
}

/// Validation finding category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    ChannelMismatch,
    UnknownPattern,
    GridMisaligned,
    EmptyPattern,
    ZoneOverlap,
    InvalidRule,
    UnknownVirtualAsset,
    InvalidSlotUnits,
    VirtualAssetCycle,
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: IssueCode,
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code,
            zone_id: None,
            program_id: None,
            message: message.into(),
        }
    }

    fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            ..Self::error(code, message)
        }
    }

    fn in_zone(mut self, zone_id: &str) -> Self {
        self.zone_id = Some(zone_id.to_string());
        self
    }

    fn for_program(mut self, program_id: &str) -> Self {
        self.program_id = Some(program_id.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
        };
        write!(f, "[{}] {:?}", level, self.code)?;
        if let Some(ref zone) = self.zone_id {
            write!(f, " zone={}", zone)?;
        }
        if let Some(ref program) = self.program_id {
            write!(f, " program={}", program)?;
        }
        write!(f, ": {}", self.message)
    }
}

// ============================================================================
// Plan checks
// ============================================================================

/// Validate a plan against its channel and the channel's other plans
pub fn validate_plan(
    plan: &SchedulePlan,
    channel: &Channel,
    siblings: &[SchedulePlan],
    virtuals: &dyn VirtualAssetStore,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if plan.channel_id != channel.id {
        issues.push(ValidationIssue::error(
            IssueCode::ChannelMismatch,
            format!("plan belongs to '{}', not '{}'", plan.channel_id, channel.id),
        ));
    }
    if let Err(e) = channel.validate() {
        issues.push(ValidationIssue::error(IssueCode::GridMisaligned, e.to_string()));
        return issues;
    }

    for zone in &plan.zones {
        check_zone(plan, channel, zone, &mut issues);
    }
    check_overlaps(plan, channel, siblings, &mut issues);

    for pattern in &plan.patterns {
        for program in &pattern.programs {
            check_program(program, virtuals, &mut issues);
        }
    }

    issues
}

fn check_zone(plan: &SchedulePlan, channel: &Channel, zone: &Zone, issues: &mut Vec<ValidationIssue>) {
    match plan.pattern(&zone.pattern_id) {
        None => issues.push(
            ValidationIssue::error(
                IssueCode::UnknownPattern,
                format!("pattern '{}' is not owned by plan '{}'", zone.pattern_id, plan.id),
            )
            .in_zone(&zone.id),
        ),
        Some(pattern) if pattern.programs.is_empty() => issues.push(
            ValidationIssue::warning(
                IssueCode::EmptyPattern,
                format!("pattern '{}' has no programs; the zone will be avail", pattern.id),
            )
            .in_zone(&zone.id),
        ),
        Some(_) => {}
    }

    let block = channel.grid_block_minutes;
    if zone.declared_minutes() % block != 0 {
        issues.push(
            ValidationIssue::error(
                IssueCode::GridMisaligned,
                format!(
                    "length of {} minutes is not a multiple of the {}-minute block",
                    zone.declared_minutes(),
                    block
                ),
            )
            .in_zone(&zone.id),
        );
    }
    for label in [zone.start_time, zone.end_time] {
        if !channel.is_block_start(label.minute()) {
            issues.push(
                ValidationIssue::error(
                    IssueCode::GridMisaligned,
                    format!("boundary {} is not a block start", label),
                )
                .in_zone(&zone.id),
            );
        }
    }
}

fn check_overlaps(
    plan: &SchedulePlan,
    channel: &Channel,
    siblings: &[SchedulePlan],
    issues: &mut Vec<ValidationIssue>,
) {
    let day_start = channel.programming_day_start;
    let zones: Vec<&Zone> = plan.zones.iter().filter(|z| z.enabled).collect();

    for (i, a) in zones.iter().enumerate() {
        for b in &zones[i + 1..] {
            if windows_overlap(a, b, day_start) && days_intersect(&a.day_filters, &b.day_filters) {
                issues.push(
                    ValidationIssue::error(
                        IssueCode::ZoneOverlap,
                        format!("overlaps zone '{}' of the same plan", b.id),
                    )
                    .in_zone(&a.id),
                );
            }
        }
    }

    for other in siblings
        .iter()
        .filter(|o| o.id != plan.id && o.priority == plan.priority && o.is_active)
    {
        if !days_intersect(&plan.validity.days_of_week, &other.validity.days_of_week) {
            continue;
        }
        for a in &zones {
            for b in other.zones.iter().filter(|z| z.enabled) {
                if windows_overlap(a, b, day_start) && days_intersect(&a.day_filters, &b.day_filters) {
                    issues.push(
                        ValidationIssue::error(
                            IssueCode::ZoneOverlap,
                            format!(
                                "overlaps zone '{}' of plan '{}' at equal priority {}",
                                b.id, other.id, plan.priority
                            ),
                        )
                        .in_zone(&a.id),
                    );
                }
            }
        }
    }
}

fn windows_overlap(a: &Zone, b: &Zone, day_start: ScheduleTime) -> bool {
    let (a_start, a_end) = a.nominal_window(day_start);
    let (b_start, b_end) = b.nominal_window(day_start);
    a_start < b_end && b_start < a_end
}

fn days_intersect(a: &[Weekday], b: &[Weekday]) -> bool {
    a.is_empty() || b.is_empty() || a.iter().any(|d| b.contains(d))
}

fn check_program(program: &Program, virtuals: &dyn VirtualAssetStore, issues: &mut Vec<ValidationIssue>) {
    if program.slot_units == Some(0) {
        issues.push(
            ValidationIssue::error(IssueCode::InvalidSlotUnits, "slot_units must be at least 1")
                .for_program(&program.id),
        );
    }

    match program.content_type {
        ContentType::Rule | ContentType::Random => {
            if let Err(e) = RuleFilter::parse(&program.content_ref) {
                issues.push(ValidationIssue::error(IssueCode::InvalidRule, e.to_string()).for_program(&program.id));
            }
        }
        ContentType::VirtualPackage => {
            let mut path = Vec::new();
            let mut checked = HashSet::new();
            if let Some(issue) = find_cycle(&program.content_ref, virtuals, &mut path, &mut checked) {
                issues.push(issue.for_program(&program.id));
            }
        }
        ContentType::Asset | ContentType::Series => {}
    }
}

/// Depth-first walk over virtual asset references
fn find_cycle(
    virtual_id: &str,
    virtuals: &dyn VirtualAssetStore,
    path: &mut Vec<String>,
    checked: &mut HashSet<String>,
) -> Option<ValidationIssue> {
    if let Some(pos) = path.iter().position(|id| id == virtual_id) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(virtual_id.to_string());
        return Some(ValidationIssue::error(
            IssueCode::VirtualAssetCycle,
            format!("virtual asset cycle: {}", cycle.join(" -> ")),
        ));
    }
    if checked.contains(virtual_id) {
        return None;
    }

    let definition = match virtuals.lookup_virtual(virtual_id) {
        Ok(Some(definition)) => definition,
        Ok(None) => {
            return Some(ValidationIssue::error(
                IssueCode::UnknownVirtualAsset,
                format!("virtual asset '{}' not found", virtual_id),
            ))
        }
        Err(e) => return Some(ValidationIssue::error(IssueCode::UnknownVirtualAsset, e.to_string())),
    };

    path.push(virtual_id.to_string());
    let found = match &definition.definition {
        VirtualDefinition::Fixed { entries } => entries.iter().find_map(|entry| match entry {
            VirtualEntry::Dynamic { program } if program.content_type == ContentType::VirtualPackage => {
                find_cycle(&program.content_ref, virtuals, path, checked)
            }
            _ => None,
        }),
        VirtualDefinition::RuleBased { .. } => None,
    };
    path.pop();
    checked.insert(virtual_id.to_string());
    found
}
