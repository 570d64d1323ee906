//! Assignee selection: first matching rule that yields a candidate wins.

use chrono::{DateTime, Utc};

use crate::directory::{Assignee, Directory};
use crate::rules::{AutoAssignmentRule, SelectionStrategy};

/// The winning assignee and the rule that picked them.
#[derive(Debug, Clone)]
pub struct Selection {
    pub assignee_id: String,
    pub rule_id: String,
}

/// Walk `rules` (already filtered and priority-sorted) and return the first pick.
///
/// Later rules are never consulted once one produces a candidate.
pub fn find_best_assignee(
    rules: &[AutoAssignmentRule],
    directory: &Directory,
    task_data: &serde_json::Value,
    default_max_workload: u32,
) -> Option<Selection> {
    for rule in rules {
        let pool = directory.available();
        let picked = apply_strategy(rule, &pool, directory, task_data, default_max_workload);
        match picked {
            Some(assignee) => {
                tracing::debug!(
                    "🎯 Rule '{}' ({}) picked {}",
                    rule.name,
                    rule.logic.strategy.name(),
                    assignee.id
                );
                return Some(Selection {
                    assignee_id: assignee.id.clone(),
                    rule_id: rule.id.clone(),
                });
            }
            None => tracing::debug!(
                "Rule '{}' ({}) found no candidate",
                rule.name,
                rule.logic.strategy.name()
            ),
        }
    }
    None
}

fn apply_strategy<'a>(
    rule: &AutoAssignmentRule,
    pool: &[&'a Assignee],
    directory: &'a Directory,
    task_data: &serde_json::Value,
    default_max_workload: u32,
) -> Option<&'a Assignee> {
    match &rule.logic.strategy {
        SelectionStrategy::WorkloadBased { max_workload } => {
            let ceiling = max_workload.unwrap_or(default_max_workload);
            least_loaded(pool.iter().copied().filter(|a| a.workload < ceiling))
        }
        SelectionStrategy::ExpertiseMatch => {
            let required = required_expertise(task_data);
            least_loaded(
                pool.iter()
                    .copied()
                    .filter(|a| a.expertise.iter().any(|tag| required.contains(&tag.as_str()))),
            )
        }
        SelectionStrategy::RoundRobin => pool
            .iter()
            .copied()
            .min_by_key(|a| a.last_active.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)),
        SelectionStrategy::Availability => {
            least_loaded(pool.iter().copied().filter(|a| a.is_available()))
        }
        SelectionStrategy::Fallback => rule
            .logic
            .fallback_assignee
            .as_deref()
            .and_then(|id| directory.get(id).ok()),
    }
}

/// Minimum workload; the first one seen wins ties.
fn least_loaded<'a>(candidates: impl Iterator<Item = &'a Assignee>) -> Option<&'a Assignee> {
    candidates.min_by_key(|a| a.workload)
}

fn required_expertise(task_data: &serde_json::Value) -> Vec<&str> {
    task_data["requiredExpertise"]
        .as_array()
        .map(|tags| tags.iter().filter_map(|t| t.as_str()).collect())
        .unwrap_or_default()
}
