//! Merging per-agent label sets.
//!
//! Labels are compared by name. The retained instance (with its evidence and
//! reasoning) is always the one from the earliest agent that produced the
//! name, and output order follows first appearance. A failed agent is passed
//! in as an empty set, so failures can only shrink intersection and majority
//! results.

use std::collections::{HashMap, HashSet};

use narrascope_core::{AggregationMethod, Label};

/// Combine `per_agent` label sets. `num_agents` is the configured agent count
/// used as the divisor for majority and the quorum for intersection; it is
/// normally `per_agent.len()`.
pub fn aggregate(
    per_agent: &[Vec<Label>],
    method: AggregationMethod,
    num_agents: usize,
) -> Vec<Label> {
    if per_agent.is_empty() {
        return Vec::new();
    }

    // Number of agents that produced each name, counting each agent once.
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for labels in per_agent {
        let names: HashSet<&str> = labels.iter().map(|l| l.name.as_str()).collect();
        for name in names {
            *counts.entry(name).or_default() += 1;
        }
    }

    let keep = |name: &str| -> bool {
        let count = counts.get(name).copied().unwrap_or(0);
        match method {
            AggregationMethod::Union => count > 0,
            AggregationMethod::Intersection => {
                count >= num_agents.max(1) && count == per_agent.len()
            }
            // Strictly more than half: a tie at exactly half is excluded.
            AggregationMethod::Majority => count * 2 > num_agents,
        }
    };

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for label in per_agent.iter().flatten() {
        if keep(&label.name) && seen.insert(label.name.as_str()) {
            merged.push(label.clone());
        }
    }
    merged
}

/// Per-agent pooling for the subnarrative level: agent `i`'s outputs across
/// every narrative are concatenated into one list, giving one list per agent.
///
/// `per_narrative[n][i]` is agent `i`'s output for narrative `n`.
pub fn pool_by_agent(per_narrative: &[Vec<Vec<Label>>], num_agents: usize) -> Vec<Vec<Label>> {
    let mut pooled = vec![Vec::new(); num_agents];
    for agents in per_narrative {
        for (i, labels) in agents.iter().enumerate().take(num_agents) {
            pooled[i].extend(labels.iter().cloned());
        }
    }
    pooled
}
