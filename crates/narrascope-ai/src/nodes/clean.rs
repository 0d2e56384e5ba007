use std::collections::HashSet;

use narrascope_core::{
    ClassificationState, FuzzyMatchRecord, Label, Level, MatchKind, StateDelta,
};
use tracing::debug;

use super::NodeContext;

pub(super) fn clean_narratives(state: &ClassificationState, ctx: &NodeContext) -> StateDelta {
    let labels = state.narratives.as_deref().unwrap_or_default();
    let context = state.category.as_deref().unwrap_or_default();
    let (narratives, fuzzy_matches) = clean_labels(ctx, Level::Narrative, labels, context);
    StateDelta {
        narratives: Some(narratives),
        fuzzy_matches,
        ..Default::default()
    }
}

pub(super) fn clean_subnarratives(state: &ClassificationState, ctx: &NodeContext) -> StateDelta {
    let labels = state.subnarratives.as_deref().unwrap_or_default();
    let context = state.narrative_names().join(";");
    let (subnarratives, fuzzy_matches) = clean_labels(ctx, Level::Subnarrative, labels, &context);
    StateDelta {
        subnarratives: Some(subnarratives),
        fuzzy_matches,
        ..Default::default()
    }
}

/// Nothing survived the narrative stage: settle both levels so the writer
/// sees explicit empty lists.
pub(super) fn handle_empty_narratives(state: &ClassificationState) -> StateDelta {
    debug!(file_id = %state.file_id, "no narratives, skipping subnarratives");
    StateDelta {
        narratives: state.narratives.is_none().then(Vec::new),
        subnarratives: Some(Vec::new()),
        ..Default::default()
    }
}

/// Reconcile model labels with the taxonomy. Exact names pass through, the
/// narrative-level "Other" sentinel is kept, near misses are repaired when
/// fuzzy matching is on, and everything else is dropped. Duplicate names
/// after repair keep their first occurrence.
fn clean_labels(
    ctx: &NodeContext,
    level: Level,
    labels: &[Label],
    context: &str,
) -> (Vec<Label>, Vec<FuzzyMatchRecord>) {
    let fuzzy = &ctx.config.fuzzy;
    let matcher = fuzzy
        .enabled
        .then(|| ctx.matchers.get(level, fuzzy.threshold));

    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    let mut records = Vec::new();
    for label in labels {
        let repaired = if label.is_other() {
            (level == Level::Narrative).then(|| label.clone())
        } else if let Some(matcher) = &matcher {
            let result = matcher.best_match(&label.name, context);
            records.push(FuzzyMatchRecord {
                level,
                original: label.name.clone(),
                matched: result.matched.clone(),
                score: result.score,
                kind: result.kind,
            });
            match (result.kind, result.matched) {
                (MatchKind::Exact, _) => Some(label.clone()),
                (MatchKind::Fuzzy, Some(name)) => Some(label.renamed(name)),
                _ => None,
            }
        } else {
            ctx.taxonomy
                .contains(level, &label.name)
                .then(|| label.clone())
        };

        match repaired {
            Some(label) => {
                if seen.insert(label.name.clone()) {
                    cleaned.push(label);
                }
            }
            None => debug!(%level, label = %label.name, "dropped label outside taxonomy"),
        }
    }
    (cleaned, records)
}
