use narrascope_core::{ClassificationState, StateDelta};
use tracing::{info, warn};

use super::NodeContext;
use crate::aggregate::aggregate;

pub(super) fn aggregate_narratives(state: &ClassificationState, ctx: &NodeContext) -> StateDelta {
    let level = &ctx.config.narrative;
    let Some(per_agent) = state.agent_narratives.clone() else {
        warn!("no agent narratives to aggregate");
        return StateDelta {
            narratives: state.narratives.is_none().then(Vec::new),
            ..Default::default()
        };
    };
    let merged = aggregate(&per_agent, level.aggregation, level.agents);
    info!(
        method = level.aggregation.as_str(),
        agents = per_agent.len(),
        kept = merged.len(),
        "narratives aggregated"
    );
    StateDelta {
        narratives: Some(merged),
        agent_narratives: Some(None),
        narrative_votes: Some(per_agent),
        ..Default::default()
    }
}

pub(super) fn aggregate_subnarratives(
    state: &ClassificationState,
    ctx: &NodeContext,
) -> StateDelta {
    let level = &ctx.config.subnarrative;
    let Some(per_agent) = state.agent_subnarratives.clone() else {
        warn!("no agent subnarratives to aggregate");
        return StateDelta {
            subnarratives: state.subnarratives.is_none().then(Vec::new),
            ..Default::default()
        };
    };
    let merged = aggregate(&per_agent, level.aggregation, level.agents);
    info!(
        method = level.aggregation.as_str(),
        agents = per_agent.len(),
        kept = merged.len(),
        "subnarratives aggregated"
    );
    StateDelta {
        subnarratives: Some(merged),
        agent_subnarratives: Some(None),
        subnarrative_votes: Some(per_agent),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::testing::{context, names};
    use narrascope_core::{AggregationMethod, ClassifierConfig, Label};

    fn agents(lists: &[&[&str]]) -> Vec<Vec<Label>> {
        lists
            .iter()
            .map(|names| names.iter().map(|n| Label::new(*n)).collect())
            .collect()
    }

    fn config(method: AggregationMethod) -> ClassifierConfig {
        let mut config = ClassifierConfig::default();
        config.narrative.agents = 3;
        config.narrative.aggregation = method;
        config
    }

    #[test]
    fn consumes_agent_lists_and_keeps_votes() {
        let (ctx, _, _) = context(config(AggregationMethod::Majority), vec![]);
        let mut state = ClassificationState::new("doc1", "text");
        state.agent_narratives = Some(agents(&[&["A", "B"], &["A", "C"], &["B", "A"]]));

        let delta = aggregate_narratives(&state, &ctx);
        assert_eq!(names(delta.narratives.as_deref().unwrap()), vec!["A", "B"]);
        assert_eq!(delta.agent_narratives, Some(None));
        assert_eq!(delta.narrative_votes.as_ref().unwrap().len(), 3);

        state.apply(delta);
        assert!(state.agent_narratives.is_none());
        assert!(state.has_agent_data());
    }

    #[test]
    fn intersection_with_failed_agent_is_empty() {
        let (ctx, _, _) = context(config(AggregationMethod::Intersection), vec![]);
        let mut state = ClassificationState::new("doc1", "text");
        state.agent_narratives = Some(agents(&[&["A"], &[], &["A"]]));
        let delta = aggregate_narratives(&state, &ctx);
        assert_eq!(delta.narratives, Some(Vec::new()));
    }

    #[test]
    fn missing_agent_data_leaves_explicit_empty() {
        let (ctx, _, _) = context(ClassifierConfig::default(), vec![]);
        let state = ClassificationState::new("doc1", "text");
        let delta = aggregate_subnarratives(&state, &ctx);
        assert_eq!(delta.subnarratives, Some(Vec::new()));
        assert!(delta.subnarrative_votes.is_none());
    }
}
