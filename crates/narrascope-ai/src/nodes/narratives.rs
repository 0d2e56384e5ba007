use narrascope_core::{AgentOutcome, ClassificationState, Label, NodeKind, StateDelta, Strategy};
use tracing::{info, warn};

use super::NodeContext;
use crate::error::ClassifyError;
use crate::prompts;
use crate::structured::NarrativeResponse;

pub(super) async fn classify_narratives(
    state: &ClassificationState,
    ctx: &NodeContext,
) -> Result<StateDelta, ClassifyError> {
    let scope = match ctx.config.strategy {
        Strategy::Hierarchical => state.category.as_deref(),
        Strategy::Flat => None,
    };
    let candidates = ctx.taxonomy.narratives_in(scope);
    let (system, user) = prompts::narratives(
        &ctx.taxonomy,
        &candidates,
        state.working_text(),
        &state.narrative_feedback,
    );
    let request = ctx.request(NodeKind::ClassifyNarratives, system, user);
    let retries = Some(state.narrative_retries + 1);
    let extractor = ctx.extractor();

    let agents = ctx.config.narrative.agents;
    if agents <= 1 {
        let response: NarrativeResponse = extractor
            .extract(request, "classify_narratives")
            .await?;
        info!(count = response.narratives.len(), "narratives classified");
        return Ok(StateDelta {
            narratives: Some(response.narratives),
            narrative_retries: retries,
            ..Default::default()
        });
    }

    // Agents run one after another to keep bursts under provider rate limits.
    let mut per_agent: Vec<Vec<Label>> = Vec::with_capacity(agents);
    let mut outcomes = Vec::with_capacity(agents);
    for agent_id in 0..agents {
        match extractor
            .extract::<NarrativeResponse>(request.clone(), "classify_narratives")
            .await
        {
            Ok(response) => {
                outcomes.push(AgentOutcome::success(agent_id, response.narratives.len()));
                per_agent.push(response.narratives);
            }
            Err(err) => {
                let kind = err.kind();
                warn!(agent_id, error_kind = %kind, error = %err, "narrative agent failed");
                outcomes.push(AgentOutcome::failure(agent_id, kind.as_str(), err.to_string()));
                per_agent.push(Vec::new());
            }
        }
    }
    info!(
        agents,
        failed = outcomes.iter().filter(|o| !o.is_success()).count(),
        "narrative agents finished"
    );

    Ok(StateDelta {
        agent_narratives: Some(Some(per_agent)),
        narrative_retries: retries,
        narrative_outcomes: outcomes,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::testing::{context, names};
    use narrascope_core::{AgentStatus, ClassifierConfig};
    use narrascope_llm::LlmError;

    fn in_category(category: &str) -> ClassificationState {
        let mut state = ClassificationState::new("doc1", "text");
        state.category = Some(category.into());
        state
    }

    #[tokio::test]
    async fn single_agent_sets_narratives_and_counts_attempt() {
        let (ctx, llm, _) = context(
            ClassifierConfig::default(),
            vec![Ok(r#"{"narratives": [{"name": "URW: A", "evidence_quote": "q"}]}"#.into())],
        );
        let delta = classify_narratives(&in_category("URW"), &ctx).await.unwrap();
        assert_eq!(names(delta.narratives.as_deref().unwrap()), vec!["URW: A"]);
        assert_eq!(delta.narrative_retries, Some(1));
        assert!(delta.agent_narratives.is_none());

        let system = &llm.requests.lock().unwrap()[0].system;
        assert!(system.contains("URW: B"));
        assert!(!system.contains("CC: D"));
    }

    #[tokio::test]
    async fn flat_strategy_offers_every_narrative() {
        let config = ClassifierConfig {
            strategy: Strategy::Flat,
            ..Default::default()
        };
        let (ctx, llm, _) = context(config, vec![Ok(r#"{"narratives": []}"#.into())]);
        let state = ClassificationState::new("doc1", "text");
        let delta = classify_narratives(&state, &ctx).await.unwrap();
        assert_eq!(delta.narratives, Some(Vec::new()));

        let system = &llm.requests.lock().unwrap()[0].system;
        assert!(system.contains("URW: A"));
        assert!(system.contains("CC: D"));
    }

    #[tokio::test]
    async fn critic_feedback_reaches_the_prompt() {
        let (ctx, llm, _) = context(
            ClassifierConfig::default(),
            vec![Ok(r#"{"narratives": []}"#.into())],
        );
        let mut state = in_category("URW");
        state.narrative_feedback = "URW: C is not supported".into();
        state.narrative_retries = 1;
        let delta = classify_narratives(&state, &ctx).await.unwrap();
        assert_eq!(delta.narrative_retries, Some(2));
        assert!(llm.requests.lock().unwrap()[0].user.contains("URW: C is not supported"));
    }

    #[tokio::test]
    async fn failed_agent_contributes_empty_list() {
        let mut config = ClassifierConfig::default();
        config.narrative.agents = 3;
        let (ctx, llm, _) = context(
            config,
            vec![
                Ok(r#"{"narratives": [{"name": "URW: A"}]}"#.into()),
                Err(LlmError::provider("blocked by content_filter")),
                Ok(r#"{"narratives": [{"name": "URW: A"}, {"name": "URW: B"}]}"#.into()),
            ],
        );
        let delta = classify_narratives(&in_category("URW"), &ctx).await.unwrap();
        assert_eq!(llm.calls(), 3);
        assert!(delta.narratives.is_none());

        let per_agent = delta.agent_narratives.unwrap().unwrap();
        assert_eq!(per_agent.len(), 3);
        assert!(per_agent[1].is_empty());
        assert_eq!(names(&per_agent[2]), vec!["URW: A", "URW: B"]);

        let outcomes = &delta.narrative_outcomes;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[1].status, AgentStatus::Failure);
        assert_eq!(outcomes[1].error_kind.as_deref(), Some("content_filter"));
        assert_eq!(outcomes[2].label_count, 2);
    }
}
