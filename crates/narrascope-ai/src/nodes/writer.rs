use narrascope_core::{ClassificationState, StateDelta};
use narrascope_store::{DocumentResult, VoteRecord, VoteSettings};
use tracing::{error, info};

use super::NodeContext;

/// Terminal node. Sink failures are logged here and never leave the node.
pub(super) async fn write_results(state: &ClassificationState, ctx: &NodeContext) -> StateDelta {
    let result = DocumentResult::from_state(state);
    match ctx.sink.write_result(&result).await {
        Ok(()) => info!(
            narratives = result.narratives.len(),
            subnarratives = result.subnarratives.len(),
            "results written"
        ),
        Err(e) => error!(error = %e, "failed to write results"),
    }

    if !ctx.config.save_votes {
        return StateDelta::none();
    }
    let settings = VoteSettings {
        narrative_method: ctx.config.narrative.aggregation,
        narrative_agents: ctx.config.narrative.agents,
        subnarrative_method: ctx.config.subnarrative.aggregation,
        subnarrative_agents: ctx.config.subnarrative.agents,
    };
    if let Some(votes) = VoteRecord::from_state(state, settings)
        && let Err(e) = ctx.sink.write_votes(&votes).await
    {
        error!(error = %e, "failed to write votes");
    }
    StateDelta::none()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use narrascope_core::{AgentOutcome, ClassifierConfig, Label};
    use narrascope_store::{ResultSink, StoreError};

    use super::*;
    use crate::nodes::testing::context;

    struct BrokenSink;

    #[async_trait]
    impl ResultSink for BrokenSink {
        async fn write_result(&self, result: &DocumentResult) -> Result<(), StoreError> {
            Err(StoreError::InvalidFileId(result.file_id.clone()))
        }

        async fn write_votes(&self, votes: &VoteRecord) -> Result<(), StoreError> {
            Err(StoreError::InvalidFileId(votes.file_id.clone()))
        }
    }

    fn ensemble_state() -> ClassificationState {
        let mut state = ClassificationState::new("doc1", "text");
        state.narratives = Some(vec![Label::new("URW: A")]);
        state.subnarratives = Some(vec![]);
        state.narrative_votes = Some(vec![vec![Label::new("URW: A")], vec![]]);
        state.narrative_outcomes = vec![
            AgentOutcome::success(0, 1),
            AgentOutcome::failure(1, "timeout", "timed out".into()),
        ];
        state
    }

    #[tokio::test]
    async fn writes_line_and_votes() {
        let (ctx, _, sink) = context(ClassifierConfig::default(), vec![]);
        write_results(&ensemble_state(), &ctx).await;
        assert_eq!(sink.lines(), vec!["doc1\tURW: A\tOther".to_string()]);
        let votes = sink.votes();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].narrative.as_ref().unwrap().outcomes.len(), 2);
    }

    #[tokio::test]
    async fn votes_skipped_when_disabled_or_single_agent() {
        let config = ClassifierConfig {
            save_votes: false,
            ..Default::default()
        };
        let (ctx, _, sink) = context(config, vec![]);
        write_results(&ensemble_state(), &ctx).await;
        assert!(sink.votes().is_empty());

        let (ctx, _, sink) = context(ClassifierConfig::default(), vec![]);
        write_results(&ClassificationState::new("doc2", "text"), &ctx).await;
        assert_eq!(sink.lines(), vec!["doc2\tOther\tOther".to_string()]);
        assert!(sink.votes().is_empty());
    }

    #[tokio::test]
    async fn sink_failure_is_swallowed() {
        let (mut ctx, _, _) = context(ClassifierConfig::default(), vec![]);
        ctx.sink = Arc::new(BrokenSink);
        let delta = write_results(&ensemble_state(), &ctx).await;
        assert_eq!(delta, StateDelta::none());
    }
}
