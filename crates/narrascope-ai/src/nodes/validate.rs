use narrascope_core::{
    APPROVED, AggregationMethod, ClassificationState, Label, Level, NodeKind, OTHER, StateDelta,
    Strategy,
};
use tracing::{debug, info};

use super::NodeContext;
use crate::aggregate::aggregate;
use crate::error::ClassifyError;
use crate::prompts;
use crate::structured::ValidationResponse;

/// Critic rejections tolerated before the narrative labels are accepted as is.
pub const MAX_NARRATIVE_RETRIES: u32 = 3;
/// Critic rejections tolerated at the subnarrative level.
pub const MAX_SUBNARRATIVE_RETRIES: u32 = 1;

pub(super) async fn validate_narratives(
    state: &ClassificationState,
    ctx: &NodeContext,
) -> Result<StateDelta, ClassifyError> {
    if state.narrative_retries > MAX_NARRATIVE_RETRIES {
        info!(retries = state.narrative_retries, "narrative retry budget spent, accepting");
        return Ok(verdict_delta(Level::Narrative, APPROVED.to_string()));
    }

    let scope = match ctx.config.strategy {
        Strategy::Hierarchical => state.category.as_deref(),
        Strategy::Flat => None,
    };
    let allowed: Vec<&str> = ctx
        .taxonomy
        .narratives_in(scope)
        .into_iter()
        .map(|n| n.name.as_str())
        .collect();
    let labels = under_review(state.narratives.as_deref(), state.agent_narratives.as_deref());

    let feedback = review(
        ctx,
        NodeKind::ValidateNarratives,
        Level::Narrative,
        &allowed,
        &labels,
        state,
    )
    .await?;
    Ok(verdict_delta(Level::Narrative, feedback))
}

pub(super) async fn validate_subnarratives(
    state: &ClassificationState,
    ctx: &NodeContext,
) -> Result<StateDelta, ClassifyError> {
    if state.subnarrative_retries > MAX_SUBNARRATIVE_RETRIES {
        info!(retries = state.subnarrative_retries, "subnarrative retry budget spent, accepting");
        return Ok(verdict_delta(Level::Subnarrative, APPROVED.to_string()));
    }

    let allowed: Vec<&str> = state
        .narrative_names()
        .into_iter()
        .filter(|name| *name != OTHER)
        .flat_map(|name| ctx.taxonomy.subnarratives_of(name))
        .map(String::as_str)
        .collect();
    let labels = under_review(
        state.subnarratives.as_deref(),
        state.agent_subnarratives.as_deref(),
    );

    let feedback = review(
        ctx,
        NodeKind::ValidateSubnarratives,
        Level::Subnarrative,
        &allowed,
        &labels,
        state,
    )
    .await?;
    Ok(verdict_delta(Level::Subnarrative, feedback))
}

/// Labels the critic sees: the single-agent result, or every agent's labels
/// when an ensemble has not been aggregated yet.
fn under_review(labels: Option<&[Label]>, per_agent: Option<&[Vec<Label>]>) -> Vec<Label> {
    match (labels, per_agent) {
        (Some(labels), _) => labels.to_vec(),
        (None, Some(per_agent)) => aggregate(per_agent, AggregationMethod::Union, per_agent.len()),
        (None, None) => Vec::new(),
    }
}

async fn review(
    ctx: &NodeContext,
    node: NodeKind,
    level: Level,
    allowed: &[&str],
    labels: &[Label],
    state: &ClassificationState,
) -> Result<String, ClassifyError> {
    let (system, user) = prompts::validation(level, allowed, labels, state.working_text());
    let request = ctx.request(node, system, user);
    let verdict: ValidationResponse = ctx.extractor().extract(request, node.as_str()).await?;

    // An empty rejection is an approval.
    if verdict.is_valid || verdict.feedback.trim().is_empty() {
        debug!(%level, "critic approved");
        Ok(APPROVED.to_string())
    } else {
        info!(%level, feedback = %verdict.feedback, "critic requested revision");
        Ok(verdict.feedback)
    }
}

fn verdict_delta(level: Level, feedback: String) -> StateDelta {
    match level {
        Level::Narrative => StateDelta {
            narrative_feedback: Some(feedback),
            ..Default::default()
        },
        Level::Subnarrative => StateDelta {
            subnarrative_feedback: Some(feedback),
            ..Default::default()
        },
    }
}
