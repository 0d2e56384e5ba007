use narrascope_core::{AgentOutcome, ClassificationState, Label, NodeKind, StateDelta};
use tracing::{debug, info, warn};

use super::NodeContext;
use crate::aggregate::pool_by_agent;
use crate::error::ClassifyError;
use crate::prompts;
use crate::structured::SubnarrativeResponse;

const OPERATION: &str = "classify_subnarratives";

pub(super) async fn classify_subnarratives(
    state: &ClassificationState,
    ctx: &NodeContext,
) -> Result<StateDelta, ClassifyError> {
    let agents = ctx.config.subnarrative.agents;
    let extractor = ctx.extractor();
    let text = state.working_text();

    let mut single: Vec<Label> = Vec::new();
    let mut per_narrative: Vec<Vec<Vec<Label>>> = Vec::new();
    let mut outcomes = Vec::new();

    let narratives = state
        .narratives
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter(|n| !n.is_other());
    for narrative in narratives {
        let candidates = ctx.taxonomy.subnarratives_of(&narrative.name);
        if candidates.is_empty() {
            debug!(narrative = %narrative.name, "narrative has no subnarratives");
            continue;
        }
        let (system, user) = prompts::subnarratives(
            &ctx.taxonomy,
            &narrative.name,
            candidates,
            text,
            &state.subnarrative_feedback,
        );
        let request = ctx.request(NodeKind::ClassifySubnarratives, system, user);

        // Calls stay sequential across narratives and agents alike.
        if agents <= 1 {
            match extractor.extract::<SubnarrativeResponse>(request, OPERATION).await {
                Ok(response) => single.extend(response.subnarratives),
                Err(err) => warn!(
                    narrative = %narrative.name,
                    error_kind = %err.kind(),
                    error = %err,
                    "subnarrative call failed, leaving this narrative empty"
                ),
            }
            continue;
        }

        let mut lists = Vec::with_capacity(agents);
        for agent_id in 0..agents {
            match extractor
                .extract::<SubnarrativeResponse>(request.clone(), OPERATION)
                .await
            {
                Ok(response) => {
                    outcomes.push(
                        AgentOutcome::success(agent_id, response.subnarratives.len())
                            .for_narrative(&narrative.name),
                    );
                    lists.push(response.subnarratives);
                }
                Err(err) => {
                    let kind = err.kind();
                    warn!(
                        agent_id,
                        narrative = %narrative.name,
                        error_kind = %kind,
                        error = %err,
                        "subnarrative agent failed"
                    );
                    outcomes.push(
                        AgentOutcome::failure(agent_id, kind.as_str(), err.to_string())
                            .for_narrative(&narrative.name),
                    );
                    lists.push(Vec::new());
                }
            }
        }
        per_narrative.push(lists);
    }

    let retries = Some(state.subnarrative_retries + 1);
    if agents <= 1 {
        info!(count = single.len(), "subnarratives classified");
        return Ok(StateDelta {
            subnarratives: Some(single),
            subnarrative_retries: retries,
            ..Default::default()
        });
    }

    info!(
        agents,
        narratives = per_narrative.len(),
        failed = outcomes.iter().filter(|o| !o.is_success()).count(),
        "subnarrative agents finished"
    );
    Ok(StateDelta {
        agent_subnarratives: Some(Some(pool_by_agent(&per_narrative, agents))),
        subnarrative_retries: retries,
        subnarrative_outcomes: outcomes,
        ..Default::default()
    })
}
