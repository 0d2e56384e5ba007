//! The steps of the classification graph.
//!
//! Every node reads the document state plus shared collaborators and returns a
//! [`StateDelta`]; none of them mutate the state or the collaborators.

mod aggregate;
mod category;
mod clean;
mod narratives;
mod subnarratives;
mod text;
mod validate;
mod writer;

pub mod route;

use std::sync::Arc;

use narrascope_core::{ClassificationState, ClassifierConfig, NodeKind, StateDelta, Taxonomy};
use narrascope_llm::{LlmClient, LlmRequest};
use narrascope_store::ResultSink;

use crate::error::ClassifyError;
use crate::fuzzy::MatcherRegistry;
use crate::retry::RetryExecutor;
use crate::structured::Extractor;

pub use category::parse_category;
pub use text::clean_text;
pub use validate::{MAX_NARRATIVE_RETRIES, MAX_SUBNARRATIVE_RETRIES};

/// Collaborators shared by every document in a run.
pub struct NodeContext {
    pub llm: Arc<dyn LlmClient>,
    pub taxonomy: Arc<Taxonomy>,
    pub matchers: Arc<MatcherRegistry>,
    pub retry: RetryExecutor,
    pub sink: Arc<dyn ResultSink>,
    pub config: Arc<ClassifierConfig>,
}

impl NodeContext {
    pub fn extractor(&self) -> Extractor<'_> {
        Extractor::new(self.llm.as_ref(), &self.retry)
    }

    /// Request for `node` with its resolved call parameters.
    pub fn request(&self, node: NodeKind, system: String, user: String) -> LlmRequest {
        let params = self.config.call_params(node);
        LlmRequest::new(system, user)
            .with_model(params.model)
            .with_temperature(params.temperature)
            .with_max_tokens(params.max_tokens)
            .with_seed_for(self.llm.provider_id(), params.seed)
    }
}

/// Execute one node.
pub async fn run(
    node: NodeKind,
    state: &ClassificationState,
    ctx: &NodeContext,
) -> Result<StateDelta, ClassifyError> {
    let delta = match node {
        NodeKind::CleanText => text::clean_text_node(state),
        NodeKind::ClassifyCategory => category::classify_category(state, ctx).await?,
        NodeKind::HandleOtherCategory => category::handle_other_category(),
        NodeKind::ClassifyNarratives => narratives::classify_narratives(state, ctx).await?,
        NodeKind::ValidateNarratives => validate::validate_narratives(state, ctx).await?,
        NodeKind::AggregateNarratives => aggregate::aggregate_narratives(state, ctx),
        NodeKind::CleanNarratives => clean::clean_narratives(state, ctx),
        NodeKind::HandleEmptyNarratives => clean::handle_empty_narratives(state),
        NodeKind::ClassifySubnarratives => subnarratives::classify_subnarratives(state, ctx).await?,
        NodeKind::ValidateSubnarratives => validate::validate_subnarratives(state, ctx).await?,
        NodeKind::AggregateSubnarratives => aggregate::aggregate_subnarratives(state, ctx),
        NodeKind::CleanSubnarratives => clean::clean_subnarratives(state, ctx),
        NodeKind::ResultWriter => writer::write_results(state, ctx).await,
    };
    Ok(delta)
}
