use narrascope_core::{ClassificationState, Label, NodeKind, OTHER, StateDelta};
use tracing::info;

use super::NodeContext;
use crate::error::ClassifyError;
use crate::prompts;

pub(super) async fn classify_category(
    state: &ClassificationState,
    ctx: &NodeContext,
) -> Result<StateDelta, ClassifyError> {
    let (system, user) = prompts::category(&ctx.taxonomy, state.working_text());
    let request = ctx.request(NodeKind::ClassifyCategory, system, user);
    let reply = ctx
        .retry
        .invoke("classify_category", || ctx.llm.invoke(&request))
        .await?;

    let category = parse_category(&reply, &ctx.taxonomy.category_names());
    info!(category = %category, "category assigned");
    Ok(StateDelta {
        category: Some(category),
        ..Default::default()
    })
}

pub(super) fn handle_other_category() -> StateDelta {
    StateDelta {
        narratives: Some(vec![Label::other()]),
        subnarratives: Some(vec![Label::other()]),
        ..Default::default()
    }
}

/// Pull a category code out of a free-text reply.
///
/// The whole reply is tried first, then each word in order; matching ignores
/// case and surrounding punctuation. Anything unrecognised is `Other`.
pub fn parse_category(reply: &str, codes: &[&str]) -> String {
    let lookup = |token: &str| {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        codes
            .iter()
            .find(|code| code.eq_ignore_ascii_case(token))
            .map(|code| code.to_string())
    };
    lookup(reply.trim())
        .or_else(|| reply.split_whitespace().find_map(lookup))
        .unwrap_or_else(|| OTHER.to_string())
}
