//! Branch decisions for conditional edges.

use narrascope_core::{APPROVED, ClassificationState, OTHER};

pub const OTHER_BRANCH: &str = "other";
pub const CONTINUE: &str = "continue";
pub const RETRY: &str = "retry";
pub const APPROVED_BRANCH: &str = "approved";
pub const EMPTY: &str = "empty";

/// After category classification.
pub fn category(state: &ClassificationState) -> &'static str {
    match state.category.as_deref() {
        None | Some(OTHER) => OTHER_BRANCH,
        Some(_) => CONTINUE,
    }
}

/// After the narrative critic.
pub fn narrative_review(state: &ClassificationState) -> &'static str {
    review(&state.narrative_feedback)
}

/// After the subnarrative critic.
pub fn subnarrative_review(state: &ClassificationState) -> &'static str {
    review(&state.subnarrative_feedback)
}

fn review(feedback: &str) -> &'static str {
    if feedback == APPROVED {
        APPROVED_BRANCH
    } else {
        RETRY
    }
}

/// At the end of the narrative stage: an empty list, or nothing but "Other",
/// skips subnarrative classification.
pub fn narratives_found(state: &ClassificationState) -> &'static str {
    let names = state.narrative_names();
    if names.is_empty() || names.iter().all(|name| *name == OTHER) {
        EMPTY
    } else {
        CONTINUE
    }
}
