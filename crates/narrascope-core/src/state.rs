//! Per-document classification state.
//!
//! A [`ClassificationState`] is owned by the single task driving its document
//! through the graph. Nodes never mutate it directly: they return a
//! [`StateDelta`] that the scheduler applies, which keeps every node a pure
//! function of the state it was given.

use crate::label::{AgentOutcome, FuzzyMatchRecord, Label};

/// Critic feedback meaning "no further retries needed".
pub const APPROVED: &str = "approved";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationState {
    pub file_id: String,
    pub text: String,
    pub cleaned_text: Option<String>,
    pub category: Option<String>,
    /// `None` until the narrative stage has run; an empty vector means no
    /// narrative was found.
    pub narratives: Option<Vec<Label>>,
    pub subnarratives: Option<Vec<Label>>,
    pub narrative_feedback: String,
    pub narrative_retries: u32,
    pub subnarrative_feedback: String,
    pub subnarrative_retries: u32,
    /// One label list per agent, present only between an ensemble
    /// classification and its aggregation.
    pub agent_narratives: Option<Vec<Vec<Label>>>,
    pub agent_subnarratives: Option<Vec<Vec<Label>>>,
    /// Agent outputs kept after aggregation for the votes sidecar.
    pub narrative_votes: Option<Vec<Vec<Label>>>,
    pub subnarrative_votes: Option<Vec<Vec<Label>>>,
    pub narrative_outcomes: Vec<AgentOutcome>,
    pub subnarrative_outcomes: Vec<AgentOutcome>,
    pub fuzzy_matches: Vec<FuzzyMatchRecord>,
}

impl ClassificationState {
    pub fn new(file_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// Text prompts should see: the cleaned text when cleaning ran.
    pub fn working_text(&self) -> &str {
        self.cleaned_text.as_deref().unwrap_or(&self.text)
    }

    pub fn narrative_names(&self) -> Vec<&str> {
        names(self.narratives.as_deref())
    }

    pub fn subnarrative_names(&self) -> Vec<&str> {
        names(self.subnarratives.as_deref())
    }

    /// Whether any ensemble data was produced for this document.
    pub fn has_agent_data(&self) -> bool {
        self.narrative_votes.is_some()
            || self.subnarrative_votes.is_some()
            || self.agent_narratives.is_some()
            || self.agent_subnarratives.is_some()
            || !self.narrative_outcomes.is_empty()
            || !self.subnarrative_outcomes.is_empty()
    }

    /// Apply a node's output. Audit trails are append-only.
    pub fn apply(&mut self, delta: StateDelta) {
        if let Some(text) = delta.cleaned_text {
            self.cleaned_text = Some(text);
        }
        if let Some(category) = delta.category {
            self.category = Some(category);
        }
        if let Some(narratives) = delta.narratives {
            self.narratives = Some(narratives);
        }
        if let Some(subnarratives) = delta.subnarratives {
            self.subnarratives = Some(subnarratives);
        }
        if let Some(feedback) = delta.narrative_feedback {
            self.narrative_feedback = feedback;
        }
        if let Some(retries) = delta.narrative_retries {
            self.narrative_retries = retries;
        }
        if let Some(feedback) = delta.subnarrative_feedback {
            self.subnarrative_feedback = feedback;
        }
        if let Some(retries) = delta.subnarrative_retries {
            self.subnarrative_retries = retries;
        }
        if let Some(agents) = delta.agent_narratives {
            self.agent_narratives = agents;
        }
        if let Some(agents) = delta.agent_subnarratives {
            self.agent_subnarratives = agents;
        }
        if let Some(votes) = delta.narrative_votes {
            self.narrative_votes = Some(votes);
        }
        if let Some(votes) = delta.subnarrative_votes {
            self.subnarrative_votes = Some(votes);
        }
        self.narrative_outcomes.extend(delta.narrative_outcomes);
        self.subnarrative_outcomes.extend(delta.subnarrative_outcomes);
        self.fuzzy_matches.extend(delta.fuzzy_matches);
    }
}

fn names(labels: Option<&[Label]>) -> Vec<&str> {
    labels
        .unwrap_or(&[])
        .iter()
        .map(|l| l.name.as_str())
        .collect()
}

/// Changes a node makes to the state. `None` leaves a field untouched.
///
/// `agent_narratives` / `agent_subnarratives` are doubly optional so a node
/// can clear them (`Some(None)`) once aggregation has consumed them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub cleaned_text: Option<String>,
    pub category: Option<String>,
    pub narratives: Option<Vec<Label>>,
    pub subnarratives: Option<Vec<Label>>,
    pub narrative_feedback: Option<String>,
    pub narrative_retries: Option<u32>,
    pub subnarrative_feedback: Option<String>,
    pub subnarrative_retries: Option<u32>,
    pub agent_narratives: Option<Option<Vec<Vec<Label>>>>,
    pub agent_subnarratives: Option<Option<Vec<Vec<Label>>>>,
    pub narrative_votes: Option<Vec<Vec<Label>>>,
    pub subnarrative_votes: Option<Vec<Vec<Label>>>,
    pub narrative_outcomes: Vec<AgentOutcome>,
    pub subnarrative_outcomes: Vec<AgentOutcome>,
    pub fuzzy_matches: Vec<FuzzyMatchRecord>,
}

impl StateDelta {
    pub fn none() -> Self {
        Self::default()
    }
}
