//! Label records produced by the narrative and subnarrative stages, plus the
//! audit records kept alongside them.

use serde::{Deserialize, Serialize};

/// Sentinel label used when a document falls outside the taxonomy.
pub const OTHER: &str = "Other";

/// Taxonomy level a label indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Narrative,
    Subnarrative,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Narrative => "narrative",
            Self::Subnarrative => "subnarrative",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single label with the evidence the model gave for it.
///
/// Narrative and subnarrative labels share this shape; which taxonomy level a
/// label belongs to is determined by the state field holding it. Models are
/// inconsistent about the key for the label itself, so several keys are
/// accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawLabel")]
pub struct Label {
    pub name: String,
    pub evidence_quote: String,
    pub reasoning: String,
}

/// Wire shape of a label as models actually emit it.
///
/// A subnarrative item often names its parent too
/// (`{"narrative": .., "subnarrative": ..}`), so each key is read separately
/// and the most specific one wins.
#[derive(Debug, Default, Deserialize)]
struct RawLabel {
    subnarrative_name: Option<String>,
    subnarrative: Option<String>,
    name: Option<String>,
    narrative_name: Option<String>,
    narrative: Option<String>,
    label: Option<String>,
    evidence_quote: Option<String>,
    evidence: Option<String>,
    #[serde(default)]
    reasoning: String,
}

impl TryFrom<RawLabel> for Label {
    type Error = String;

    fn try_from(raw: RawLabel) -> Result<Self, Self::Error> {
        let name = raw
            .subnarrative_name
            .or(raw.subnarrative)
            .or(raw.name)
            .or(raw.narrative_name)
            .or(raw.narrative)
            .or(raw.label)
            .ok_or_else(|| "label has no name".to_string())?;
        Ok(Self {
            name,
            evidence_quote: raw.evidence_quote.or(raw.evidence).unwrap_or_default(),
            reasoning: raw.reasoning,
        })
    }
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evidence_quote: String::new(),
            reasoning: String::new(),
        }
    }

    /// The "Other" sentinel label.
    pub fn other() -> Self {
        Self::new(OTHER)
    }

    pub fn is_other(&self) -> bool {
        self.name == OTHER
    }

    /// Copy of this label carrying a different name, keeping the evidence.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evidence_quote: self.evidence_quote.clone(),
            reasoning: self.reasoning.clone(),
        }
    }
}

/// Whether an agent invocation produced a label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Failure,
}

/// Outcome of one agent invocation inside a multi-agent node.
///
/// Kept for failure attribution; failed agents are recorded, never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub agent_id: usize,
    pub status: AgentStatus,
    pub label_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Narrative the agent was asked about (subnarrative stage only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
}

impl AgentOutcome {
    pub fn success(agent_id: usize, label_count: usize) -> Self {
        Self {
            agent_id,
            status: AgentStatus::Success,
            label_count,
            error_kind: None,
            error_detail: None,
            narrative: None,
        }
    }

    pub fn failure(agent_id: usize, error_kind: &str, error_detail: String) -> Self {
        Self {
            agent_id,
            status: AgentStatus::Failure,
            label_count: 0,
            error_kind: Some(error_kind.to_string()),
            error_detail: Some(error_detail),
            narrative: None,
        }
    }

    pub fn for_narrative(mut self, narrative: &str) -> Self {
        self.narrative = Some(narrative.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}

/// How a model-returned label was reconciled against the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Fuzzy,
    Unmatched,
}

/// Audit entry for a single label repair attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyMatchRecord {
    pub level: Level,
    pub original: String,
    pub matched: Option<String>,
    pub score: f64,
    pub kind: MatchKind,
}
