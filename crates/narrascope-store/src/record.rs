//! Output records derived from a finished classification state.

use chrono::{DateTime, Utc};
use narrascope_core::{
    AgentOutcome, AggregationMethod, ClassificationState, FuzzyMatchRecord, Label, OTHER,
};
use serde::{Deserialize, Serialize};

/// Final labels for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub file_id: String,
    pub narratives: Vec<Label>,
    pub subnarratives: Vec<Label>,
}

impl DocumentResult {
    pub fn from_state(state: &ClassificationState) -> Self {
        Self {
            file_id: state.file_id.clone(),
            narratives: state.narratives.clone().unwrap_or_default(),
            subnarratives: state.subnarratives.clone().unwrap_or_default(),
        }
    }

    /// `file_id <TAB> n1;n2 <TAB> s1;s2`, with `Other` standing in for an
    /// empty level. Separator characters inside names become spaces.
    pub fn tsv_line(&self) -> String {
        format!(
            "{}\t{}\t{}",
            self.file_id,
            join_names(&self.narratives),
            join_names(&self.subnarratives)
        )
    }

    pub fn evidence(&self) -> EvidenceSidecar {
        EvidenceSidecar {
            file_id: self.file_id.clone(),
            narratives: self
                .narratives
                .iter()
                .map(|l| NarrativeEvidence {
                    narrative_name: l.name.clone(),
                    evidence_quote: l.evidence_quote.clone(),
                    reasoning: l.reasoning.clone(),
                })
                .collect(),
            subnarratives: self
                .subnarratives
                .iter()
                .map(|l| SubnarrativeEvidence {
                    subnarrative_name: l.name.clone(),
                    evidence_quote: l.evidence_quote.clone(),
                    reasoning: l.reasoning.clone(),
                })
                .collect(),
        }
    }
}

fn join_names(labels: &[Label]) -> String {
    if labels.is_empty() {
        return OTHER.to_string();
    }
    labels
        .iter()
        .map(|l| tsv_field(&l.name))
        .collect::<Vec<_>>()
        .join(";")
}

/// A label name made safe for one `;`-separated TSV field.
fn tsv_field(name: &str) -> String {
    name.replace(['\t', '\r', '\n', ';'], " ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeEvidence {
    pub narrative_name: String,
    pub evidence_quote: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnarrativeEvidence {
    pub subnarrative_name: String,
    pub evidence_quote: String,
    pub reasoning: String,
}

/// Contents of `evidence/<file_id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSidecar {
    pub file_id: String,
    pub narratives: Vec<NarrativeEvidence>,
    pub subnarratives: Vec<SubnarrativeEvidence>,
}

/// Ensemble record for one taxonomy level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelVotes {
    pub method: AggregationMethod,
    pub agents: usize,
    pub per_agent: Vec<Vec<Label>>,
    pub aggregated: Vec<Label>,
    pub outcomes: Vec<AgentOutcome>,
}

/// Contents of `votes/<file_id>.json`: the forensic record of an ensemble run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub file_id: String,
    pub written_at: DateTime<Utc>,
    pub narrative: Option<LevelVotes>,
    pub subnarrative: Option<LevelVotes>,
    pub fuzzy_matches: Vec<FuzzyMatchRecord>,
}

/// Aggregation settings used for a run, needed to label the votes record.
#[derive(Debug, Clone, Copy)]
pub struct VoteSettings {
    pub narrative_method: AggregationMethod,
    pub narrative_agents: usize,
    pub subnarrative_method: AggregationMethod,
    pub subnarrative_agents: usize,
}

impl VoteRecord {
    /// Build the votes record, or `None` if the document produced no
    /// per-agent data.
    pub fn from_state(state: &ClassificationState, settings: VoteSettings) -> Option<Self> {
        if !state.has_agent_data() {
            return None;
        }

        let narrative = level_votes(
            state.narrative_votes.as_ref().or(state.agent_narratives.as_ref()),
            &state.narrative_outcomes,
            state.narratives.as_deref(),
            settings.narrative_method,
            settings.narrative_agents,
        );
        let subnarrative = level_votes(
            state
                .subnarrative_votes
                .as_ref()
                .or(state.agent_subnarratives.as_ref()),
            &state.subnarrative_outcomes,
            state.subnarratives.as_deref(),
            settings.subnarrative_method,
            settings.subnarrative_agents,
        );

        Some(Self {
            file_id: state.file_id.clone(),
            written_at: Utc::now(),
            narrative,
            subnarrative,
            fuzzy_matches: state.fuzzy_matches.clone(),
        })
    }
}

fn level_votes(
    per_agent: Option<&Vec<Vec<Label>>>,
    outcomes: &[AgentOutcome],
    aggregated: Option<&[Label]>,
    method: AggregationMethod,
    agents: usize,
) -> Option<LevelVotes> {
    if per_agent.is_none() && outcomes.is_empty() {
        return None;
    }
    Some(LevelVotes {
        method,
        agents,
        per_agent: per_agent.cloned().unwrap_or_default(),
        aggregated: aggregated.map(<[Label]>::to_vec).unwrap_or_default(),
        outcomes: outcomes.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrascope_core::StateDelta;

    fn settings() -> VoteSettings {
        VoteSettings {
            narrative_method: AggregationMethod::Majority,
            narrative_agents: 2,
            subnarrative_method: AggregationMethod::Union,
            subnarrative_agents: 1,
        }
    }

    #[test]
    fn tsv_line_uses_other_for_empty_levels() {
        let result = DocumentResult {
            file_id: "doc1".into(),
            narratives: vec![],
            subnarratives: vec![],
        };
        assert_eq!(result.tsv_line(), "doc1\tOther\tOther");
    }

    #[test]
    fn tsv_line_joins_with_semicolons() {
        let result = DocumentResult {
            file_id: "EN_10001.txt".into(),
            narratives: vec![Label::new("URW: A"), Label::new("URW: B")],
            subnarratives: vec![Label::new("URW: A: x")],
        };
        assert_eq!(result.tsv_line(), "EN_10001.txt\tURW: A;URW: B\tURW: A: x");
    }

    #[test]
    fn separators_inside_names_are_blanked() {
        let result = DocumentResult {
            file_id: "doc1".into(),
            narratives: vec![Label::new("URW: A\nfake\tline"), Label::new("x;y")],
            subnarratives: vec![Label::new("URW: A: one\r")],
        };
        let line = result.tsv_line();
        assert_eq!(line, "doc1\tURW: A fake line;x y\tURW: A: one ");
        assert_eq!(line.split('\t').count(), 3);
    }

    #[test]
    fn evidence_sidecar_shape() {
        let result = DocumentResult {
            file_id: "doc1".into(),
            narratives: vec![Label {
                name: "URW: A".into(),
                evidence_quote: "quote".into(),
                reasoning: "why".into(),
            }],
            subnarratives: vec![Label::new("URW: A: x")],
        };
        let value = serde_json::to_value(result.evidence()).unwrap();
        assert_eq!(value["file_id"], "doc1");
        assert_eq!(value["narratives"][0]["narrative_name"], "URW: A");
        assert_eq!(value["narratives"][0]["evidence_quote"], "quote");
        assert_eq!(value["subnarratives"][0]["subnarrative_name"], "URW: A: x");
    }

    #[test]
    fn no_votes_without_agent_data() {
        let state = ClassificationState::new("doc1", "text");
        assert!(VoteRecord::from_state(&state, settings()).is_none());
    }

    #[test]
    fn votes_record_complete_even_when_result_empty() {
        let mut state = ClassificationState::new("doc1", "text");
        state.apply(StateDelta {
            narratives: Some(vec![]),
            narrative_votes: Some(vec![vec![Label::new("A")], vec![Label::new("B")]]),
            narrative_outcomes: vec![AgentOutcome::success(0, 1), AgentOutcome::success(1, 1)],
            ..Default::default()
        });
        let record = VoteRecord::from_state(&state, settings()).unwrap();
        let narrative = record.narrative.unwrap();
        assert_eq!(narrative.per_agent.len(), 2);
        assert!(narrative.aggregated.is_empty());
        assert_eq!(narrative.outcomes.len(), 2);
        assert_eq!(narrative.method, AggregationMethod::Majority);
        assert!(record.subnarrative.is_none());
    }
}
