//! Prompt assembly.
//!
//! The wording is deliberately plain; the taxonomy and its definitions carry
//! the domain knowledge.

use narrascope_core::taxonomy::Narrative;
use narrascope_core::{Label, Level, OTHER, Taxonomy};

// ── Category ──

const CATEGORY_SYSTEM: &str = "\
You are a news analyst sorting articles by topic.

Answer with exactly one of the category codes listed below and nothing else. \
If the article fits none of them, answer Other.";

pub fn category(taxonomy: &Taxonomy, text: &str) -> (String, String) {
    let codes = taxonomy.category_names().join(", ");
    let system = format!("{CATEGORY_SYSTEM}\n\nCategories: {codes}, {OTHER}");
    let user = format!("Article:\n{text}");
    (system, user)
}

// ── Narratives ──

const NARRATIVE_SYSTEM: &str = "\
You identify the narratives an article promotes.

Choose only from the narrative names listed. Copy names exactly. For each \
narrative, quote the passage of the article that supports it and explain your \
reasoning briefly. If none apply, return an empty list.";

pub fn narratives(
    taxonomy: &Taxonomy,
    candidates: &[&Narrative],
    text: &str,
    feedback: &str,
) -> (String, String) {
    let mut system = format!("{NARRATIVE_SYSTEM}\n\nNarratives:\n");
    for narrative in candidates {
        push_entry(&mut system, taxonomy, &narrative.name);
    }
    (system, with_feedback(format!("Article:\n{text}"), feedback))
}

// ── Subnarratives ──

const SUBNARRATIVE_SYSTEM: &str = "\
You refine a narrative into the subnarratives an article promotes.

Choose only from the subnarrative names listed under the given narrative. Copy \
names exactly. For each, quote the supporting passage and explain your reasoning \
briefly. If none apply, return an empty list.";

pub fn subnarratives(
    taxonomy: &Taxonomy,
    narrative: &str,
    candidates: &[String],
    text: &str,
    feedback: &str,
) -> (String, String) {
    let mut system = format!("{SUBNARRATIVE_SYSTEM}\n\nNarrative: {narrative}\nSubnarratives:\n");
    for name in candidates {
        push_entry(&mut system, taxonomy, name);
    }
    (system, with_feedback(format!("Article:\n{text}"), feedback))
}

// ── Critic ──

const CRITIC_SYSTEM: &str = "\
You review another analyst's labels for an article.

Decide whether the labels are supported by the article and drawn from the \
allowed list. Set is_valid to true if they are acceptable. Otherwise set it to \
false and explain in feedback what should change.";

pub fn validation(level: Level, allowed: &[&str], labels: &[Label], text: &str) -> (String, String) {
    let system = format!(
        "{CRITIC_SYSTEM}\n\nAllowed {level} labels:\n{}",
        allowed
            .iter()
            .map(|name| format!("- {name}"))
            .collect::<Vec<_>>()
            .join("\n")
    );
    let proposed = if labels.is_empty() {
        "(none)".to_string()
    } else {
        labels
            .iter()
            .map(|l| format!("- {} (evidence: {:?})", l.name, l.evidence_quote))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let user = format!("Article:\n{text}\n\nProposed {level} labels:\n{proposed}");
    (system, user)
}

fn push_entry(out: &mut String, taxonomy: &Taxonomy, name: &str) {
    out.push_str("- ");
    out.push_str(name);
    if let Some(def) = taxonomy.definition(name) {
        if !def.definition.is_empty() {
            out.push_str(": ");
            out.push_str(&def.definition);
        }
        if let Some(example) = &def.example {
            out.push_str("\n  Example: ");
            out.push_str(example);
        }
        if let Some(instruction) = &def.instruction {
            out.push_str("\n  Note: ");
            out.push_str(instruction);
        }
    }
    out.push('\n');
}

fn with_feedback(user: String, feedback: &str) -> String {
    if feedback.trim().is_empty() {
        user
    } else {
        format!(
            "{user}\n\nA reviewer rejected your previous answer with this feedback:\n{feedback}\n\
             Revise your answer accordingly."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> Taxonomy {
        Taxonomy::from_json_str(r#"{"URW": {"URW: A": ["URW: A: x"]}, "CC": {"CC: B": []}, "Other": {}}"#)
            .unwrap()
            .with_definitions_json(
                r#"{"URW: A": {"definition": "Defines A.", "example": "Example of A."}}"#,
            )
            .unwrap()
    }

    #[test]
    fn category_lists_codes_and_other() {
        let (system, user) = category(&taxonomy(), "Some text");
        assert!(system.ends_with("Categories: URW, CC, Other"));
        assert!(user.contains("Some text"));
    }

    #[test]
    fn narrative_prompt_includes_definitions() {
        let tax = taxonomy();
        let candidates = tax.narratives_in(Some("URW"));
        let (system, _) = narratives(&tax, &candidates, "text", "");
        assert!(system.contains("- URW: A: Defines A."));
        assert!(system.contains("Example: Example of A."));
        assert!(!system.contains("CC: B"));
    }

    #[test]
    fn feedback_appended_only_when_present() {
        let tax = taxonomy();
        let candidates = tax.narratives_in(None);
        let (_, plain) = narratives(&tax, &candidates, "text", "");
        assert!(!plain.contains("reviewer"));
        let (_, revised) = narratives(&tax, &candidates, "text", "Drop CC: B.");
        assert!(revised.contains("Drop CC: B."));
    }

    #[test]
    fn validation_prompt_marks_empty_labels() {
        let (system, user) = validation(Level::Subnarrative, &["URW: A: x"], &[], "text");
        assert!(system.contains("Allowed subnarrative labels"));
        assert!(user.contains("(none)"));
    }
}
