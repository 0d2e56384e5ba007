use narrascope_core::{ClassificationState, StateDelta};

pub(super) fn clean_text_node(state: &ClassificationState) -> StateDelta {
    StateDelta {
        cleaned_text: Some(clean_text(&state.text)),
        ..Default::default()
    }
}

/// Strip URLs, collapse horizontal whitespace, and squeeze runs of blank
/// lines down to one.
pub fn clean_text(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut blank_run = 0;
    for line in text.lines() {
        let cleaned = line
            .split_whitespace()
            .filter(|word| !is_url(word))
            .collect::<Vec<_>>()
            .join(" ");
        if cleaned.is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push(String::new());
            }
            continue;
        }
        blank_run = 0;
        out.push(cleaned);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

fn is_url(word: &str) -> bool {
    let word = word.trim_start_matches(['(', '<', '[', '"']);
    word.starts_with("http://") || word.starts_with("https://") || word.starts_with("www.")
}
