//! The category → narrative → subnarrative label tree.
//!
//! Loaded once at startup from a nested JSON mapping and shared read-only
//! across every document. Insertion order of the source file is preserved,
//! so prompts and flattened label lists are stable between runs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::label::{Level, OTHER};

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("taxonomy JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed taxonomy: {0}")]
    Shape(String),
}

/// A narrative and the subnarratives scoped under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrative {
    pub name: String,
    pub subnarratives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub narratives: Vec<Narrative>,
}

/// Optional prompt material attached to a label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
}

/// Immutable label tree with per-label definitions.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    categories: Vec<Category>,
    definitions: HashMap<String, Definition>,
}

/// Summary statistics for a Taxonomy.
pub struct TaxonomySummary {
    pub categories: usize,
    pub narratives: usize,
    pub subnarratives: usize,
    pub with_definitions: usize,
}

impl Taxonomy {
    /// Parse `{category: {narrative: [subnarrative, ...]}}`.
    pub fn from_json_str(json: &str) -> Result<Self, TaxonomyError> {
        let root: Value = serde_json::from_str(json)?;
        let root = root
            .as_object()
            .ok_or_else(|| TaxonomyError::Shape("top level must be an object".into()))?;

        let mut categories = Vec::with_capacity(root.len());
        for (category, narratives) in root {
            let narratives = match narratives {
                Value::Object(map) => map
                    .iter()
                    .map(|(name, subs)| {
                        Ok(Narrative {
                            name: name.clone(),
                            subnarratives: string_list(subs, name)?,
                        })
                    })
                    .collect::<Result<Vec<_>, TaxonomyError>>()?,
                Value::Null => Vec::new(),
                _ => {
                    return Err(TaxonomyError::Shape(format!(
                        "category {category:?} must map narratives to subnarrative lists"
                    )));
                }
            };
            categories.push(Category {
                name: category.clone(),
                narratives,
            });
        }

        Ok(Self {
            categories,
            definitions: HashMap::new(),
        })
    }

    /// Load the label tree from disk.
    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        let json = read(path)?;
        let taxonomy = Self::from_json_str(&json)?;
        let summary = taxonomy.summary();
        info!(
            path = %path.display(),
            categories = summary.categories,
            narratives = summary.narratives,
            subnarratives = summary.subnarratives,
            "loaded taxonomy"
        );
        Ok(taxonomy)
    }

    /// Merge `{label: {definition, example?, instruction?}}` into the taxonomy.
    ///
    /// Definitions for labels absent from the tree are kept; they are harmless
    /// and taxonomies are commonly edited independently of their definitions.
    pub fn with_definitions_json(mut self, json: &str) -> Result<Self, TaxonomyError> {
        let defs: HashMap<String, Definition> = serde_json::from_str(json)?;
        self.definitions.extend(defs);
        Ok(self)
    }

    pub fn load_definitions(self, path: &Path) -> Result<Self, TaxonomyError> {
        let json = read(path)?;
        self.with_definitions_json(&json)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Category names, excluding the "Other" catch-all.
    pub fn category_names(&self) -> Vec<&str> {
        self.categories
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| *name != OTHER)
            .collect()
    }

    /// Narratives scoped to `category`, or to every category when `None`.
    pub fn narratives_in(&self, category: Option<&str>) -> Vec<&Narrative> {
        self.categories
            .iter()
            .filter(|c| category.is_none_or(|name| c.name == name))
            .flat_map(|c| c.narratives.iter())
            .collect()
    }

    /// Subnarratives under `narrative`, searching every category.
    pub fn subnarratives_of(&self, narrative: &str) -> &[String] {
        self.find_narrative(narrative)
            .map(|n| n.subnarratives.as_slice())
            .unwrap_or(&[])
    }

    pub fn find_narrative(&self, narrative: &str) -> Option<&Narrative> {
        self.categories
            .iter()
            .flat_map(|c| c.narratives.iter())
            .find(|n| n.name == narrative)
    }

    /// Category owning `narrative`, if any.
    pub fn parent_category(&self, narrative: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.narratives.iter().any(|n| n.name == narrative))
            .map(|c| c.name.as_str())
    }

    /// Every label at `level`, deduplicated, in file order.
    pub fn labels(&self, level: Level) -> Vec<&str> {
        let mut seen = HashSet::new();
        let narratives = self.categories.iter().flat_map(|c| c.narratives.iter());
        let names: Box<dyn Iterator<Item = &str> + '_> = match level {
            Level::Narrative => Box::new(narratives.map(|n| n.name.as_str())),
            Level::Subnarrative => {
                Box::new(narratives.flat_map(|n| n.subnarratives.iter().map(|s| s.as_str())))
            }
        };
        names.filter(|name| seen.insert(*name)).collect()
    }

    pub fn contains(&self, level: Level, name: &str) -> bool {
        match level {
            Level::Narrative => self.find_narrative(name).is_some(),
            Level::Subnarrative => self
                .categories
                .iter()
                .flat_map(|c| c.narratives.iter())
                .any(|n| n.subnarratives.iter().any(|s| s == name)),
        }
    }

    pub fn definition(&self, label: &str) -> Option<&Definition> {
        self.definitions.get(label)
    }

    pub fn summary(&self) -> TaxonomySummary {
        TaxonomySummary {
            categories: self.categories.len(),
            narratives: self.labels(Level::Narrative).len(),
            subnarratives: self.labels(Level::Subnarrative).len(),
            with_definitions: self.definitions.len(),
        }
    }
}

fn read(path: &Path) -> Result<String, TaxonomyError> {
    std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn string_list(value: &Value, narrative: &str) -> Result<Vec<String>, TaxonomyError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    TaxonomyError::Shape(format!(
                        "subnarratives of {narrative:?} must be strings"
                    ))
                })
            })
            .collect(),
        _ => Err(TaxonomyError::Shape(format!(
            "narrative {narrative:?} must map to a list of subnarratives"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "URW": {
            "URW: Blaming the war on others": [
                "URW: Blaming the war on others: Ukraine is the aggressor",
                "URW: Blaming the war on others: The West are the aggressors"
            ],
            "URW: Discrediting Ukraine": [
                "URW: Discrediting Ukraine: Ukraine is a puppet of the West"
            ]
        },
        "CC": {
            "CC: Criticism of institutions and authorities": [
                "CC: Criticism of institutions and authorities: Criticism of the EU"
            ],
            "CC: Amplifying Climate Fears": []
        },
        "Other": {}
    }"#;

    #[test]
    fn preserves_file_order() {
        let tax = Taxonomy::from_json_str(SAMPLE).unwrap();
        let names: Vec<&str> = tax.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["URW", "CC", "Other"]);
        assert_eq!(tax.category_names(), vec!["URW", "CC"]);
        assert_eq!(
            tax.labels(Level::Narrative)[0],
            "URW: Blaming the war on others"
        );
    }

    #[test]
    fn narratives_scoped_by_category() {
        let tax = Taxonomy::from_json_str(SAMPLE).unwrap();
        assert_eq!(tax.narratives_in(Some("URW")).len(), 2);
        assert_eq!(tax.narratives_in(Some("CC")).len(), 2);
        assert_eq!(tax.narratives_in(None).len(), 4);
        assert!(tax.narratives_in(Some("missing")).is_empty());
    }

    #[test]
    fn subnarrative_lookup_and_parent() {
        let tax = Taxonomy::from_json_str(SAMPLE).unwrap();
        assert_eq!(tax.subnarratives_of("URW: Blaming the war on others").len(), 2);
        assert!(tax.subnarratives_of("CC: Amplifying Climate Fears").is_empty());
        assert!(tax.subnarratives_of("nope").is_empty());
        assert_eq!(tax.parent_category("CC: Amplifying Climate Fears"), Some("CC"));
        assert_eq!(tax.parent_category("nope"), None);
    }

    #[test]
    fn contains_checks_level() {
        let tax = Taxonomy::from_json_str(SAMPLE).unwrap();
        assert!(tax.contains(Level::Narrative, "URW: Discrediting Ukraine"));
        assert!(!tax.contains(Level::Subnarrative, "URW: Discrediting Ukraine"));
        assert!(tax.contains(
            Level::Subnarrative,
            "URW: Discrediting Ukraine: Ukraine is a puppet of the West"
        ));
    }

    #[test]
    fn summary_counts() {
        let tax = Taxonomy::from_json_str(SAMPLE)
            .unwrap()
            .with_definitions_json(
                r#"{"URW: Discrediting Ukraine": {"definition": "Portrays Ukraine negatively."}}"#,
            )
            .unwrap();
        let summary = tax.summary();
        assert_eq!(summary.categories, 3);
        assert_eq!(summary.narratives, 4);
        assert_eq!(summary.subnarratives, 4);
        assert_eq!(summary.with_definitions, 1);
        assert_eq!(
            tax.definition("URW: Discrediting Ukraine").unwrap().definition,
            "Portrays Ukraine negatively."
        );
    }

    #[test]
    fn rejects_non_list_subnarratives() {
        let err = Taxonomy::from_json_str(r#"{"URW": {"A": "not a list"}}"#).unwrap_err();
        assert!(matches!(err, TaxonomyError::Shape(_)));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let tax = Taxonomy::load(&path).unwrap();
        assert_eq!(tax.categories().len(), 3);

        let missing = Taxonomy::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, TaxonomyError::Io { .. }));
    }
}
