//! File-backed result sink.
//!
//! Layout under the output directory:
//!
//! ```text
//! results.tsv            one line per document
//! evidence/<id>.json     labels with evidence quotes and reasoning
//! votes/<id>.json        per-agent audit record (ensemble runs only)
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::StoreError;
use crate::record::{DocumentResult, VoteRecord};
use crate::sink::ResultSink;

pub const RESULTS_FILE: &str = "results.tsv";
pub const EVIDENCE_DIR: &str = "evidence";
pub const VOTES_DIR: &str = "votes";

pub struct FileSink {
    root: PathBuf,
    /// Serializes appends so concurrent documents never interleave lines.
    results: Mutex<tokio::fs::File>,
}

impl FileSink {
    /// Create the output layout, truncating any previous results file.
    pub async fn create(root: &Path) -> Result<Self, StoreError> {
        for dir in [root.to_path_buf(), root.join(EVIDENCE_DIR), root.join(VOTES_DIR)] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::io(&dir, e))?;
        }
        let results_path = root.join(RESULTS_FILE);
        let file = tokio::fs::File::create(&results_path)
            .await
            .map_err(|e| StoreError::io(&results_path, e))?;
        info!(root = %root.display(), "created result sink");
        Ok(Self {
            root: root.to_path_buf(),
            results: Mutex::new(file),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn write_json<T: Serialize>(
        &self,
        dir: &str,
        file_id: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let path = self.root.join(dir).join(sidecar_name(file_id)?);
        let json = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        debug!(path = %path.display(), "wrote sidecar");
        Ok(())
    }
}

/// `<file_id>.json`, rejecting ids that would escape the sidecar directory.
fn sidecar_name(file_id: &str) -> Result<String, StoreError> {
    let invalid = file_id.is_empty()
        || file_id == "."
        || file_id == ".."
        || file_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StoreError::InvalidFileId(file_id.to_string()));
    }
    Ok(format!("{file_id}.json"))
}

#[async_trait]
impl ResultSink for FileSink {
    async fn write_result(&self, result: &DocumentResult) -> Result<(), StoreError> {
        self.write_json(EVIDENCE_DIR, &result.file_id, &result.evidence())
            .await?;

        let line = format!("{}\n", result.tsv_line());
        let path = self.root.join(RESULTS_FILE);
        let mut file = self.results.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.flush().await.map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }

    async fn write_votes(&self, votes: &VoteRecord) -> Result<(), StoreError> {
        self.write_json(VOTES_DIR, &votes.file_id, votes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use narrascope_core::Label;

    fn result(id: &str) -> DocumentResult {
        DocumentResult {
            file_id: id.into(),
            narratives: vec![Label {
                name: "URW: A".into(),
                evidence_quote: "q".into(),
                reasoning: "r".into(),
            }],
            subnarratives: vec![],
        }
    }

    #[tokio::test]
    async fn writes_results_and_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::create(dir.path()).await.unwrap();
        sink.write_result(&result("doc1")).await.unwrap();
        sink.write_result(&result("doc2")).await.unwrap();

        let tsv = std::fs::read_to_string(dir.path().join(RESULTS_FILE)).unwrap();
        assert_eq!(tsv, "doc1\tURW: A\tOther\ndoc2\tURW: A\tOther\n");

        let evidence = std::fs::read_to_string(dir.path().join("evidence/doc1.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&evidence).unwrap();
        assert_eq!(value["narratives"][0]["evidence_quote"], "q");
    }

    #[tokio::test]
    async fn writes_votes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::create(dir.path()).await.unwrap();
        let votes = VoteRecord {
            file_id: "doc1".into(),
            written_at: Utc::now(),
            narrative: None,
            subnarrative: None,
            fuzzy_matches: vec![],
        };
        sink.write_votes(&votes).await.unwrap();
        assert!(dir.path().join("votes/doc1.json").exists());
    }

    #[tokio::test]
    async fn create_truncates_previous_results() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RESULTS_FILE), "stale\n").unwrap();
        let _sink = FileSink::create(dir.path()).await.unwrap();
        let tsv = std::fs::read_to_string(dir.path().join(RESULTS_FILE)).unwrap();
        assert!(tsv.is_empty());
    }

    #[test]
    fn rejects_path_like_ids() {
        assert!(sidecar_name("EN_1.txt").is_ok());
        assert!(matches!(
            sidecar_name("../escape"),
            Err(StoreError::InvalidFileId(_))
        ));
        assert!(sidecar_name("").is_err());
    }
}
