//! Destinations for per-document results.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::StoreError;
use crate::record::{DocumentResult, VoteRecord};

/// Where finished documents go. Implementations must tolerate concurrent
/// calls from many document tasks.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Record the final labels (results line plus evidence).
    async fn write_result(&self, result: &DocumentResult) -> Result<(), StoreError>;

    /// Record the per-agent audit trail.
    async fn write_votes(&self, votes: &VoteRecord) -> Result<(), StoreError>;
}

/// In-memory sink, mostly for tests and dry runs.
#[derive(Default)]
pub struct MemorySink {
    results: Mutex<Vec<DocumentResult>>,
    votes: Mutex<Vec<VoteRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<DocumentResult> {
        self.results.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn votes(&self) -> Vec<VoteRecord> {
        self.votes.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Results rendered as they would appear in the results file.
    pub fn lines(&self) -> Vec<String> {
        self.results().iter().map(DocumentResult::tsv_line).collect()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn write_result(&self, result: &DocumentResult) -> Result<(), StoreError> {
        if let Ok(mut results) = self.results.lock() {
            results.push(result.clone());
        }
        Ok(())
    }

    async fn write_votes(&self, votes: &VoteRecord) -> Result<(), StoreError> {
        if let Ok(mut all) = self.votes.lock() {
            all.push(votes.clone());
        }
        Ok(())
    }
}
