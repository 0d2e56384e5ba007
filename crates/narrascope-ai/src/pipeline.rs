//! Batch driver: one graph, one set of shared collaborators, many documents.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use narrascope_core::{ClassificationState, ClassifierConfig, Taxonomy};
use narrascope_llm::LlmClient;
use narrascope_store::ResultSink;
use tracing::{Instrument, error, info, info_span};

use crate::error::ClassifyError;
use crate::fuzzy::MatcherRegistry;
use crate::graph::Graph;
use crate::nodes::NodeContext;
use crate::retry::{RetryExecutor, RetryPolicy};

/// A document to classify.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub file_id: String,
    pub text: String,
}

impl Document {
    pub fn new(file_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            text: text.into(),
        }
    }
}

/// Outcome counts for a batch. A document counts as failed when an error
/// escaped its graph run; its remaining siblings are unaffected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `(file_id, error)` for every failed document.
    pub failures: Vec<(String, String)>,
}

pub struct Classifier {
    graph: Graph,
    ctx: NodeContext,
}

impl Classifier {
    /// Build a classifier with the retry policy from `config`.
    pub fn new(
        config: ClassifierConfig,
        taxonomy: Arc<Taxonomy>,
        llm: Arc<dyn LlmClient>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, ClassifyError> {
        let retry = RetryExecutor::new(RetryPolicy::from(&config.retry));
        Self::with_retry(config, taxonomy, llm, sink, retry)
    }

    pub fn with_retry(
        config: ClassifierConfig,
        taxonomy: Arc<Taxonomy>,
        llm: Arc<dyn LlmClient>,
        sink: Arc<dyn ResultSink>,
        retry: RetryExecutor,
    ) -> Result<Self, ClassifyError> {
        config.validate()?;
        let graph = Graph::build(&config)?;
        info!(
            strategy = ?config.strategy,
            nodes = graph.nodes().len(),
            narrative_agents = config.narrative.agents,
            subnarrative_agents = config.subnarrative.agents,
            provider = llm.provider_id(),
            "classifier ready"
        );
        let ctx = NodeContext {
            llm,
            matchers: Arc::new(MatcherRegistry::new(taxonomy.clone())),
            taxonomy,
            retry,
            sink,
            config: Arc::new(config),
        };
        Ok(Self { graph, ctx })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.ctx.config
    }

    /// Run one document through the graph, returning its final state.
    pub async fn classify(&self, doc: Document) -> Result<ClassificationState, ClassifyError> {
        let span = info_span!("document", file_id = %doc.file_id);
        async move {
            let started = Instant::now();
            let state = ClassificationState::new(doc.file_id, doc.text);
            let state = self.graph.run(state, &self.ctx).await?;
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                narratives = state.narrative_names().len(),
                "document classified"
            );
            Ok(state)
        }
        .instrument(span)
        .await
    }

    /// Classify `docs` with at most `concurrency` documents in flight.
    pub async fn run_batch(&self, docs: Vec<Document>) -> BatchSummary {
        let total = docs.len();
        let concurrency = self.ctx.config.concurrency.max(1);
        info!(total, concurrency, "starting batch");

        let outcomes: Vec<(String, Result<(), String>)> = futures::stream::iter(docs)
            .map(|doc| async move {
                let file_id = doc.file_id.clone();
                let outcome = self.classify(doc).await.map(drop).map_err(|e| {
                    error!(file_id = %file_id, error = %e, "document failed");
                    e.to_string()
                });
                (file_id, outcome)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        for (file_id, outcome) in outcomes {
            match outcome {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    summary.failures.push((file_id, e));
                }
            }
        }
        info!(
            total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch finished"
        );
        summary
    }
}
