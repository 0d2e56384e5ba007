//! Classification graph: retries, structured output, fuzzy repair, ensemble
//! aggregation, and the batch driver.

pub mod aggregate;
mod error;
pub mod fuzzy;
pub mod graph;
pub mod nodes;
mod pipeline;
pub mod prompts;
pub mod retry;
pub mod structured;

pub use aggregate::{aggregate, pool_by_agent};
pub use error::{ClassifyError, GraphError};
pub use fuzzy::{FuzzyMatcher, MatchResult, MatcherRegistry};
pub use graph::{Graph, GraphBuilder, Router, Target};
pub use nodes::NodeContext;
pub use pipeline::{BatchSummary, Classifier, Document};
pub use retry::{Pause, RetryExecutor, RetryPolicy, TokioPause};
pub use structured::{
    Extractor, NarrativeResponse, StructuredOutput, SubnarrativeResponse, ValidationResponse,
};
