use narrascope_core::{ConfigError, NodeKind};
use narrascope_llm::LlmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("node {0} registered twice")]
    DuplicateNode(NodeKind),
    #[error("node {0} already has an outgoing edge")]
    DuplicateEdge(NodeKind),
    #[error("edge references unregistered node {0}")]
    UnknownNode(NodeKind),
    #[error("graph has no entry node")]
    MissingEntry,
    #[error("node {0} has no outgoing edge")]
    NoOutgoingEdge(NodeKind),
    #[error("node {0} is unreachable from the entry")]
    Unreachable(NodeKind),
    #[error("router for {node} returned unmapped branch {branch:?}")]
    UnknownBranch { node: NodeKind, branch: String },
    #[error("document did not reach the end after {0} steps")]
    StepLimit(usize),
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
