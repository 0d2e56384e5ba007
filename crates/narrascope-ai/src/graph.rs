//! The per-document state machine.
//!
//! Topology is assembled from configuration: validation, aggregation, and
//! cleaning nodes (and the edges around them) only exist when the settings
//! call for them. [`GraphBuilder`] takes nodes and edges as data, and
//! [`GraphBuilder::compile`] rejects anything that could strand a document.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

use narrascope_core::{ClassificationState, ClassifierConfig, LevelConfig, NodeKind, Strategy};
use tracing::{debug, trace};

use crate::error::{ClassifyError, GraphError};
use crate::nodes::{self, NodeContext, route};

/// Upper bound on node executions per document. Validation loops are capped
/// well below this, so hitting it means the topology is wrong.
pub const MAX_STEPS: usize = 64;

/// Where an edge leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Node(NodeKind),
    End,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(node) => write!(f, "{node}"),
            Self::End => f.write_str("END"),
        }
    }
}

/// Picks a branch name from the current state.
pub type Router = Arc<dyn Fn(&ClassificationState) -> &'static str + Send + Sync>;

#[derive(Clone)]
enum Edge {
    Direct(Target),
    Conditional {
        router: Router,
        branches: BTreeMap<&'static str, Target>,
    },
}

impl Edge {
    fn targets(&self) -> Vec<Target> {
        match self {
            Self::Direct(target) => vec![*target],
            Self::Conditional { branches, .. } => branches.values().copied().collect(),
        }
    }
}

#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<NodeKind>,
    edges: BTreeMap<NodeKind, Edge>,
    entry: Option<NodeKind>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: NodeKind) -> Result<&mut Self, GraphError> {
        if self.nodes.contains(&node) {
            return Err(GraphError::DuplicateNode(node));
        }
        self.nodes.push(node);
        Ok(self)
    }

    pub fn add_edge(&mut self, from: NodeKind, to: Target) -> Result<&mut Self, GraphError> {
        self.insert_edge(from, Edge::Direct(to))
    }

    pub fn add_conditional_edges(
        &mut self,
        from: NodeKind,
        router: Router,
        branches: impl IntoIterator<Item = (&'static str, Target)>,
    ) -> Result<&mut Self, GraphError> {
        let branches = branches.into_iter().collect();
        self.insert_edge(from, Edge::Conditional { router, branches })
    }

    pub fn set_entry(&mut self, node: NodeKind) -> &mut Self {
        self.entry = Some(node);
        self
    }

    fn insert_edge(&mut self, from: NodeKind, edge: Edge) -> Result<&mut Self, GraphError> {
        if self.edges.contains_key(&from) {
            return Err(GraphError::DuplicateEdge(from));
        }
        self.edges.insert(from, edge);
        Ok(self)
    }

    /// Check the topology and freeze it.
    pub fn compile(self) -> Result<Graph, GraphError> {
        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        let known: HashSet<NodeKind> = self.nodes.iter().copied().collect();
        if !known.contains(&entry) {
            return Err(GraphError::UnknownNode(entry));
        }

        for (from, edge) in &self.edges {
            if !known.contains(from) {
                return Err(GraphError::UnknownNode(*from));
            }
            for target in edge.targets() {
                if let Target::Node(to) = target
                    && !known.contains(&to)
                {
                    return Err(GraphError::UnknownNode(to));
                }
            }
        }
        if let Some(node) = self.nodes.iter().find(|n| !self.edges.contains_key(n)) {
            return Err(GraphError::NoOutgoingEdge(*node));
        }

        let mut reached = HashSet::from([entry]);
        let mut queue = VecDeque::from([entry]);
        while let Some(node) = queue.pop_front() {
            for target in self.edges[&node].targets() {
                if let Target::Node(next) = target
                    && reached.insert(next)
                {
                    queue.push_back(next);
                }
            }
        }
        if let Some(node) = self.nodes.iter().find(|n| !reached.contains(n)) {
            return Err(GraphError::Unreachable(*node));
        }

        Ok(Graph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
        })
    }
}

/// A compiled, immutable topology shared by every document in a run.
pub struct Graph {
    nodes: Vec<NodeKind>,
    edges: BTreeMap<NodeKind, Edge>,
    entry: NodeKind,
}

/// How a stage hands off once its last node has run.
enum Exit {
    Direct(Target),
    Branch {
        router: Router,
        branches: Vec<(&'static str, Target)>,
    },
}

/// Node kinds making up one labelling stage.
struct Stage {
    classify: NodeKind,
    validate: NodeKind,
    aggregate: NodeKind,
    clean: NodeKind,
    review: fn(&ClassificationState) -> &'static str,
}

const NARRATIVE_STAGE: Stage = Stage {
    classify: NodeKind::ClassifyNarratives,
    validate: NodeKind::ValidateNarratives,
    aggregate: NodeKind::AggregateNarratives,
    clean: NodeKind::CleanNarratives,
    review: route::narrative_review,
};

const SUBNARRATIVE_STAGE: Stage = Stage {
    classify: NodeKind::ClassifySubnarratives,
    validate: NodeKind::ValidateSubnarratives,
    aggregate: NodeKind::AggregateSubnarratives,
    clean: NodeKind::CleanSubnarratives,
    review: route::subnarrative_review,
};

impl Graph {
    /// Assemble the topology a configuration calls for.
    pub fn build(config: &ClassifierConfig) -> Result<Self, GraphError> {
        let mut g = GraphBuilder::new();
        let writer = Target::Node(NodeKind::ResultWriter);

        let first = match config.strategy {
            Strategy::Hierarchical => NodeKind::ClassifyCategory,
            Strategy::Flat => NodeKind::ClassifyNarratives,
        };
        if config.clean_text {
            g.add_node(NodeKind::CleanText)?
                .add_edge(NodeKind::CleanText, Target::Node(first))?
                .set_entry(NodeKind::CleanText);
        } else {
            g.set_entry(first);
        }

        if config.strategy == Strategy::Hierarchical {
            g.add_node(NodeKind::ClassifyCategory)?
                .add_node(NodeKind::HandleOtherCategory)?
                .add_conditional_edges(
                    NodeKind::ClassifyCategory,
                    Arc::new(route::category),
                    [
                        (route::OTHER_BRANCH, Target::Node(NodeKind::HandleOtherCategory)),
                        (route::CONTINUE, Target::Node(NodeKind::ClassifyNarratives)),
                    ],
                )?
                .add_edge(NodeKind::HandleOtherCategory, writer)?;
        }

        wire_stage(
            &mut g,
            &NARRATIVE_STAGE,
            &config.narrative,
            config.clean_labels,
            Exit::Branch {
                router: Arc::new(route::narratives_found),
                branches: vec![
                    (route::EMPTY, Target::Node(NodeKind::HandleEmptyNarratives)),
                    (route::CONTINUE, Target::Node(NodeKind::ClassifySubnarratives)),
                ],
            },
        )?;
        g.add_node(NodeKind::HandleEmptyNarratives)?
            .add_edge(NodeKind::HandleEmptyNarratives, writer)?;

        wire_stage(
            &mut g,
            &SUBNARRATIVE_STAGE,
            &config.subnarrative,
            config.clean_labels,
            Exit::Direct(writer),
        )?;

        g.add_node(NodeKind::ResultWriter)?
            .add_edge(NodeKind::ResultWriter, Target::End)?;

        let graph = g.compile()?;
        debug!(nodes = graph.nodes.len(), entry = %graph.entry, "graph compiled");
        Ok(graph)
    }

    pub fn entry(&self) -> NodeKind {
        self.entry
    }

    /// Registered nodes in registration order.
    pub fn nodes(&self) -> &[NodeKind] {
        &self.nodes
    }

    pub fn contains(&self, node: NodeKind) -> bool {
        self.nodes.contains(&node)
    }

    /// Branch targets leaving `node`, `None` if it is not registered.
    pub fn successors(&self, node: NodeKind) -> Option<Vec<Target>> {
        self.edges.get(&node).map(Edge::targets)
    }

    /// Human-readable topology, one node per line.
    pub fn describe(&self) -> String {
        let mut out = format!("entry: {}\n", self.entry);
        for node in &self.nodes {
            let _ = match &self.edges[node] {
                Edge::Direct(target) => writeln!(out, "{node} -> {target}"),
                Edge::Conditional { branches, .. } => {
                    let arms: Vec<String> = branches
                        .iter()
                        .map(|(branch, target)| format!("[{branch}] {target}"))
                        .collect();
                    writeln!(out, "{node} -> {}", arms.join(" | "))
                }
            };
        }
        out
    }

    /// Drive one document from the entry node to the end.
    pub async fn run(
        &self,
        mut state: ClassificationState,
        ctx: &NodeContext,
    ) -> Result<ClassificationState, ClassifyError> {
        let mut current = self.entry;
        for _ in 0..MAX_STEPS {
            trace!(node = %current, "entering node");
            let delta = nodes::run(current, &state, ctx).await?;
            state.apply(delta);
            match self.next(current, &state)? {
                Target::Node(next) => current = next,
                Target::End => return Ok(state),
            }
        }
        Err(GraphError::StepLimit(MAX_STEPS).into())
    }

    fn next(&self, node: NodeKind, state: &ClassificationState) -> Result<Target, GraphError> {
        match self.edges.get(&node) {
            Some(Edge::Direct(target)) => Ok(*target),
            Some(Edge::Conditional { router, branches }) => {
                let branch = router(state);
                branches
                    .get(branch)
                    .copied()
                    .ok_or_else(|| GraphError::UnknownBranch {
                        node,
                        branch: branch.to_string(),
                    })
            }
            None => Err(GraphError::NoOutgoingEdge(node)),
        }
    }
}

/// Register one labelling stage:
/// `classify -> [validate loop] -> [aggregate] -> [clean] -> exit`.
fn wire_stage(
    g: &mut GraphBuilder,
    stage: &Stage,
    level: &LevelConfig,
    clean: bool,
    exit: Exit,
) -> Result<(), GraphError> {
    let mut tail = Vec::new();
    if level.is_ensemble() {
        tail.push(stage.aggregate);
    }
    if clean {
        tail.push(stage.clean);
    }

    g.add_node(stage.classify)?;
    if level.validation {
        g.add_node(stage.validate)?;
    }
    for node in &tail {
        g.add_node(*node)?;
    }

    // With no tail the stage exit hangs directly off the classifier (or
    // its reviewer).
    let reviewed = match (tail.first(), tail.last()) {
        (Some(first), Some(last)) => {
            for pair in tail.windows(2) {
                g.add_edge(pair[0], Target::Node(pair[1]))?;
            }
            connect(g, *last, exit)?;
            Exit::Direct(Target::Node(*first))
        }
        _ => exit,
    };

    if level.validation {
        g.add_edge(stage.classify, Target::Node(stage.validate))?;
        connect(g, stage.validate, with_retry(stage, reviewed))
    } else {
        connect(g, stage.classify, reviewed)
    }
}

/// Put the critic's retry branch in front of `exit`.
fn with_retry(stage: &Stage, exit: Exit) -> Exit {
    let review = stage.review;
    let retry = (route::RETRY, Target::Node(stage.classify));
    match exit {
        Exit::Direct(target) => Exit::Branch {
            router: Arc::new(review),
            branches: vec![retry, (route::APPROVED_BRANCH, target)],
        },
        Exit::Branch {
            router,
            mut branches,
        } => {
            branches.push(retry);
            Exit::Branch {
                router: Arc::new(move |state: &ClassificationState| {
                    if review(state) == route::RETRY {
                        route::RETRY
                    } else {
                        router(state)
                    }
                }),
                branches,
            }
        }
    }
}

fn connect(g: &mut GraphBuilder, from: NodeKind, exit: Exit) -> Result<(), GraphError> {
    match exit {
        Exit::Direct(target) => g.add_edge(from, target)?,
        Exit::Branch { router, branches } => g.add_conditional_edges(from, router, branches)?,
    };
    Ok(())
}
