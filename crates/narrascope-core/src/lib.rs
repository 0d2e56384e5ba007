//! Core types, taxonomy store, per-document state, and run configuration.

pub mod config;
pub mod label;
pub mod state;
pub mod taxonomy;

pub use config::{
    AggregationMethod, CallParams, ClassifierConfig, ConfigError, LevelConfig, NodeKind,
    NodeOverride, Strategy,
};
pub use label::{AgentOutcome, AgentStatus, FuzzyMatchRecord, Label, Level, MatchKind, OTHER};
pub use state::{APPROVED, ClassificationState, StateDelta};
pub use taxonomy::{Taxonomy, TaxonomyError};
