//! Result storage: TSV results file plus evidence and votes JSON sidecars.

mod error;
pub use error::StoreError;

mod files;
mod record;
mod sink;

pub use files::{EVIDENCE_DIR, FileSink, RESULTS_FILE, VOTES_DIR};
pub use record::{
    DocumentResult, EvidenceSidecar, LevelVotes, NarrativeEvidence, SubnarrativeEvidence,
    VoteRecord, VoteSettings,
};
pub use sink::{MemorySink, ResultSink};
