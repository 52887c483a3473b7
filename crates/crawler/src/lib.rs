//! Session orchestration: sequences target visits, owns the dwell/annotation
//! window, and drives session, capture and ledger.

pub mod annotate;
pub mod orchestrator;
pub mod targets;
pub mod visit;
pub mod vpn;

pub use orchestrator::Orchestrator;
pub use targets::{parse_targets, read_targets};
