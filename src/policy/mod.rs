//! Pluggable policies applied around every tool invocation
//!
//! Duplicate suppression gates execution; leakage flagging and quality
//! scoring post-process what the tool returned. Detection vocabularies live
//! here so they can evolve without touching the loop.

pub mod duplication;
pub mod leakage;
pub mod quality;

pub use duplication::{Admission, DuplicationPolicy, SOURCE_UNAVAILABLE};
pub use leakage::{KeywordLeakageFilter, LeakageFilter, REDACTION_NOTICE};
pub use quality::{score_text, HeuristicQualityEvaluator, QualityEvaluator, TOOL_ERROR_TAG};
