//! # Finding Deduplication
//!
//! Parses structured finding blocks out of free-form review output,
//! normalizes them, and collapses near-duplicates across review passes
//! using Dice-coefficient similarity on character bigrams.
//!
//! Similarity math is stateless (`similarity`); parsed and normalized
//! values are inert data (`parser`, `normalize`); the merger owns the
//! lookup indices and the output formatting.

pub mod merger;
pub mod normalize;
pub mod parser;
pub mod similarity;

pub use merger::{aggregate_agent_results, AggregatedFinding, FindingMerger};
pub use normalize::NormalizedFinding;
pub use parser::{parse_finding_blocks, FindingBlock};
