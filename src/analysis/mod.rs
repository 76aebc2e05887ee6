//! Evaluation anomaly analysis.
//!
//! Filtering, aggregation and scoring of evaluation records. Everything in
//! here is synchronous and free of I/O; levels come in through the
//! [`LevelResolver`] trait.

pub mod aggregator;
pub mod detector;
pub mod filter;
pub mod levels;
pub mod received;
pub mod scorer;

pub use detector::Detector;
pub use filter::{RecordFilter, DEFAULT_EXCLUDED_KEYWORDS};
pub use levels::{LevelResolver, StaticLevels};
pub use received::ReceivedDetector;
pub use scorer::{FlagRule, ScoringPolicy};
