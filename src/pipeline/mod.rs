//! Pipeline orchestration.

pub mod aggregator;

pub use aggregator::{Aggregator, AggregatorSettings};
