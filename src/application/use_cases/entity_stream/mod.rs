//! Streaming aggregation of raw shard records and normalized records.

pub mod accumulator;
pub mod service;
pub mod sources;
pub mod unify;

pub use accumulator::Flow;
pub use service::EntityStreamService;
pub use sources::{NormalizedStore, ProjectDirectory, ShardOpener, ShardReader};
