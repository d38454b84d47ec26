//! Request orchestration: document preparation and concurrent answering.

mod engine;

pub use engine::{QueryEngine, QueryEngineBuilder, QueryOptions, QueryStage, QueryStats};
