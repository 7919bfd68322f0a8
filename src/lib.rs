pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod feeder;
pub mod inference;
pub mod input;
pub mod interject;
pub mod output;
pub mod prompting;
pub mod sampler;
pub mod stats;

#[cfg(test)]
mod testing;

pub use config::{GenerationParams, RunConfig, SamplingConfig};
pub use engine::{CandleEngine, EngineOptions, InferenceEngine, Token};
pub use error::{InferenceError, Result};
pub use inference::{Orchestrator, RunOutcome, StopReason};
