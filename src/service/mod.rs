/// Remote inference service: request orchestration, wire types and the high-level client.

pub mod client;
pub mod orchestrator;
pub mod wire;

pub use client::{ModelServiceClient, PredictOutcome};
pub use orchestrator::{CancelToken, Operation, Orchestrator, Outcome, RequestCategory, RetryPolicy};
pub use wire::{ModelStatus, PredictResponse, WirePrediction};
