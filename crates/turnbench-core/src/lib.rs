//! turnbench-core: multi-turn behavioral consistency harness for language models.
//! Drive a model adapter through a scenario, then score the transcript: one metric per
//! responding turn plus one per validator, aggregated into an `EvaluationResult`.
//! See `examples/vending.rs` for a quickstart.

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod datasource;
pub mod error;
pub mod evaluator;
pub mod export;
pub mod matcher;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod testing;
pub mod turn;
pub mod validator;

pub mod adapters {
    pub mod mock;
    pub mod openai;
}

pub mod scenarios {
    pub mod vending;
}

pub use adapter::{from_async_fn, GenerationParams, ModelAdapter};
pub use adapters::{mock::MockAdapter, openai::OpenAiAdapter};
pub use config::{AdapterConfig, OutputConfig, RunConfig, ScenarioRef};
pub use conversation::ConversationManager;
pub use datasource::{FileScenarioSource, ScenarioSource, StaticScenarios};
pub use error::EvalError;
pub use evaluator::Evaluator;
pub use report::generate_html_report;
pub use runner::{Bench, BenchBuilder, BenchReport, FailureKind, ScenarioFailure, ScenarioRun};
pub use scenario::{ConversationTurn, Scenario, ScenarioBuilder, ScenarioConfig, ScenarioFile, TurnKind};
pub use validator::{Validator, ValidatorRegistry};
pub use turnbench_types::{
    EvaluationMetric, EvaluationResult, ExpectedPattern, MatchMode, Message, ModelResponse, ResultDocument,
    Role, Transcript,
};
