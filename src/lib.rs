#[macro_use]
mod macros;

mod collections;
mod common;
pub mod language;
pub mod runtime;

pub use language::{parse, Source};
pub use runtime::{config::Config, error, Evaluator, EvaluatorState, StepOutcome};
