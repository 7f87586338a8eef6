/// eval
///
/// Evaluates programs step by step. Every expression is compiled into a
/// flat list of steps (see `steps`) that a `Prompt` executes against a
/// stack of frames. Values produced by steps are pushed onto the value
/// stack of the frame they run in; finishing a node pops the values of its
/// dependencies and pushes its own.
///
/// Evaluating a user function, structure, conversion or table query pushes
/// a new frame. Native functions run immediately. An exception halts the
/// prompt and becomes the value of the evaluation.

pub mod error;
pub mod natives;
pub mod steps;
pub mod value;
mod executor;

pub use error::{Exception, ExceptionKind};
pub use executor::{EvalContinuation, Prompt};
pub(crate) use executor::RunContext;
pub use natives::{Evaluation, NativeRegistry};
pub use value::{StreamId, Value};
