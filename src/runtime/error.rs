use crate::language::eval::StreamId;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StreamError {
    UnknownStream(StreamId),
    /// The evaluator receiving records was dropped.
    EvaluatorGone,
}

/// The operation is not available in the evaluator's current state.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct WrongStateError;
