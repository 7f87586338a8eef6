use std::fmt;

use crate::common::*;
use crate::language::context::Context;

/// Why an evaluation halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ExceptionKind {
    #[display(fmt = "blocked by conflicts")]
    BlockingConflict,
    #[display(fmt = "unknown name")]
    UnknownName,
    #[display(fmt = "type mismatch")]
    TypeMismatch,
    #[display(fmt = "not a function")]
    NotAFunction,
    #[display(fmt = "missing input")]
    MissingInput,
    #[display(fmt = "unimplemented")]
    Unimplemented,
    #[display(fmt = "unknown property")]
    UnknownProperty,
    #[display(fmt = "unknown conversion")]
    UnknownConversion,
    #[display(fmt = "not a table")]
    NotATable,
    #[display(fmt = "not a stream")]
    NotAStream,
    #[display(fmt = "step limit reached")]
    StepLimit,
}

/// A frame of the evaluation stack at the time of an exception.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionFrame {
    pub line: u32,
    pub procedure: String,
    pub is_func: bool,
}

impl fmt::Display for ExceptionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func_or_program = if self.is_func { "function" } else { "program " };
        write!(f, "{} {}:{}", func_or_program, &self.procedure, self.line)
    }
}

/// Exception value. Produced by an evaluation step that cannot proceed;
/// halts the evaluator with this as its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub node: NodeId,
    pub line: u32,
    pub message: String,
    pub frames: Vec<ExceptionFrame>,
}

impl Exception {
    pub(crate) fn new(context: &Context, kind: ExceptionKind, node: NodeId, message: String) -> Self {
        Exception { kind, node, line: line_of(context, node), message, frames: Vec::new() }
    }
}

/// One-based line on which `node` starts.
pub(crate) fn line_of(context: &Context, node: NodeId) -> u32 {
    let heap = context.heap();
    let first = match heap.leaves(node).first() {
        Some(first) => first.index(),
        None => return 1,
    };
    let breaks: usize = heap
        .tokens
        .iter()
        .take_while(|(id, _)| id.index() <= first)
        .map(|(_, token)| token.space.matches('\n').count())
        .sum();
    breaks as u32 + 1
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}: {}", self.kind, self.line, self.message)?;
        if !self.frames.is_empty() {
            writeln!(f)?;
            writeln!(f, " +-  Stack trace:")?;
            for frame in self.frames.iter().rev() {
                write!(f, " | ")?;
                fmt::Display::fmt(frame, f)?;
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_stack_trace() {
        let source = crate::language::parse("1");
        let mut exception = Exception {
            kind: ExceptionKind::TypeMismatch,
            node: source.program,
            line: 2,
            message: "expected a number".to_string(),
            frames: Vec::new(),
        };
        assert_eq!(exception.to_string(), "type mismatch at line 2: expected a number");

        exception.frames.push(ExceptionFrame { line: 2, procedure: "main".to_string(), is_func: false });
        exception.frames.push(ExceptionFrame { line: 1, procedure: "f".to_string(), is_func: true });
        let text = exception.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], " +-  Stack trace:");
        assert_eq!(lines[2], " | function f:1");
        assert_eq!(lines[3], " | program  main:2");
    }
}
