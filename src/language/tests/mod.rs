/**
 * language/tests
 *
 * Tests for the front end and the executor: parsing and recovery, the type
 * model, the conflict rules, evaluation through the runtime's evaluator and
 * edits of the immutable tree. Each file exercises one area through the
 * builder-style `Tester` harness in `utils.rs`.
 */

mod utils;
mod parser;
mod typing;
mod conflicts;
mod eval;
mod editing;

pub(crate) use utils::Tester; // the testing harness
pub(crate) use crate::language::conflicts::ConflictKind;
pub(crate) use crate::language::eval::{ExceptionKind, Value};
