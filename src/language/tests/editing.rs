/// editing.rs
///
/// Revising sources: structural sharing between revisions, rejected
/// edits, the token cache and reading one source from several threads.

use super::*;
use crate::common::*;
use crate::language::ast::{EditError, MeasurementLiteral, Name};
use crate::language::context::{Context, Shares};
use crate::language::eval::NativeRegistry;
use crate::language::tokens::{Token, TokenKind};
use crate::language::Source;
use crate::runtime::{config::Config, logging::DummyLogger, Evaluator};
use crossbeam_utils::thread::scope;

fn nth_of_kind(source: &Source, kind: &str, index: usize) -> NodeId {
    source
        .heap
        .descendants(source.program)
        .into_iter()
        .filter(|id| source.heap[*id].kind_name() == kind)
        .nth(index)
        .unwrap()
}

fn number_literal(source: &mut Source, text: &str) -> NodeId {
    let mut token = Token::new(TokenKind::Number, text);
    token.space = " ".to_string();
    token.preceding_space = true;
    let number = source.heap.alloc_token(token);
    source.heap.alloc(MeasurementLiteral { number, unit: None })
}

fn evaluate(source: Source) -> Option<f64> {
    let context = Context::new(Rc::new(source), Shares::new(), Arc::new(NativeRegistry::with_defaults()));
    let mut evaluator = Evaluator::new(Rc::new(context), Config::default(), Box::new(DummyLogger));
    evaluator.start().unwrap();
    evaluator.current_value().and_then(|v| v.as_number())
}

#[test]
fn test_revision_shares_untouched_nodes() {
    let mut source = Source::new("revise", "x: 1\ny: 2\nx + y");
    let original = nth_of_kind(&source, "MeasurementLiteral", 1);
    let first_bind = nth_of_kind(&source, "Bind", 0);
    let second_bind = nth_of_kind(&source, "Bind", 1);

    let replacement = number_literal(&mut source, "5");
    let previous = source.revise(original, replacement).unwrap();
    assert_ne!(previous, source.program);

    let before = source.heap.descendants(previous);
    let after = source.heap.descendants(source.program);
    assert!(before.contains(&first_bind) && after.contains(&first_bind));
    assert!(before.contains(&second_bind) && !after.contains(&second_bind));
    assert!(after.contains(&replacement) && !after.contains(&original));

    assert_eq!(source.text(), "x: 1\ny: 5\nx + y");
    let mut old = source.clone();
    old.program = previous;
    assert_eq!(old.text(), "x: 1\ny: 2\nx + y");

    assert_eq!(evaluate(old), Some(3.));
    assert_eq!(evaluate(source), Some(6.));
}

#[test]
fn test_rejected_edits_leave_the_source_alone() {
    let mut source = Source::new("reject", "x: 1\ny: 2\nx + y");
    let program = source.program;
    let first = nth_of_kind(&source, "MeasurementLiteral", 0);
    let second = nth_of_kind(&source, "MeasurementLiteral", 1);

    let detached = number_literal(&mut source, "3");
    assert_eq!(source.revise(detached, second), Err(EditError::NotInTree(detached)));
    assert_eq!(source.revise(second, first), Err(EditError::AlreadyInTree(first)));

    let name = source.heap.alloc_token(Token::new(TokenKind::Name, "z"));
    let name = source.heap.alloc(Name { separator: None, name, language: None });
    match source.revise(second, name) {
        Err(EditError::IncompatibleReplacement { field, replacement }) => {
            assert_eq!(field, "value");
            assert_eq!(replacement, "Name");
        },
        other => panic!("Expected an incompatible replacement, got {:?}", other),
    }

    assert_eq!(source.program, program);
    assert_eq!(source.text(), "x: 1\ny: 2\nx + y");
}

#[test]
fn test_token_cache() {
    let text = "•Cat(name•'')\n`purrs`/eng ƒ speak() 'meow'\nCat('Tom').name";
    let source = Source::new("cached", text);
    let bytes = source.cache_tokens().unwrap();
    let restored = Source::from_cached_tokens("cached", &bytes).unwrap();
    assert_eq!(restored.text(), text);
    assert_eq!(restored.heap.descendants(restored.program).len(), source.heap.descendants(source.program).len());

    assert!(Source::from_cached_tokens("garbage", &[1, 2, 3]).is_err());
}

#[test]
fn test_concurrent_reads() {
    let source = Source::new("shared", "x: [1 2 3]\nx[2] + 1");
    let expected = source.text();
    scope(|s| {
        for _ in 0..4 {
            let source = &source;
            let expected = &expected;
            s.spawn(move |_| {
                for _ in 0..50 {
                    assert_eq!(&source.text(), expected);
                }
            });
        }
    })
    .unwrap();
}
