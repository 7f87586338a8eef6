/// parser.rs
///
/// Round-trips, error recovery and the bind/expression decision.

use super::*;
use crate::language::ast::{Node, UnparsableReason};
use crate::language::parse;

#[test]
fn test_round_trip() {
    let programs = [
        "1 + 2",
        "x: 1m·s/h\nx",
        "`Adds`/eng ƒ add(a•# b•#:1) a + b\nadd(1)",
        "•Cat,Gato/spa(name•'' lives•#:9) (\n  ƒ speak() \"meow \\name\\!\"\n)\nCat('Tom').speak()",
        "[1 2 3][2] + {1:'a' 2:'b'}{1}",
        "|a•# |b•''\n|1 |'x'\n|2 |'y'",
        "↓ scores 2\n↑ total: 0 ∆ Tick total + 1",
        "[1 2",
        ") 1 (",
        "  \n\t  ",
    ];
    for program in programs.iter() {
        assert_eq!(parse(program).text(), *program);
    }
}

#[test]
fn test_recovery_accounts_for_every_token() {
    let programs = ["[1 2", "ƒ (a", "x: •\ny: 2", "•Cat(a b", "1 + + 2\n3", "{1:2 3", "a.1 b"];
    for program in programs.iter() {
        let source = parse(program);
        let leaves = source.heap.leaves(source.program);
        let mut unique = leaves.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), leaves.len(), "{:?} repeats a token", program);
        assert_eq!(leaves.len(), source.heap.tokens.len(), "{:?} loses a token", program);
    }
}

#[test]
fn test_unclosed_list() {
    Tester::new_single_source_expect_conflicts("unclosed list", "[1 2")
        .assert_count(1)
        .assert_conflict("Unparsable", ConflictKind::Unparsable(UnparsableReason::ExpectedListClose));

    Tester::new("unclosed list node")
        .with_source("[1 2")
        .compile()
        .for_node("Unparsable", 0, |node| {
            node.assert_unparsable(UnparsableReason::ExpectedListClose).assert_text("[1 2");
        });
}

#[test]
fn test_recovery_resumes_on_next_line() {
    let tester = Tester::new("next line").with_source("1 + )\ny: 2\ny").compile();
    assert_eq!(tester.count_nodes("Bind"), 1);
    tester.for_node("Unparsable", 0, |node| {
        node.assert_unparsable(UnparsableReason::ExpectedExpression).assert_text(")");
    });

    let tester = Tester::new("unclosed evaluate").with_source("f(\n2 + 3").compile();
    assert_eq!(tester.count_nodes("BinaryOperation"), 1);
    tester.for_node("Unparsable", 0, |node| {
        node.assert_unparsable(UnparsableReason::ExpectedEvalClose);
    });
}

#[test]
fn test_bind_or_expression() {
    let tester = Tester::new("bind with value").with_source("a: 1").compile();
    assert_eq!(tester.count_nodes("Bind"), 1);

    // Reads as a typed bind and as a type check equally well; the bind wins
    let tester = Tester::new("tie").with_source("a•#").compile();
    assert_eq!(tester.count_nodes("Bind"), 1);
    assert_eq!(tester.count_nodes("Is"), 0);

    let tester = Tester::new("plain reference").with_source("a").compile();
    assert_eq!(tester.count_nodes("Bind"), 0);
    assert_eq!(tester.count_nodes("Reference"), 1);

    // The bind reading has an unparsable value, the expression reading does not
    let tester = Tester::new("broken value").with_source("a: )").compile();
    assert_eq!(tester.count_nodes("Bind"), 0);
    assert_eq!(tester.count_nodes("Unparsable"), 1);
}

#[test]
fn test_postfix_operators() {
    Tester::new("select")
        .with_source("t |? |a a > 1")
        .compile()
        .for_node("Select", 0, |node| {
            node.assert_text("t |? |a a > 1");
        });

    Tester::new("conversion of an access")
        .with_source("x.y → ''")
        .compile()
        .for_node("Convert", 0, |node| {
            node.assert_text("x.y → ''");
        });

    let tester = Tester::new("evaluate needs adjacency").with_source("f (1)").compile();
    assert_eq!(tester.count_nodes("Evaluate"), 0);
    let tester = Tester::new("evaluate").with_source("f(1)").compile();
    assert_eq!(tester.count_nodes("Evaluate"), 1);

    // A conversion starting a line is a definition, not a postfix
    let tester = Tester::new("definition on next line").with_source("1\n→ # '' 'num'").compile();
    assert_eq!(tester.count_nodes("Convert"), 0);
    assert_eq!(tester.count_nodes("ConversionDefinition"), 1);
}

#[test]
fn test_definitions() {
    let source = parse("•Cat •Animal ∘T (a•T) ( ƒ speak() … )\n→ # '' 'num'");
    let heap = &source.heap;
    let nodes: Vec<&Node> = heap.descendants(source.program).into_iter().map(|id| &heap[id]).collect();
    let structure = nodes.iter().find_map(|n| match n {
        Node::StructureDefinition(s) => Some(s),
        _ => None,
    });
    let structure = structure.unwrap();
    assert_eq!(structure.interfaces.len(), 1);
    assert_eq!(structure.type_variables.len(), 1);
    assert_eq!(structure.inputs.len(), 1);
    assert!(structure.block.is_some());
    assert!(nodes.iter().any(|n| matches!(n, Node::FunctionDefinition(f) if f.etc.is_some() && f.body.is_none())));
    assert!(nodes.iter().any(|n| matches!(n, Node::ConversionDefinition(_))));
}

#[test]
fn test_maps_and_sets() {
    let tester = Tester::new("empty map").with_source("{:}").compile();
    assert_eq!(tester.count_nodes("MapLiteral"), 1);
    let tester = Tester::new("set").with_source("{1 2}").compile();
    assert_eq!(tester.count_nodes("SetLiteral"), 1);
    Tester::new_single_source_expect_conflicts("mixed", "{1:2 3}")
        .assert_conflict("MapLiteral", ConflictKind::MixedSetAndMap);
}

#[test]
fn test_deeply_nested_binds() {
    let depth = 24;
    let mut program = String::new();
    for level in 0..depth {
        program.push_str(&format!("a{}: (", level));
    }
    program.push('1');
    program.push_str(&")".repeat(depth));

    let source = parse(&program);
    assert_eq!(source.text(), program);
    let nodes = source.heap.descendants(source.program);
    let binds = nodes.iter().filter(|id| source.heap[**id].kind_name() == "Bind").count();
    assert_eq!(binds, depth);
    assert!(nodes.iter().all(|id| !source.heap[*id].is_unparsable()));
}
