/// conflicts.rs
///
/// Conflicts found during analysis: names, definitions, interfaces,
/// evaluations and queries.

use super::*;
use crate::language::ast::UnparsableReason;

#[test]
fn test_unparsable_is_a_single_conflict() {
    Tester::new_single_source_expect_conflicts("unclosed list", "[1 2")
        .assert_count(1)
        .assert_conflict("Unparsable", ConflictKind::Unparsable(UnparsableReason::ExpectedListClose));
}

#[test]
fn test_names() {
    Tester::new_single_source_expect_conflicts("unknown name", "y")
        .assert_conflict("Reference", ConflictKind::UnknownName("y".to_string()));
    Tester::new_single_source_expect_conflicts("to unparsable", "↑ x: )\nx")
        .assert_conflict("Reference", ConflictKind::ReferenceToUnparsable);
    Tester::new_single_source_expect_conflicts("circular", "x: x + 1\nx")
        .assert_conflict("Reference", ConflictKind::CircularReference("x".to_string()));
    Tester::new_single_source_expect_conflicts("unknown borrow", "↓ scores\nscores")
        .assert_conflict("Borrow", ConflictKind::UnknownBorrow("scores".to_string()));
    Tester::new_single_source_expect_conflicts("misplaced this", ".")
        .assert_conflict("This", ConflictKind::MisplacedThis);
}

#[test]
fn test_recursion_is_not_circular() {
    Tester::new_single_source_expect_ok("recursion", "ƒ count(n•#)•# n < 1 ? 0 count(n - 1)\ncount(3)");
}

#[test]
fn test_duplicates() {
    Tester::new_single_source_expect_conflicts("languages", "`a`/eng `b`/eng x: 1\nx")
        .assert_conflict("Docs", ConflictKind::DuplicateLanguage("eng".to_string()));
    Tester::new_single_source_expect_conflicts("aliases", "•Cat,Cat(a b)")
        .assert_conflict("Names", ConflictKind::DuplicateName("Cat".to_string()));
    Tester::new_single_source_expect_conflicts("inputs", "•Cat(a a)")
        .assert_conflict("StructureDefinition", ConflictKind::DuplicateName("a".to_string()));
    Tester::new_single_source_expect_conflicts("binds", "a: 1\na: 2\na")
        .assert_conflict("Block", ConflictKind::DuplicateName("a".to_string()));
    Tester::new_single_source_expect_conflicts("type variables", "•Cat ∘T∘T ()")
        .assert_conflict("StructureDefinition", ConflictKind::DuplicateTypeVariables("T".to_string()));
}

#[test]
fn test_optional_inputs_come_last() {
    Tester::new_single_source_expect_conflicts("structure", "•Cat(a•#:1 b•#)")
        .assert_conflict("StructureDefinition", ConflictKind::RequiredAfterOptional);
    Tester::new_single_source_expect_conflicts("function", "ƒ f(a•#:1 b•#) a")
        .assert_conflict("FunctionDefinition", ConflictKind::RequiredAfterOptional);
}

#[test]
fn test_interfaces() {
    Tester::new_single_source_expect_conflicts(
        "unimplemented",
        "•Animal() ( ƒ sound()•'' … )\n•Cat •Animal() ( ƒ speak() 'meow' )",
    )
    .assert_conflict("StructureDefinition", ConflictKind::Unimplemented("sound".to_string()));

    Tester::new_single_source_expect_ok(
        "implemented",
        "•Animal() ( ƒ sound()•'' … )\n•Cat •Animal() ( ƒ sound() 'meow' )",
    );

    // Mixing abstract and implemented functions is only advisory
    Tester::new("mixed")
        .with_source("•Animal() ( ƒ sound()•'' … ƒ smell() 1 )")
        .compile()
        .expect_ok()
        .expect_conflicts()
        .assert_count(1)
        .assert_advisory(ConflictKind::Implemented);

    Tester::new_single_source_expect_conflicts("inputs", "•Animal(name•'') ( ƒ sound()•'' … ƒ smell()•# … )")
        .assert_conflict("StructureDefinition", ConflictKind::DisallowedInputs)
        .assert_count_of(0, |kind| *kind == ConflictKind::Implemented);
}

#[test]
fn test_evaluations() {
    let add = "ƒ add(a•# b•#) a + b\n";
    Tester::new_single_source_expect_conflicts("missing", format!("{}add(1)", add))
        .assert_conflict("Evaluate", ConflictKind::MissingInput("b".to_string()));
    Tester::new_single_source_expect_conflicts("incompatible", format!("{}add(1 'two')", add))
        .assert_conflict("Evaluate", ConflictKind::IncompatibleInput);
    Tester::new_single_source_expect_conflicts("unexpected", format!("{}add(1 2 3)", add))
        .assert_conflict("Evaluate", ConflictKind::UnexpectedInput);
    Tester::new_single_source_expect_conflicts("not a function", "x: 1\nx(2)")
        .assert_conflict("Evaluate", ConflictKind::NotAFunction);
    Tester::new_single_source_expect_ok("named", format!("{}add(b:1 a:2)", add));
}

#[test]
fn test_declared_types() {
    Tester::new_single_source_expect_conflicts("bind", "x•'': 1")
        .assert_conflict("Bind", ConflictKind::IncompatibleBind);
    Tester::new_single_source_expect_conflicts("output", "ƒ f()•# 'one'")
        .assert_conflict("FunctionDefinition", ConflictKind::IncompatibleOutput);
    Tester::new_single_source_expect_conflicts("unknown type", "x•Dog: 1")
        .assert_conflict("NameType", ConflictKind::UnknownTypeName("Dog".to_string()));
}

#[test]
fn test_operations() {
    Tester::new_single_source_expect_conflicts("condition", "1 ? 2 3")
        .assert_conflict("Conditional", ConflictKind::ExpectedBooleanCondition);
    Tester::new_single_source_expect_conflicts("negate text", "-'a'")
        .assert_conflict("UnaryOperation", ConflictKind::IncompatibleOperand);
    Tester::new_single_source_expect_conflicts("not a list", "x: 1\nx[1]")
        .assert_conflict("ListAccess", ConflictKind::NotAList);
    Tester::new_single_source_expect_conflicts("conversion", "⊤ → #")
        .assert_conflict("Convert", ConflictKind::UnknownConversion("#".to_string()));
    Tester::new_single_source_expect_conflicts("mixed set", "{1 2:3}")
        .assert_conflict("MapLiteral", ConflictKind::MixedSetAndMap);
}

#[test]
fn test_queries() {
    Tester::new_single_source_expect_conflicts("not a table", "x: 1\nx |- ⊤")
        .assert_count(1)
        .assert_conflict("Delete", ConflictKind::NotATable)
        .assert_count_of(0, |kind| *kind == ConflictKind::NonBooleanQuery);

    let people = "people: |name•'' |age•#\n|'Ada' |36\n";
    Tester::new_single_source_expect_conflicts("query", format!("{}people |- 1", people))
        .assert_conflict("Delete", ConflictKind::NonBooleanQuery);
    Tester::new_single_source_expect_conflicts("insert", format!("{}people |+ |'Tom'", people))
        .assert_conflict("Insert", ConflictKind::IncompatibleRow);
    Tester::new_single_source_expect_ok("update", format!("{}people |: |age: 37 name = 'Ada'", people));
}
