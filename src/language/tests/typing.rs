/// typing.rs
///
/// Types of expressions: units, inference through functions, generics,
/// narrowing and cycles.

use super::*;

#[test]
fn test_literal_types() {
    Tester::new_single_source_expect_ok("number", "1").assert_type("#");
    Tester::new_single_source_expect_ok("unit", "1m").assert_type("#m");
    Tester::new_single_source_expect_ok("text", "'hi'").assert_type("''");
    Tester::new_single_source_expect_ok("formatted text", "'hi'/eng").assert_type("''/eng");
    Tester::new_single_source_expect_ok("boolean", "⊤").assert_type("?");
    Tester::new_single_source_expect_ok("none", "!").assert_type("!");
    Tester::new_single_source_expect_ok("list", "[1 2]").assert_type("[#]");
    Tester::new_single_source_expect_ok("set", "{'a' 'b'}").assert_type("{''}");
    Tester::new_single_source_expect_ok("map", "{'a':1}").assert_type("{'':#}");
    Tester::new_single_source_expect_ok("table", "|a•# |b•''").assert_type("|a•#|b•''");
}

#[test]
fn test_unit_arithmetic() {
    Tester::new_single_source_expect_ok("product", "2m · 3s").assert_type("#m·s");
    Tester::new_single_source_expect_ok("quotient", "6m ÷ 3s").assert_type("#m/s");
    Tester::new_single_source_expect_ok("same unit sum", "1m + 2m").assert_type("#m");
    Tester::new_single_source_expect_ok("comparison", "1m < 2m").assert_type("?");
    Tester::new_single_source_expect_conflicts("mixed unit sum", "1m + 2s")
        .assert_conflict("BinaryOperation", ConflictKind::IncompatibleOperand);
}

#[test]
fn test_function_types() {
    Tester::new_single_source_expect_ok("inferred output", "ƒ double(a•#) a · 2\ndouble(2)").assert_type("#");
    Tester::new_single_source_expect_ok("declared output", "ƒ greet(name•'')•'' 'hi'\ngreet('Ada')")
        .assert_type("''");
    Tester::new_single_source_expect_ok("function value", "ƒ double(a•#) a · 2\ndouble").assert_type("ƒ(#) #");
}

#[test]
fn test_generic_functions() {
    Tester::new_single_source_expect_ok("inferred from input", "ƒ id ∘T (x•T)•T x\nid('a')").assert_type("''");
    Tester::new_single_source_expect_ok("explicit", "ƒ id ∘T (x•T)•T x\nid∘#(1)").assert_type("#");

    // Each evaluation binds its own type variables
    Tester::new_single_source_expect_ok("no leakage", "ƒ id ∘T (x•T)•T x\na: id('a')\nb: id(1)\nb")
        .assert_type("#")
        .for_node("Bind", 1, |node| {
            node.assert_type("''");
        });
}

#[test]
fn test_structures() {
    Tester::new_single_source_expect_ok("structure", "•Cat(name•'' lives•#:9)\nCat('Tom')").assert_type("Cat");
    Tester::new_single_source_expect_ok("property", "•Cat(name•'' lives•#:9)\nCat('Tom').lives").assert_type("#");
    Tester::new_single_source_expect_ok("generic property", "•Box ∘T (item•T)\nBox('a').item").assert_type("''");
}

#[test]
fn test_narrowing() {
    Tester::new_single_source_expect_ok("is narrows", "x•#∨'': 1\ny: x•# ? x + 1 0\ny").for_node("BinaryOperation", 0, |node| {
        node.assert_type("#");
    });
    Tester::new_single_source_expect_ok("none check", "x•#∨!: 1\nx = ! ? 0 x + 1")
        .for_node("BinaryOperation", 0, |node| {
            node.assert_type("?");
        })
        .for_node("BinaryOperation", 1, |node| {
            node.assert_type("#");
        });
    // Narrowing an already narrowed name changes nothing
    Tester::new_single_source_expect_ok("twice", "x•#∨'': 1\ny: x•# ? (x•# ? x + 1 0) 0\ny")
        .for_node("Reference", 1, |node| {
            node.assert_type("#");
        })
        .for_node("Reference", 2, |node| {
            node.assert_type("#");
        })
        .for_node("BinaryOperation", 0, |node| {
            node.assert_type("#");
        });
}

#[test]
fn test_cycles_are_unknown() {
    Tester::new("cycle").with_source("ƒ f() g()\nƒ g() f()\nf()").compile().assert_type("unknown (cycle)");
    Tester::new("later bind").with_source("a: b\nb: 1\na").compile().assert_type("unknown (unknown name)");
}

#[test]
fn test_borrowed_types() {
    Tester::new("borrow")
        .with_share("scores", Value::List(vec![Value::number(1.), Value::number(2.)]))
        .with_source("↓ scores\nscores")
        .compile()
        .expect_ok()
        .assert_type("[#]");
}

#[test]
fn test_native_members() {
    Tester::new_single_source_expect_ok("text length", "'abc'.length()").assert_type("#");
    Tester::new_single_source_expect_ok("list first", "[1 2].first()").assert_type("#∨!");
    Tester::new_single_source_expect_conflicts("unknown member", "[1 2].fly()")
        .assert_conflict("PropertyReference", ConflictKind::UnknownProperty("fly".to_string()));
}
