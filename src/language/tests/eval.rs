/// eval.rs
///
/// Evaluating whole programs: arithmetic, functions, structures, tables,
/// conversions, natives and exceptions.

use super::*;

#[test]
fn test_arithmetic() {
    Tester::new_single_source_expect_ok("sum", "1 + 2").evaluate().assert_number(3.0);
    // Strictly left to right
    Tester::new_single_source_expect_ok("no precedence", "1 + 2 · 3").evaluate().assert_number(9.0);
    Tester::new_single_source_expect_ok("units", "2m · 3m").evaluate().assert_display("6m^2");
    Tester::new_single_source_expect_ok("negation", "-(2 + 3)").evaluate().assert_number(-5.0);
    Tester::new_single_source_expect_ok("comparison", "1 < 2").evaluate().assert_bool(true);
}

#[test]
fn test_binds_and_blocks() {
    Tester::new_single_source_expect_ok("bind", "x: 2\ny: x · 10\ny").evaluate().assert_number(20.0);
    Tester::new_single_source_expect_ok("block", "x: 1\n(\n  x: 2\n  x + 1\n) + x").evaluate().assert_number(4.0);
    Tester::new_single_source_expect_ok("share", "↑ x: 1\nx").evaluate().assert_number(1.0);
}

#[test]
fn test_conditionals() {
    Tester::new_single_source_expect_ok("yes", "1 < 2 ? 'yes' 'no'").evaluate().assert_display("\"yes\"");
    Tester::new_single_source_expect_ok("no", "1 > 2 ? 'yes' 'no'").evaluate().assert_display("\"no\"");
    Tester::new_single_source_expect_ok("none", "ƒ f(x•#∨!) x = ! ? 0 x + 1\nf(!)").evaluate().assert_number(0.0);
}

#[test]
fn test_functions() {
    Tester::new_single_source_expect_ok("call", "ƒ add(a•# b•#) a + b\nadd(1 2)").evaluate().assert_number(3.0);
    Tester::new_single_source_expect_ok("default", "ƒ inc(a•# by•#:1) a + by\ninc(2)").evaluate().assert_number(3.0);
    Tester::new_single_source_expect_ok("named", "ƒ sub(a•# b•#) a - b\nsub(b:1 a:5)").evaluate().assert_number(4.0);
    Tester::new_single_source_expect_ok("closure", "x: 10\nƒ f(a•#) a + x\nf(1)").evaluate().assert_number(11.0);
    Tester::new_single_source_expect_ok("recursion", "ƒ fact(n•#)•# n < 2 ? 1 n · fact(n - 1)\nfact(5)")
        .evaluate()
        .assert_number(120.0);
    Tester::new_single_source_expect_ok("generic", "ƒ id ∘T (x•T)•T x\nid('a')").evaluate().assert_display("\"a\"");
}

#[test]
fn test_structures() {
    let cat = "•Cat(name•'' lives•#:9)\n";
    Tester::new_single_source_expect_ok("default input", format!("{}Cat('Tom').lives", cat))
        .evaluate()
        .assert_number(9.0);
    Tester::new_single_source_expect_ok("display", format!("{}Cat('Tom' 3)", cat))
        .evaluate()
        .assert_display("Cat(name:\"Tom\" lives:3)");
    Tester::new_single_source_expect_ok("method", "•Counter(n•#) ( ƒ twice() n · 2 )\nCounter(4).twice()")
        .evaluate()
        .assert_number(8.0);
}

#[test]
fn test_omitted_inputs_take_defaults() {
    let inc = "ƒ inc(a•# by•#:1) a + by\n";
    Tester::new_single_source_expect_ok("defaulted", format!("{}inc(2)", inc)).evaluate().assert_number(3.0);
    Tester::new_single_source_expect_ok("overridden", format!("{}inc(2 5)", inc)).evaluate().assert_number(7.0);
    Tester::new_single_source_expect_ok("computed default", "ƒ scale(a•# by•#:2 · 3) a · by\nscale(2)")
        .evaluate()
        .assert_number(12.0);

    let cat = "•Cat(name•'' lives•#:9)\n";
    Tester::new_single_source_expect_ok("defaulted field", format!("{}Cat('Tom')", cat))
        .evaluate()
        .assert_display("Cat(name:\"Tom\" lives:9)");
    // Defaults stay inside the call
    Tester::new_single_source_expect_ok("no leak", format!("{}lives: 1\nCat('Tom').lives + lives", cat))
        .evaluate()
        .assert_number(10.0);
}

#[test]
fn test_collections() {
    Tester::new_single_source_expect_ok("list access", "[10 20 30][2]").evaluate().assert_number(20.0);
    Tester::new_single_source_expect_ok("out of range", "[10 20][5]").evaluate().assert_display("!");
    Tester::new_single_source_expect_ok("map access", "{'a':1 'b':2}{'b'}").evaluate().assert_number(2.0);
    Tester::new_single_source_expect_ok("set membership", "{1 2}{3}").evaluate().assert_bool(false);
    Tester::new_single_source_expect_ok("empty map", "{:}").evaluate().assert_display("{:}");
}

#[test]
fn test_templates() {
    Tester::new_single_source_expect_ok("template", "x: 'Ada'\n'hi \\x\\, \\1 + 2\\!'")
        .evaluate()
        .assert_display("\"hi Ada, 3!\"");
}

#[test]
fn test_tables() {
    let people = "people: |name•'' |age•#\n|'Ada' |36\n|'Tom' |12\n";
    Tester::new_single_source_expect_ok("select", format!("{}people |? |name age > 30", people))
        .evaluate()
        .assert_display("|name\n|\"Ada\"");
    Tester::new_single_source_expect_ok("insert", format!("{}people |+ |'Bo' |5", people))
        .evaluate()
        .assert_display("|name|age\n|\"Ada\"|36\n|\"Tom\"|12\n|\"Bo\"|5");
    Tester::new_single_source_expect_ok("update", format!("{}people |: |age: 37 name = 'Ada'", people))
        .evaluate()
        .assert_display("|name|age\n|\"Ada\"|37\n|\"Tom\"|12");
    Tester::new_single_source_expect_ok("delete", format!("{}people |- age < 20", people))
        .evaluate()
        .assert_display("|name|age\n|\"Ada\"|36");
}

#[test]
fn test_conversions() {
    Tester::new_single_source_expect_ok("native", "1 → ''").evaluate().assert_display("\"1\"");
    Tester::new_single_source_expect_ok("parse", "'42' → #").evaluate().assert_number(42.0);
    Tester::new_single_source_expect_ok("defined", "→ # '' 'number'\n1 → ''").evaluate().assert_display("\"number\"");
    Tester::new_single_source_expect_ok("this", "→ ? # . ? 1 0\n⊤ → #").evaluate().assert_number(1.0);
}

#[test]
fn test_natives() {
    Tester::new_single_source_expect_ok("text length", "'abc'.length()").evaluate().assert_number(3.0);
    Tester::new_single_source_expect_ok("list first", "[7 8].first()").evaluate().assert_number(7.0);
    Tester::new("borrowed")
        .with_share("scores", Value::List(vec![Value::number(1.), Value::number(2.)]))
        .with_source("↓ scores\nscores")
        .compile()
        .expect_ok()
        .evaluate()
        .assert_display("[1 2]");
}

#[test]
fn test_exceptions() {
    Tester::new("blocked").with_source("1 + 'one'").compile().evaluate().assert_exception(ExceptionKind::BlockingConflict);
    // Unannotated inputs are only checked when evaluated
    Tester::new_single_source_expect_ok("mismatch", "ƒ f(a) a + 1\nf('x')")
        .evaluate()
        .assert_exception(ExceptionKind::TypeMismatch);
}
