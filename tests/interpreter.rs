use lox::prelude::*;

fn make_expression(source: &'static str) -> Expr {
    let tokens = Scanner::new(source).scan_tokens();
    let stmt = Parser::new(tokens)
        .parse()
        .expect("failed to parse the source")
        .pop()
        .expect("no statement was created");

    match stmt {
        Stmt::Expression { expr } => expr,
        _ => panic!("statement is not an expression"),
    }
}

macro_rules! assert_literal {
    ($source:literal, $expected:expr, $lit_type:path) => {
        let mut ipr = Interpreter::new();
        let expr = make_expression($source);
        let res = ipr.evaluate_expr(&expr);
        assert!(res.is_ok());
        assert_eq!(res.unwrap(), $lit_type($expected));
    };
}

macro_rules! assert_int {
    ($source:literal, $expected:expr) => {
        assert_literal!($source, $expected, Object::Int);
    };
}

macro_rules! assert_float {
    ($source:literal, $expected:expr) => {
        assert_literal!($source, $expected, Object::Float);
    };
}

macro_rules! assert_string {
    ($source:literal, $expected:expr) => {
        assert_literal!($source, $expected, Object::String);
    };
}

macro_rules! assert_boolean {
    ($source:literal, $expected:expr) => {
        assert_literal!($source, $expected, Object::Boolean);
    };
}

#[test]
fn unary_minus() {
    assert_float!("-3.14;", -3.14);
    assert_int!("-3;", -3);
}

#[test]
fn unary_bang() {
    assert_boolean!("!true;", false);
    assert_boolean!("!false;", true);
}

#[test]
fn binary_plus_numbers() {
    assert_int!("10 + 20;", 30);
    assert_float!("10 + 20.5;", 30.5);
}

#[test]
fn binary_plus_strings() {
    assert_string!(r#" "Hello " + "World!"; "#, "Hello World!".to_string());
}

#[test]
fn binary_minus() {
    assert_int!("10 - 20;", -10);
}

#[test]
fn binary_star() {
    assert_int!("10 * 20;", 200);
}

#[test]
fn binary_slash() {
    assert_int!("10 / 20;", 0);
    assert_float!("10.0 / 20;", 0.5);
}

#[test]
fn binary_greater() {
    assert_boolean!("10 > 20;", false);
    assert_boolean!("20 > 10;", true);
}

#[test]
fn binary_greater_equal() {
    assert_boolean!("10 >= 20;", false);
    assert_boolean!("20 >= 10;", true);
}

#[test]
fn binary_less() {
    assert_boolean!("10 < 20;", true);
    assert_boolean!("20 < 10;", false);
}

#[test]
fn binary_less_equal() {
    assert_boolean!("10 <= 20;", true);
    assert_boolean!("20 <= 10;", false);
}

#[test]
fn binary_equal_equal() {
    assert_boolean!("10 == 20;", false);
    assert_boolean!("10 == 10;", true);
}

#[test]
fn binary_bang_equal() {
    assert_boolean!("10 != 20;", true);
    assert_boolean!("10 != 10;", false);
}

#[test]
fn ternary() {
    assert_int!("true ? 1 : 2;", 1);
    assert_int!("false ? 1 : 2;", 2);
}

#[test]
fn comma() {
    assert_int!("1, 2;", 2);
}

#[test]
fn bytecode_and_tree_walker_agree_on_arithmetic() {
    // Same source through both back ends; the VM prints, the walker returns.
    let mut ipr = Interpreter::new();
    let expr = make_expression("(1 + 2) * 4 - 6 / 2;");
    assert_eq!(ipr.evaluate_expr(&expr).unwrap(), Object::Int(9));

    let mut vm = Vm::new();
    assert_eq!(vm.interpret_source("(1 + 2) * 4 - 6 / 2"), InterpretResult::Ok);
}
