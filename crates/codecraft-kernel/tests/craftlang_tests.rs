//! CraftLang end to end: source in, printed output and errors out.

use codecraft_kernel::ast::sexpr::format_program;
use codecraft_kernel::craftlang::{self, CraftError, RunOptions};
use codecraft_kernel::interpreter::{lookup, BufferedOutput, Interpreter, ScriptedInput};
use codecraft_kernel::parser::parse;
use rstest::rstest;

fn run(source: &str) -> String {
    let outcome = craftlang::run(source, &RunOptions::default());
    match outcome.error {
        None => outcome.output,
        Some(e) => panic!("{:?} failed: {}", source, e),
    }
}

fn run_with_input(source: &str, input: &str) -> String {
    let options = RunOptions {
        input: Some(input.to_string()),
        ..RunOptions::default()
    };
    let outcome = craftlang::run(source, &options);
    assert!(outcome.success(), "{:?}", outcome.error);
    outcome.output
}

fn runtime_error(source: &str) -> (String, String) {
    let outcome = craftlang::run(source, &RunOptions::default());
    match outcome.error {
        Some(CraftError::Runtime(e)) => (e.message, outcome.output),
        other => panic!("expected runtime error from {:?}, got {:?}", source, other),
    }
}

fn ast(source: &str) -> String {
    format_program(&parse(source).expect("parse"))
}

// ═══════════════════════════════════════════════════════════════════════════
// Expressions
// ═══════════════════════════════════════════════════════════════════════════

#[rstest]
#[case::precedence("print(1 + 2 * 3);", "7\n")]
#[case::grouping("print((1 + 2) * 3);", "9\n")]
#[case::modulo("print(5 % 2);", "1\n")]
#[case::modulo_by_zero("print(5 % 0);", "NaN\n")]
#[case::concat_number_string("print(1 + \"a\");", "1a\n")]
#[case::concat_string_bool("print(\"flag: \" + true);", "flag: true\n")]
#[case::concat_null("print(null + \"!\");", "null!\n")]
#[case::fraction("print(10 / 4);", "2.5\n")]
#[case::repeating_fraction("print(10 / 3);", "3.3333333333333335\n")]
#[case::negation("print(-(2 - 5));", "3\n")]
#[case::strict_equality("print(1 == \"1\");", "false\n")]
#[case::inequality("print(null != false);", "true\n")]
#[case::relational("print(2 <= 2 and 3 > 4);", "false\n")]
#[case::not_keyword("print(not 0);", "true\n")]
#[case::bang("print(!\"\");", "true\n")]
#[case::or_returns_bool("print(0 or \"x\");", "true\n")]
#[case::escapes("print(\"a\\tb\\\\c\");", "a\tb\\c\n")]
#[case::single_quotes("print('it\\'s');", "it's\n")]
#[case::to_string("print(toString(4) + toString(2));", "42\n")]
#[case::to_number("print(toNumber(\"2.5\") * 2);", "5\n")]
fn expressions(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(run(source), expected);
}

#[test]
fn and_or_evaluate_both_sides() {
    let source = r#"
        let calls = 0;
        function bump() { calls = calls + 1; return true; }
        let a = false and bump();
        let b = true or bump();
        print(calls);
    "#;
    assert_eq!(run(source), "2\n");
}

#[test]
fn literals_survive_the_parser() {
    insta::assert_snapshot!(ast(r#"let n = 3.25; let s = "tab\there"; let b = true; let z = null;"#), @r#"(let n 3.25) (let s "tab\there") (let b true) (let z null)"#);
}

#[test]
fn program_shape() {
    let source = r#"
        function fact(n) {
            if (n <= 1) return 1;
            return n * fact(n - 1);
        }
        for (let i = 0; i < 3; i = i + 1) print(fact(i));
        let name = input("Name? ");
    "#;
    insta::assert_snapshot!(ast(source), @r#"(function fact (n) (block (if (<= n 1) (return 1)) (return (* n (call fact (- n 1)))))) (for (let i 0) (< i 3) (= i (+ i 1)) (print (call fact i))) (let name (input "Name? "))"#);
}

// ═══════════════════════════════════════════════════════════════════════════
// Scoping and closures
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn redeclaration_fails_before_reassignment() {
    let (message, _) = runtime_error("let x = 1; const x = 2;");
    assert_eq!(message, "Variable 'x' is already defined");
}

#[test]
fn constant_keeps_its_value() {
    let program = parse("const PI = 3; PI = 4;").expect("parse");
    let mut out = BufferedOutput::new();
    let mut input = ScriptedInput::default();
    let mut interpreter = Interpreter::new(&mut out, &mut input);

    let err = interpreter.interpret(&program).unwrap_err();
    assert_eq!(err.message, "Cannot reassign constant 'PI'");
    let pi = lookup(interpreter.globals(), "PI").expect("PI defined");
    assert_eq!(pi.to_string(), "3");
}

#[test]
fn shadowing_in_a_block_is_allowed() {
    let source = "let x = 1; { let x = 2; print(x); } print(x);";
    assert_eq!(run(source), "2\n1\n");
}

#[test]
fn closure_outlives_its_scope() {
    let source = r#"
        function makeCounter() {
            let count = 0;
            function next() {
                count = count + 1;
                return count;
            }
            return next;
        }
        let counter = makeCounter();
        counter();
        counter();
        print(counter());
        let other = makeCounter();
        print(other());
    "#;
    assert_eq!(run(source), "3\n1\n");
}

#[test]
fn closure_declared_in_a_nested_block() {
    let source = r#"
        function make() {
            let f = null;
            {
                let hidden = "inner";
                function show() { return hidden; }
                f = show;
            }
            return f;
        }
        print(make()());
    "#;
    assert_eq!(run(source), "inner\n");
}

#[test]
fn call_frames_use_the_closure_not_the_caller() {
    let source = r#"
        let x = "global";
        function read() { return x; }
        function caller() { let x = "local"; return read(); }
        print(caller());
    "#;
    assert_eq!(run(source), "global\n");
}

#[test]
fn for_counter_outlives_the_loop() {
    assert_eq!(run("for (let i = 0; i < 3; i = i + 1) { } print(i);"), "3\n");
}

#[test]
fn second_for_counter_in_the_same_frame_is_a_redeclaration() {
    let source = r#"
        for (let i = 0; i < 2; i = i + 1) print(i);
        for (let i = 5; i < 7; i = i + 1) print(i);
    "#;
    let (message, output) = runtime_error(source);
    assert_eq!(message, "Variable 'i' is already defined");
    assert_eq!(output, "0\n1\n");
}

#[test]
fn for_counter_inside_a_block_stays_local() {
    let source = r#"
        { for (let i = 0; i < 2; i = i + 1) { } }
        { for (let i = 5; i < 6; i = i + 1) print(i); }
    "#;
    assert_eq!(run(source), "5\n");
}

#[test]
fn return_unwinds_out_of_loops() {
    let source = r#"
        function firstOver(limit) {
            let i = 0;
            while (true) {
                if (i * i > limit) return i;
                i = i + 1;
            }
        }
        print(firstOver(50));
    "#;
    assert_eq!(run(source), "8\n");
}

// ═══════════════════════════════════════════════════════════════════════════
// Runtime errors
// ═══════════════════════════════════════════════════════════════════════════

#[rstest]
#[case::division_by_zero("print(5 / 0);", "Division by zero")]
#[case::undefined("print(missing);", "Undefined variable 'missing'")]
#[case::arity("function f(a, b) { return a; } f(1);", "Function 'f' expects 2 arguments, got 1")]
#[case::type_mismatch("print(\"a\" * 2);", "Operands must be numbers for operator '*'")]
#[case::negate_string("print(-\"a\");", "Operand must be a number for operator '-'")]
#[case::not_callable("let x = 1; x();", "Can only call functions")]
#[case::bad_number("toNumber(\"abc\");", "Cannot convert to number")]
#[case::top_level_return("return 1;", "Cannot return from top-level code")]
#[case::assign_undeclared("y = 1;", "Undefined variable 'y'")]
fn runtime_errors(#[case] source: &str, #[case] message: &str) {
    assert_eq!(runtime_error(source).0, message);
}

#[test]
fn output_before_an_error_is_kept() {
    let (message, output) = runtime_error("print(\"before\");\nprint(1 / 0);");
    assert_eq!(message, "Division by zero");
    assert_eq!(output, "before\n");
}

#[test]
fn runtime_error_reports_line() {
    let outcome = craftlang::run("let a = 1;\n\nprint(a / 0);", &RunOptions::default());
    let error = outcome.error.expect("error");
    assert_eq!(error.to_string(), "Division by zero at line 3");
}

#[test]
fn runaway_recursion_is_an_error() {
    let options = RunOptions {
        max_call_depth: 64,
        ..RunOptions::default()
    };
    let outcome = craftlang::run("function f(n) { return f(n + 1); } f(0);", &options);
    let Some(CraftError::Runtime(e)) = outcome.error else {
        panic!("expected runtime error");
    };
    assert_eq!(e.message, "Maximum call depth exceeded (64) in 'f'");
}

#[test]
fn syntax_errors_are_all_reported() {
    let outcome = craftlang::run("let = 1;\nprint(2)\n", &RunOptions::default());
    let Some(CraftError::Syntax(errors)) = outcome.error else {
        panic!("expected syntax errors");
    };
    assert_eq!(errors.len(), 2);
    assert!(outcome.output.is_empty());
}

#[test]
fn huge_operator_chain_is_a_syntax_error() {
    let source = format!("print({}1);", "1 + ".repeat(100_000));
    let outcome = craftlang::run(&source, &RunOptions::default());
    let Some(CraftError::Syntax(errors)) = outcome.error else {
        panic!("expected a syntax error");
    };
    assert_eq!(errors[0].message, "Expression too deep (max 512)");
    assert!(outcome.output.is_empty());
}

#[test]
fn long_operator_chain_within_the_limit_runs() {
    let source = format!("print({}1);", "1 + ".repeat(99));
    assert_eq!(run(&source), "100\n");
}

// ═══════════════════════════════════════════════════════════════════════════
// Sample programs
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn hello_world() {
    assert_eq!(run(r#"print("Hello, World!");"#), "Hello, World!\n");
}

#[test]
fn variables_sample() {
    let source = r#"let name = "CraftLang";
let version = 1.0;
const PI = 3.14159;

print("Language: " + name);
print("Version: " + version);
print("PI: " + PI);"#;
    assert_eq!(run(source), "Language: CraftLang\nVersion: 1\nPI: 3.14159\n");
}

#[test]
fn functions_sample() {
    let source = r#"function greet(name) {
    return "Hello, " + name + "!";
}

function factorial(n) {
    if (n <= 1) {
        return 1;
    }
    return n * factorial(n - 1);
}

print(greet("World"));
print("5! = " + factorial(5));"#;
    assert_eq!(run(source), "Hello, World!\n5! = 120\n");
}

#[test]
fn control_flow_sample() {
    let source = r#"let x = 10;

if (x > 5) {
    print("x is greater than 5");
} else {
    print("x is 5 or less");
}

let i = 1;
while (i <= 3) {
    print("Count: " + i);
    i = i + 1;
}"#;
    assert_eq!(
        run(source),
        "x is greater than 5\nCount: 1\nCount: 2\nCount: 3\n"
    );
}

#[test]
fn calculator_sample() {
    let source = r#"function add(a, b) { return a + b; }
function divide(a, b) {
    if (b == 0) {
        print("Error: Division by zero!");
        return null;
    }
    return a / b;
}

let a = 10;
let b = 3;

print("Addition: " + a + " + " + b + " = " + add(a, b));
print("Division: " + a + " / " + b + " = " + divide(a, b));
print("Guarded: " + divide(a, 0));"#;
    assert_eq!(
        run(source),
        "Addition: 10 + 3 = 13\nDivision: 10 / 3 = 3.3333333333333335\nError: Division by zero!\nGuarded: null\n"
    );
}

#[test]
fn interactive_sample() {
    let source = r#"let name = input("What's your name? ");
print("Nice to meet you, " + name + "!");

let age = toNumber(input("How old are you? "));
if (age >= 18) {
    print("You're an adult!");
} else {
    print("You're a minor!");
}"#;
    assert_eq!(
        run_with_input(source, "Ada\n36\n"),
        "What's your name? Nice to meet you, Ada!\nHow old are you? You're an adult!\n"
    );
}

#[test]
fn exhausted_input_reads_as_zero() {
    assert_eq!(run_with_input("print(input() + 1);", ""), "Input: 1\n");
}

// ═══════════════════════════════════════════════════════════════════════════
// Tooling
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn debug_run_dumps_tokens_and_tree() {
    let options = RunOptions {
        debug: true,
        ..RunOptions::default()
    };
    let outcome = craftlang::run("print(1);", &options);
    insta::assert_snapshot!(outcome.output, @r"
    === TOKENS ===
    'print' (1:1)
    '(' (1:6)
    number 1 (1:7)
    ')' (1:8)
    ';' (1:9)

    === AST ===
    (print 1)

    1
    ");
}

#[test]
fn validate_collects_positions() {
    let diagnostics = craftlang::validate_syntax("print(1);\nlet x = ;");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, "syntax");
    assert_eq!(diagnostics[0].line, 2);
    assert!(craftlang::validate_syntax("print(1);").is_empty());
}

#[test]
fn format_reindents_blocks() {
    let source = "function f(a) {\nif (a) {\nprint(a);\n}\n}";
    insta::assert_snapshot!(craftlang::format_source(source), @r"
    function f(a) {
        if (a) {
            print(a);
        }
    }
    ");
}
