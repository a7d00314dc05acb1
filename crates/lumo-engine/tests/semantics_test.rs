//! End-to-end tests: programs are compiled, run on the reference VM, and
//! observed through a `print` native.

use lumo_engine::ast::builder::*;
use lumo_engine::ast::{BinaryOperator, Expression, Program, Statement};
use lumo_engine::{Engine, Error, RuntimeError, Value};
use parking_lot::Mutex;
use std::sync::Arc;

/// Engine with a `print` native that records its argument.
fn engine() -> (Engine, Arc<Mutex<Vec<Value>>>) {
    let out = Arc::new(Mutex::new(Vec::new()));
    let sink = out.clone();
    let mut engine = Engine::new();
    engine.define_native("print", 1, move |args| {
        sink.lock().extend_from_slice(args);
        Ok(Value::Void)
    });
    (engine, out)
}

fn run(program: &Program) -> Vec<Value> {
    let (mut engine, out) = engine();
    engine.run(program).unwrap();
    assert!(engine.vm().stack().is_empty(), "stack left unbalanced");
    let printed = out.lock().clone();
    printed
}

fn run_err(program: &Program) -> RuntimeError {
    let (mut engine, _) = engine();
    match engine.run(program) {
        Err(Error::Runtime(err)) => err,
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

fn print(value: Expression) -> Statement {
    expr_stmt(call(ident("print"), vec![value]))
}

fn main_fn(body: Vec<Statement>) -> Statement {
    fn_decl("main", &[], body)
}

fn set(name: &str, value: Expression) -> Statement {
    expr_stmt(assign(ident(name), value))
}

fn incr(name: &str) -> Expression {
    assign(ident(name), add(ident(name), int(1)))
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|v| Value::Int(*v)).collect()
}

// ============================================================================
// Expressions and globals
// ============================================================================

#[test]
fn test_arithmetic_and_mixed_numbers() {
    let printed = run(&program(vec![main_fn(vec![
        print(add(int(1), mul(int(2), int(3)))),
        print(add(int(1), float(0.5))),
        print(binary(BinaryOperator::Modulo, int(17), int(5))),
        print(neg(int(4))),
        print(add(string("lu"), string("mo"))),
    ])]));
    assert_eq!(
        printed,
        vec![
            Value::Int(7),
            Value::Float(1.5),
            Value::Int(2),
            Value::Int(-4),
            Value::from("lumo"),
        ]
    );
}

#[test]
fn test_globals_initialize_before_main() {
    let printed = run(&program(vec![
        let_("greeting", add(string("hi"), string("!"))),
        main_fn(vec![print(ident("greeting"))]),
    ]));
    assert_eq!(printed, vec![Value::from("hi!")]);
}

#[test]
fn test_recursion_through_global() {
    let fib = fn_decl(
        "fib",
        &["n"],
        vec![
            if_(lt(ident("n"), int(2)), vec![ret(Some(ident("n")))], None),
            ret(Some(add(
                call(ident("fib"), vec![sub(ident("n"), int(1))]),
                call(ident("fib"), vec![sub(ident("n"), int(2))]),
            ))),
        ],
    );
    let printed = run(&program(vec![
        main_fn(vec![print(call(ident("fib"), vec![int(15)]))]),
        fib,
    ]));
    assert_eq!(printed, ints(&[610]));
}

#[test]
fn test_local_function_can_recurse() {
    let fact = fn_decl(
        "fact",
        &["n"],
        vec![
            if_(lt(ident("n"), int(2)), vec![ret(Some(int(1)))], None),
            ret(Some(mul(
                ident("n"),
                call(ident("fact"), vec![sub(ident("n"), int(1))]),
            ))),
        ],
    );
    let printed = run(&program(vec![main_fn(vec![
        fact,
        print(call(ident("fact"), vec![int(5)])),
    ])]));
    assert_eq!(printed, ints(&[120]));
}

#[test]
fn test_shadowing() {
    let printed = run(&program(vec![main_fn(vec![
        let_("x", int(1)),
        block(vec![let_("x", int(2)), print(ident("x"))]),
        print(ident("x")),
    ])]));
    assert_eq!(printed, ints(&[2, 1]));
}

#[test]
fn test_short_circuit() {
    let boom = fn_decl(
        "boom",
        &[],
        vec![print(string("boom")), ret(Some(boolean(true)))],
    );
    let printed = run(&program(vec![
        boom,
        main_fn(vec![
            print(and(boolean(false), call(ident("boom"), vec![]))),
            print(or(boolean(true), call(ident("boom"), vec![]))),
            print(and(boolean(true), call(ident("boom"), vec![]))),
        ]),
    ]));
    assert_eq!(
        printed,
        vec![
            Value::Bool(false),
            Value::Bool(true),
            Value::from("boom"),
            Value::Bool(true),
        ]
    );
}

// ============================================================================
// Closures
// ============================================================================

#[test]
fn test_closure_outlives_its_frame() {
    let make_counter = fn_decl(
        "make_counter",
        &[],
        vec![
            let_("n", int(0)),
            ret(Some(closure(
                &[],
                vec![expr_stmt(incr("n")), ret(Some(ident("n")))],
            ))),
        ],
    );
    let printed = run(&program(vec![
        make_counter,
        main_fn(vec![
            let_("c", call(ident("make_counter"), vec![])),
            print(call(ident("c"), vec![])),
            print(call(ident("c"), vec![])),
            let_("d", call(ident("make_counter"), vec![])),
            print(call(ident("d"), vec![])),
            print(call(ident("c"), vec![])),
        ]),
    ]));
    assert_eq!(printed, ints(&[1, 2, 1, 3]));
}

#[test]
fn test_open_upvalue_is_shared() {
    let printed = run(&program(vec![main_fn(vec![
        let_("n", int(0)),
        let_("inc", closure(&[], vec![expr_stmt(incr("n"))])),
        let_("get", arrow(&[], ident("n"))),
        expr_stmt(call(ident("inc"), vec![])),
        expr_stmt(call(ident("inc"), vec![])),
        print(call(ident("get"), vec![])),
        print(ident("n")),
    ])]));
    assert_eq!(printed, ints(&[2, 2]));
}

/// Captures the loop variable into `a`, `b` and `c` on three iterations.
fn capture_each(first: i64) -> Vec<Statement> {
    ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(n, name)| {
            if_(
                eq(ident("i"), int(first + n as i64)),
                vec![set(name, arrow(&[], ident("i")))],
                None,
            )
        })
        .collect()
}

fn print_captures() -> Vec<Statement> {
    ["a", "b", "c"]
        .iter()
        .map(|name| print(call(ident(name), vec![])))
        .collect()
}

#[test]
fn test_for_in_captures_each_iteration() {
    let mut body = vec![let_("a", nil()), let_("b", nil()), let_("c", nil())];
    body.push(for_in("i", range_inclusive(int(1), int(3)), capture_each(1)));
    body.extend(print_captures());
    assert_eq!(run(&program(vec![main_fn(body)])), ints(&[1, 2, 3]));
}

#[test]
fn test_for_var_captures_each_iteration() {
    let mut body = vec![let_("a", nil()), let_("b", nil()), let_("c", nil())];
    body.push(for_var(
        "i",
        int(0),
        Some(lt(ident("i"), int(3))),
        Some(incr("i")),
        capture_each(0),
    ));
    body.extend(print_captures());
    assert_eq!(run(&program(vec![main_fn(body)])), ints(&[0, 1, 2]));
}

#[test]
fn test_for_var_body_updates_carry_over() {
    let printed = run(&program(vec![main_fn(vec![for_var(
        "i",
        int(0),
        Some(lt(ident("i"), int(10))),
        Some(incr("i")),
        vec![expr_stmt(incr("i")), print(ident("i"))],
    )])]));
    assert_eq!(printed, ints(&[1, 3, 5, 7, 9]));
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn test_ranges() {
    let printed = run(&program(vec![main_fn(vec![
        for_in("i", range(int(3), int(0)), vec![print(ident("i"))]),
        for_in("i", range(int(2), int(2)), vec![print(ident("i"))]),
        for_in("i", range_inclusive(int(5), int(6)), vec![print(ident("i"))]),
    ])]));
    assert_eq!(printed, ints(&[3, 2, 1, 5, 6]));
}

#[test]
fn test_ranges_ending_at_integer_bounds() {
    // The counter stops a runaway loop after a few extra iterations
    let bounded = |range: Expression| {
        vec![
            let_("n", int(0)),
            for_in(
                "i",
                range,
                vec![
                    print(ident("i")),
                    expr_stmt(incr("n")),
                    if_(gt(ident("n"), int(4)), vec![break_()], None),
                ],
            ),
        ]
    };
    let mut body = bounded(range_inclusive(int(i64::MAX - 1), int(i64::MAX)));
    body.push(block(bounded(range_inclusive(
        int(i64::MIN + 1),
        int(i64::MIN),
    ))));
    let printed = run(&program(vec![main_fn(body)]));
    assert_eq!(
        printed,
        ints(&[i64::MAX - 1, i64::MAX, i64::MIN + 1, i64::MIN])
    );
}

#[test]
fn test_while_break() {
    let printed = run(&program(vec![main_fn(vec![
        let_("i", int(0)),
        while_(
            boolean(true),
            vec![
                if_(eq(ident("i"), int(3)), vec![break_()], None),
                print(ident("i")),
                expr_stmt(incr("i")),
            ],
        ),
        print(string("done")),
    ])]));
    assert_eq!(
        printed,
        vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::from("done")]
    );
}

#[test]
fn test_while_continue() {
    let printed = run(&program(vec![main_fn(vec![
        let_("i", int(0)),
        while_(
            lt(ident("i"), int(5)),
            vec![
                expr_stmt(incr("i")),
                if_(
                    eq(binary(BinaryOperator::Modulo, ident("i"), int(2)), int(0)),
                    vec![continue_()],
                    None,
                ),
                print(ident("i")),
            ],
        ),
    ])]));
    assert_eq!(printed, ints(&[1, 3, 5]));
}

#[test]
fn test_break_releases_loop_locals() {
    let printed = run(&program(vec![main_fn(vec![
        let_("n", int(0)),
        loop_(vec![
            let_("step", int(2)),
            set("n", add(ident("n"), ident("step"))),
            if_(gt(ident("n"), int(5)), vec![break_()], None),
        ]),
        let_("after", int(100)),
        print(ident("n")),
        print(ident("after")),
    ])]));
    assert_eq!(printed, ints(&[6, 100]));
}

#[test]
fn test_nested_break_and_continue() {
    let inner = for_in(
        "j",
        range(int(0), int(3)),
        vec![
            if_(eq(ident("j"), int(1)), vec![continue_()], None),
            if_(eq(ident("i"), int(2)), vec![break_()], None),
            print(add(mul(ident("i"), int(10)), ident("j"))),
        ],
    );
    let printed = run(&program(vec![main_fn(vec![
        for_in("i", range(int(0), int(3)), vec![inner]),
        print(string("end")),
    ])]));
    assert_eq!(
        printed,
        vec![
            Value::Int(0),
            Value::Int(2),
            Value::Int(10),
            Value::Int(12),
            Value::from("end"),
        ]
    );
}

#[test]
fn test_break_closes_captured_loop_locals() {
    let printed = run(&program(vec![main_fn(vec![
        let_("f", nil()),
        loop_(vec![
            let_("x", int(42)),
            set("f", arrow(&[], ident("x"))),
            break_(),
        ]),
        let_("y", int(7)),
        print(call(ident("f"), vec![])),
    ])]));
    assert_eq!(printed, ints(&[42]));
}

// ============================================================================
// Records
// ============================================================================

fn point() -> Statement {
    let this_x = || member(ident("self"), "x");
    record(
        "Point",
        &["x", "y"],
        vec![
            function(
                "sum",
                &[],
                vec![ret(Some(add(this_x(), member(ident("self"), "y"))))],
            ),
            function(
                "shift",
                &["d"],
                vec![
                    expr_stmt(assign(this_x(), add(this_x(), ident("d")))),
                    ret(Some(ident("self"))),
                ],
            ),
        ],
    )
}

#[test]
fn test_records_and_methods() {
    let printed = run(&program(vec![
        point(),
        main_fn(vec![
            let_("p", call(ident("Point"), vec![int(1), int(2)])),
            print(method_call(ident("p"), "sum", vec![])),
            expr_stmt(method_call(ident("p"), "shift", vec![int(10)])),
            print(member(ident("p"), "x")),
            let_("m", member(ident("p"), "sum")),
            print(call(ident("m"), vec![])),
        ]),
    ]));
    assert_eq!(printed, ints(&[3, 11, 13]));
}

#[test]
fn test_callable_field_wins_over_method() {
    let printed = run(&program(vec![
        record(
            "Box",
            &["f"],
            vec![function("f", &[], vec![ret(Some(int(0)))])],
        ),
        main_fn(vec![
            let_(
                "b",
                call(ident("Box"), vec![arrow(&["x"], mul(ident("x"), int(2)))]),
            ),
            print(method_call(ident("b"), "f", vec![int(21)])),
        ]),
    ]));
    assert_eq!(printed, ints(&[42]));
}

#[test]
fn test_local_record() {
    let printed = run(&program(vec![main_fn(vec![
        record("Pair", &["a", "b"], vec![]),
        let_("p", call(ident("Pair"), vec![int(1), int(2)])),
        print(member(ident("p"), "b")),
    ])]));
    assert_eq!(printed, ints(&[2]));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_encoded_program_runs_the_same() {
    let source = program(vec![
        point(),
        main_fn(vec![
            let_("p", call(ident("Point"), vec![int(4), int(5)])),
            for_in(
                "i",
                range(int(0), int(2)),
                vec![print(method_call(ident("p"), "sum", vec![]))],
            ),
        ]),
    ]);
    let direct = run(&source);

    let (mut engine, out) = engine();
    let bytes = engine.compile(&source).unwrap().encode().unwrap();
    engine.run_bytes(&bytes).unwrap();
    assert_eq!(*out.lock(), direct);
    assert_eq!(direct, ints(&[9, 9]));
}

// ============================================================================
// Runtime errors
// ============================================================================

#[test]
fn test_condition_must_be_bool() {
    let err = run_err(&program(vec![main_fn(vec![if_(int(1), vec![], None)])]));
    assert!(matches!(
        err,
        RuntimeError::UnexpectedType {
            expected: "bool",
            found: "int",
            ..
        }
    ));
}

#[test]
fn test_division_by_zero() {
    let err = run_err(&program(vec![main_fn(vec![print(binary(
        BinaryOperator::Divide,
        int(1),
        int(0),
    ))])]));
    assert_eq!(err, RuntimeError::DivisionByZero);
}

#[test]
fn test_call_errors() {
    let err = run_err(&program(vec![main_fn(vec![
        let_("x", int(1)),
        expr_stmt(call(ident("x"), vec![])),
    ])]));
    assert_eq!(err, RuntimeError::NotCallable("int"));

    let err = run_err(&program(vec![
        fn_decl("f", &["a"], vec![]),
        main_fn(vec![expr_stmt(call(ident("f"), vec![]))]),
    ]));
    assert!(matches!(
        err,
        RuntimeError::ArityMismatch {
            expected: 1,
            found: 0,
            ..
        }
    ));
}

#[test]
fn test_missing_property() {
    let err = run_err(&program(vec![
        point(),
        main_fn(vec![
            let_("p", call(ident("Point"), vec![int(1), int(2)])),
            print(member(ident("p"), "z")),
        ]),
    ]));
    assert_eq!(
        err,
        RuntimeError::NoSuchProperty {
            property: "z".into(),
            type_name: "Point".into(),
        }
    );
}

#[test]
fn test_native_failure_is_reported() {
    let mut engine = Engine::new();
    engine.define_native("fail", 0, |_| Err("nope".to_string()));
    let err = engine
        .run(&program(vec![main_fn(vec![expr_stmt(call(
            ident("fail"),
            vec![],
        ))])]))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Runtime(RuntimeError::Native { name, message }) if name == "fail" && message == "nope"
    ));
}

#[test]
fn test_unbounded_recursion_overflows() {
    let err = run_err(&program(vec![
        fn_decl("f", &[], vec![ret(Some(call(ident("f"), vec![])))]),
        main_fn(vec![expr_stmt(call(ident("f"), vec![]))]),
    ]));
    assert_eq!(err, RuntimeError::StackOverflow);
}
