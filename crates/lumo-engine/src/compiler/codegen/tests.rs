//! Tests for the bytecode compiler.

use super::*;
use crate::ast::builder::*;
use crate::compiler::bytecode::{Instruction, Metadata, Operand};
use crate::runtime::value::Function;
use std::sync::Arc;

fn compile_ok(program: &Program) -> Chunk {
    Compiler::default()
        .compile(program)
        .expect("compilation should succeed")
}

fn compile_err(program: &Program) -> CompileErrors {
    Compiler::default()
        .compile(program)
        .expect_err("compilation should fail")
}

fn with_main(body: Vec<Statement>) -> Program {
    program(vec![fn_decl("main", &[], body)])
}

fn instructions(chunk: &Chunk) -> Vec<Instruction> {
    chunk
        .instructions()
        .collect::<Result<_, _>>()
        .expect("well-formed code")
}

fn opcodes(chunk: &Chunk) -> Vec<OpCode> {
    instructions(chunk).iter().map(|i| i.opcode).collect()
}

fn function_named(chunk: &Chunk, name: &str) -> Arc<Function> {
    chunk
        .constants
        .iter()
        .find_map(|c| match c {
            Value::Function(f) if f.name() == name => Some(f.clone()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no function `{}` in constant pool", name))
}

fn main_chunk(program: &Program) -> Chunk {
    function_named(&compile_ok(program), "main").chunk.clone()
}

// ============================================================================
// Program shape
// ============================================================================

#[test]
fn test_compile_empty_main() {
    let chunk = compile_ok(&with_main(vec![]));
    assert_eq!(chunk.name, None);
    assert_eq!(
        opcodes(&chunk),
        vec![
            OpCode::PushClosure,
            OpCode::DefGlobal,
            OpCode::GetGlobal,
            OpCode::Call,
            OpCode::Pop,
            OpCode::ExitSuccess,
        ]
    );
    let main = function_named(&chunk, "main");
    assert_eq!(main.arity, 0);
    assert_eq!(opcodes(&main.chunk), vec![OpCode::ReturnVoid]);
}

#[test]
fn test_metadata_covers_every_byte() {
    let main = main_chunk(&with_main(vec![let_("x", int(1)).at(3, 9)]));
    assert_eq!(main.metadata.len(), main.code.len());
    // PUSH_CONST is 5 bytes, then DEF_LOCAL carries the statement span
    assert_eq!(main.code[5], OpCode::DefLocal as u8);
    assert_eq!(main.metadata[5], Metadata { position: 3, len: 9 });
}

#[test]
fn test_constants_are_deduplicated() {
    let main = main_chunk(&with_main(vec![
        let_("a", int(7)),
        let_("b", int(7)),
        let_("s", string("x")),
        let_("t", string("x")),
    ]));
    assert_eq!(main.constants, vec![Value::Int(7), Value::from("x")]);
}

#[test]
fn test_natives_take_the_first_global_slots() {
    let program = with_main(vec![expr_stmt(call(ident("print"), vec![int(1)]))]);
    let chunk = Compiler::new(CompilerOptions::new().native("print"))
        .compile(&program)
        .unwrap();

    let script = instructions(&chunk);
    assert_eq!(script[2].opcode, OpCode::GetGlobal);
    assert_eq!(script[2].operands, vec![Operand::Slot(1)]);

    let main = function_named(&chunk, "main");
    let body = instructions(&main.chunk);
    assert_eq!(body[0].operands, vec![Operand::Slot(0)]);
    assert_eq!(
        body.iter().map(|i| i.opcode).collect::<Vec<_>>(),
        vec![
            OpCode::GetGlobal,
            OpCode::PushConst,
            OpCode::Call,
            OpCode::Pop,
            OpCode::ReturnVoid,
        ]
    );
}

#[test]
fn test_pure_expression_statements_are_stripped() {
    let body = vec![
        let_("x", int(1)),
        expr_stmt(int(1)),
        expr_stmt(ident("x")),
    ];
    assert_eq!(
        opcodes(&main_chunk(&with_main(body.clone()))),
        vec![OpCode::PushConst, OpCode::DefLocal, OpCode::ReturnVoid]
    );

    let chunk = Compiler::new(CompilerOptions::new().strip_pure_expressions(false))
        .compile(&with_main(body))
        .unwrap();
    assert_eq!(
        opcodes(&function_named(&chunk, "main").chunk),
        vec![
            OpCode::PushConst,
            OpCode::DefLocal,
            OpCode::PushConst,
            OpCode::Pop,
            OpCode::GetLocal,
            OpCode::Pop,
            OpCode::ReturnVoid,
        ]
    );
}

// ============================================================================
// Functions and closures
// ============================================================================

#[test]
fn test_trailing_return_is_not_duplicated() {
    let main = main_chunk(&with_main(vec![ret(Some(int(1)))]));
    assert_eq!(opcodes(&main), vec![OpCode::PushConst, OpCode::Return]);
}

#[test]
fn test_return_void_after_branch_join() {
    let main = main_chunk(&with_main(vec![if_(
        boolean(true),
        vec![ret(Some(int(1)))],
        Some(vec![ret(Some(int(2)))]),
    )]));
    assert_eq!(opcodes(&main).last(), Some(&OpCode::ReturnVoid));
}

#[test]
fn test_lambda_chunk_name_and_capture() {
    let main = main_chunk(&with_main(vec![
        let_("x", int(1)),
        let_("f", arrow(&[], ident("x"))),
    ]));
    let lambda = function_named(&main, "<lambda>");
    assert_eq!(
        opcodes(&lambda.chunk),
        vec![OpCode::GetUpvalue, OpCode::Return]
    );

    let push = instructions(&main)
        .into_iter()
        .find(|i| i.opcode == OpCode::PushClosure)
        .unwrap();
    // Slot 0 is the callee, so `x` is slot 1
    assert_eq!(
        push.operands[1..],
        [
            Operand::Count(1),
            Operand::Capture {
                is_local: true,
                index: 1
            }
        ]
    );
}

#[test]
fn test_upvalue_threads_through_intermediate_function() {
    let main = main_chunk(&with_main(vec![
        let_("x", int(1)),
        let_(
            "outer",
            closure(&[], vec![let_("inner", arrow(&[], ident("x")))]),
        ),
    ]));
    let outer = function_named(&main, "<lambda>");
    let push = instructions(&outer.chunk)
        .into_iter()
        .find(|i| i.opcode == OpCode::PushClosure)
        .unwrap();
    assert_eq!(
        push.operands[2],
        Operand::Capture {
            is_local: false,
            index: 0
        }
    );
}

#[test]
fn test_block_exit_closes_captured_locals() {
    let main = main_chunk(&with_main(vec![block(vec![
        let_("x", int(1)),
        let_("f", arrow(&[], ident("x"))),
    ])]));
    assert_eq!(
        opcodes(&main),
        vec![
            OpCode::PushConst,
            OpCode::DefLocal,
            OpCode::PushClosure,
            OpCode::DefLocal,
            OpCode::PopLocal,
            OpCode::CloseUpvalue,
            OpCode::ReturnVoid,
        ]
    );
}

#[test]
fn test_block_exit_pops_plain_locals_together() {
    let main = main_chunk(&with_main(vec![block(vec![
        let_("a", int(1)),
        let_("b", int(2)),
        let_("c", int(3)),
    ])]));
    let body = instructions(&main);
    let pop = &body[body.len() - 2];
    assert_eq!(pop.opcode, OpCode::PopnLocal);
    assert_eq!(pop.operands, vec![Operand::Count(3)]);
}

#[test]
fn test_function_may_reference_later_global() {
    let program = program(vec![
        fn_decl("main", &[], vec![expr_stmt(call(ident("helper"), vec![]))]),
        fn_decl("helper", &[], vec![]),
    ]);
    compile_ok(&program);
}

// ============================================================================
// Records
// ============================================================================

fn point() -> Statement {
    record(
        "Point",
        &["x"],
        vec![function(
            "getx",
            &[],
            vec![ret(Some(member(ident("self"), "x")))],
        )],
    )
}

#[test]
fn test_record_declaration_shape() {
    let chunk = compile_ok(&program(vec![point(), fn_decl("main", &[], vec![])]));
    assert_eq!(
        opcodes(&chunk)[..4],
        [
            OpCode::PushConst,
            OpCode::PushClosure,
            OpCode::AppendMethods,
            OpCode::DefGlobal,
        ]
    );
    assert!(matches!(&chunk.constants[0], Value::Record(r) if r.name == "Point"));

    let getx = function_named(&chunk, "getx");
    let body = instructions(&getx.chunk);
    assert_eq!(body[0].opcode, OpCode::GetLocal);
    assert_eq!(body[0].operands, vec![Operand::Slot(0)]);
    assert_eq!(
        body.iter().map(|i| i.opcode).collect::<Vec<_>>(),
        vec![OpCode::GetLocal, OpCode::GetProperty, OpCode::Return]
    );
}

#[test]
fn test_method_call_uses_call_property() {
    let program = program(vec![
        point(),
        fn_decl(
            "main",
            &[],
            vec![
                let_("p", call(ident("Point"), vec![int(1)])),
                expr_stmt(method_call(ident("p"), "getx", vec![])),
                let_("f", member(ident("p"), "getx")),
                expr_stmt(call(ident("f"), vec![])),
            ],
        ),
    ]);
    let main = main_chunk(&program);
    assert_eq!(
        opcodes(&main),
        vec![
            OpCode::GetGlobal,
            OpCode::PushConst,
            OpCode::Call,
            OpCode::DefLocal,
            OpCode::GetLocal,
            OpCode::CallProperty,
            OpCode::Pop,
            OpCode::GetLocal,
            OpCode::GetProperty,
            OpCode::DefLocal,
            OpCode::GetLocal,
            OpCode::Call,
            OpCode::Pop,
            OpCode::ReturnVoid,
        ]
    );
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_if_jump_targets() {
    let main = main_chunk(&with_main(vec![if_(boolean(true), vec![], Some(vec![]))]));
    let body = instructions(&main);
    assert_eq!(
        body.iter().map(|i| i.opcode).collect::<Vec<_>>(),
        vec![
            OpCode::PushTrue,
            OpCode::JumpFalse,
            OpCode::Pop,
            OpCode::Jump,
            OpCode::Pop,
            OpCode::ReturnVoid,
        ]
    );
    assert_eq!(body[1].jump_target(), Some(body[4].offset));
    assert_eq!(body[3].jump_target(), Some(body[5].offset));
}

#[test]
fn test_break_jumps_back_to_test_site() {
    let main = main_chunk(&with_main(vec![while_(boolean(true), vec![break_()])]));
    let body = instructions(&main);
    let at = |offset: usize| body.iter().find(|i| i.offset == offset).unwrap().opcode;

    let break_loop = body
        .windows(2)
        .find(|w| w[0].opcode == OpCode::PushFalse)
        .map(|w| w[1].clone())
        .unwrap();
    assert_eq!(break_loop.opcode, OpCode::Loop);
    assert_eq!(at(break_loop.jump_target().unwrap()), OpCode::JumpFalse);

    // Both exits land on the final POP
    let exit = body[body.len() - 2].offset;
    for jump in body.iter().filter(|i| i.opcode == OpCode::JumpFalse) {
        assert_eq!(jump.jump_target(), Some(exit));
    }
}

#[test]
fn test_backpatch_out_of_range_is_fatal() {
    let mut compiler = Compiler::default();
    let err = compiler.patch_jump(1000).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::BackpatchRange { offset: 1000 });
}

// ============================================================================
// Diagnostics
// ============================================================================

#[test]
fn test_undeclared_variable() {
    let errors = compile_err(&with_main(vec![expr_stmt(ident("y").at(14, 1))]));
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.0[0].kind,
        CompileErrorKind::UndeclaredVariable("y".into())
    );
    assert_eq!(errors.0[0].span, Span::new(14, 1));
}

#[test]
fn test_redeclared_local() {
    let errors = compile_err(&with_main(vec![let_("x", int(1)), let_("x", int(2))]));
    assert!(errors.contains(&CompileErrorKind::RedeclaredVariable("x".into())));
}

#[test]
fn test_shadowing_in_inner_block_is_allowed() {
    compile_ok(&with_main(vec![
        let_("x", int(1)),
        block(vec![let_("x", int(2))]),
    ]));
}

#[test]
fn test_redeclared_global() {
    let errors = compile_err(&program(vec![
        fn_decl("main", &[], vec![]),
        fn_decl("main", &[], vec![]),
    ]));
    assert_eq!(errors.len(), 1);
    assert!(errors.contains(&CompileErrorKind::RedeclaredVariable("main".into())));
}

#[test]
fn test_duplicate_parameters_fields_and_methods() {
    let errors = compile_err(&program(vec![
        fn_decl("f", &["a", "a"], vec![]),
        record("P", &["x", "x"], vec![]),
        record(
            "Q",
            &[],
            vec![function("m", &[], vec![]), function("m", &[], vec![])],
        ),
        fn_decl("main", &[], vec![]),
    ]));
    assert!(errors.contains(&CompileErrorKind::RedeclaredVariable("a".into())));
    assert!(errors.contains(&CompileErrorKind::RedeclaredVariable("x".into())));
    assert!(errors.contains(&CompileErrorKind::RedeclaredVariable("m".into())));
}

#[test]
fn test_global_used_before_initialized() {
    let errors = compile_err(&program(vec![
        let_("a", ident("b")),
        let_("b", int(1)),
        fn_decl("main", &[], vec![]),
    ]));
    assert!(errors.contains(&CompileErrorKind::UsedBeforeInitialized("b".into())));
}

#[test]
fn test_global_referenced_from_top_level_block() {
    compile_ok(&program(vec![
        block(vec![expr_stmt(call(ident("f"), vec![]))]),
        while_(boolean(false), vec![expr_stmt(ident("later"))]),
        fn_decl("f", &[], vec![]),
        let_("later", int(1)),
        fn_decl("main", &[], vec![]),
    ]));
}

#[test]
fn test_missing_entry_function() {
    let errors = compile_err(&program(vec![let_("main", int(1))]));
    assert!(errors.contains(&CompileErrorKind::MissingEntryFunction("main".into())));

    let chunk = Compiler::new(CompilerOptions::new().entry_point("start"))
        .compile(&program(vec![fn_decl("start", &[], vec![])]));
    assert!(chunk.is_ok());
}

#[test]
fn test_break_and_continue_outside_loop() {
    let errors = compile_err(&program(vec![
        fn_decl("f", &[], vec![continue_()]),
        fn_decl(
            "main",
            &[],
            vec![loop_(vec![let_("g", closure(&[], vec![break_()]))])],
        ),
    ]));
    assert!(errors.contains(&CompileErrorKind::BreakOrContinueOutsideLoop("continue")));
    assert!(errors.contains(&CompileErrorKind::BreakOrContinueOutsideLoop("break")));
}

#[test]
fn test_invalid_assignment_target() {
    let errors = compile_err(&with_main(vec![expr_stmt(assign(int(1), int(2)))]));
    assert!(errors.contains(&CompileErrorKind::InvalidAssignmentTarget));
}

#[test]
fn test_return_outside_function() {
    let errors = compile_err(&program(vec![ret(None), fn_decl("main", &[], vec![])]));
    assert!(errors.contains(&CompileErrorKind::ReturnOutsideFunction));
}

#[test]
fn test_one_error_per_top_level_statement() {
    let errors = compile_err(&program(vec![
        let_("a", add(ident("u1"), ident("u2"))),
        let_("b", ident("u3")),
        fn_decl("main", &[], vec![]),
    ]));
    assert_eq!(errors.len(), 2);
    assert!(errors.contains(&CompileErrorKind::UndeclaredVariable("u1".into())));
    assert!(!errors.contains(&CompileErrorKind::UndeclaredVariable("u2".into())));
    assert!(errors.contains(&CompileErrorKind::UndeclaredVariable("u3".into())));
}
