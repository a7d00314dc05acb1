// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Constructor helpers for building ASTs by hand.
//!
//! Nodes built here carry an empty [`Span`]; use [`Expression::at`] or
//! [`Statement::at`] to attach a position.
//!
//! ```rust
//! use lumo_engine::ast::builder::*;
//!
//! // fn main() { let x = 1 + 2; }
//! let program = program(vec![fn_decl(
//!     "main",
//!     &[],
//!     vec![let_("x", add(int(1), int(2)))],
//! )]);
//! assert_eq!(program.body.len(), 1);
//! ```

#![allow(missing_docs)]

use super::*;

impl Expression {
    /// Attaches a source span. A bare name also gets it on its identifier.
    pub fn at(mut self, start: u32, len: u32) -> Self {
        self.span = Span::new(start, len);
        if let ExpressionKind::Identifier(id) = &mut self.kind {
            id.span = self.span;
        }
        self
    }
}

impl Statement {
    /// Attaches a source span.
    pub fn at(mut self, start: u32, len: u32) -> Self {
        self.span = Span::new(start, len);
        self
    }
}

fn expr(kind: ExpressionKind) -> Expression {
    Expression {
        kind,
        span: Span::default(),
    }
}

fn stmt(kind: StatementKind) -> Statement {
    Statement {
        kind,
        span: Span::default(),
    }
}

/// Builds an identifier node.
pub fn id(name: &str) -> Identifier {
    Identifier {
        name: name.to_string(),
        span: Span::default(),
    }
}

/// Wraps top-level statements into a program.
pub fn program(body: Vec<Statement>) -> Program {
    Program::new(body)
}

// ============================================================================
// Expressions
// ============================================================================

pub fn int(value: i64) -> Expression {
    expr(ExpressionKind::Literal(Literal::Int(value)))
}

pub fn float(value: f64) -> Expression {
    expr(ExpressionKind::Literal(Literal::Float(value)))
}

pub fn string(value: &str) -> Expression {
    expr(ExpressionKind::Literal(Literal::String(value.to_string())))
}

pub fn char_lit(value: char) -> Expression {
    expr(ExpressionKind::Literal(Literal::Char(value)))
}

pub fn boolean(value: bool) -> Expression {
    expr(ExpressionKind::Literal(Literal::Bool(value)))
}

pub fn nil() -> Expression {
    expr(ExpressionKind::Literal(Literal::Nil))
}

pub fn void() -> Expression {
    expr(ExpressionKind::Literal(Literal::Void))
}

/// A name reference.
pub fn ident(name: &str) -> Expression {
    expr(ExpressionKind::Identifier(id(name)))
}

pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
    expr(ExpressionKind::Binary(BinaryExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    }))
}

pub fn add(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::Add, left, right)
}

pub fn sub(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::Subtract, left, right)
}

pub fn mul(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::Multiply, left, right)
}

pub fn eq(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::Equal, left, right)
}

pub fn lt(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::LessThan, left, right)
}

pub fn gt(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::GreaterThan, left, right)
}

/// Short-circuit `and`.
pub fn and(left: Expression, right: Expression) -> Expression {
    logical(LogicalOperator::And, left, right)
}

/// Short-circuit `or`.
pub fn or(left: Expression, right: Expression) -> Expression {
    logical(LogicalOperator::Or, left, right)
}

pub fn logical(operator: LogicalOperator, left: Expression, right: Expression) -> Expression {
    expr(ExpressionKind::Logical(LogicalExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    }))
}

pub fn not(argument: Expression) -> Expression {
    unary(UnaryOperator::Not, argument)
}

pub fn neg(argument: Expression) -> Expression {
    unary(UnaryOperator::Minus, argument)
}

pub fn unary(operator: UnaryOperator, argument: Expression) -> Expression {
    expr(ExpressionKind::Unary(UnaryExpression {
        operator,
        argument: Box::new(argument),
    }))
}

/// `target = value`
pub fn assign(target: Expression, value: Expression) -> Expression {
    expr(ExpressionKind::Assignment(AssignmentExpression {
        target: Box::new(target),
        value: Box::new(value),
    }))
}

pub fn call(callee: Expression, arguments: Vec<Expression>) -> Expression {
    expr(ExpressionKind::Call(CallExpression {
        callee: Box::new(callee),
        arguments,
    }))
}

/// `object.property`
pub fn member(object: Expression, property: &str) -> Expression {
    expr(ExpressionKind::Member(MemberExpression {
        object: Box::new(object),
        property: id(property),
    }))
}

/// `object.method(arguments)`
pub fn method_call(object: Expression, method: &str, arguments: Vec<Expression>) -> Expression {
    call(member(object, method), arguments)
}

/// `start..end`
pub fn range(start: Expression, end: Expression) -> Expression {
    range_expr(start, end, false)
}

/// `start..=end`
pub fn range_inclusive(start: Expression, end: Expression) -> Expression {
    range_expr(start, end, true)
}

fn range_expr(start: Expression, end: Expression, inclusive: bool) -> Expression {
    expr(ExpressionKind::Range(RangeExpression {
        start: Box::new(start),
        end: Box::new(end),
        inclusive,
    }))
}

/// `(params) -> body_expr`
pub fn arrow(params: &[&str], body: Expression) -> Expression {
    expr(ExpressionKind::Arrow(ArrowFunctionExpression {
        params: params.iter().map(|p| id(p)).collect(),
        body: ArrowBody::Expression(Box::new(body)),
    }))
}

/// `(params) -> { body }`
pub fn closure(params: &[&str], body: Vec<Statement>) -> Expression {
    expr(ExpressionKind::Arrow(ArrowFunctionExpression {
        params: params.iter().map(|p| id(p)).collect(),
        body: ArrowBody::Block(body),
    }))
}

// ============================================================================
// Statements
// ============================================================================

/// `let name = init;`
pub fn let_(name: &str, init: Expression) -> Statement {
    stmt(StatementKind::VariableDeclaration(VariableDeclaration {
        id: id(name),
        init,
    }))
}

/// An expression statement.
pub fn expr_stmt(expression: Expression) -> Statement {
    stmt(StatementKind::Expression(expression))
}

/// A function declaration node, for use as a record method.
pub fn function(name: &str, params: &[&str], body: Vec<Statement>) -> FunctionDeclaration {
    FunctionDeclaration {
        id: id(name),
        params: params.iter().map(|p| id(p)).collect(),
        body,
    }
}

/// `fn name(params) { body }`
pub fn fn_decl(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    stmt(StatementKind::FunctionDeclaration(function(name, params, body)))
}

/// `struct name { fields; methods }`
pub fn record(name: &str, fields: &[&str], methods: Vec<FunctionDeclaration>) -> Statement {
    stmt(StatementKind::RecordDeclaration(RecordDeclaration {
        id: id(name),
        fields: fields.iter().map(|f| id(f)).collect(),
        methods,
    }))
}

pub fn block(body: Vec<Statement>) -> Statement {
    stmt(StatementKind::Block(BlockStatement { body }))
}

/// `if test { then } else { otherwise }`
pub fn if_(test: Expression, then: Vec<Statement>, otherwise: Option<Vec<Statement>>) -> Statement {
    stmt(StatementKind::If(IfStatement {
        test,
        consequent: Box::new(block(then)),
        alternate: otherwise.map(|body| Box::new(block(body))),
    }))
}

pub fn while_(test: Expression, body: Vec<Statement>) -> Statement {
    stmt(StatementKind::While(WhileStatement {
        test,
        body: Box::new(block(body)),
    }))
}

pub fn loop_(body: Vec<Statement>) -> Statement {
    stmt(StatementKind::Loop(LoopStatement {
        body: Box::new(block(body)),
    }))
}

/// `for binding in iterable { body }`
pub fn for_in(binding: &str, iterable: Expression, body: Vec<Statement>) -> Statement {
    stmt(StatementKind::ForIn(ForInStatement {
        binding: id(binding),
        iterable,
        body: Box::new(block(body)),
    }))
}

/// `for (let name = init; test; update) { body }`
pub fn for_var(
    name: &str,
    init: Expression,
    test: Option<Expression>,
    update: Option<Expression>,
    body: Vec<Statement>,
) -> Statement {
    stmt(StatementKind::For(ForStatement {
        init: VariableDeclaration { id: id(name), init },
        test,
        update,
        body: Box::new(block(body)),
    }))
}

/// `return argument;`
pub fn ret(argument: Option<Expression>) -> Statement {
    stmt(StatementKind::Return(ReturnStatement { argument }))
}

pub fn break_() -> Statement {
    stmt(StatementKind::Break)
}

pub fn continue_() -> Statement {
    stmt(StatementKind::Continue)
}
