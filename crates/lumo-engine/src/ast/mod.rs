// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Abstract Syntax Tree (AST) definitions for Lumo.
//!
//! The parser lives outside this crate; it hands the compiler a [`Program`]
//! built from these nodes. Every statement and expression carries the
//! [`Span`] it was parsed from so the compiler can record per-byte source
//! positions in the chunk metadata.

pub mod builder;

/// A region of source text: byte offset plus length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Byte offset of the first character
    pub start: u32,
    /// Length in bytes
    pub len: u32,
}

impl Span {
    /// Creates a new span.
    pub const fn new(start: u32, len: u32) -> Self {
        Self { start, len }
    }
}

/// A complete Lumo program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// The top-level statements, in source order
    pub body: Vec<Statement>,
}

impl Program {
    /// Creates a program from its top-level statements.
    pub fn new(body: Vec<Statement>) -> Self {
        Self { body }
    }
}

/// An identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    /// The name of the identifier
    pub name: String,
    /// Where the identifier appears
    pub span: Span,
}

/// A statement with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// What kind of statement this is
    pub kind: StatementKind,
    /// Where the statement appears
    pub span: Span,
}

/// A Lumo statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `let name = init;`
    VariableDeclaration(VariableDeclaration),
    /// `fn name(params) { body }`
    FunctionDeclaration(FunctionDeclaration),
    /// `struct Name { fields; methods }`
    RecordDeclaration(RecordDeclaration),
    /// Expression statement
    Expression(Expression),
    /// Block statement { ... }
    Block(BlockStatement),
    /// If statement
    If(IfStatement),
    /// While statement
    While(WhileStatement),
    /// Indefinite `loop { ... }`
    Loop(LoopStatement),
    /// `for x in iterable { ... }`
    ForIn(ForInStatement),
    /// C-style `for (let i = a; test; update) { ... }`
    For(ForStatement),
    /// Return statement
    Return(ReturnStatement),
    /// Break statement
    Break,
    /// Continue statement
    Continue,
}

/// A `let` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    /// The identifier being declared
    pub id: Identifier,
    /// Initializer expression
    pub init: Expression,
}

/// A function declaration. Also used for record methods.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    /// The function name
    pub id: Identifier,
    /// The parameters
    pub params: Vec<Identifier>,
    /// The function body
    pub body: Vec<Statement>,
}

/// A record (struct with methods) declaration.
///
/// Methods see their receiver as `self`; it is not listed in `params`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDeclaration {
    /// The record name
    pub id: Identifier,
    /// Field names, in constructor order
    pub fields: Vec<Identifier>,
    /// Methods
    pub methods: Vec<FunctionDeclaration>,
}

/// A block statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    /// The statements in the block
    pub body: Vec<Statement>,
}

/// An if statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    /// The condition
    pub test: Expression,
    /// The then branch
    pub consequent: Box<Statement>,
    /// The optional else branch
    pub alternate: Option<Box<Statement>>,
}

/// A while statement.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    /// The condition
    pub test: Expression,
    /// The loop body
    pub body: Box<Statement>,
}

/// An indefinite loop, left only through `break` or `return`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopStatement {
    /// The loop body
    pub body: Box<Statement>,
}

/// A for-in statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ForInStatement {
    /// The loop variable, rebound every iteration
    pub binding: Identifier,
    /// The value to iterate over
    pub iterable: Expression,
    /// The loop body
    pub body: Box<Statement>,
}

/// A C-style for statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    /// The loop variable declaration
    pub init: VariableDeclaration,
    /// The condition (absent means loop forever)
    pub test: Option<Expression>,
    /// The update expression
    pub update: Option<Expression>,
    /// The loop body
    pub body: Box<Statement>,
}

/// A return statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    /// The return value
    pub argument: Option<Expression>,
}

/// An expression with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// What kind of expression this is
    pub kind: ExpressionKind,
    /// Where the expression appears
    pub span: Span,
}

/// A Lumo expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    /// Literal value
    Literal(Literal),
    /// Identifier reference
    Identifier(Identifier),
    /// Binary expression (evaluates both operands)
    Binary(BinaryExpression),
    /// Short-circuit `and` / `or`
    Logical(LogicalExpression),
    /// Unary expression
    Unary(UnaryExpression),
    /// Assignment expression
    Assignment(AssignmentExpression),
    /// Call expression
    Call(CallExpression),
    /// Member access expression
    Member(MemberExpression),
    /// `start..end` / `start..=end`
    Range(RangeExpression),
    /// Anonymous function `(params) -> body`
    Arrow(ArrowFunctionExpression),
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    String(String),
    /// Character literal
    Char(char),
    /// Boolean literal
    Bool(bool),
    /// nil
    Nil,
    /// The unit value
    Void,
}

/// A binary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    /// The operator
    pub operator: BinaryOperator,
    /// The left operand
    pub left: Box<Expression>,
    /// The right operand
    pub right: Box<Expression>,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    // Logical, no short-circuit
    And,
    Or,
}

/// A short-circuit logical expression.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalExpression {
    /// The operator
    pub operator: LogicalOperator,
    /// The left operand
    pub left: Box<Expression>,
    /// The right operand, evaluated only when needed
    pub right: Box<Expression>,
}

/// Short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    /// `and`
    And,
    /// `or`
    Or,
}

/// A unary expression.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpression {
    /// The operator
    pub operator: UnaryOperator,
    /// The operand
    pub argument: Box<Expression>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// -
    Minus,
    /// !
    Not,
}

/// An assignment expression. Only identifiers and members are valid targets.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpression {
    /// The assignment target
    pub target: Box<Expression>,
    /// The assigned value
    pub value: Box<Expression>,
}

/// A function call expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    /// The function being called
    pub callee: Box<Expression>,
    /// The arguments
    pub arguments: Vec<Expression>,
}

/// A member access expression.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpression {
    /// The object
    pub object: Box<Expression>,
    /// The property
    pub property: Identifier,
}

/// A range expression.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeExpression {
    /// Lower bound
    pub start: Box<Expression>,
    /// Upper bound
    pub end: Box<Expression>,
    /// Whether `end` is part of the range
    pub inclusive: bool,
}

/// An anonymous function expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrowFunctionExpression {
    /// Parameters
    pub params: Vec<Identifier>,
    /// Body (expression or block)
    pub body: ArrowBody,
}

/// Arrow function body.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrowBody {
    /// Expression body, returned implicitly
    Expression(Box<Expression>),
    /// Block body
    Block(Vec<Statement>),
}
