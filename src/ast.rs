//! Source tree types for KSX
//!
//! Trees are produced by an external parser (or built with [`crate::builder`]) and
//! are never mutated by the engine. Statement lists hold `Rc<Statement>` so the
//! statement queue can reference nodes without copying them.

use crate::prelude::Rc;
use serde::{Deserialize, Serialize};

/// Source position of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Span {
            start,
            end,
            line,
            column,
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Span {
            start: 0,
            end: 0,
            line: 1,
            column: 1,
        }
    }
}

// ============ STATEMENTS ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Statement {
    Empty(EmptyStatement),
    Expression(ExpressionStatement),
    ArrowExpression(ArrowExpressionStatement),

    // Declarations
    Let(LetStatement),
    Const(ConstStatement),
    Function(FunctionDeclaration),
    Import(ImportDeclaration),

    // Control Flow
    Block(BlockStatement),
    If(IfStatement),
    Switch(SwitchStatement),
    While(WhileStatement),
    DoWhile(DoWhileStatement),
    For(ForStatement),
    ForIn(ForInStatement),
    ForOf(ForOfStatement),
    Try(TryStatement),

    // Jump
    Return(ReturnStatement),
    Break(BreakStatement),
    Continue(ContinueStatement),
    Throw(ThrowStatement),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Empty(s) => s.span,
            Statement::Expression(s) => s.span,
            Statement::ArrowExpression(s) => s.span,
            Statement::Let(s) => s.span,
            Statement::Const(s) => s.span,
            Statement::Function(s) => s.span,
            Statement::Import(s) => s.span,
            Statement::Block(s) => s.span,
            Statement::If(s) => s.span,
            Statement::Switch(s) => s.span,
            Statement::While(s) => s.span,
            Statement::DoWhile(s) => s.span,
            Statement::For(s) => s.span,
            Statement::ForIn(s) => s.span,
            Statement::ForOf(s) => s.span,
            Statement::Try(s) => s.span,
            Statement::Return(s) => s.span,
            Statement::Break(s) => s.span,
            Statement::Continue(s) => s.span,
            Statement::Throw(s) => s.span,
        }
    }

    /// Node name used in diagnostics and trace output
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Empty(_) => "EmptyStatement",
            Statement::Expression(_) => "ExpressionStatement",
            Statement::ArrowExpression(_) => "ArrowExpressionStatement",
            Statement::Let(_) => "LetStatement",
            Statement::Const(_) => "ConstStatement",
            Statement::Function(_) => "FunctionDeclaration",
            Statement::Import(_) => "ImportDeclaration",
            Statement::Block(_) => "BlockStatement",
            Statement::If(_) => "IfStatement",
            Statement::Switch(_) => "SwitchStatement",
            Statement::While(_) => "WhileStatement",
            Statement::DoWhile(_) => "DoWhileStatement",
            Statement::For(_) => "ForStatement",
            Statement::ForIn(_) => "ForInStatement",
            Statement::ForOf(_) => "ForOfStatement",
            Statement::Try(_) => "TryStatement",
            Statement::Return(_) => "ReturnStatement",
            Statement::Break(_) => "BreakStatement",
            Statement::Continue(_) => "ContinueStatement",
            Statement::Throw(_) => "ThrowStatement",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyStatement {
    /// Set on the synthetic closing item of a block; pops the block scope
    #[serde(default)]
    pub remove_block_scope: bool,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionStatement {
    pub expression: Expression,
    #[serde(default)]
    pub span: Span,
}

/// An arrow function run as a statement with the host's event arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrowExpressionStatement {
    pub expression: Rc<ArrowExpression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetStatement {
    pub declarations: Vec<VarDeclaration>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstStatement {
    pub declarations: Vec<VarDeclaration>,
    #[serde(default)]
    pub is_exported: bool,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDeclaration {
    pub pattern: BindingPattern,
    pub init: Option<Expression>,
    #[serde(default)]
    pub span: Span,
}

/// Binding target of a declaration or arrow parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BindingPattern {
    Identifier(String),
    /// `[a, , [b, c], {d}]` - `None` marks a hole
    Array(Vec<Option<BindingPattern>>),
    /// `{a, b: alias, c: {d}}`
    Object(Vec<ObjectPatternProperty>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPatternProperty {
    pub key: String,
    pub value: BindingPattern,
}

/// `function name(params) { ... }`, hoisted into its block as a closure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub function: Rc<ArrowExpression>,
    #[serde(default)]
    pub is_exported: bool,
    #[serde(default)]
    pub span: Span,
}

/// `import { a, b as c } from "module"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDeclaration {
    pub imports: Vec<ImportSpecifier>,
    pub module_file: String,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSpecifier {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportSpecifier {
    /// Name the import is bound to in the importing module
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockStatement {
    pub statements: Vec<Rc<Statement>>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfStatement {
    pub condition: Expression,
    pub then_branch: Rc<Statement>,
    pub else_branch: Option<Rc<Statement>>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub test: Option<Expression>,
    pub statements: Vec<Rc<Statement>>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhileStatement {
    pub condition: Expression,
    pub body: Rc<Statement>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoWhileStatement {
    pub condition: Expression,
    pub body: Rc<Statement>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForStatement {
    pub init: Option<Rc<Statement>>,
    pub condition: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Rc<Statement>,
    #[serde(default)]
    pub span: Span,
}

/// How a `for..in`/`for..of` loop binds its variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForVarBinding {
    /// `for (x of ...)` - assigns an existing binding
    None,
    Let,
    Const,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForInStatement {
    pub binding: ForVarBinding,
    pub id: String,
    pub expression: Expression,
    pub body: Rc<Statement>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForOfStatement {
    pub binding: ForVarBinding,
    pub id: String,
    pub expression: Expression,
    pub body: Rc<Statement>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryStatement {
    pub try_block: BlockStatement,
    pub catch_variable: Option<String>,
    pub catch_block: Option<BlockStatement>,
    pub finally_block: Option<BlockStatement>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnStatement {
    pub expression: Option<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakStatement {
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContinueStatement {
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrowStatement {
    pub expression: Expression,
    #[serde(default)]
    pub span: Span,
}

// ============ EXPRESSIONS ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expression {
    Literal(Literal),
    Identifier(Identifier),
    TemplateLiteral(TemplateLiteral),
    Array(ArrayLiteral),
    Object(ObjectLiteral),
    Spread(SpreadExpression),

    MemberAccess(MemberAccessExpression),
    CalculatedMemberAccess(CalculatedMemberAccessExpression),
    FunctionInvocation(FunctionInvocationExpression),
    Arrow(Rc<ArrowExpression>),

    Unary(UnaryExpression),
    Binary(BinaryExpression),
    Conditional(ConditionalExpression),
    Assignment(AssignmentExpression),
    Prefix(UpdateExpression),
    Postfix(UpdateExpression),
    Sequence(SequenceExpression),
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Literal(e) => e.span,
            Expression::Identifier(e) => e.span,
            Expression::TemplateLiteral(e) => e.span,
            Expression::Array(e) => e.span,
            Expression::Object(e) => e.span,
            Expression::Spread(e) => e.span,
            Expression::MemberAccess(e) => e.span,
            Expression::CalculatedMemberAccess(e) => e.span,
            Expression::FunctionInvocation(e) => e.span,
            Expression::Arrow(e) => e.span,
            Expression::Unary(e) => e.span,
            Expression::Binary(e) => e.span,
            Expression::Conditional(e) => e.span,
            Expression::Assignment(e) => e.span,
            Expression::Prefix(e) => e.span,
            Expression::Postfix(e) => e.span,
            Expression::Sequence(e) => e.span,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Literal {
    pub value: LiteralValue,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    /// `$name` style reference that only consults the global scope
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub span: Span,
}

/// Template literal, already split into string and expression segments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateLiteral {
    pub segments: Vec<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayLiteral {
    pub items: Vec<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectLiteral {
    pub properties: Vec<ObjectProperty>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ObjectProperty {
    KeyValue { key: PropertyKey, value: Expression },
    Spread(Expression),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PropertyKey {
    Identifier(String),
    String(String),
    Number(f64),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadExpression {
    pub operand: Box<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberAccessExpression {
    pub object: Box<Expression>,
    pub member: String,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatedMemberAccessExpression {
    pub object: Box<Expression>,
    pub member: Box<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInvocationExpression {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrowExpression {
    pub name: Option<String>,
    pub params: Vec<BindingPattern>,
    /// Either an `ExpressionStatement` (expression body) or a `BlockStatement`
    pub body: Rc<Statement>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnaryExpression {
    pub operator: UnaryOp,
    pub operand: Box<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Typeof, // typeof
    Delete, // delete
    Plus,   // +
    Minus,  // -
    Not,    // !
    BitNot, // ~
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryExpression {
    pub operator: BinaryOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add, // +
    Sub, // -
    Mul, // *
    Div, // /
    Mod, // %
    Exp, // **

    // Comparison
    Eq,          // ==
    NotEq,       // !=
    StrictEq,    // ===
    StrictNotEq, // !==
    Lt,          // <
    LtEq,        // <=
    Gt,          // >
    GtEq,        // >=

    // Bitwise
    BitAnd,  // &
    BitOr,   // |
    BitXor,  // ^
    LShift,  // <<
    RShift,  // >>
    URShift, // >>>

    // Logical (short-circuit)
    And,      // &&
    Or,       // ||
    Coalesce, // ??

    In, // in
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalExpression {
    pub condition: Box<Expression>,
    pub consequent: Box<Expression>,
    pub alternate: Box<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentExpression {
    pub operator: AssignmentOp,
    pub target: Box<Expression>,
    pub value: Box<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentOp {
    Assign,         // =
    AddAssign,      // +=
    SubAssign,      // -=
    MulAssign,      // *=
    DivAssign,      // /=
    ModAssign,      // %=
    ExpAssign,      // **=
    LShiftAssign,   // <<=
    RShiftAssign,   // >>=
    URShiftAssign,  // >>>=
    BitAndAssign,   // &=
    BitOrAssign,    // |=
    BitXorAssign,   // ^=
    AndAssign,      // &&=
    OrAssign,       // ||=
    CoalesceAssign, // ??=
}

impl AssignmentOp {
    /// Binary operator a compound assignment applies
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignmentOp::Assign => None,
            AssignmentOp::AddAssign => Some(BinaryOp::Add),
            AssignmentOp::SubAssign => Some(BinaryOp::Sub),
            AssignmentOp::MulAssign => Some(BinaryOp::Mul),
            AssignmentOp::DivAssign => Some(BinaryOp::Div),
            AssignmentOp::ModAssign => Some(BinaryOp::Mod),
            AssignmentOp::ExpAssign => Some(BinaryOp::Exp),
            AssignmentOp::LShiftAssign => Some(BinaryOp::LShift),
            AssignmentOp::RShiftAssign => Some(BinaryOp::RShift),
            AssignmentOp::URShiftAssign => Some(BinaryOp::URShift),
            AssignmentOp::BitAndAssign => Some(BinaryOp::BitAnd),
            AssignmentOp::BitOrAssign => Some(BinaryOp::BitOr),
            AssignmentOp::BitXorAssign => Some(BinaryOp::BitXor),
            AssignmentOp::AndAssign => Some(BinaryOp::And),
            AssignmentOp::OrAssign => Some(BinaryOp::Or),
            AssignmentOp::CoalesceAssign => Some(BinaryOp::Coalesce),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateExpression {
    pub operator: UpdateOp,
    pub operand: Box<Expression>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Increment, // ++
    Decrement, // --
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceExpression {
    pub expressions: Vec<Expression>,
    #[serde(default)]
    pub span: Span,
}
