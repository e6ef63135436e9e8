//! Constructors for building trees by hand
//!
//! Hosts that produce trees without a parser, and the engine's own tests,
//! assemble programs from these. Every node gets a default span.

use crate::ast::*;
use crate::prelude::Rc;

// ═══════════════════════════════════════════════════════════════════════════════
// Expressions
// ═══════════════════════════════════════════════════════════════════════════════

fn literal(value: LiteralValue) -> Expression {
    Expression::Literal(Literal {
        value,
        span: Span::default(),
    })
}

pub fn num(value: f64) -> Expression {
    literal(LiteralValue::Number(value))
}

pub fn str_lit(value: &str) -> Expression {
    literal(LiteralValue::String(value.to_string()))
}

pub fn bool_lit(value: bool) -> Expression {
    literal(LiteralValue::Boolean(value))
}

pub fn null() -> Expression {
    literal(LiteralValue::Null)
}

pub fn undefined() -> Expression {
    literal(LiteralValue::Undefined)
}

pub fn ident(name: &str) -> Expression {
    Expression::Identifier(Identifier {
        name: name.to_string(),
        is_global: false,
        span: Span::default(),
    })
}

/// `$name`: looked up in globals only
pub fn global(name: &str) -> Expression {
    Expression::Identifier(Identifier {
        name: name.to_string(),
        is_global: true,
        span: Span::default(),
    })
}

pub fn template(segments: Vec<Expression>) -> Expression {
    Expression::TemplateLiteral(TemplateLiteral {
        segments,
        span: Span::default(),
    })
}

pub fn array(items: Vec<Expression>) -> Expression {
    Expression::Array(ArrayLiteral {
        items,
        span: Span::default(),
    })
}

pub fn spread(operand: Expression) -> Expression {
    Expression::Spread(SpreadExpression {
        operand: Box::new(operand),
        span: Span::default(),
    })
}

pub fn object(properties: Vec<(&str, Expression)>) -> Expression {
    Expression::Object(ObjectLiteral {
        properties: properties
            .into_iter()
            .map(|(key, value)| ObjectProperty::KeyValue {
                key: PropertyKey::Identifier(key.to_string()),
                value,
            })
            .collect(),
        span: Span::default(),
    })
}

pub fn member(object: Expression, name: &str) -> Expression {
    Expression::MemberAccess(MemberAccessExpression {
        object: Box::new(object),
        member: name.to_string(),
        is_optional: false,
        span: Span::default(),
    })
}

/// `object?.name`
pub fn optional_member(object: Expression, name: &str) -> Expression {
    Expression::MemberAccess(MemberAccessExpression {
        object: Box::new(object),
        member: name.to_string(),
        is_optional: true,
        span: Span::default(),
    })
}

/// `object[key]`
pub fn index(object: Expression, key: Expression) -> Expression {
    Expression::CalculatedMemberAccess(CalculatedMemberAccessExpression {
        object: Box::new(object),
        member: Box::new(key),
        span: Span::default(),
    })
}

pub fn call(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::FunctionInvocation(FunctionInvocationExpression {
        callee: Box::new(callee),
        arguments,
        span: Span::default(),
    })
}

pub fn arrow_fn(params: Vec<&str>, body: Statement) -> Rc<ArrowExpression> {
    Rc::new(ArrowExpression {
        name: None,
        params: params
            .into_iter()
            .map(|p| BindingPattern::Identifier(p.to_string()))
            .collect(),
        body: Rc::new(body),
        span: Span::default(),
    })
}

/// `(params) => body`, where `body` is a block or an expression statement
pub fn arrow(params: Vec<&str>, body: Statement) -> Expression {
    Expression::Arrow(arrow_fn(params, body))
}

pub fn binary(operator: BinaryOp, left: Expression, right: Expression) -> Expression {
    Expression::Binary(BinaryExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::default(),
    })
}

pub fn add(left: Expression, right: Expression) -> Expression {
    binary(BinaryOp::Add, left, right)
}

pub fn sub(left: Expression, right: Expression) -> Expression {
    binary(BinaryOp::Sub, left, right)
}

pub fn mul(left: Expression, right: Expression) -> Expression {
    binary(BinaryOp::Mul, left, right)
}

pub fn lt(left: Expression, right: Expression) -> Expression {
    binary(BinaryOp::Lt, left, right)
}

pub fn strict_eq(left: Expression, right: Expression) -> Expression {
    binary(BinaryOp::StrictEq, left, right)
}

pub fn unary(operator: UnaryOp, operand: Expression) -> Expression {
    Expression::Unary(UnaryExpression {
        operator,
        operand: Box::new(operand),
        span: Span::default(),
    })
}

pub fn conditional(condition: Expression, consequent: Expression, alternate: Expression) -> Expression {
    Expression::Conditional(ConditionalExpression {
        condition: Box::new(condition),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
        span: Span::default(),
    })
}

pub fn assign(target: Expression, value: Expression) -> Expression {
    assign_op(AssignmentOp::Assign, target, value)
}

pub fn assign_op(operator: AssignmentOp, target: Expression, value: Expression) -> Expression {
    Expression::Assignment(AssignmentExpression {
        operator,
        target: Box::new(target),
        value: Box::new(value),
        span: Span::default(),
    })
}

fn update(operator: UpdateOp, operand: Expression) -> UpdateExpression {
    UpdateExpression {
        operator,
        operand: Box::new(operand),
        span: Span::default(),
    }
}

pub fn postfix_inc(operand: Expression) -> Expression {
    Expression::Postfix(update(UpdateOp::Increment, operand))
}

pub fn postfix_dec(operand: Expression) -> Expression {
    Expression::Postfix(update(UpdateOp::Decrement, operand))
}

pub fn prefix_inc(operand: Expression) -> Expression {
    Expression::Prefix(update(UpdateOp::Increment, operand))
}

pub fn sequence(expressions: Vec<Expression>) -> Expression {
    Expression::Sequence(SequenceExpression {
        expressions,
        span: Span::default(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Statements
// ═══════════════════════════════════════════════════════════════════════════════

/// Wrap statements for the processors
pub fn program(statements: Vec<Statement>) -> Vec<Rc<Statement>> {
    statements.into_iter().map(Rc::new).collect()
}

pub fn expr_stmt(expression: Expression) -> Statement {
    Statement::Expression(ExpressionStatement {
        expression,
        span: Span::default(),
    })
}

/// Arrow run as a statement with the context's event arguments
pub fn arrow_stmt(params: Vec<&str>, body: Statement) -> Statement {
    Statement::ArrowExpression(ArrowExpressionStatement {
        expression: arrow_fn(params, body),
        span: Span::default(),
    })
}

fn declaration(pattern: BindingPattern, init: Option<Expression>) -> VarDeclaration {
    VarDeclaration {
        pattern,
        init,
        span: Span::default(),
    }
}

pub fn let_(name: &str, init: Expression) -> Statement {
    let_pattern(BindingPattern::Identifier(name.to_string()), Some(init))
}

pub fn let_pattern(pattern: BindingPattern, init: Option<Expression>) -> Statement {
    Statement::Let(LetStatement {
        declarations: vec![declaration(pattern, init)],
        span: Span::default(),
    })
}

pub fn const_(name: &str, init: Expression) -> Statement {
    Statement::Const(ConstStatement {
        declarations: vec![declaration(BindingPattern::Identifier(name.to_string()), Some(init))],
        is_exported: false,
        span: Span::default(),
    })
}

pub fn export_const(name: &str, init: Expression) -> Statement {
    Statement::Const(ConstStatement {
        declarations: vec![declaration(BindingPattern::Identifier(name.to_string()), Some(init))],
        is_exported: true,
        span: Span::default(),
    })
}

pub fn function(name: &str, params: Vec<&str>, body: Vec<Statement>) -> Statement {
    Statement::Function(FunctionDeclaration {
        name: name.to_string(),
        function: arrow_fn(params, block(body)),
        is_exported: false,
        span: Span::default(),
    })
}

pub fn export_function(name: &str, params: Vec<&str>, body: Vec<Statement>) -> Statement {
    Statement::Function(FunctionDeclaration {
        name: name.to_string(),
        function: arrow_fn(params, block(body)),
        is_exported: true,
        span: Span::default(),
    })
}

/// `import { name as alias, .. } from "module_file"`
pub fn import(names: Vec<(&str, Option<&str>)>, module_file: &str) -> Statement {
    Statement::Import(ImportDeclaration {
        imports: names
            .into_iter()
            .map(|(name, alias)| ImportSpecifier {
                name: name.to_string(),
                alias: alias.map(str::to_string),
            })
            .collect(),
        module_file: module_file.to_string(),
        span: Span::default(),
    })
}

fn block_of(statements: Vec<Statement>) -> BlockStatement {
    BlockStatement {
        statements: program(statements),
        span: Span::default(),
    }
}

pub fn block(statements: Vec<Statement>) -> Statement {
    Statement::Block(block_of(statements))
}

pub fn if_(condition: Expression, then_branch: Statement, else_branch: Option<Statement>) -> Statement {
    Statement::If(IfStatement {
        condition,
        then_branch: Rc::new(then_branch),
        else_branch: else_branch.map(Rc::new),
        span: Span::default(),
    })
}

pub fn while_(condition: Expression, body: Statement) -> Statement {
    Statement::While(WhileStatement {
        condition,
        body: Rc::new(body),
        span: Span::default(),
    })
}

pub fn do_while(body: Statement, condition: Expression) -> Statement {
    Statement::DoWhile(DoWhileStatement {
        condition,
        body: Rc::new(body),
        span: Span::default(),
    })
}

pub fn for_(
    init: Option<Statement>,
    condition: Option<Expression>,
    update: Option<Expression>,
    body: Statement,
) -> Statement {
    Statement::For(ForStatement {
        init: init.map(Rc::new),
        condition,
        update,
        body: Rc::new(body),
        span: Span::default(),
    })
}

pub fn for_in(binding: ForVarBinding, id: &str, expression: Expression, body: Statement) -> Statement {
    Statement::ForIn(ForInStatement {
        binding,
        id: id.to_string(),
        expression,
        body: Rc::new(body),
        span: Span::default(),
    })
}

pub fn for_of(binding: ForVarBinding, id: &str, expression: Expression, body: Statement) -> Statement {
    Statement::ForOf(ForOfStatement {
        binding,
        id: id.to_string(),
        expression,
        body: Rc::new(body),
        span: Span::default(),
    })
}

/// `try {..} catch (var) {..} finally {..}`; `catch` is `(variable, body)`
pub fn try_(
    try_block: Vec<Statement>,
    catch: Option<(Option<&str>, Vec<Statement>)>,
    finally_block: Option<Vec<Statement>>,
) -> Statement {
    let (catch_variable, catch_block) = match catch {
        Some((variable, body)) => (variable.map(str::to_string), Some(block_of(body))),
        None => (None, None),
    };
    Statement::Try(TryStatement {
        try_block: block_of(try_block),
        catch_variable,
        catch_block,
        finally_block: finally_block.map(block_of),
        span: Span::default(),
    })
}

pub fn switch(discriminant: Expression, cases: Vec<SwitchCase>) -> Statement {
    Statement::Switch(SwitchStatement {
        discriminant,
        cases,
        span: Span::default(),
    })
}

pub fn case(test: Expression, statements: Vec<Statement>) -> SwitchCase {
    SwitchCase {
        test: Some(test),
        statements: program(statements),
        span: Span::default(),
    }
}

pub fn default_case(statements: Vec<Statement>) -> SwitchCase {
    SwitchCase {
        test: None,
        statements: program(statements),
        span: Span::default(),
    }
}

pub fn return_(expression: Expression) -> Statement {
    Statement::Return(ReturnStatement {
        expression: Some(expression),
        span: Span::default(),
    })
}

pub fn return_void() -> Statement {
    Statement::Return(ReturnStatement {
        expression: None,
        span: Span::default(),
    })
}

pub fn break_() -> Statement {
    Statement::Break(BreakStatement::default())
}

pub fn continue_() -> Statement {
    Statement::Continue(ContinueStatement::default())
}

pub fn throw(expression: Expression) -> Statement {
    Statement::Throw(ThrowStatement {
        expression,
        span: Span::default(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Patterns
// ═══════════════════════════════════════════════════════════════════════════════

pub fn pat(name: &str) -> BindingPattern {
    BindingPattern::Identifier(name.to_string())
}

pub fn array_pat(items: Vec<Option<BindingPattern>>) -> BindingPattern {
    BindingPattern::Array(items)
}

pub fn object_pat(properties: Vec<(&str, BindingPattern)>) -> BindingPattern {
    BindingPattern::Object(
        properties
            .into_iter()
            .map(|(key, value)| ObjectPatternProperty {
                key: key.to_string(),
                value,
            })
            .collect(),
    )
}
