//! AST node types for the pmscript language, a JavaScript subset.
//!
//! Every node carries a [`Span`] for error reporting. Function definitions
//! are reference-counted so closures can hold on to their body without
//! cloning the tree.

use std::rc::Rc;

use crate::Span;

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A complete script: a list of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// `{ statements... }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `expr;`
    Expr(ExprStmt),
    /// `let a = 1, b;`
    Var(VarDecl),
    /// `function name(params) { ... }`
    Function(Rc<FunctionDef>),
    /// `if (cond) stmt [else stmt]`
    If(IfStmt),
    /// `for (init; test; update) stmt`
    For(ForStmt),
    /// `for (const x of list) stmt`
    ForOf(ForEachStmt),
    /// `for (const key in object) stmt`
    ForIn(ForEachStmt),
    /// `while (cond) stmt`
    While(WhileStmt),
    /// `do stmt while (cond)`
    DoWhile(WhileStmt),
    /// `{ ... }`
    Block(Block),
    /// `return [expr]`
    Return(ReturnStmt),
    /// `break`
    Break(Span),
    /// `continue`
    Continue(Span),
    /// `throw expr`
    Throw(ThrowStmt),
    /// `try { } catch (e) { } finally { }`
    Try(TryStmt),
    /// A lone `;`
    Empty(Span),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr(s) => s.span,
            Stmt::Var(s) => s.span,
            Stmt::Function(f) => f.span,
            Stmt::If(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::ForOf(s) | Stmt::ForIn(s) => s.span,
            Stmt::While(s) | Stmt::DoWhile(s) => s.span,
            Stmt::Block(b) => b.span,
            Stmt::Return(s) => s.span,
            Stmt::Break(span) | Stmt::Continue(span) | Stmt::Empty(span) => *span,
            Stmt::Throw(s) => s.span,
            Stmt::Try(s) => s.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprStmt {
    pub expr: Expr,
    pub span: Span,
}

/// Declaration keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub kind: VarKind,
    pub declarators: Vec<Declarator>,
    pub span: Span,
}

/// One `name [= init]` inside a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: Ident,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_branch: Box<Stmt>,
    pub else_branch: Option<Box<Stmt>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Var(VarDecl),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub init: Option<ForInit>,
    pub test: Option<Expr>,
    pub update: Option<Expr>,
    pub body: Box<Stmt>,
    pub span: Span,
}

/// Shared shape of `for…of` and `for…in`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForEachStmt {
    /// `None` when the loop assigns to an existing binding: `for (x of xs)`.
    pub kind: Option<VarKind>,
    pub binding: Ident,
    pub iterable: Expr,
    pub body: Box<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Box<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThrowStmt {
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryStmt {
    pub block: Block,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<Ident>,
    pub body: Block,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════════════════════

/// A function declaration, function expression, or arrow function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<Ident>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub is_arrow: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub default: Option<Expr>,
    /// `...rest`
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Block),
    /// Concise arrow body: `x => x + 1`
    Expr(Box<Expr>),
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Source-like rendering of a callee, used in `x is not a function`.
    pub fn describe(&self) -> String {
        match &self.kind {
            ExprKind::Identifier(name) => name.clone(),
            ExprKind::Member {
                object, property, ..
            } => match property {
                MemberProperty::Named(ident) => format!("{}.{}", object.describe(), ident.name),
                MemberProperty::Computed(_) => format!("{}[...]", object.describe()),
            },
            ExprKind::Call { callee, .. } => format!("{}(...)", callee.describe()),
            ExprKind::Paren(inner) => inner.describe(),
            ExprKind::String(s) => format!("\"{s}\""),
            ExprKind::Number(n) => n.to_string(),
            _ => "expression".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // ── Literals ──
    /// `42`, `3.14`, `0xff`
    Number(f64),
    /// `'text'` or `"text"`
    String(String),
    /// `` `hello ${name}` ``
    Template(Vec<TemplatePart>),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
    /// `[a, ...rest]`
    Array(Vec<ListItem>),
    /// `{ key: value, short, ...spread }`
    Object(Vec<PropertyEntry>),

    // ── Names & Access ──
    /// `name`
    Identifier(String),
    /// `obj.name`, `obj[expr]`, `obj?.name`
    Member {
        object: Box<Expr>,
        property: MemberProperty,
        optional: bool,
    },
    /// `callee(args)`, `callee?.(args)`
    Call {
        callee: Box<Expr>,
        args: Vec<ListItem>,
        optional: bool,
    },
    /// `new Callee(args)`
    New {
        callee: Box<Expr>,
        args: Vec<ListItem>,
    },

    // ── Operators ──
    /// `!x`, `-x`, `+x`, `typeof x`, `void x`
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `x++`, `--x`
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    /// `a + b`, `a === b`, `a in b`, ...
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// `a && b`, `a || b`, `a ?? b` (short-circuit)
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    /// `test ? a : b`
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    /// `target = value`, `target += value`, ...
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },

    // ── Functions ──
    /// `function (a) { }` or `(a) => a`
    Function(Rc<FunctionDef>),

    // ── Grouping ──
    /// `(expr)`
    Paren(Box<Expr>),
}

/// A part of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Expr(Expr),
}

/// Element of an array literal or argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    /// `.name`
    Named(Ident),
    /// `[expr]`
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyEntry {
    /// `key: value` or `[expr]: value` or `name() { }`
    Field { key: PropertyKey, value: Expr },
    /// `{ name }`
    Shorthand(Ident),
    /// `{ ...expr }`
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Named(String),
    Computed(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AssignOp {
    /// The arithmetic operator a compound assignment applies, if any.
    pub fn binary_op(self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
            AssignOp::Mod => Some(BinOp::Mod),
        }
    }
}
