use rustpython_ast as ast;
use rustpython_ast::text_size::TextRange;
use rustpython_ast::Ranged;

/// Identity of a parse node, used to key side tables without holding a
/// reference into the tree. Two distinct nodes can share a range (a lone
/// name expression and its enclosing expression statement, for instance),
/// so the node kind participates in the key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeKey {
    kind: NodeKind,
    range: TextRange,
}

impl NodeKey {
    pub fn from_expr(expr: &ast::Expr) -> Self {
        Self {
            kind: NodeKind::from_expr(expr),
            range: expr.range(),
        }
    }

    pub fn from_stmt(stmt: &ast::Stmt) -> Self {
        Self {
            kind: NodeKind::from_stmt(stmt),
            range: stmt.range(),
        }
    }

    pub fn from_alias(alias: &ast::Alias) -> Self {
        Self {
            kind: NodeKind::Alias,
            range: alias.range(),
        }
    }

    pub fn from_arg(arg: &ast::Arg) -> Self {
        Self {
            kind: NodeKind::Parameter,
            range: arg.range(),
        }
    }

    pub fn from_identifier(identifier: &ast::Identifier) -> Self {
        Self {
            kind: NodeKind::Identifier,
            range: identifier.range(),
        }
    }

    pub fn module(range: TextRange) -> Self {
        Self {
            kind: NodeKind::Module,
            range,
        }
    }

    pub fn range(self) -> TextRange {
        self.range
    }

    pub fn kind(self) -> NodeKind {
        self.kind
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NodeKind {
    Module,
    Stmt(StmtKind),
    Expr(ExprKind),
    Alias,
    Parameter,
    Identifier,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StmtKind {
    FunctionDef,
    ClassDef,
    Return,
    Delete,
    Assign,
    AugAssign,
    AnnAssign,
    TypeAlias,
    For,
    While,
    If,
    With,
    Match,
    Raise,
    Try,
    Assert,
    Import,
    ImportFrom,
    Global,
    Nonlocal,
    Expr,
    Pass,
    Break,
    Continue,
    Other,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ExprKind {
    BoolOp,
    NamedExpr,
    BinOp,
    UnaryOp,
    Lambda,
    IfExp,
    Dict,
    Set,
    ListComp,
    SetComp,
    DictComp,
    GeneratorExp,
    Await,
    Yield,
    YieldFrom,
    Compare,
    Call,
    FormattedValue,
    JoinedStr,
    Constant,
    Attribute,
    Subscript,
    Starred,
    Name,
    List,
    Tuple,
    Slice,
    Other,
}

impl NodeKind {
    fn from_stmt(stmt: &ast::Stmt) -> Self {
        let kind = match stmt {
            ast::Stmt::FunctionDef(_) | ast::Stmt::AsyncFunctionDef(_) => StmtKind::FunctionDef,
            ast::Stmt::ClassDef(_) => StmtKind::ClassDef,
            ast::Stmt::Return(_) => StmtKind::Return,
            ast::Stmt::Delete(_) => StmtKind::Delete,
            ast::Stmt::Assign(_) => StmtKind::Assign,
            ast::Stmt::AugAssign(_) => StmtKind::AugAssign,
            ast::Stmt::AnnAssign(_) => StmtKind::AnnAssign,
            ast::Stmt::TypeAlias(_) => StmtKind::TypeAlias,
            ast::Stmt::For(_) | ast::Stmt::AsyncFor(_) => StmtKind::For,
            ast::Stmt::While(_) => StmtKind::While,
            ast::Stmt::If(_) => StmtKind::If,
            ast::Stmt::With(_) | ast::Stmt::AsyncWith(_) => StmtKind::With,
            ast::Stmt::Match(_) => StmtKind::Match,
            ast::Stmt::Raise(_) => StmtKind::Raise,
            ast::Stmt::Try(_) | ast::Stmt::TryStar(_) => StmtKind::Try,
            ast::Stmt::Assert(_) => StmtKind::Assert,
            ast::Stmt::Import(_) => StmtKind::Import,
            ast::Stmt::ImportFrom(_) => StmtKind::ImportFrom,
            ast::Stmt::Global(_) => StmtKind::Global,
            ast::Stmt::Nonlocal(_) => StmtKind::Nonlocal,
            ast::Stmt::Expr(_) => StmtKind::Expr,
            ast::Stmt::Pass(_) => StmtKind::Pass,
            ast::Stmt::Break(_) => StmtKind::Break,
            ast::Stmt::Continue(_) => StmtKind::Continue,
            _ => StmtKind::Other,
        };
        NodeKind::Stmt(kind)
    }

    fn from_expr(expr: &ast::Expr) -> Self {
        let kind = match expr {
            ast::Expr::BoolOp(_) => ExprKind::BoolOp,
            ast::Expr::NamedExpr(_) => ExprKind::NamedExpr,
            ast::Expr::BinOp(_) => ExprKind::BinOp,
            ast::Expr::UnaryOp(_) => ExprKind::UnaryOp,
            ast::Expr::Lambda(_) => ExprKind::Lambda,
            ast::Expr::IfExp(_) => ExprKind::IfExp,
            ast::Expr::Dict(_) => ExprKind::Dict,
            ast::Expr::Set(_) => ExprKind::Set,
            ast::Expr::ListComp(_) => ExprKind::ListComp,
            ast::Expr::SetComp(_) => ExprKind::SetComp,
            ast::Expr::DictComp(_) => ExprKind::DictComp,
            ast::Expr::GeneratorExp(_) => ExprKind::GeneratorExp,
            ast::Expr::Await(_) => ExprKind::Await,
            ast::Expr::Yield(_) => ExprKind::Yield,
            ast::Expr::YieldFrom(_) => ExprKind::YieldFrom,
            ast::Expr::Compare(_) => ExprKind::Compare,
            ast::Expr::Call(_) => ExprKind::Call,
            ast::Expr::FormattedValue(_) => ExprKind::FormattedValue,
            ast::Expr::JoinedStr(_) => ExprKind::JoinedStr,
            ast::Expr::Constant(_) => ExprKind::Constant,
            ast::Expr::Attribute(_) => ExprKind::Attribute,
            ast::Expr::Subscript(_) => ExprKind::Subscript,
            ast::Expr::Starred(_) => ExprKind::Starred,
            ast::Expr::Name(_) => ExprKind::Name,
            ast::Expr::List(_) => ExprKind::List,
            ast::Expr::Tuple(_) => ExprKind::Tuple,
            ast::Expr::Slice(_) => ExprKind::Slice,
            _ => ExprKind::Other,
        };
        NodeKind::Expr(kind)
    }
}
