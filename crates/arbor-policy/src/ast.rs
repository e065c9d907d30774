//! Abstract syntax for policy modules.

/// A compiled policy module.
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    /// Dotted package path (e.g. `main`, `tupelo.nopolicychange`).
    pub package: String,
    /// Rules in declaration order.
    pub rules: Vec<Rule>,
}

impl Module {
    /// All clauses declaring `name`.
    pub fn clauses(&self, name: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.name == name && !r.is_default)
            .collect()
    }

    /// The `default` clause for `name`, if any.
    pub fn default_clause(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name && r.is_default)
    }

    /// Returns `true` if any clause declares `name`.
    pub fn declares(&self, name: &str) -> bool {
        self.rules.iter().any(|r| r.name == name)
    }
}

/// A single rule clause.
///
/// Shapes covered: `default name = value`, `name = value { body }`,
/// `name = value`, and `name { body }` (value defaults to `true`).
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub name: String,
    pub is_default: bool,
    /// The rule value; `None` means boolean `true`.
    pub value: Option<Expr>,
    /// Conjunctive body; empty means the rule holds unconditionally.
    pub body: Vec<Stmt>,
}

/// A body statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    /// `x := expr` — bind a local to each expansion of `expr`.
    Bind(String, Expr),
    /// `a == b`
    Eq(Expr, Expr),
    /// `a != b`
    Neq(Expr, Expr),
    /// `not expr` — succeeds iff no expansion of `expr` is truthy.
    Not(Expr),
    /// Bare expression — succeeds iff some expansion is truthy.
    Expr(Expr),
}

/// An expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// Array literal.
    Array(Vec<Expr>),
    /// Array comprehension `[head | body]`.
    Comprehension { head: Box<Expr>, body: Vec<Stmt> },
    /// Built-in call.
    Call { name: String, args: Vec<Expr> },
    /// A reference rooted at an identifier (`input`, `data`, a local, or a
    /// module-local rule) followed by path steps.
    Ref { root: String, path: Vec<PathSeg> },
}

/// One step of a reference path.
#[derive(Clone, Debug, PartialEq)]
pub enum PathSeg {
    /// `.name` or `["name"]`
    Key(String),
    /// `[3]`
    Index(i64),
    /// `[_]` — expand over all elements/values.
    Wildcard,
}
