// Copyright 2021 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::{Deserialize, Serialize};

use crate::builtins::BuiltinFn;
use crate::common::Scalar;

/// Expressions are the input surface of the engine: problem descriptions
/// arrive as already-built trees (there is no surface parser), so the
/// identifiers they carry are raw strings that get canonicalized at the
/// point of resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// numeric literal
    Const(f64),
    /// string literal; only meaningful as a map key or template value
    Str(String),
    /// a name resolved through the binding environment: an external
    /// parameter, a generator binding, or a well-known constant
    Var(String),
    /// chained indexing into parameter structure: `a[b]`, `a[b][c]`
    Index(Box<Expr>, Box<Expr>),
    /// indexed access to a variable family: `x[i,j]`, `x[1,_]`
    Ref(String, Vec<IndexExpr>),
    Op1(UnaryOp, Box<Expr>),
    Op2(BinaryOp, Box<Expr>, Box<Expr>),
    /// non-linear primitive, replaced by an auxiliary variable at compile
    /// time
    App(BuiltinFn),
    /// generator aggregation: `sum(i in d1, j in d2: body)`
    Sum(Vec<GeneratorClause>, Box<Expr>),
}

/// One position of an indexed variable access
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IndexExpr {
    /// `_`: aggregate over every declared member matching the other
    /// positions
    Wildcard,
    Expr(Expr),
}

/// A generator clause binds a name to each element of a finite domain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorClause {
    pub name: String,
    pub domain: DomainExpr,
}

impl GeneratorClause {
    pub fn new(name: &str, domain: DomainExpr) -> Self {
        GeneratorClause {
            name: name.to_string(),
            domain,
        }
    }
}

/// The finite domain a generator ranges over
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DomainExpr {
    /// `lo..hi`: integers from lo up to but not including hi
    Range(Expr, Expr),
    /// an explicit sequence of values
    Values(Vec<Scalar>),
    /// anything that resolves through the environment to a list (its
    /// elements) or a map (its keys, sorted)
    Expr(Expr),
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum UnaryOp {
    Positive,
    Negative,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lte,
    Gte,
}

impl BinaryOp {
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Eq | BinaryOp::Lte | BinaryOp::Gte => 1,
            BinaryOp::Add | BinaryOp::Sub => 2,
            BinaryOp::Mul | BinaryOp::Div => 3,
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "=",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
        }
    }

    pub(crate) fn is_comparison(&self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Lte | BinaryOp::Gte)
    }
}

struct PrintVisitor;

impl PrintVisitor {
    fn walk(&self, expr: &Expr) -> String {
        match expr {
            Expr::Const(n) => format!("{n}"),
            Expr::Str(s) => format!("{s:?}"),
            Expr::Var(name) => name.clone(),
            Expr::Index(base, idx) => {
                format!("{}[{}]", self.walk(base), self.walk(idx))
            }
            Expr::Ref(family, indices) => {
                let indices: Vec<String> = indices
                    .iter()
                    .map(|idx| match idx {
                        IndexExpr::Wildcard => "_".to_string(),
                        IndexExpr::Expr(e) => self.walk(e),
                    })
                    .collect();
                format!("{}[{}]", family, indices.join(","))
            }
            Expr::Op1(op, e) => {
                let op = match op {
                    UnaryOp::Positive => "+",
                    UnaryOp::Negative => "-",
                };
                format!("{}{}", op, self.walk_with_parens(e, 4))
            }
            Expr::Op2(op, l, r) => {
                let prec = op.precedence();
                // subtraction and division are left-associative, so an
                // equal-precedence right child still needs parens
                let right_prec = match op {
                    BinaryOp::Sub | BinaryOp::Div => prec + 1,
                    _ => prec,
                };
                format!(
                    "{} {} {}",
                    self.walk_with_parens(l, prec),
                    op.as_str(),
                    self.walk_with_parens(r, right_prec)
                )
            }
            Expr::App(builtin) => {
                let args: Vec<String> = builtin.args().iter().map(|e| self.walk(e)).collect();
                format!("{}({})", builtin.name(), args.join(", "))
            }
            Expr::Sum(clauses, body) => {
                let clauses: Vec<String> = clauses
                    .iter()
                    .map(|c| format!("{} in {}", c.name, self.walk_domain(&c.domain)))
                    .collect();
                format!("sum({}: {})", clauses.join(", "), self.walk(body))
            }
        }
    }

    fn walk_with_parens(&self, expr: &Expr, parent_prec: u8) -> String {
        let needs_parens = match expr {
            Expr::Op2(child_op, _, _) => child_op.precedence() < parent_prec,
            Expr::Op1(_, _) => parent_prec >= 4,
            _ => false,
        };
        if needs_parens {
            format!("({})", self.walk(expr))
        } else {
            self.walk(expr)
        }
    }

    fn walk_domain(&self, domain: &DomainExpr) -> String {
        match domain {
            DomainExpr::Range(lo, hi) => format!("{}..{}", self.walk(lo), self.walk(hi)),
            DomainExpr::Values(vals) => {
                let vals: Vec<String> = vals.iter().map(|v| format!("{v}")).collect();
                format!("{{{}}}", vals.join(","))
            }
            DomainExpr::Expr(e) => self.walk(e),
        }
    }
}

/// Render an expression for diagnostics
pub fn print_expr(expr: &Expr) -> String {
    PrintVisitor.walk(expr)
}
