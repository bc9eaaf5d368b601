// Copyright 2022 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Common test infrastructure for building problems.
//!
//! There is no surface syntax in this crate, so tests construct
//! expression trees directly; the free functions here keep that from
//! drowning in `Box::new`.  [TestProblem] is a builder for whole
//! problems, used by the integration tests and by downstream crates'
//! tests.

use crate::ast::{BinaryOp, DomainExpr, Expr, GeneratorClause, IndexExpr, UnaryOp};
use crate::builtins::BuiltinFn;
use crate::common::{Result, Scalar, VariableId, canonicalize};
use crate::datamodel::{
    ConstraintFamily, Direction, Parameter, ProblemSpec, Value, VarKind, VariableFamily,
};
use crate::{CompiledModel, compile};

pub fn num(n: f64) -> Expr {
    Expr::Const(n)
}

pub fn strlit(s: &str) -> Expr {
    Expr::Str(s.to_string())
}

pub fn var(name: &str) -> Expr {
    Expr::Var(name.to_string())
}

pub fn idx(base: Expr, index: Expr) -> Expr {
    Expr::Index(Box::new(base), Box::new(index))
}

pub fn ref1(family: &str, index: Expr) -> Expr {
    Expr::Ref(family.to_string(), vec![IndexExpr::Expr(index)])
}

pub fn ref2(family: &str, i: Expr, j: Expr) -> Expr {
    Expr::Ref(
        family.to_string(),
        vec![IndexExpr::Expr(i), IndexExpr::Expr(j)],
    )
}

pub fn neg(e: Expr) -> Expr {
    Expr::Op1(UnaryOp::Negative, Box::new(e))
}

fn op2(op: BinaryOp, l: Expr, r: Expr) -> Expr {
    Expr::Op2(op, Box::new(l), Box::new(r))
}

pub fn add(l: Expr, r: Expr) -> Expr {
    op2(BinaryOp::Add, l, r)
}

pub fn sub(l: Expr, r: Expr) -> Expr {
    op2(BinaryOp::Sub, l, r)
}

pub fn mul(l: Expr, r: Expr) -> Expr {
    op2(BinaryOp::Mul, l, r)
}

pub fn div(l: Expr, r: Expr) -> Expr {
    op2(BinaryOp::Div, l, r)
}

pub fn eq(l: Expr, r: Expr) -> Expr {
    op2(BinaryOp::Eq, l, r)
}

pub fn lte(l: Expr, r: Expr) -> Expr {
    op2(BinaryOp::Lte, l, r)
}

pub fn gte(l: Expr, r: Expr) -> Expr {
    op2(BinaryOp::Gte, l, r)
}

pub fn sum1(name: &str, domain: DomainExpr, body: Expr) -> Expr {
    Expr::Sum(
        vec![GeneratorClause::new(name, domain)],
        Box::new(body),
    )
}

pub fn abs(e: Expr) -> Expr {
    Expr::App(BuiltinFn::Abs(Box::new(e)))
}

pub fn max2(a: Expr, b: Expr) -> Expr {
    Expr::App(BuiltinFn::Max(vec![a, b]))
}

pub fn min2(a: Expr, b: Expr) -> Expr {
    Expr::App(BuiltinFn::Min(vec![a, b]))
}

pub fn and2(a: Expr, b: Expr) -> Expr {
    Expr::App(BuiltinFn::And(vec![a, b]))
}

pub fn or2(a: Expr, b: Expr) -> Expr {
    Expr::App(BuiltinFn::Or(vec![a, b]))
}

/// `i in lo..hi`, end-exclusive
pub fn range(lo: f64, hi: f64) -> DomainExpr {
    DomainExpr::Range(num(lo), num(hi))
}

/// A numerically indexed variable id, e.g. `vid("x", &[1.0, 2.0])` for
/// `x[1,2]`.
pub fn vid(base: &str, indices: &[f64]) -> VariableId {
    VariableId::new(
        canonicalize(base),
        indices.iter().map(|&n| Scalar::from(n)).collect(),
    )
}

/// A string-indexed variable id, e.g. `vids("ship", &["paris"])`.
pub fn vids(base: &str, indices: &[&str]) -> VariableId {
    VariableId::new(
        canonicalize(base),
        indices.iter().map(|&s| Scalar::str(s)).collect(),
    )
}

/// A variable id with mixed index types.
pub fn vidx(base: &str, indices: &[Scalar]) -> VariableId {
    VariableId::new(canonicalize(base), indices.iter().cloned().collect())
}

/// Builder for whole problems.
pub struct TestProblem {
    spec: ProblemSpec,
}

impl TestProblem {
    pub fn new(name: &str) -> Self {
        TestProblem {
            spec: ProblemSpec::new(name, Direction::Minimize),
        }
    }

    pub fn maximize(mut self) -> Self {
        self.spec.direction = Direction::Maximize;
        self
    }

    pub fn param(mut self, name: &str, value: Value) -> Self {
        self.spec.parameters.push(Parameter::new(name, value));
        self
    }

    pub fn param_num(self, name: &str, value: f64) -> Self {
        self.param(name, Value::Number(value))
    }

    pub fn param_list(self, name: &str, values: &[f64]) -> Self {
        self.param(
            name,
            Value::List(values.iter().map(|&n| Value::Number(n)).collect()),
        )
    }

    pub fn param_strs(self, name: &str, values: &[&str]) -> Self {
        self.param(
            name,
            Value::List(values.iter().map(|&s| Value::Str(s.to_string())).collect()),
        )
    }

    pub fn param_map(self, name: &str, entries: &[(&str, f64)]) -> Self {
        self.param(
            name,
            Value::Map(
                entries
                    .iter()
                    .map(|&(k, v)| (k.to_string(), Value::Number(v)))
                    .collect(),
            ),
        )
    }

    fn family(
        mut self,
        name: &str,
        clauses: &[(&str, DomainExpr)],
        kind: VarKind,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        self.spec.variables.push(VariableFamily {
            name: name.to_string(),
            clauses: build_clauses(clauses),
            kind,
            min,
            max,
            documentation: String::new(),
        });
        self
    }

    pub fn continuous(self, name: &str, clauses: &[(&str, DomainExpr)]) -> Self {
        self.family(name, clauses, VarKind::Continuous, None, None)
    }

    pub fn bounded(
        self,
        name: &str,
        clauses: &[(&str, DomainExpr)],
        min: f64,
        max: f64,
    ) -> Self {
        self.family(name, clauses, VarKind::Continuous, Some(min), Some(max))
    }

    pub fn integer(self, name: &str, clauses: &[(&str, DomainExpr)]) -> Self {
        self.family(name, clauses, VarKind::Integer, None, None)
    }

    pub fn binary(self, name: &str, clauses: &[(&str, DomainExpr)]) -> Self {
        self.family(name, clauses, VarKind::Binary, None, None)
    }

    pub fn constraint(
        mut self,
        name_template: &str,
        clauses: &[(&str, DomainExpr)],
        body: Expr,
    ) -> Self {
        self.spec.constraints.push(ConstraintFamily {
            name_template: name_template.to_string(),
            clauses: build_clauses(clauses),
            body,
            documentation: String::new(),
        });
        self
    }

    pub fn objective(mut self, expr: Expr) -> Self {
        self.spec.objective = Some(expr);
        self
    }

    pub fn build_spec(&self) -> ProblemSpec {
        self.spec.clone()
    }

    pub fn compile(&self) -> Result<CompiledModel> {
        compile(&self.spec)
    }
}

fn build_clauses(clauses: &[(&str, DomainExpr)]) -> Vec<GeneratorClause> {
    clauses
        .iter()
        .map(|(name, domain)| GeneratorClause::new(name, domain.clone()))
        .collect()
}
