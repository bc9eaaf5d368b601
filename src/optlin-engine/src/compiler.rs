// Copyright 2021 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Lowering expressions to polynomials over concrete decision variables.
//!
//! The compiler walks an expression with a binding environment in hand;
//! anything it can evaluate to a number folds into coefficients, and
//! variable references become polynomial terms.  Comparison operators
//! never appear inside expressions: a constraint body is a single
//! comparison at the top, normalized here into `lhs op rhs` with all
//! variable terms on the left.

use smallvec::SmallVec;

use crate::ast::{BinaryOp, Expr, IndexExpr, UnaryOp, print_expr};
use crate::common::{Result, Scalar, VariableId, canonicalize};
use crate::compile_err;
use crate::datamodel::Value;
use crate::env::Env;
use crate::generators::{eval_scalar, eval_value, expand};
use crate::linearize;
use crate::model::{Constraint, ConstraintOp, Model};
use crate::polynomial::Polynomial;

pub(crate) struct Compiler<'a> {
    pub(crate) model: &'a mut Model,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(model: &'a mut Model) -> Compiler<'a> {
        Compiler { model }
    }

    /// Lower an expression to a polynomial over the model's variables.
    pub(crate) fn compile_expr(&mut self, expr: &Expr, env: &Env) -> Result<Polynomial> {
        match expr {
            Expr::Const(n) => Ok(Polynomial::constant(*n)),
            Expr::Str(_) => compile_err!(
                ExpectedNumber,
                format!("string literal {} in numeric position", print_expr(expr))
            ),
            Expr::Var(name) => self.compile_name(name, env),
            Expr::Index(_, _) => match eval_value(expr, env)? {
                Value::Number(n) => Ok(Polynomial::constant(n)),
                other => compile_err!(
                    ExpectedNumber,
                    format!(
                        "'{}' is a {}, not a number",
                        print_expr(expr),
                        other.type_name()
                    )
                ),
            },
            Expr::Ref(family, indices) => self.compile_ref(family, indices, env),
            Expr::Op1(op, operand) => {
                let poly = self.compile_expr(operand, env)?;
                Ok(match op {
                    UnaryOp::Positive => poly,
                    UnaryOp::Negative => -poly,
                })
            }
            Expr::Op2(op, left, right) => self.compile_op2(*op, left, right, env),
            Expr::App(builtin) => self.linearize_builtin(builtin, env),
            Expr::Sum(clauses, body) => {
                let mut total = Polynomial::zero();
                for child in expand(clauses, env)? {
                    total = total + self.compile_expr(body, &child)?;
                }
                Ok(total)
            }
        }
    }

    /// A bare name is a binding or parameter; as a convenience a bare
    /// name also resolves to a scalar (unindexed) variable family.
    fn compile_name(&mut self, name: &str, env: &Env) -> Result<Polynomial> {
        let ident = canonicalize(name);
        if let Some(value) = env.lookup(ident.as_str()) {
            return match value {
                Value::Number(n) => Ok(Polynomial::constant(*n)),
                other => compile_err!(
                    ExpectedNumber,
                    format!("'{name}' is a {}, not a number", other.type_name())
                ),
            };
        }
        if let Some(info) = self.model.family(&ident) {
            if info.arity == 0 {
                return Ok(Polynomial::var(VariableId::scalar(ident)));
            }
            return compile_err!(
                MismatchedIndices,
                format!(
                    "variable family '{ident}' needs {} indices, reference has none",
                    info.arity
                )
            );
        }
        compile_err!(UnboundName, format!("nothing named '{name}' in scope"))
    }

    fn compile_ref(&mut self, family: &str, indices: &[IndexExpr], env: &Env) -> Result<Polynomial> {
        let base = canonicalize(family);
        let Some(info) = self.model.family(&base) else {
            return compile_err!(
                UnknownVariableFamily,
                format!("no variable family named '{family}'")
            );
        };
        if indices.len() != info.arity {
            return compile_err!(
                MismatchedIndices,
                format!(
                    "family '{base}' has {} indices, reference has {}",
                    info.arity,
                    indices.len()
                )
            );
        }

        let mut resolved: SmallVec<[Option<Scalar>; 2]> = SmallVec::with_capacity(indices.len());
        for index in indices {
            match index {
                IndexExpr::Wildcard => resolved.push(None),
                IndexExpr::Expr(expr) => resolved.push(Some(eval_scalar(expr, env)?)),
            }
        }

        if resolved.iter().all(|slot| slot.is_some()) {
            let values: SmallVec<[Scalar; 2]> = resolved.into_iter().flatten().collect();
            let id = VariableId::new(base.clone(), values);
            if self.model.variable(&id).is_none() {
                return compile_err!(
                    DoesNotExist,
                    format!("no variable '{id}' in family '{base}'")
                );
            }
            return Ok(Polynomial::var(id));
        }

        // wildcard positions sum over every member whose fixed positions
        // match
        let mut total = Polynomial::zero();
        for member in &info.members {
            let matches = member
                .indices()
                .iter()
                .zip(&resolved)
                .all(|(have, want)| want.as_ref().is_none_or(|w| w == have));
            if matches {
                total = total + Polynomial::var(member.clone());
            }
        }
        Ok(total)
    }

    fn compile_op2(&mut self, op: BinaryOp, left: &Expr, right: &Expr, env: &Env) -> Result<Polynomial> {
        if op.is_comparison() {
            return compile_err!(
                MisplacedComparison,
                format!("comparison '{}' nested inside an expression", op.as_str())
            );
        }

        let lhs = self.compile_expr(left, env)?;
        let rhs = self.compile_expr(right, env)?;
        match op {
            BinaryOp::Add => Ok(lhs + rhs),
            BinaryOp::Sub => Ok(lhs - rhs),
            BinaryOp::Mul => lhs.checked_mul(&rhs),
            BinaryOp::Div => {
                let Some(divisor) = rhs.constant_value() else {
                    return compile_err!(
                        NonConstantDivisor,
                        format!("cannot divide by '{}'", print_expr(right))
                    );
                };
                if divisor == 0.0 {
                    return compile_err!(
                        DivisionByZero,
                        format!("divisor '{}' is zero", print_expr(right))
                    );
                }
                Ok(lhs.scale(1.0 / divisor))
            }
            BinaryOp::Eq | BinaryOp::Lte | BinaryOp::Gte => unreachable!(),
        }
    }

    /// Compile a comparison into a normalized constraint row.  Rows that
    /// fold to a constant are decided immediately: trivially true rows
    /// return None, trivially false ones fail.
    pub(crate) fn compile_constraint(
        &mut self,
        name: &str,
        documentation: String,
        body: &Expr,
        env: &Env,
    ) -> Result<Option<Constraint>> {
        let Expr::Op2(op, left, right) = body else {
            return compile_err!(
                ExpectedComparison,
                format!("constraint body '{}' is not a comparison", print_expr(body))
            );
        };
        let op = match op {
            BinaryOp::Eq => ConstraintOp::Eq,
            BinaryOp::Lte => ConstraintOp::Lte,
            BinaryOp::Gte => ConstraintOp::Gte,
            _ => {
                return compile_err!(
                    ExpectedComparison,
                    format!("constraint body '{}' is not a comparison", print_expr(body))
                );
            }
        };

        let lhs = self.compile_expr(left, env)?;
        let rhs = self.compile_expr(right, env)?;
        let (vars, konst) = (lhs - rhs).split_constant();

        if vars.is_zero() {
            let holds = match op {
                ConstraintOp::Eq => konst == 0.0,
                ConstraintOp::Lte => konst <= 0.0,
                ConstraintOp::Gte => konst >= 0.0,
            };
            if !holds {
                return compile_err!(
                    InfeasibleConstraint,
                    format!("'{}' can never hold", print_expr(body))
                );
            }
            return Ok(None);
        }

        linearize::check_constraint_soundness(&vars, op, self.model.aux_directions(), name)?;

        Ok(Some(Constraint {
            name: name.to_string(),
            documentation,
            lhs: vars,
            op,
            rhs: -konst,
        }))
    }
}
