// Copyright 2022 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Domain evaluation and generator expansion.
//!
//! A generator clause binds a name over a finite domain; a clause list
//! expands to the cartesian product of its domains, first clause varying
//! slowest.  Expansion is eager: families are small by construction and an
//! eager `Vec<Env>` keeps ordering obvious and deterministic.

use crate::ast::{DomainExpr, Expr, GeneratorClause};
use crate::common::{Result, Scalar, canonicalize};
use crate::compile_err;
use crate::datamodel::Value;
use crate::env::Env;

/// Evaluate an expression down to a parameter-structure value.  This is
/// the ground half of the expression language: anything touching decision
/// variables has no value at compile time and errors here.
pub(crate) fn eval_value(expr: &Expr, env: &Env) -> Result<Value> {
    use crate::ast::{BinaryOp, UnaryOp};

    match expr {
        Expr::Const(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Var(name) => {
            let ident = canonicalize(name);
            match env.lookup(ident.as_str()) {
                Some(value) => Ok(value.clone()),
                None => compile_err!(UnboundName, format!("'{name}' is not bound")),
            }
        }
        Expr::Index(base, idx) => {
            let base_value = eval_value(base, env)?;
            let index = eval_scalar(idx, env)?;
            index_into(&base_value, &index)
        }
        Expr::Op1(op, e) => {
            let operand = eval_number(e, env)?;
            let result = match op {
                UnaryOp::Positive => operand,
                UnaryOp::Negative => -operand,
            };
            Ok(Value::Number(result))
        }
        Expr::Op2(op, l, r) => {
            if op.is_comparison() {
                return compile_err!(
                    MisplacedComparison,
                    format!("'{}' used as a value", crate::ast::print_expr(expr))
                );
            }
            let lhs = eval_number(l, env)?;
            let rhs = eval_number(r, env)?;
            let result = match op {
                BinaryOp::Add => lhs + rhs,
                BinaryOp::Sub => lhs - rhs,
                BinaryOp::Mul => lhs * rhs,
                BinaryOp::Div => {
                    if rhs == 0.0 {
                        return compile_err!(
                            DivisionByZero,
                            format!("'{}'", crate::ast::print_expr(expr))
                        );
                    }
                    lhs / rhs
                }
                BinaryOp::Eq | BinaryOp::Lte | BinaryOp::Gte => unreachable!(),
            };
            Ok(Value::Number(result))
        }
        Expr::Ref(_, _) | Expr::App(_) | Expr::Sum(_, _) => {
            compile_err!(
                UnresolvedIndex,
                format!(
                    "'{}' depends on decision variables",
                    crate::ast::print_expr(expr)
                )
            )
        }
    }
}

/// Evaluate an index expression to a concrete scalar
pub(crate) fn eval_scalar(expr: &Expr, env: &Env) -> Result<Scalar> {
    let value = eval_value(expr, env)?;
    match value.as_scalar() {
        Some(scalar) => Ok(scalar),
        None => compile_err!(
            UnresolvedIndex,
            format!(
                "'{}' resolves to a {}, not a scalar",
                crate::ast::print_expr(expr),
                value.type_name()
            )
        ),
    }
}

fn eval_number(expr: &Expr, env: &Env) -> Result<f64> {
    let value = eval_value(expr, env)?;
    match value {
        Value::Number(n) => Ok(n),
        other => compile_err!(
            ExpectedNumber,
            format!(
                "'{}' is a {}",
                crate::ast::print_expr(expr),
                other.type_name()
            )
        ),
    }
}

/// Index one level into a list (1-based, integral) or map (canonical key)
fn index_into(base: &Value, index: &Scalar) -> Result<Value> {
    match base {
        Value::List(items) => {
            let n = match index.as_f64() {
                Some(n) if n.fract() == 0.0 => n as i64,
                _ => {
                    return compile_err!(
                        DoesNotExist,
                        format!("'{index}' is not an integral list index")
                    );
                }
            };
            if n < 1 || n as usize > items.len() {
                return compile_err!(
                    DoesNotExist,
                    format!("list index {} out of range (len {})", n, items.len())
                );
            }
            Ok(items[n as usize - 1].clone())
        }
        Value::Map(entries) => match entries.get(&index.as_key()) {
            Some(value) => Ok(value.clone()),
            None => compile_err!(DoesNotExist, format!("no key '{index}' in map")),
        },
        Value::Number(_) | Value::Str(_) => {
            compile_err!(
                CantIndexScalar,
                format!("cannot index into a {}", base.type_name())
            )
        }
    }
}

/// Evaluate a domain expression to its finite, ordered element sequence
pub fn domain_values(domain: &DomainExpr, env: &Env) -> Result<Vec<Scalar>> {
    match domain {
        DomainExpr::Range(lo, hi) => {
            let lo = range_endpoint(lo, env)?;
            let hi = range_endpoint(hi, env)?;
            // end-exclusive: 1..4 is 1, 2, 3
            Ok((lo..hi).map(|n| Scalar::num(n as f64)).collect())
        }
        DomainExpr::Values(values) => {
            for value in values {
                if let Scalar::Num(n) = value
                    && !n.0.is_finite()
                {
                    return compile_err!(
                        InvalidDomain,
                        format!("non-finite domain element {}", n.0)
                    );
                }
            }
            Ok(values.clone())
        }
        DomainExpr::Expr(expr) => match eval_value(expr, env)? {
            Value::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in &items {
                    match item.as_scalar() {
                        Some(scalar) => values.push(scalar),
                        None => {
                            return compile_err!(
                                InvalidDomain,
                                format!(
                                    "domain list contains a {}, not a scalar",
                                    item.type_name()
                                )
                            );
                        }
                    }
                }
                Ok(values)
            }
            // a map contributes its keys, already in sorted order
            Value::Map(entries) => Ok(entries.keys().map(|k| Scalar::str(k)).collect()),
            other => compile_err!(
                InvalidDomain,
                format!(
                    "'{}' is a {}, not a finite domain",
                    crate::ast::print_expr(expr),
                    other.type_name()
                )
            ),
        },
    }
}

fn range_endpoint(expr: &Expr, env: &Env) -> Result<i64> {
    let scalar = eval_scalar(expr, env)?;
    match scalar.as_f64() {
        Some(n) if n.fract() == 0.0 && n.is_finite() => Ok(n as i64),
        _ => compile_err!(
            InvalidDomain,
            format!(
                "range endpoint '{}' is not an integer",
                crate::ast::print_expr(expr)
            )
        ),
    }
}

/// One point of a generator's cartesian product: the environment with all
/// clause bindings pushed, plus the bound values in clause order.  The
/// values are recorded positionally so a clause shadowed by a later one
/// with the same name still contributes its own value.
#[derive(Clone, Debug)]
pub struct Combination {
    pub env: Env,
    pub values: Vec<Scalar>,
}

/// Expand generator clauses into one environment per combination, in
/// c1-major order.  Later clause domains see earlier bindings.
pub fn expand(clauses: &[GeneratorClause], env: &Env) -> Result<Vec<Env>> {
    let combinations = expand_combinations(clauses, env)?;
    Ok(combinations.into_iter().map(|c| c.env).collect())
}

/// Like [expand], but also reports each combination's values in clause
/// order.  Variable materialization needs the values to mint indices.
pub fn expand_combinations(clauses: &[GeneratorClause], env: &Env) -> Result<Vec<Combination>> {
    let mut combinations = Vec::new();
    let mut values = Vec::with_capacity(clauses.len());
    expand_into(clauses, env, &mut values, &mut combinations)?;
    Ok(combinations)
}

fn expand_into(
    clauses: &[GeneratorClause],
    env: &Env,
    values: &mut Vec<Scalar>,
    out: &mut Vec<Combination>,
) -> Result<()> {
    let Some((clause, rest)) = clauses.split_first() else {
        out.push(Combination {
            env: env.clone(),
            values: values.clone(),
        });
        return Ok(());
    };

    let name = canonicalize(&clause.name);
    if name.as_str().is_empty() {
        return compile_err!(
            BadParameterValue,
            format!("generator binding name {:?} is empty", clause.name)
        );
    }

    for value in domain_values(&clause.domain, env)? {
        let child = env.extend(&name, value.clone())?;
        values.push(value);
        expand_into(rest, &child, values, out)?;
        values.pop();
    }
    Ok(())
}
