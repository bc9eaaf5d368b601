// Copyright 2022 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Exact reformulation of the nonlinear builtins into rows plus
//! auxiliary variables.
//!
//! Each application introduces one fresh auxiliary and a handful of rows
//! tying it to its operands, appended to the model immediately.  The
//! `abs`/`max` rows only force the aux to be at least its operands, and
//! the `min` rows at most; such one-sided auxes are sound only under
//! pressure toward their operands, which is checked at every place one
//! can be consumed: the objective direction
//! ([check_objective_soundness]), user rows
//! ([check_constraint_soundness]), and the encoding rows of an enclosing
//! primitive (`push_row`).  `and`/`or` over binary-valued operands are
//! exact in both directions.

use crate::ast::Expr;
use crate::builtins::BuiltinFn;
use crate::common::{Result, VariableId};
use crate::compiler::Compiler;
use crate::datamodel::{Direction, VarKind};
use crate::env::Env;
use crate::model::{AuxDirection, Bounds, Constraint, ConstraintOp, VariableDecl};
use crate::polynomial::Polynomial;
use crate::{compile_err, model_err};

impl Compiler<'_> {
    pub(crate) fn linearize_builtin(&mut self, builtin: &BuiltinFn, env: &Env) -> Result<Polynomial> {
        match builtin {
            BuiltinFn::Abs(operand) => {
                let poly = self.compile_expr(operand, env)?;
                self.linearize_abs(poly)
            }
            BuiltinFn::Max(args) => {
                let polys = self.compile_args("max", args, env)?;
                self.linearize_extremum("max", polys, ConstraintOp::Gte)
            }
            BuiltinFn::Min(args) => {
                let polys = self.compile_args("min", args, env)?;
                self.linearize_extremum("min", polys, ConstraintOp::Lte)
            }
            BuiltinFn::And(args) => {
                let polys = self.compile_args("and", args, env)?;
                self.linearize_conjunction(polys)
            }
            BuiltinFn::Or(args) => {
                let polys = self.compile_args("or", args, env)?;
                self.linearize_disjunction(polys)
            }
        }
    }

    fn compile_args(&mut self, prim: &str, args: &[Expr], env: &Env) -> Result<Vec<Polynomial>> {
        if args.is_empty() {
            return compile_err!(
                BadBuiltinArgs,
                format!("{prim}() needs at least one argument")
            );
        }
        args.iter().map(|arg| self.compile_expr(arg, env)).collect()
    }

    /// `a = abs(e)`: continuous `a >= 0` with `a >= e` and `a >= -e`.
    fn linearize_abs(&mut self, operand: Polynomial) -> Result<Polynomial> {
        let id = self.model.fresh_aux("abs");
        self.model.add_variable(VariableDecl {
            id: id.clone(),
            kind: VarKind::Continuous,
            bounds: Bounds::non_negative(),
            documentation: format!("abs({operand})"),
        })?;
        self.model.record_aux(id.clone(), AuxDirection::OverEstimate);

        let aux = Polynomial::var(id.clone());
        self.push_row(
            &id,
            format!("{id}⁚pos"),
            aux.clone() - operand.clone(),
            ConstraintOp::Gte,
        )?;
        self.push_row(&id, format!("{id}⁚neg"), aux.clone() + operand, ConstraintOp::Gte)?;
        Ok(aux)
    }

    /// `m = max(e1..en)` with `m >= ei` rows, or `m = min(e1..en)` with
    /// `m <= ei` rows; `m` is free.
    fn linearize_extremum(
        &mut self,
        prim: &str,
        operands: Vec<Polynomial>,
        op: ConstraintOp,
    ) -> Result<Polynomial> {
        let id = self.model.fresh_aux(prim);
        self.model.add_variable(VariableDecl {
            id: id.clone(),
            kind: VarKind::Continuous,
            bounds: Bounds::free(),
            documentation: format!("{prim} over {} operands", operands.len()),
        })?;
        let direction = if op == ConstraintOp::Gte {
            AuxDirection::OverEstimate
        } else {
            AuxDirection::UnderEstimate
        };
        self.model.record_aux(id.clone(), direction);

        let aux = Polynomial::var(id.clone());
        for (i, operand) in operands.into_iter().enumerate() {
            self.push_row(&id, format!("{id}⁚{i}"), aux.clone() - operand, op)?;
        }
        Ok(aux)
    }

    /// `y = and(b1..bn)` for binary-valued operands: binary `y` with
    /// `y <= bi` for each operand and `y >= sum(bi) - (n - 1)`.
    fn linearize_conjunction(&mut self, operands: Vec<Polynomial>) -> Result<Polynomial> {
        let id = self.model.fresh_aux("and");
        self.model.add_variable(VariableDecl {
            id: id.clone(),
            kind: VarKind::Binary,
            bounds: Bounds::binary(),
            documentation: format!("and over {} operands", operands.len()),
        })?;
        self.model.record_aux(id.clone(), AuxDirection::Exact);

        let aux = Polynomial::var(id.clone());
        let slack = Polynomial::constant((operands.len() - 1) as f64);
        let mut sum = Polynomial::zero();
        for (i, operand) in operands.into_iter().enumerate() {
            self.push_row(
                &id,
                format!("{id}⁚{i}"),
                aux.clone() - operand.clone(),
                ConstraintOp::Lte,
            )?;
            sum = sum + operand;
        }
        self.push_row(&id, format!("{id}⁚all"), aux.clone() - sum + slack, ConstraintOp::Gte)?;
        Ok(aux)
    }

    /// `y = or(b1..bn)` for binary-valued operands: binary `y` with
    /// `y >= bi` for each operand and `y <= sum(bi)`.
    fn linearize_disjunction(&mut self, operands: Vec<Polynomial>) -> Result<Polynomial> {
        let id = self.model.fresh_aux("or");
        self.model.add_variable(VariableDecl {
            id: id.clone(),
            kind: VarKind::Binary,
            bounds: Bounds::binary(),
            documentation: format!("or over {} operands", operands.len()),
        })?;
        self.model.record_aux(id.clone(), AuxDirection::Exact);

        let aux = Polynomial::var(id.clone());
        let mut sum = Polynomial::zero();
        for (i, operand) in operands.into_iter().enumerate() {
            self.push_row(
                &id,
                format!("{id}⁚{i}"),
                aux.clone() - operand.clone(),
                ConstraintOp::Gte,
            )?;
            sum = sum + operand;
        }
        self.push_row(&id, format!("{id}⁚any"), aux.clone() - sum, ConstraintOp::Lte)?;
        Ok(aux)
    }

    /// Append an encoding row for the aux `defined`.  The row is itself a
    /// consumer of any earlier aux appearing in the operand, and must not
    /// press a one-sided one off its operands.
    fn push_row(
        &mut self,
        defined: &VariableId,
        name: String,
        diff: Polynomial,
        op: ConstraintOp,
    ) -> Result<()> {
        let (lhs, konst) = diff.split_constant();
        for (id, direction) in self.model.aux_directions() {
            if id == defined || *direction == AuxDirection::Exact {
                continue;
            }
            if appears_nonlinearly(&lhs, id) || presses_open_side(&lhs, op, id, *direction) {
                return compile_err!(
                    UnsoundLinearization,
                    format!(
                        "'{id}' flows into '{defined}' on its open side, so the relaxation would not hold"
                    )
                );
            }
        }
        self.model.add_constraint(Constraint {
            name,
            documentation: String::new(),
            lhs,
            op,
            rhs: -konst,
        });
        Ok(())
    }
}

/// A one-sided auxiliary only takes its primitive's value when something
/// presses it against its operands.  In the objective that press is the
/// optimization direction: an over-estimator must be (effectively)
/// minimized, an under-estimator maximized.
pub(crate) fn check_objective_soundness(
    objective: &Polynomial,
    direction: Direction,
    auxes: &[(VariableId, AuxDirection)],
) -> Result<()> {
    for (id, aux_direction) in auxes {
        if *aux_direction == AuxDirection::Exact {
            continue;
        }
        if appears_nonlinearly(objective, id) {
            return model_err!(
                UnsoundLinearization,
                format!("'{id}' appears in a quadratic objective term, where its one-sided rows cannot pin it")
            );
        }
        let coeff = objective.linear_coefficient(id);
        if coeff == 0.0 {
            continue;
        }
        let pressed_down = match direction {
            Direction::Minimize => coeff > 0.0,
            Direction::Maximize => coeff < 0.0,
        };
        let wants_down = *aux_direction == AuxDirection::OverEstimate;
        if pressed_down != wants_down {
            return model_err!(
                UnsoundLinearization,
                format!("the objective pushes '{id}' away from its operands, so the relaxation would not hold")
            );
        }
    }
    Ok(())
}

/// In a constraint row the press comes from the comparison itself: an
/// over-estimator may only be bounded from above (`abs(e) <= c` works,
/// `abs(e) >= c` does not), an under-estimator only from below.
pub(crate) fn check_constraint_soundness(
    lhs: &Polynomial,
    op: ConstraintOp,
    auxes: &[(VariableId, AuxDirection)],
    name: &str,
) -> Result<()> {
    for (id, aux_direction) in auxes {
        if *aux_direction == AuxDirection::Exact {
            continue;
        }
        if appears_nonlinearly(lhs, id) {
            return compile_err!(
                UnsoundLinearization,
                format!("'{id}' appears in a quadratic term of '{name}', where its one-sided rows cannot pin it")
            );
        }
        if !presses_open_side(lhs, op, id, *aux_direction) {
            continue;
        }
        if op == ConstraintOp::Eq {
            return compile_err!(
                UnsoundLinearization,
                format!("'{name}' pins '{id}' with an equality, which its one-sided rows cannot guarantee")
            );
        }
        return compile_err!(
            UnsoundLinearization,
            format!("'{name}' bounds '{id}' on its open side; abs and max admit only upper bounds, min only lower")
        );
    }
    Ok(())
}

/// Whether a `lhs op rhs` row bounds the one-sided aux on its open side.
/// Equalities pin, which one-sided rows never guarantee.
fn presses_open_side(
    lhs: &Polynomial,
    op: ConstraintOp,
    id: &VariableId,
    direction: AuxDirection,
) -> bool {
    let coeff = lhs.linear_coefficient(id);
    if coeff == 0.0 {
        return false;
    }
    let le_coeff = match op {
        ConstraintOp::Lte => coeff,
        ConstraintOp::Gte => -coeff,
        ConstraintOp::Eq => return true,
    };
    let wants_upper_bound = direction == AuxDirection::OverEstimate;
    wants_upper_bound != (le_coeff > 0.0)
}

fn appears_nonlinearly(poly: &Polynomial, id: &VariableId) -> bool {
    poly.terms()
        .any(|(monomial, _)| monomial.degree() > 1 && monomial.vars().contains(id))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use float_cmp::approx_eq;

    use super::*;
    use crate::common::ErrorCode;
    use crate::datamodel::{ConstraintFamily, VariableFamily};
    use crate::env::Env;
    use crate::model::{Model, ModelBuilder};
    use crate::test_common::{abs, and2, lte, max2, min2, num, or2, sub, var};

    fn scalar_family(name: &str, kind: VarKind) -> VariableFamily {
        VariableFamily {
            name: name.to_string(),
            clauses: vec![],
            kind,
            min: None,
            max: None,
            documentation: String::new(),
        }
    }

    fn build_with_constraint(
        families: &[VariableFamily],
        body: Expr,
    ) -> crate::common::Result<Model> {
        let env = Env::new(&[])?;
        let mut b = ModelBuilder::new("t", Direction::Minimize, env);
        for family in families {
            b.declare_variable_family(family)?;
        }
        b.declare_constraint_family(&ConstraintFamily {
            name_template: "row".to_string(),
            clauses: vec![],
            body,
            documentation: String::new(),
        })?;
        Ok(b.build())
    }

    fn build_with_objective(
        families: &[VariableFamily],
        direction: Direction,
        objective: Expr,
    ) -> crate::common::Result<Model> {
        let env = Env::new(&[])?;
        let mut b = ModelBuilder::new("t", direction, env);
        for family in families {
            b.declare_variable_family(family)?;
        }
        b.set_objective(&objective)?;
        Ok(b.build())
    }

    fn row_holds(model: &Model, name: &str, values: &HashMap<VariableId, f64>) -> bool {
        let row = model
            .constraints()
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("no row {name}"));
        let lhs = row.lhs.evaluate(values);
        match row.op {
            ConstraintOp::Eq => approx_eq!(f64, lhs, row.rhs),
            ConstraintOp::Lte => lhs <= row.rhs || approx_eq!(f64, lhs, row.rhs),
            ConstraintOp::Gte => lhs >= row.rhs || approx_eq!(f64, lhs, row.rhs),
        }
    }

    #[test]
    fn abs_in_a_constraint_brackets_the_operand() {
        let mut x = scalar_family("x", VarKind::Continuous);
        x.min = Some(0.0);
        x.max = Some(10.0);
        // abs(x - 5) <= 2
        let model =
            build_with_constraint(&[x], lte(abs(sub(var("x"), num(5.0))), num(2.0))).unwrap();

        // one auxiliary next to x, three rows in total
        assert_eq!(2, model.variables().len());
        let aux = &model.variables()[1];
        assert_eq!("$⁚abs⁚0", aux.id.to_string());
        assert_eq!(Bounds::non_negative(), aux.bounds);
        assert_eq!(3, model.constraints().len());

        // projecting out the aux must leave exactly |x - 5| <= 2: set the
        // aux to its row-minimal value and see whether the user row holds
        let x_id = model.variables()[0].id.clone();
        for (x_val, feasible) in
            [(2.9_f64, false), (3.0, true), (5.0, true), (7.0, true), (7.1, false)]
        {
            let values: HashMap<VariableId, f64> =
                [(x_id.clone(), x_val), (aux.id.clone(), (x_val - 5.0).abs())]
                    .into_iter()
                    .collect();
            assert!(row_holds(&model, "$⁚abs⁚0⁚pos", &values));
            assert!(row_holds(&model, "$⁚abs⁚0⁚neg", &values));
            assert_eq!(feasible, row_holds(&model, "row", &values), "x = {x_val}");
        }
    }

    #[test]
    fn and_rows_force_the_conjunction() {
        let a = scalar_family("a", VarKind::Binary);
        let b = scalar_family("b", VarKind::Binary);
        let model =
            build_with_constraint(&[a, b], lte(and2(var("a"), var("b")), num(1.0))).unwrap();

        let a_id = model.variables()[0].id.clone();
        let b_id = model.variables()[1].id.clone();
        let y_id = model.variables()[2].id.clone();
        let rows = ["$⁚and⁚0⁚0", "$⁚and⁚0⁚1", "$⁚and⁚0⁚all"];

        for a_val in [0.0, 1.0] {
            for b_val in [0.0, 1.0] {
                let feasible_y: Vec<f64> = [0.0, 1.0]
                    .into_iter()
                    .filter(|&y| {
                        let values: HashMap<VariableId, f64> = [
                            (a_id.clone(), a_val),
                            (b_id.clone(), b_val),
                            (y_id.clone(), y),
                        ]
                        .into_iter()
                        .collect();
                        rows.iter().all(|row| row_holds(&model, row, &values))
                    })
                    .collect();
                let expected = if a_val == 1.0 && b_val == 1.0 { 1.0 } else { 0.0 };
                assert_eq!(vec![expected], feasible_y, "a={a_val} b={b_val}");
            }
        }
    }

    #[test]
    fn or_rows_force_the_disjunction() {
        let a = scalar_family("a", VarKind::Binary);
        let b = scalar_family("b", VarKind::Binary);
        let model =
            build_with_constraint(&[a, b], lte(or2(var("a"), var("b")), num(1.0))).unwrap();

        let a_id = model.variables()[0].id.clone();
        let b_id = model.variables()[1].id.clone();
        let y_id = model.variables()[2].id.clone();
        let rows = ["$⁚or⁚0⁚0", "$⁚or⁚0⁚1", "$⁚or⁚0⁚any"];

        for a_val in [0.0, 1.0] {
            for b_val in [0.0, 1.0] {
                let feasible_y: Vec<f64> = [0.0, 1.0]
                    .into_iter()
                    .filter(|&y| {
                        let values: HashMap<VariableId, f64> = [
                            (a_id.clone(), a_val),
                            (b_id.clone(), b_val),
                            (y_id.clone(), y),
                        ]
                        .into_iter()
                        .collect();
                        rows.iter().all(|row| row_holds(&model, row, &values))
                    })
                    .collect();
                let expected = if a_val == 1.0 || b_val == 1.0 { 1.0 } else { 0.0 };
                assert_eq!(vec![expected], feasible_y, "a={a_val} b={b_val}");
            }
        }
    }

    #[test]
    fn aux_numbering_is_monotonic() {
        let x = scalar_family("x", VarKind::Continuous);
        let body = lte(
            crate::test_common::add(abs(var("x")), abs(sub(var("x"), num(1.0)))),
            num(10.0),
        );
        let model = build_with_constraint(&[x], body).unwrap();
        let names: Vec<String> = model
            .variables()
            .iter()
            .skip(1)
            .map(|v| v.id.to_string())
            .collect();
        assert_eq!(vec!["$⁚abs⁚0", "$⁚abs⁚1"], names);
    }

    #[test]
    fn objective_direction_must_press_the_aux() {
        let x = scalar_family("x", VarKind::Continuous);
        let y = scalar_family("y", VarKind::Continuous);

        // minimizing abs and max is sound, maximizing is not
        let obj = abs(sub(var("x"), num(5.0)));
        assert!(build_with_objective(&[x.clone()], Direction::Minimize, obj.clone()).is_ok());
        let err = build_with_objective(&[x.clone()], Direction::Maximize, obj).unwrap_err();
        assert_eq!(ErrorCode::UnsoundLinearization, err.code);

        // a negated abs flips the effective pressure
        let obj = sub(num(0.0), abs(var("x")));
        let err = build_with_objective(&[x.clone()], Direction::Minimize, obj).unwrap_err();
        assert_eq!(ErrorCode::UnsoundLinearization, err.code);

        // min mirrors max
        let obj = min2(var("x"), var("y"));
        assert!(
            build_with_objective(&[x.clone(), y.clone()], Direction::Maximize, obj.clone())
                .is_ok()
        );
        let err = build_with_objective(&[x, y], Direction::Minimize, obj).unwrap_err();
        assert_eq!(ErrorCode::UnsoundLinearization, err.code);
    }

    #[test]
    fn constraints_may_only_close_the_open_side() {
        let x = scalar_family("x", VarKind::Continuous);
        let y = scalar_family("y", VarKind::Continuous);

        let families = [x, y];
        let ok = [
            lte(abs(var("x")), num(5.0)),
            crate::test_common::gte(min2(var("x"), var("y")), num(3.0)),
            lte(max2(var("x"), var("y")), num(3.0)),
        ];
        for body in ok {
            assert!(build_with_constraint(&families, body).is_ok());
        }

        let unsound = [
            crate::test_common::gte(abs(var("x")), num(5.0)),
            crate::test_common::eq(abs(var("x")), num(5.0)),
            lte(min2(var("x"), var("y")), num(3.0)),
            crate::test_common::gte(max2(var("x"), var("y")), num(3.0)),
        ];
        for body in unsound {
            let err = build_with_constraint(&families, body).unwrap_err();
            assert_eq!(ErrorCode::UnsoundLinearization, err.code);
        }
    }

    #[test]
    fn nesting_may_only_feed_the_closed_side() {
        let x = scalar_family("x", VarKind::Continuous);

        // the outer abs's neg row would reward inflating the inner aux,
        // so any feasible point relaxes the model
        let obj = abs(sub(abs(var("x")), num(3.0)));
        let err = build_with_objective(&[x.clone()], Direction::Minimize, obj).unwrap_err();
        assert_eq!(ErrorCode::UnsoundLinearization, err.code);

        // max consumes abs on its closed side
        let obj = max2(abs(var("x")), num(3.0));
        assert!(build_with_objective(&[x.clone()], Direction::Minimize, obj).is_ok());

        // min rows lower-bound the inner abs, its open side
        let body = lte(min2(abs(var("x")), num(5.0)), num(2.0));
        let err = build_with_constraint(&[x], body).unwrap_err();
        assert_eq!(ErrorCode::UnsoundLinearization, err.code);
    }

    #[test]
    fn empty_argument_lists_are_rejected() {
        let err = build_with_objective(
            &[],
            Direction::Minimize,
            Expr::App(crate::builtins::BuiltinFn::Max(vec![])),
        )
        .unwrap_err();
        assert_eq!(ErrorCode::BadBuiltinArgs, err.code);
    }
}
