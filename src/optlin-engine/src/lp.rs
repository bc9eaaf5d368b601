// Copyright 2021 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Serialization of a model into LP format text.
//!
//! The emitted dialect sticks to what SCIP's reader accepts: an
//! objective whose quadratic part is bracketed and halved, `Subject To`
//! rows, explicit `Bounds` for every variable with infinite bounds
//! clamped to the `1e+20` sentinel, and a `General` section declaring
//! the integral variables.  Output is a pure function of the model, so
//! identical models serialize to identical bytes.

use std::collections::HashSet;

use crate::common::VariableId;
use crate::datamodel::{Direction, VarKind};
use crate::model::{Constraint, Model, VariableDecl};
use crate::names::{MAX_NAME_LEN, NameRegistry, sanitize_name};
use crate::polynomial::Polynomial;

/// bound magnitude the solver reads as infinite
pub const LP_INFINITY: f64 = 1e20;

#[derive(Clone, Copy, PartialEq, Eq)]
enum QuadStyle {
    /// objective convention: coefficients doubled inside `[ ... ] / 2`
    Halved,
    /// constraint convention: plain `[ ... ]`
    Plain,
}

/// Serialize the model.  The registry must cover every variable in the
/// model, which holds for any registry built from it.
pub(crate) fn write_lp(model: &Model, registry: &NameRegistry) -> String {
    let mut out = String::new();
    out.push_str(&format!("\\ {}\n", model.name()));

    out.push_str(match model.direction() {
        Direction::Minimize => "Minimize\n",
        Direction::Maximize => "Maximize\n",
    });
    out.push_str(" obj:");
    push_poly(&mut out, model.objective(), registry, QuadStyle::Halved, true);
    out.push('\n');

    out.push_str("Subject To\n");
    let mut used_row_names: HashSet<String> = HashSet::new();
    used_row_names.insert("obj".to_string());
    for row in model.constraints() {
        push_row(&mut out, row, registry, &mut used_row_names);
    }

    out.push_str("Bounds\n");
    for decl in model.variables() {
        push_bound(&mut out, decl, registry);
    }

    let integral: Vec<&VariableDecl> = model
        .variables()
        .iter()
        .filter(|decl| decl.kind != VarKind::Continuous)
        .collect();
    if !integral.is_empty() {
        out.push_str("General\n");
        for decl in integral {
            out.push_str(&format!(" {}\n", lp_name(registry, decl)));
        }
    }

    out.push_str("End\n");
    out
}

fn lp_name<'r>(registry: &'r NameRegistry, decl: &VariableDecl) -> &'r str {
    match registry.lp_name(&decl.id) {
        Some(name) => name,
        None => unreachable!("variable '{}' missing from the name registry", decl.id),
    }
}

fn push_row(out: &mut String, row: &Constraint, registry: &NameRegistry, used: &mut HashSet<String>) {
    let name = unique_row_name(&row.name, used);
    out.push_str(&format!(" {name}:"));
    push_poly(out, &row.lhs, registry, QuadStyle::Plain, false);
    out.push_str(&format!(" {} {}\n", row.op.as_str(), fmt_num(row.rhs)));
}

fn push_bound(out: &mut String, decl: &VariableDecl, registry: &NameRegistry) {
    let name = lp_name(registry, decl);
    if decl.kind == VarKind::Binary {
        out.push_str(&format!(" 0 <= {name} <= 1\n"));
        return;
    }

    let (min, max) = (decl.bounds.min, decl.bounds.max);
    if min == f64::NEG_INFINITY && max == f64::INFINITY {
        out.push_str(&format!(" {name} free\n"));
    } else if min == max {
        out.push_str(&format!(" {name} = {}\n", fmt_num(min)));
    } else if max == f64::INFINITY {
        out.push_str(&format!(" {name} >= {}\n", fmt_num(min)));
    } else {
        out.push_str(&format!(" {} <= {name} <= {}\n", fmt_num(min), fmt_num(max)));
    }
}

/// Append a polynomial as LP terms: linear terms, then the constant (in
/// objectives only), then the bracketed quadratic part.
fn push_poly(
    out: &mut String,
    poly: &Polynomial,
    registry: &NameRegistry,
    style: QuadStyle,
    with_constant: bool,
) {
    let mut first = true;

    for (monomial, coeff) in poly.terms() {
        let [id] = monomial.vars() else { continue };
        let Some(name) = registry.lp_name(id) else {
            unreachable!("variable '{id}' missing from the name registry");
        };
        push_term(out, &mut first, coeff, name);
    }

    if with_constant {
        let konst = poly.constant_term();
        if konst != 0.0 {
            push_term(out, &mut first, konst, "");
        }
    }

    let quads: Vec<(&[VariableId], f64)> = poly
        .terms()
        .filter(|(monomial, _)| monomial.degree() == 2)
        .map(|(monomial, coeff)| (monomial.vars(), coeff))
        .collect();
    if !quads.is_empty() {
        out.push_str(if first { " [" } else { " + [" });
        let mut quad_first = true;
        for (vars, coeff) in quads {
            let [a, b] = vars else {
                unreachable!("quadratic monomial with {} variables", vars.len())
            };
            let coeff = if style == QuadStyle::Halved { coeff * 2.0 } else { coeff };
            let body = if a == b {
                match registry.lp_name(a) {
                    Some(name) => format!("{name} ^ 2"),
                    None => unreachable!("variable '{a}' missing from the name registry"),
                }
            } else {
                match (registry.lp_name(a), registry.lp_name(b)) {
                    (Some(left), Some(right)) => format!("{left} * {right}"),
                    _ => unreachable!("quadratic variables missing from the name registry"),
                }
            };
            push_term(out, &mut quad_first, coeff, &body);
        }
        out.push_str(if style == QuadStyle::Halved { " ] / 2" } else { " ]" });
    }
}

fn push_term(out: &mut String, first: &mut bool, coeff: f64, body: &str) {
    let sign = if coeff < 0.0 { "-" } else { "+" };
    let magnitude = fmt_num(coeff.abs());
    if *first && sign == "+" {
        out.push_str(&format!(" {magnitude}"));
    } else {
        out.push_str(&format!(" {sign} {magnitude}"));
    }
    if !body.is_empty() {
        out.push_str(&format!(" {body}"));
    }
    *first = false;
}

fn unique_row_name(raw: &str, used: &mut HashSet<String>) -> String {
    let base = sanitize_name(raw);
    let mut name = base.clone();
    let mut n = 1;
    while !used.insert(name.clone()) {
        let stem = base.len().min(MAX_NAME_LEN - 8);
        name = format!("{}_{n}", &base[..stem]);
        n += 1;
    }
    name
}

fn fmt_num(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if v >= LP_INFINITY {
        return "1e+20".to_string();
    }
    if v <= -LP_INFINITY {
        return "-1e+20".to_string();
    }
    format!("{v}")
}

#[cfg(test)]
mod tests {
    use crate::test_common::{
        TestProblem, add, lte, mul, num, range, ref1, ref2, sum1, var,
    };

    #[test]
    fn small_model_serializes_exactly() {
        let compiled = TestProblem::new("demo")
            .bounded("x", &[("i", range(1.0, 3.0))], 0.0, 10.0)
            .constraint(
                "cap_{i}",
                &[("i", range(1.0, 3.0))],
                lte(ref1("x", var("i")), num(5.0)),
            )
            .objective(sum1("i", range(1.0, 3.0), ref1("x", var("i"))))
            .compile()
            .unwrap();

        let expected = "\\ demo\n\
                        Minimize\n \
                        obj: 1 x(1) + 1 x(2)\n\
                        Subject To\n \
                        cap_1: 1 x(1) <= 5\n \
                        cap_2: 1 x(2) <= 5\n\
                        Bounds\n \
                        0 <= x(1) <= 10\n \
                        0 <= x(2) <= 10\n\
                        End\n";
        assert_eq!(expected, compiled.to_lp_string());
    }

    #[test]
    fn integral_kinds_get_a_general_section() {
        let compiled = TestProblem::new("kinds")
            .binary("pick", &[("i", range(1.0, 3.0))])
            .integer("n", &[])
            .compile()
            .unwrap();

        let lp = compiled.to_lp_string();
        assert!(lp.contains("Bounds\n 0 <= pick(1) <= 1\n 0 <= pick(2) <= 1\n n free\n"));
        assert!(lp.ends_with("General\n pick(1)\n pick(2)\n n\nEnd\n"));
    }

    #[test]
    fn quadratic_objective_is_bracketed_and_halved() {
        // x*x + 2 x*y + 3 x
        let compiled = TestProblem::new("quad")
            .continuous("x", &[])
            .continuous("y", &[])
            .objective(add(
                add(
                    mul(var("x"), var("x")),
                    mul(num(2.0), mul(var("x"), var("y"))),
                ),
                mul(num(3.0), var("x")),
            ))
            .compile()
            .unwrap();

        let lp = compiled.to_lp_string();
        assert!(
            lp.contains(" obj: 3 x + [ 2 x ^ 2 + 4 x * y ] / 2\n"),
            "{lp}"
        );
    }

    #[test]
    fn quadratic_constraints_are_bracketed_plain() {
        let compiled = TestProblem::new("quadrow")
            .continuous("x", &[])
            .constraint("ball", &[], lte(mul(var("x"), var("x")), num(4.0)))
            .compile()
            .unwrap();

        let lp = compiled.to_lp_string();
        assert!(lp.contains(" ball: [ 1 x ^ 2 ] <= 4\n"), "{lp}");
    }

    #[test]
    fn infinite_bounds_use_the_sentinel() {
        let compiled = TestProblem::new("inf")
            .bounded("x", &[], f64::NEG_INFINITY, 5.0)
            .constraint("wide", &[], lte(var("x"), var("infinity")))
            .compile()
            .unwrap();

        let lp = compiled.to_lp_string();
        assert!(lp.contains(" wide: 1 x <= 1e+20\n"), "{lp}");
        assert!(lp.contains(" -1e+20 <= x <= 5\n"), "{lp}");
    }

    #[test]
    fn duplicate_row_names_get_suffixes() {
        let compiled = TestProblem::new("dup")
            .continuous("x", &[("i", range(1.0, 3.0))])
            .constraint(
                "row",
                &[("i", range(1.0, 3.0))],
                lte(ref1("x", var("i")), num(1.0)),
            )
            .compile()
            .unwrap();

        let lp = compiled.to_lp_string();
        assert!(lp.contains(" row: "), "{lp}");
        assert!(lp.contains(" row_1: "), "{lp}");
    }

    #[test]
    fn negative_terms_format_with_signs() {
        let compiled = TestProblem::new("neg")
            .continuous("x", &[("i", range(1.0, 3.0))])
            .constraint(
                "diff",
                &[],
                lte(
                    crate::test_common::sub(ref1("x", num(1.0)), ref1("x", num(2.0))),
                    num(-3.0),
                ),
            )
            .compile()
            .unwrap();

        let lp = compiled.to_lp_string();
        assert!(lp.contains(" diff: 1 x(1) - 1 x(2) <= -3\n"), "{lp}");
    }

    #[test]
    fn empty_objective_is_legal() {
        let compiled = TestProblem::new("noobj")
            .continuous("x", &[])
            .constraint("cap", &[], lte(var("x"), num(1.0)))
            .compile()
            .unwrap();

        let lp = compiled.to_lp_string();
        assert!(lp.contains("Minimize\n obj:\n"), "{lp}");
    }

    #[test]
    fn ref2_terms_serialize_with_both_indices() {
        let clauses = [("i", range(1.0, 3.0)), ("j", range(1.0, 3.0))];
        let compiled = TestProblem::new("grid")
            .continuous("x", &clauses)
            .constraint("pin", &[], lte(ref2("x", num(2.0), num(1.0)), num(1.0)))
            .compile()
            .unwrap();

        let lp = compiled.to_lp_string();
        assert!(lp.contains(" pin: 1 x(2,1) <= 1\n"), "{lp}");
    }
}
