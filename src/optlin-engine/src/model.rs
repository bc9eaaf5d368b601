// Copyright 2021 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The materialized optimization model and its builder.
//!
//! A [Model] is the fully expanded form of a problem: every variable
//! family turned into concrete [VariableDecl]s, every constraint family
//! into concrete [Constraint] rows, and the objective lowered to a single
//! polynomial.  [ModelBuilder] drives that pipeline in declaration order,
//! so two builds of the same input produce identical models.

use std::collections::HashMap;

use crate::ast::{Expr, print_expr};
use crate::common::{Canonical, Ident, Result, Scalar, VariableId, canonicalize};
use crate::compiler::Compiler;
use crate::datamodel::{self, Direction, Value, VarKind};
use crate::env::Env;
use crate::generators::expand_combinations;
use crate::linearize;
use crate::polynomial::Polynomial;
use crate::{compile_err, model_err, var_err};

/// Inclusive variable bounds; unbounded sides are the IEEE infinities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn free() -> Self {
        Bounds {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn non_negative() -> Self {
        Bounds {
            min: 0.0,
            max: f64::INFINITY,
        }
    }

    pub fn binary() -> Self {
        Bounds { min: 0.0, max: 1.0 }
    }
}

/// A single concrete decision variable.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableDecl {
    pub id: VariableId,
    pub kind: VarKind,
    pub bounds: Bounds,
    /// human-readable note, empty when the family had none
    pub documentation: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintOp {
    Eq,
    Lte,
    Gte,
}

impl ConstraintOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintOp::Eq => "=",
            ConstraintOp::Lte => "<=",
            ConstraintOp::Gte => ">=",
        }
    }
}

/// A normalized constraint row: all variable terms on the left, a single
/// constant on the right.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub name: String,
    /// human-readable note, empty when the family had none
    pub documentation: String,
    pub lhs: Polynomial,
    pub op: ConstraintOp,
    pub rhs: f64,
}

/// Which way a linearized builtin's auxiliary variable is one-sided.
///
/// `abs` and `max` introduce over-estimators (the rows only force the aux
/// to be at least its operand), `min` an under-estimator; `and`/`or` over
/// binary operands are exact.  A one-sided aux is sound only where the
/// surrounding comparison or the optimization direction closes the open
/// side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AuxDirection {
    OverEstimate,
    UnderEstimate,
    Exact,
}

/// Bookkeeping for one declared variable family.
#[derive(Clone, Debug)]
pub(crate) struct FamilyInfo {
    pub(crate) arity: usize,
    /// members in materialization order
    pub(crate) members: Vec<VariableId>,
}

#[derive(Clone, Debug)]
pub struct Model {
    name: String,
    direction: Direction,
    variables: Vec<VariableDecl>,
    var_index: HashMap<VariableId, usize>,
    families: HashMap<Ident<Canonical>, FamilyInfo>,
    constraints: Vec<Constraint>,
    objective: Polynomial,
    aux_directions: Vec<(VariableId, AuxDirection)>,
    n_aux: u32,
}

impl Model {
    fn new(name: String, direction: Direction) -> Self {
        Model {
            name,
            direction,
            variables: Vec::new(),
            var_index: HashMap::new(),
            families: HashMap::new(),
            constraints: Vec::new(),
            objective: Polynomial::zero(),
            aux_directions: Vec::new(),
            n_aux: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// All variables in materialization order, auxiliaries included.
    pub fn variables(&self) -> &[VariableDecl] {
        &self.variables
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &Polynomial {
        &self.objective
    }

    pub fn variable(&self, id: &VariableId) -> Option<&VariableDecl> {
        self.var_index.get(id).map(|&i| &self.variables[i])
    }

    pub(crate) fn family(&self, name: &Ident<Canonical>) -> Option<&FamilyInfo> {
        self.families.get(name)
    }

    pub(crate) fn add_variable(&mut self, decl: VariableDecl) -> Result<()> {
        if self.var_index.contains_key(&decl.id) {
            return var_err!(
                DuplicateVariable,
                format!("variable '{}' is declared twice", decl.id)
            );
        }
        self.var_index.insert(decl.id.clone(), self.variables.len());
        self.variables.push(decl);
        Ok(())
    }

    pub(crate) fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Mint a fresh auxiliary variable id.  The `$⁚` prefix cannot come
    /// out of `canonicalize`, so auxiliaries never collide with user
    /// families.
    pub(crate) fn fresh_aux(&mut self, prim: &str) -> VariableId {
        let id = VariableId::scalar(Ident::from_unchecked(format!("$⁚{}⁚{}", prim, self.n_aux)));
        self.n_aux += 1;
        id
    }

    pub(crate) fn record_aux(&mut self, id: VariableId, direction: AuxDirection) {
        self.aux_directions.push((id, direction));
    }

    pub(crate) fn aux_directions(&self) -> &[(VariableId, AuxDirection)] {
        &self.aux_directions
    }
}

/// Builds a [Model] from parameter bindings and family declarations.
///
/// Families are materialized eagerly as they are declared: variable
/// families first, then constraint families (whose bodies may reference
/// any previously declared variables), then the objective.
pub struct ModelBuilder {
    model: Model,
    env: Env,
}

impl ModelBuilder {
    pub fn new(name: &str, direction: Direction, env: Env) -> ModelBuilder {
        ModelBuilder {
            model: Model::new(name.to_string(), direction),
            env,
        }
    }

    /// Expand a variable family's generator clauses and declare one
    /// variable per combination.
    pub fn declare_variable_family(&mut self, family: &datamodel::VariableFamily) -> Result<()> {
        let base = canonicalize(&family.name);
        if base.as_str().is_empty() {
            return var_err!(
                BadParameterValue,
                format!("variable family name {:?} is empty", family.name)
            );
        }
        if self.model.families.contains_key(&base) {
            return var_err!(
                DuplicateVariable,
                format!("variable family '{base}' is declared twice")
            );
        }

        let bounds = family_bounds(family)?;
        let clause_names: Vec<Ident<Canonical>> = family
            .clauses
            .iter()
            .map(|clause| canonicalize(&clause.name))
            .collect();
        let combos = expand_combinations(&family.clauses, &self.env)
            .map_err(|err| err.with_context(&format!("variable family '{}'", family.name)))?;

        let mut members = Vec::with_capacity(combos.len());
        for combo in &combos {
            let id = VariableId::new(base.clone(), combo.values.iter().cloned().collect());
            let documentation = if family.documentation.is_empty() {
                String::new()
            } else {
                let context = combination_context(
                    "variable family",
                    &family.name,
                    &clause_names,
                    &combo.values,
                );
                instantiate_template(&family.documentation, &combo.env)
                    .map_err(|err| err.with_context(&context))?
            };
            self.model.add_variable(VariableDecl {
                id: id.clone(),
                kind: family.kind,
                bounds,
                documentation,
            })?;
            members.push(id);
        }

        self.model.families.insert(
            base,
            FamilyInfo {
                arity: family.clauses.len(),
                members,
            },
        );
        Ok(())
    }

    /// Expand a constraint family's generator clauses and compile one
    /// constraint row per combination.
    pub fn declare_constraint_family(&mut self, family: &datamodel::ConstraintFamily) -> Result<()> {
        let clause_names: Vec<Ident<Canonical>> = family
            .clauses
            .iter()
            .map(|clause| canonicalize(&clause.name))
            .collect();
        let combos = expand_combinations(&family.clauses, &self.env)
            .map_err(|err| err.with_context(&format!("constraint '{}'", family.name_template)))?;

        for combo in &combos {
            let context =
                combination_context("constraint", &family.name_template, &clause_names, &combo.values);
            let name = instantiate_template(&family.name_template, &combo.env)
                .map_err(|err| err.with_context(&context))?;
            let documentation = if family.documentation.is_empty() {
                String::new()
            } else {
                instantiate_template(&family.documentation, &combo.env)
                    .map_err(|err| err.with_context(&context))?
            };
            let constraint = Compiler::new(&mut self.model)
                .compile_constraint(&name, documentation, &family.body, &combo.env)
                .map_err(|err| err.with_context(&context))?;
            // rows that folded to a constant truth drop out here
            if let Some(constraint) = constraint {
                self.model.add_constraint(constraint);
            }
        }
        Ok(())
    }

    /// Compile the objective expression and check that every one-sided
    /// auxiliary it touches is pushed toward its operand.
    pub fn set_objective(&mut self, expr: &Expr) -> Result<()> {
        if let Expr::Op2(op, _, _) = expr {
            if op.is_comparison() {
                return model_err!(
                    NonLinearObjective,
                    format!(
                        "objective '{}' is a comparison, not an expression",
                        print_expr(expr)
                    )
                );
            }
        }

        let objective = Compiler::new(&mut self.model)
            .compile_expr(expr, &self.env)
            .map_err(|err| err.with_context("objective"))?;
        linearize::check_objective_soundness(
            &objective,
            self.model.direction,
            self.model.aux_directions(),
        )?;
        self.model.objective = objective;
        Ok(())
    }

    pub fn build(self) -> Model {
        self.model
    }
}

fn family_bounds(family: &datamodel::VariableFamily) -> Result<Bounds> {
    // kind overrides any stated bounds for binaries
    if family.kind == VarKind::Binary {
        return Ok(Bounds::binary());
    }

    let min = family.min.unwrap_or(f64::NEG_INFINITY);
    let max = family.max.unwrap_or(f64::INFINITY);
    if min.is_nan() || max.is_nan() {
        return var_err!(
            BadParameterValue,
            format!("bounds for family '{}' are NaN", family.name)
        );
    }
    if min > max {
        return var_err!(
            BadParameterValue,
            format!("family '{}' has min {min} above max {max}", family.name)
        );
    }
    Ok(Bounds { min, max })
}

/// Substitute `{name}` placeholders with the bound scalar's display form.
/// Only simple names are allowed inside braces.
fn instantiate_template(template: &str, env: &Env) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return compile_err!(BadTemplate, format!("unclosed '{{' in {template:?}"));
        };
        let raw = &after[..end];
        let name = canonicalize(raw);
        if name.as_str().is_empty() {
            return compile_err!(BadTemplate, format!("empty placeholder in {template:?}"));
        }
        match env.lookup(name.as_str()) {
            Some(Value::Number(n)) => out.push_str(&Scalar::from(*n).as_key()),
            Some(Value::Str(s)) => out.push_str(s),
            Some(other) => {
                return compile_err!(
                    BadTemplate,
                    format!(
                        "placeholder '{{{raw}}}' is a {}, not a scalar",
                        other.type_name()
                    )
                );
            }
            None => {
                return compile_err!(
                    UnboundName,
                    format!("nothing named '{raw}' for placeholder in {template:?}")
                );
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Error context naming the family and, once expansion has begun, the
/// generator combination being materialized.
fn combination_context(
    what: &str,
    name: &str,
    clause_names: &[Ident<Canonical>],
    values: &[Scalar],
) -> String {
    if values.is_empty() {
        return format!("{what} '{name}'");
    }
    let bindings: Vec<String> = clause_names
        .iter()
        .zip(values)
        .map(|(clause, value)| format!("{clause}={value}"))
        .collect();
    format!("{what} '{name}' [{}]", bindings.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DomainExpr, GeneratorClause};
    use crate::common::ErrorCode;
    use crate::datamodel::{ConstraintFamily, Parameter, VariableFamily};
    use crate::test_common::{lte, num, ref1, var};

    fn range(lo: f64, hi: f64) -> DomainExpr {
        DomainExpr::Range(num(lo), num(hi))
    }

    fn builder(params: &[Parameter]) -> ModelBuilder {
        let env = Env::new(params).unwrap();
        ModelBuilder::new("test", Direction::Minimize, env)
    }

    fn family(name: &str, clauses: Vec<GeneratorClause>) -> VariableFamily {
        VariableFamily {
            name: name.to_string(),
            clauses,
            kind: VarKind::Continuous,
            min: None,
            max: None,
            documentation: String::new(),
        }
    }

    #[test]
    fn variables_materialize_in_declaration_order() {
        let mut b = builder(&[]);
        b.declare_variable_family(&family(
            "x",
            vec![
                GeneratorClause::new("i", range(1.0, 3.0)),
                GeneratorClause::new("j", range(1.0, 3.0)),
            ],
        ))
        .unwrap();

        let model = b.build();
        let ids: Vec<String> = model
            .variables()
            .iter()
            .map(|v| v.id.to_string())
            .collect();
        assert_eq!(vec!["x[1,1]", "x[1,2]", "x[2,1]", "x[2,2]"], ids);
        assert_eq!(Bounds::free(), model.variables()[0].bounds);
    }

    #[test]
    fn duplicate_family_is_rejected() {
        let mut b = builder(&[]);
        b.declare_variable_family(&family("x", vec![])).unwrap();
        let err = b.declare_variable_family(&family("X ", vec![])).unwrap_err();
        assert_eq!(ErrorCode::DuplicateVariable, err.code);
    }

    #[test]
    fn binary_kind_overrides_stated_bounds() {
        let mut b = builder(&[]);
        let mut fam = family("pick", vec![GeneratorClause::new("i", range(1.0, 4.0))]);
        fam.kind = VarKind::Binary;
        fam.min = Some(-5.0);
        fam.max = Some(100.0);
        b.declare_variable_family(&fam).unwrap();
        let model = b.build();
        assert_eq!(Bounds::binary(), model.variables()[0].bounds);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut b = builder(&[]);
        let mut fam = family("x", vec![]);
        fam.min = Some(3.0);
        fam.max = Some(1.0);
        let err = b.declare_variable_family(&fam).unwrap_err();
        assert_eq!(ErrorCode::BadParameterValue, err.code);
    }

    #[test]
    fn template_substitution() {
        let env = Env::new(&[]).unwrap();
        let env = env.extend(&canonicalize("i"), Scalar::from(2.0)).unwrap();
        let env = env
            .extend(&canonicalize("city"), Scalar::str("paris"))
            .unwrap();

        assert_eq!(
            "cap_2_paris",
            instantiate_template("cap_{i}_{city}", &env).unwrap()
        );
        assert_eq!("plain", instantiate_template("plain", &env).unwrap());
    }

    #[test]
    fn template_errors() {
        let env = Env::new(&[Parameter::new(
            "cost",
            Value::List(vec![Value::Number(1.0)]),
        )])
        .unwrap();

        let err = instantiate_template("bad_{i", &env).unwrap_err();
        assert_eq!(ErrorCode::BadTemplate, err.code);

        let err = instantiate_template("bad_{}", &env).unwrap_err();
        assert_eq!(ErrorCode::BadTemplate, err.code);

        let err = instantiate_template("bad_{nope}", &env).unwrap_err();
        assert_eq!(ErrorCode::UnboundName, err.code);

        let err = instantiate_template("bad_{cost}", &env).unwrap_err();
        assert_eq!(ErrorCode::BadTemplate, err.code);
    }

    #[test]
    fn constraints_materialize_per_combination() {
        let mut b = builder(&[]);
        b.declare_variable_family(&family(
            "x",
            vec![GeneratorClause::new("i", range(1.0, 3.0))],
        ))
        .unwrap();
        b.declare_constraint_family(&ConstraintFamily {
            name_template: "row_{i}".to_string(),
            clauses: vec![GeneratorClause::new("i", range(1.0, 3.0))],
            body: lte(ref1("x", var("i")), num(10.0)),
            documentation: String::new(),
        })
        .unwrap();

        let model = b.build();
        let names: Vec<&str> = model.constraints().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(vec!["row_1", "row_2"], names);

        let row = &model.constraints()[0];
        assert_eq!(ConstraintOp::Lte, row.op);
        assert_eq!(10.0, row.rhs);
        assert_eq!(
            1.0,
            row.lhs
                .linear_coefficient(&VariableId::new(canonicalize("x"), [Scalar::from(1.0)].into_iter().collect()))
        );
    }

    #[test]
    fn constraint_errors_name_the_combination() {
        let mut b = builder(&[]);
        let err = b
            .declare_constraint_family(&ConstraintFamily {
                name_template: "row_{i}".to_string(),
                clauses: vec![GeneratorClause::new("i", range(1.0, 2.0))],
                body: lte(ref1("y", var("i")), num(10.0)),
                documentation: String::new(),
            })
            .unwrap_err();
        assert_eq!(ErrorCode::UnknownVariableFamily, err.code);
        let details = err.get_details().unwrap();
        assert!(details.contains("row_{i}"), "{details}");
        assert!(details.contains("i=1"), "{details}");
    }

    #[test]
    fn objective_comparison_is_rejected() {
        let mut b = builder(&[]);
        let err = b.set_objective(&lte(num(1.0), num(2.0))).unwrap_err();
        assert_eq!(ErrorCode::NonLinearObjective, err.code);
    }

    #[test]
    fn constant_rows_fold_at_compile_time() {
        let mut b = builder(&[]);
        b.declare_constraint_family(&ConstraintFamily {
            name_template: "ok".to_string(),
            clauses: vec![],
            body: lte(num(1.0), num(2.0)),
            documentation: String::new(),
        })
        .unwrap();
        let err = b
            .declare_constraint_family(&ConstraintFamily {
                name_template: "bad".to_string(),
                clauses: vec![],
                body: lte(num(2.0), num(1.0)),
                documentation: String::new(),
            })
            .unwrap_err();
        assert_eq!(ErrorCode::InfeasibleConstraint, err.code);

        let model = b.build();
        assert!(model.constraints().is_empty());
    }

    #[test]
    fn documentation_substitutes_per_combination() {
        let mut b = builder(&[]);
        let mut fam = family("ship", vec![GeneratorClause::new("i", range(1.0, 3.0))]);
        fam.documentation = "units shipped on day {i}".to_string();
        b.declare_variable_family(&fam).unwrap();
        b.declare_constraint_family(&ConstraintFamily {
            name_template: "cap_{i}".to_string(),
            clauses: vec![GeneratorClause::new("i", range(1.0, 3.0))],
            body: lte(ref1("ship", var("i")), num(10.0)),
            documentation: "daily capacity for day {i}".to_string(),
        })
        .unwrap();

        let model = b.build();
        let docs: Vec<&str> = model
            .variables()
            .iter()
            .map(|v| v.documentation.as_str())
            .collect();
        assert_eq!(
            vec!["units shipped on day 1", "units shipped on day 2"],
            docs
        );
        assert_eq!(
            "daily capacity for day 2",
            model.constraints()[1].documentation
        );
    }

    #[test]
    fn bad_documentation_placeholder_is_an_error() {
        let mut b = builder(&[]);
        let mut fam = family("x", vec![]);
        fam.documentation = "scales with {nope}".to_string();
        let err = b.declare_variable_family(&fam).unwrap_err();
        assert_eq!(ErrorCode::UnboundName, err.code);
    }

    #[test]
    fn family_documentation_errors_name_the_combination() {
        let mut b = builder(&[]);
        let mut fam = family("x", vec![GeneratorClause::new("i", range(1.0, 3.0))]);
        fam.documentation = "scales with {nope}".to_string();
        let err = b.declare_variable_family(&fam).unwrap_err();
        assert_eq!(ErrorCode::UnboundName, err.code);
        let details = err.get_details().unwrap();
        assert!(details.contains("variable family 'x'"), "{details}");
        assert!(details.contains("i=1"), "{details}");
    }
}
