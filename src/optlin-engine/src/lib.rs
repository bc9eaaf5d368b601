// Copyright 2021 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod ast;
mod builtins;
pub mod common;
mod compiler;
pub mod datamodel;
mod env;
mod generators;
mod linearize;
mod lp;
mod model;
mod names;
mod polynomial;
pub mod test_common;

pub use optlin_core::{Solution, SolveStatus};

pub use self::builtins::BuiltinFn;
pub use self::common::{
    Error, ErrorCode, ErrorKind, Ident, Result, Scalar, VariableId, canonicalize,
};
pub use self::env::Env;
pub use self::lp::LP_INFINITY;
pub use self::model::{Bounds, Constraint, ConstraintOp, Model, ModelBuilder, VariableDecl};
pub use self::names::NameRegistry;
pub use self::polynomial::{Monomial, Polynomial};

/// A fully materialized model together with the solver-facing names of
/// its variables.
#[derive(Clone, Debug)]
pub struct CompiledModel {
    model: Model,
    registry: NameRegistry,
}

impl CompiledModel {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    /// Serialize the model in CPLEX LP format.
    pub fn to_lp_string(&self) -> String {
        lp::write_lp(&self.model, &self.registry)
    }
}

/// Compile a problem specification into a concrete model: register
/// parameters, materialize variable then constraint families, compile
/// the objective, and assign solver-safe names to every variable.
pub fn compile(spec: &datamodel::ProblemSpec) -> Result<CompiledModel> {
    let env = Env::new(&spec.parameters)?;
    let mut builder = ModelBuilder::new(&spec.name, spec.direction, env);
    for family in spec.variables.iter() {
        builder.declare_variable_family(family)?;
    }
    for family in spec.constraints.iter() {
        builder.declare_constraint_family(family)?;
    }
    if let Some(objective) = &spec.objective {
        builder.set_objective(objective)?;
    }
    let model = builder.build();
    let registry = NameRegistry::new(&model);
    Ok(CompiledModel { model, registry })
}
