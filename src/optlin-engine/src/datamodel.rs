// Copyright 2022 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The declarative problem description the engine compiles.
//!
//! Everything here is plain data: a `ProblemSpec` is what a caller (or a
//! JSON document) hands us, and compilation never mutates it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ast::{Expr, GeneratorClause};
use crate::common::{Error, ErrorCode, ErrorKind, Result, Scalar};

/// An external parameter value: a scalar, or finite nested structure of
/// scalars reachable by chained indexing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Number(n) => Some(Scalar::num(*n)),
            Value::Str(s) => Some(Scalar::str(s)),
            Value::List(_) | Value::Map(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
}

impl Parameter {
    pub fn new(name: &str, value: Value) -> Self {
        Parameter {
            name: name.to_string(),
            value,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Continuous,
    Integer,
    Binary,
}

impl Default for VarKind {
    fn default() -> Self {
        VarKind::Continuous
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Minimize
    }
}

/// A template producing one decision variable per generator combination.
/// A family with no clauses is a single scalar variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableFamily {
    pub name: String,
    #[serde(default)]
    pub clauses: Vec<GeneratorClause>,
    #[serde(default)]
    pub kind: VarKind,
    /// None means unbounded below
    #[serde(default)]
    pub min: Option<f64>,
    /// None means unbounded above
    #[serde(default)]
    pub max: Option<f64>,
    /// human-readable note; `{binding}` placeholders are substituted per
    /// member
    #[serde(default)]
    pub documentation: String,
}

/// A template producing one constraint per generator combination.  The
/// instantiated name comes from `name_template` with `{binding}`
/// placeholders substituted textually, and `documentation` is treated the
/// same way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintFamily {
    pub name_template: String,
    #[serde(default)]
    pub clauses: Vec<GeneratorClause>,
    pub body: Expr,
    #[serde(default)]
    pub documentation: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProblemSpec {
    pub name: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub variables: Vec<VariableFamily>,
    #[serde(default)]
    pub constraints: Vec<ConstraintFamily>,
    #[serde(default)]
    pub objective: Option<Expr>,
}

impl ProblemSpec {
    pub fn new(name: &str, direction: Direction) -> Self {
        ProblemSpec {
            name: name.to_string(),
            direction,
            parameters: vec![],
            variables: vec![],
            constraints: vec![],
            objective: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| Error::new(ErrorKind::Model, ErrorCode::Generic, Some(err.to_string())))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| Error::new(ErrorKind::Model, ErrorCode::Generic, Some(err.to_string())))
    }
}
