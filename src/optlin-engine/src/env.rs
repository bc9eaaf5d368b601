// Copyright 2022 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The binding environment: external parameters plus generator bindings.
//!
//! Environments are immutable values.  `extend` returns a new environment
//! sharing its tail with the old one, so threading them through nested
//! generator expansion is cheap and never mutates an enclosing scope.

use std::collections::HashMap;
use std::rc::Rc;

use lazy_static::lazy_static;

use crate::common::{Canonical, Ident, Result, Scalar, canonicalize};
use crate::compile_err;
use crate::datamodel::{Parameter, Value};

lazy_static! {
    static ref WELL_KNOWN: HashMap<&'static str, f64> = {
        let mut known = HashMap::new();
        known.insert("pi", std::f64::consts::PI);
        known.insert("infinity", f64::INFINITY);
        known
    };
}

#[derive(Clone, Debug)]
struct Binding {
    name: Ident<Canonical>,
    value: Value,
    parent: Option<Rc<Binding>>,
}

/// A layered, immutable map from names to values.
///
/// The base layer holds registered parameters and the well-known constants;
/// generator bindings stack on top of it.  Inner bindings shadow outer
/// bindings, but nothing ever shadows the base layer: that is a compile
/// error, not a quiet capture.
#[derive(Clone, Debug)]
pub struct Env {
    params: Rc<HashMap<Ident<Canonical>, Value>>,
    bindings: Option<Rc<Binding>>,
}

impl Env {
    /// Build the base environment from the external parameters, validating
    /// values and coercing map keys to their canonical form exactly once.
    pub fn new(parameters: &[Parameter]) -> Result<Env> {
        let mut params: HashMap<Ident<Canonical>, Value> = WELL_KNOWN
            .iter()
            .map(|(name, value)| (Ident::from_str_unchecked(name), Value::Number(*value)))
            .collect();

        for param in parameters {
            let name = canonicalize(&param.name);
            if name.as_str().is_empty() {
                return compile_err!(
                    BadParameterValue,
                    format!("parameter name {:?} is empty", param.name)
                );
            }
            let value = coerce_value(&param.name, &param.value)?;
            if params.insert(name, value).is_some() {
                return compile_err!(
                    ShadowedParameter,
                    format!("parameter '{}' is already bound", param.name)
                );
            }
        }

        Ok(Env {
            params: Rc::new(params),
            bindings: None,
        })
    }

    /// A new environment with one extra generator binding.  Generator
    /// bindings may shadow each other, but never a parameter or well-known
    /// constant.
    pub fn extend(&self, name: &Ident<Canonical>, value: Scalar) -> Result<Env> {
        if self.params.contains_key(name.as_str()) {
            return compile_err!(
                ShadowedParameter,
                format!("generator binding '{name}' would shadow a parameter")
            );
        }

        let value = match value {
            Scalar::Num(n) => Value::Number(n.0),
            Scalar::Str(s) => Value::Str(s),
        };
        let binding = Binding {
            name: name.clone(),
            value,
            parent: self.bindings.clone(),
        };

        Ok(Env {
            params: Rc::clone(&self.params),
            bindings: Some(Rc::new(binding)),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut next = self.bindings.as_deref();
        while let Some(binding) = next {
            if binding.name.as_str() == name {
                return Some(&binding.value);
            }
            next = binding.parent.as_deref();
        }
        self.params.get(name)
    }
}

/// Validate a parameter value: numbers must be finite, and map keys are
/// normalized so that later lookups hit them through `Scalar::as_key`
/// (`"2.0"` and `2` are the same key).
fn coerce_value(param: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Number(n) => {
            if !n.is_finite() {
                return compile_err!(
                    BadParameterValue,
                    format!("parameter '{param}' contains non-finite number {n}")
                );
            }
            Ok(Value::Number(*n))
        }
        Value::Str(s) => Ok(Value::Str(s.clone())),
        Value::List(items) => {
            let items: Result<Vec<Value>> =
                items.iter().map(|item| coerce_value(param, item)).collect();
            Ok(Value::List(items?))
        }
        Value::Map(entries) => {
            let mut coerced = std::collections::BTreeMap::new();
            for (key, entry) in entries {
                let key = match key.parse::<f64>() {
                    Ok(n) if n.is_finite() => Scalar::num(n).as_key(),
                    _ => key.clone(),
                };
                let entry = coerce_value(param, entry)?;
                if coerced.insert(key.clone(), entry).is_some() {
                    return compile_err!(
                        BadParameterValue,
                        format!("parameter '{param}' has colliding map key '{key}'")
                    );
                }
            }
            Ok(Value::Map(coerced))
        }
    }
}
