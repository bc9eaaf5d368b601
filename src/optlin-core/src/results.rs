// Copyright 2021 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;
use std::fmt;

use crate::common::VariableId;

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Unknown,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unbounded => "unbounded",
            SolveStatus::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Variable assignments reported by a solver, keyed by the identity the
/// model was built with rather than the sanitized names that went over the
/// wire.
///
/// Solvers omit zero-valued variables from their solution output, so absent
/// entries read as 0.
#[derive(Clone, Debug)]
pub struct Solution {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    values: HashMap<VariableId, f64>,
}

impl Solution {
    pub fn new(status: SolveStatus, objective: Option<f64>, values: HashMap<VariableId, f64>) -> Self {
        Solution {
            status,
            objective,
            values,
        }
    }

    /// The assigned value, with absent variables reading as 0
    pub fn value(&self, id: &VariableId) -> f64 {
        self.values.get(id).copied().unwrap_or(0.0)
    }

    /// The assigned value, if the solver reported one
    pub fn get(&self, id: &VariableId) -> Option<f64> {
        self.values.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VariableId, f64)> {
        self.values.iter().map(|(id, v)| (id, *v))
    }

    pub fn print_tsv(&self) {
        let mut ids: Vec<&VariableId> = self.values.keys().collect();
        ids.sort();
        for id in ids {
            println!("{id}\t{}", self.values[id]);
        }
    }
}
