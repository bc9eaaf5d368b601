// Copyright 2022 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Everything that leaves the process: writing LP text to disk, running
//! a solver over it, and mapping the solution file back onto the model.

use std::env;
use std::fs;
use std::io::BufReader;

pub use optlin_engine::{self as engine, CompiledModel, Solution, SolveStatus};

pub mod scip;

pub use scip::{SolverError, SolverResult, parse_solution};

const DEFAULT_SOLVER: &str = "scip";

/// The solver binary to invoke, `scip` unless `OPTLIN_SOLVER` points
/// somewhere else.
pub fn solver_program() -> String {
    env::var("OPTLIN_SOLVER").unwrap_or_else(|_| DEFAULT_SOLVER.to_string())
}

/// Solve a compiled model out of process and read the solution back
/// through its name registry.
pub fn solve(compiled: &CompiledModel) -> SolverResult<Solution> {
    solve_with(compiled, &solver_program())
}

/// Like [solve], with an explicit solver binary.  The LP and solution
/// files live in a scratch directory that is cleaned up on return.
pub fn solve_with(compiled: &CompiledModel, program: &str) -> SolverResult<Solution> {
    let dir = tempfile::tempdir().map_err(SolverError::Io)?;
    let lp_path = dir.path().join("model.lp");
    let sol_path = dir.path().join("model.sol");

    fs::write(&lp_path, compiled.to_lp_string()).map_err(SolverError::Io)?;
    scip::run(program, &lp_path, &sol_path)?;

    let file = fs::File::open(&sol_path).map_err(SolverError::Io)?;
    parse_solution(&mut BufReader::new(file), compiled.registry())
}
