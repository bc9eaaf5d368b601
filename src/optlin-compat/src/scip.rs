// Copyright 2022 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Driving SCIP as a child process and reading its solution files.
//!
//! A solution file is line oriented: a `solution status:` line, an
//! `objective value:` line, then one `name value` row per nonzero
//! variable (SCIP appends an `(obj:…)` note we ignore).  Names are the
//! sanitized LP spellings, so rows resolve back to [VariableId]s through
//! the model's [NameRegistry].

use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead};
use std::path::Path;
use std::process::Command;

use optlin_core::VariableId;
use optlin_engine::{NameRegistry, Solution, SolveStatus};

pub type SolverResult<T> = std::result::Result<T, SolverError>;

/// A failure while driving the solver process or reading its output.
/// Deliberately a different type from the modeling [engine::Error];
/// nothing here means the model was wrong.
///
/// [engine::Error]: optlin_engine::Error
#[derive(Debug)]
pub enum SolverError {
    /// the solver binary could not be started
    Spawn(String, io::Error),
    /// the solver ran but exited uncleanly
    Failed(String),
    /// scratch files could not be written or read
    Io(io::Error),
    /// a solution file line does not follow the expected format
    BadSolutionFile(usize, String),
    /// the solution names a variable the registry has no id for
    UnknownVariable(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Spawn(program, err) => {
                write!(f, "could not start solver '{program}': {err}")
            }
            SolverError::Failed(detail) => write!(f, "solver failed: {detail}"),
            SolverError::Io(err) => write!(f, "solver scratch file: {err}"),
            SolverError::BadSolutionFile(line, detail) => {
                write!(f, "solution file line {line}: {detail}")
            }
            SolverError::UnknownVariable(name) => {
                write!(f, "solution names unknown variable '{name}'")
            }
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SolverError::Spawn(_, err) | SolverError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Run the solver batch-style: read the LP, optimize, write the
/// solution file, quit.
pub(crate) fn run(program: &str, lp: &Path, sol: &Path) -> SolverResult<()> {
    let output = Command::new(program)
        .arg("-c")
        .arg(format!("read {}", lp.display()))
        .arg("-c")
        .arg("optimize")
        .arg("-c")
        .arg(format!("write solution {}", sol.display()))
        .arg("-c")
        .arg("quit")
        .output()
        .map_err(|err| SolverError::Spawn(program.to_string(), err))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SolverError::Failed(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

/// Parse a SCIP solution file, resolving each row's name through the
/// registry.  Variables the solver left out read as 0 in the returned
/// [Solution].
pub fn parse_solution(
    reader: &mut dyn BufRead,
    registry: &NameRegistry,
) -> SolverResult<Solution> {
    let mut status = SolveStatus::Unknown;
    let mut objective = None;
    let mut values: HashMap<VariableId, f64> = HashMap::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(SolverError::Io)?;
        let line = line.trim();
        if line.is_empty() || line == "no solution available" {
            continue;
        }

        if let Some(rest) = line.strip_prefix("solution status:") {
            status = parse_status(rest.trim());
            continue;
        }

        if let Some(rest) = line.strip_prefix("objective value:") {
            let rest = rest.trim();
            let value = rest.parse::<f64>().map_err(|_| {
                SolverError::BadSolutionFile(i + 1, format!("bad objective value '{rest}'"))
            })?;
            objective = Some(value);
            continue;
        }

        // "name value" with an optional "(obj:…)" trailer
        let mut fields = line.split_whitespace();
        let (Some(name), Some(field)) = (fields.next(), fields.next()) else {
            return Err(SolverError::BadSolutionFile(
                i + 1,
                format!("unrecognized line '{line}'"),
            ));
        };
        let value = field.parse::<f64>().map_err(|_| {
            SolverError::BadSolutionFile(i + 1, format!("bad value '{field}' for '{name}'"))
        })?;
        let Some(id) = registry.variable_id(name) else {
            return Err(SolverError::UnknownVariable(name.to_string()));
        };
        values.insert(id.clone(), value);
    }

    Ok(Solution::new(status, objective, values))
}

fn parse_status(status: &str) -> SolveStatus {
    // "infeasible or unbounded" is genuinely undecided
    if status.contains("infeasible or unbounded") {
        SolveStatus::Unknown
    } else if status.contains("optimal") {
        SolveStatus::Optimal
    } else if status.contains("infeasible") {
        SolveStatus::Infeasible
    } else if status.contains("unbounded") {
        SolveStatus::Unbounded
    } else {
        SolveStatus::Unknown
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;

    use float_cmp::approx_eq;
    use optlin_engine::CompiledModel;
    use optlin_engine::test_common::{TestProblem, range, ref1, sum1, var, vid};

    use super::*;

    fn compiled_xs() -> CompiledModel {
        TestProblem::new("t")
            .continuous("x", &[("i", range(1.0, 4.0))])
            .objective(sum1("i", range(1.0, 4.0), ref1("x", var("i"))))
            .compile()
            .unwrap()
    }

    #[test]
    fn optimal_solution_round_trips() {
        let compiled = compiled_xs();
        let text = "solution status: optimal solution found\n\
                    objective value:                     12.5\n\
                    x(1)                                  7 \t(obj:1)\n\
                    x(3)                                  5.5 \t(obj:1)\n";
        let solution =
            parse_solution(&mut BufReader::new(text.as_bytes()), compiled.registry()).unwrap();

        assert_eq!(SolveStatus::Optimal, solution.status);
        assert!(approx_eq!(f64, 12.5, solution.objective.unwrap()));
        assert!(approx_eq!(f64, 7.0, solution.value(&vid("x", &[1.0]))));
        assert!(approx_eq!(f64, 5.5, solution.value(&vid("x", &[3.0]))));
        // omitted from the file, reads as zero
        assert_eq!(0.0, solution.value(&vid("x", &[2.0])));
        assert_eq!(None, solution.get(&vid("x", &[2.0])));
    }

    #[test]
    fn infeasible_files_have_no_values() {
        let compiled = compiled_xs();
        let text = "solution status: infeasible\nno solution available\n";
        let solution =
            parse_solution(&mut BufReader::new(text.as_bytes()), compiled.registry()).unwrap();

        assert_eq!(SolveStatus::Infeasible, solution.status);
        assert_eq!(None, solution.objective);
        assert!(solution.is_empty());
    }

    #[test]
    fn status_strings() {
        assert_eq!(
            SolveStatus::Optimal,
            parse_status("optimal solution found")
        );
        assert_eq!(SolveStatus::Infeasible, parse_status("infeasible"));
        assert_eq!(SolveStatus::Unbounded, parse_status("unbounded"));
        assert_eq!(SolveStatus::Unknown, parse_status("infeasible or unbounded"));
        assert_eq!(
            SolveStatus::Unknown,
            parse_status("solving was interrupted [time limit reached]")
        );
    }

    #[test]
    fn exponent_values_parse() {
        let compiled = compiled_xs();
        let text = "solution status: optimal solution found\n\
                    objective value:                     1.4e2\n\
                    x(2)                                  1.4e2 \t(obj:1)\n";
        let solution =
            parse_solution(&mut BufReader::new(text.as_bytes()), compiled.registry()).unwrap();
        assert!(approx_eq!(f64, 140.0, solution.value(&vid("x", &[2.0]))));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let compiled = compiled_xs();

        let err = parse_solution(
            &mut BufReader::new("objective value: twelve\n".as_bytes()),
            compiled.registry(),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::BadSolutionFile(1, _)));

        let err = parse_solution(
            &mut BufReader::new("x(1) seven\n".as_bytes()),
            compiled.registry(),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::BadSolutionFile(1, _)));

        let err = parse_solution(
            &mut BufReader::new("y(1) 7\n".as_bytes()),
            compiled.registry(),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::UnknownVariable(name) if name == "y(1)"));
    }
}
