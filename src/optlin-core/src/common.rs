// Copyright 2021 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::marker::PhantomData;
use std::{error, result};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,      // will never be produced
    DoesNotExist, // the named entity doesn't exist
    ExpectedNumber,
    ExpectedComparison,
    BadBuiltinArgs,
    UnboundName,
    InvalidDomain,
    UnresolvedIndex,
    UnknownVariableFamily,
    MismatchedIndices,
    CantIndexScalar,
    DegreeOverflow,
    DuplicateVariable,
    NonLinearObjective,
    ShadowedParameter,
    MisplacedComparison,
    NonConstantDivisor,
    DivisionByZero,
    BadParameterValue,
    BadTemplate,
    InfeasibleConstraint,
    UnsoundLinearization,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            ExpectedNumber => "expected_number",
            ExpectedComparison => "expected_comparison",
            BadBuiltinArgs => "bad_builtin_args",
            UnboundName => "unbound_name",
            InvalidDomain => "invalid_domain",
            UnresolvedIndex => "unresolved_index",
            UnknownVariableFamily => "unknown_variable_family",
            MismatchedIndices => "mismatched_indices",
            CantIndexScalar => "cant_index_scalar",
            DegreeOverflow => "degree_overflow",
            DuplicateVariable => "duplicate_variable",
            NonLinearObjective => "non_linear_objective",
            ShadowedParameter => "shadowed_parameter",
            MisplacedComparison => "misplaced_comparison",
            NonConstantDivisor => "non_constant_divisor",
            DivisionByZero => "division_by_zero",
            BadParameterValue => "bad_parameter_value",
            BadTemplate => "bad_template",
            InfeasibleConstraint => "infeasible_constraint",
            UnsoundLinearization => "unsound_linearization",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Model,
    Compilation,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl From<Box<dyn std::error::Error>> for Error {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        Error {
            kind: ErrorKind::Compilation,
            code: ErrorCode::Generic,
            details: Some(err.to_string()),
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }

    /// Wrap this error's details with additional context, e.g. the family
    /// and generator combination that triggered it.
    pub fn with_context(self, context: &str) -> Self {
        let details = match self.details {
            Some(details) => format!("{context}: {details}"),
            None => context.to_string(),
        };
        Error {
            kind: self.kind,
            code: self.code,
            details: Some(details),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Model => "ModelError",
            ErrorKind::Compilation => "CompilationError",
            ErrorKind::Variable => "VariableError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Marker type for canonical identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Canonical;

/// Marker type for raw (non-canonical) identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Raw;

/// An owned identifier with state tracking (canonical or raw).
///
/// Canonical form means lowercase with whitespace runs replaced by a single
/// underscore.  Family and parameter names are canonicalized exactly once, at
/// the edge where they enter the engine, and every internal lookup operates
/// on `Ident<Canonical>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident<State = Canonical> {
    inner: String,
    _phantom: PhantomData<State>,
}

impl Ident<Canonical> {
    /// Create a canonical identifier from a raw string
    pub fn from_raw(s: &str) -> Self {
        canonicalize(s)
    }

    /// Create from an already-canonicalized string
    ///
    /// Note: Caller must guarantee the string is already canonical
    pub fn from_unchecked(s: String) -> Self {
        Ident {
            inner: s,
            _phantom: PhantomData,
        }
    }

    /// Create from an already-canonicalized string slice
    ///
    /// Note: Caller must guarantee the string is already canonical
    pub fn from_str_unchecked(s: &str) -> Self {
        Ident {
            inner: s.to_string(),
            _phantom: PhantomData,
        }
    }

    /// Get the underlying canonical string
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Consume self and return the underlying String
    pub fn into_string(self) -> String {
        self.inner
    }
}

impl AsRef<str> for Ident<Canonical> {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

// Implement Borrow for HashMap lookups
impl std::borrow::Borrow<str> for Ident<Canonical> {
    fn borrow(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for Ident<Canonical> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

pub fn canonicalize(name: &str) -> Ident<Canonical> {
    // trim before walking so leading/trailing whitespace doesn't leave
    // stray underscores
    let name = name.trim();

    let mut canonicalized_name = String::with_capacity(name.len());
    let mut in_whitespace = false;

    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                canonicalized_name.push('_');
                in_whitespace = true;
            }
        } else {
            in_whitespace = false;
            for lc in c.to_lowercase() {
                canonicalized_name.push(lc);
            }
        }
    }

    Ident::from_unchecked(canonicalized_name)
}

#[test]
fn test_canonicalize() {
    assert_eq!("a_b", canonicalize("   a b").as_str());
    assert_eq!("å_b", canonicalize("Å\nb").as_str());
    assert_eq!("a_b", canonicalize("a \n b").as_str());
    assert_eq!("total_cost", canonicalize("Total Cost").as_str());
    assert_eq!("x", canonicalize("x").as_str());
    assert_eq!("", canonicalize("   ").as_str());
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Model,
        ErrorCode::DuplicateVariable,
        Some("x[1,2]".to_string()),
    );
    assert_eq!("ModelError{duplicate_variable: x[1,2]}", format!("{err}"));

    let err = Error::new(ErrorKind::Compilation, ErrorCode::UnboundName, None);
    assert_eq!("CompilationError{unbound_name}", format!("{err}"));
}

#[test]
fn test_error_with_context() {
    let err = Error::new(
        ErrorKind::Compilation,
        ErrorCode::UnboundName,
        Some("j".to_string()),
    );
    let err = err.with_context("constraint family 'rows', combination (i=2)");
    assert_eq!(
        "CompilationError{unbound_name: constraint family 'rows', combination (i=2): j}",
        format!("{err}")
    );
}

/// A concrete index value: the result of evaluating a generator binding or
/// an index expression down to ground.
///
/// Numbers are wrapped in `OrderedFloat` so scalars are `Eq + Hash + Ord`
/// and can key maps and sort deterministically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Num(OrderedFloat<f64>),
    Str(String),
}

impl Scalar {
    pub fn num(v: f64) -> Self {
        Scalar::Num(OrderedFloat(v))
    }

    pub fn str(s: &str) -> Self {
        Scalar::Str(s.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Num(n) => Some(n.0),
            Scalar::Str(_) => None,
        }
    }

    /// The canonical key form used for map lookups and name templates.
    /// Integral numbers render without a fractional part (`2`, not `2.0`),
    /// which is also what `Display` produces.
    pub fn as_key(&self) -> String {
        format!("{self}")
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::num(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::num(v as f64)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::str(s)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Num(n) => write!(f, "{}", n.0),
            Scalar::Str(s) => write!(f, "{s}"),
        }
    }
}

/// The identity of a materialized decision variable: a family base name
/// plus the concrete index tuple it was instantiated with.
///
/// The derived total order (base name, then indices) is what makes
/// polynomial terms and serialized output deterministic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId {
    base: Ident<Canonical>,
    indices: SmallVec<[Scalar; 2]>,
}

impl VariableId {
    pub fn new(base: Ident<Canonical>, indices: SmallVec<[Scalar; 2]>) -> Self {
        VariableId { base, indices }
    }

    /// An unindexed (scalar) variable
    pub fn scalar(base: Ident<Canonical>) -> Self {
        VariableId {
            base,
            indices: SmallVec::new(),
        }
    }

    pub fn base(&self) -> &Ident<Canonical> {
        &self.base
    }

    pub fn indices(&self) -> &[Scalar] {
        &self.indices
    }

    pub fn arity(&self) -> usize {
        self.indices.len()
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.indices.is_empty() {
            return write!(f, "{}", self.base);
        }
        write!(f, "{}[", self.base)?;
        for (i, idx) in self.indices.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{idx}")?;
        }
        write!(f, "]")
    }
}

#[test]
fn test_scalar_display() {
    assert_eq!("2", format!("{}", Scalar::num(2.0)));
    assert_eq!("2.5", format!("{}", Scalar::num(2.5)));
    assert_eq!("-3", format!("{}", Scalar::num(-3.0)));
    assert_eq!("north", format!("{}", Scalar::str("north")));
    assert_eq!("2", Scalar::num(2.0).as_key());
}

#[test]
fn test_scalar_ordering() {
    let mut vals = vec![Scalar::str("b"), Scalar::num(2.0), Scalar::num(1.0)];
    vals.sort();
    assert_eq!(
        vec![Scalar::num(1.0), Scalar::num(2.0), Scalar::str("b")],
        vals
    );
}

#[test]
fn test_variable_id_display() {
    use smallvec::smallvec;

    let x = VariableId::scalar(canonicalize("x"));
    assert_eq!("x", format!("{x}"));

    let xij = VariableId::new(
        canonicalize("x"),
        smallvec![Scalar::num(1.0), Scalar::num(2.0)],
    );
    assert_eq!("x[1,2]", format!("{xij}"));

    let route = VariableId::new(
        canonicalize("ship"),
        smallvec![Scalar::str("paris"), Scalar::num(3.0)],
    );
    assert_eq!("ship[paris,3]", format!("{route}"));
}

#[test]
fn test_variable_id_ordering() {
    use smallvec::smallvec;

    let a1 = VariableId::new(canonicalize("a"), smallvec![Scalar::num(1.0)]);
    let a2 = VariableId::new(canonicalize("a"), smallvec![Scalar::num(2.0)]);
    let b1 = VariableId::new(canonicalize("b"), smallvec![Scalar::num(1.0)]);

    let mut ids = vec![b1.clone(), a2.clone(), a1.clone()];
    ids.sort();
    assert_eq!(vec![a1, a2, b1], ids);
}
