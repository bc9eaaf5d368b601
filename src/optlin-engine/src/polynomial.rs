// Copyright 2022 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Sparse polynomials over decision variables, degree at most 2.
//!
//! Representations are canonical: terms live in a `BTreeMap` keyed by
//! `Monomial` (so iteration order is total and deterministic), monomial
//! variable lists are sorted (so `x*y` and `y*x` are the same key), and
//! zero coefficients are pruned on every operation.  Structural equality is
//! therefore semantic equality.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use smallvec::SmallVec;

use crate::common::{Result, VariableId};
use crate::compile_err;

const COEFF_EPSILON: f64 = 1e-12;

pub(crate) const MAX_DEGREE: usize = 2;

/// A product of at most `MAX_DEGREE` variables.  The empty product is the
/// constant term.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Monomial(SmallVec<[VariableId; 2]>);

impl Monomial {
    pub fn one() -> Self {
        Monomial(SmallVec::new())
    }

    pub fn var(id: VariableId) -> Self {
        let mut vars = SmallVec::new();
        vars.push(id);
        Monomial(vars)
    }

    pub fn degree(&self) -> usize {
        self.0.len()
    }

    pub fn vars(&self) -> &[VariableId] {
        &self.0
    }

    /// The product of two monomials, or None past the degree cap
    pub fn checked_mul(&self, other: &Monomial) -> Option<Monomial> {
        if self.degree() + other.degree() > MAX_DEGREE {
            return None;
        }
        let mut vars: SmallVec<[VariableId; 2]> = self.0.clone();
        vars.extend(other.0.iter().cloned());
        vars.sort();
        Some(Monomial(vars))
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "1");
        }
        for (i, var) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "*")?;
            }
            write!(f, "{var}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Polynomial {
    terms: BTreeMap<Monomial, f64>,
}

impl Polynomial {
    pub fn zero() -> Self {
        Polynomial {
            terms: BTreeMap::new(),
        }
    }

    pub fn constant(c: f64) -> Self {
        let mut poly = Polynomial::zero();
        poly.add_term(Monomial::one(), c);
        poly
    }

    pub fn var(id: VariableId) -> Self {
        let mut poly = Polynomial::zero();
        poly.add_term(Monomial::var(id), 1.0);
        poly
    }

    pub(crate) fn add_term(&mut self, monomial: Monomial, coeff: f64) {
        use std::collections::btree_map::Entry;

        match self.terms.entry(monomial) {
            Entry::Occupied(mut entry) => {
                let updated = entry.get() + coeff;
                if updated.abs() <= COEFF_EPSILON {
                    entry.remove();
                } else {
                    entry.insert(updated);
                }
            }
            Entry::Vacant(entry) => {
                if coeff.abs() > COEFF_EPSILON {
                    entry.insert(coeff);
                }
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty() || (self.terms.len() == 1 && self.terms.contains_key(&Monomial::one()))
    }

    /// Some(value) iff this polynomial has no variable terms
    pub fn constant_value(&self) -> Option<f64> {
        if !self.is_constant() {
            return None;
        }
        Some(self.constant_term())
    }

    /// The coefficient of the empty monomial
    pub fn constant_term(&self) -> f64 {
        self.coefficient(&Monomial::one())
    }

    pub fn coefficient(&self, monomial: &Monomial) -> f64 {
        self.terms.get(monomial).copied().unwrap_or(0.0)
    }

    /// The coefficient of a single variable's linear term
    pub fn linear_coefficient(&self, id: &VariableId) -> f64 {
        self.coefficient(&Monomial::var(id.clone()))
    }

    pub fn degree(&self) -> usize {
        self.terms.keys().map(|m| m.degree()).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms in canonical (sorted) order
    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, f64)> {
        self.terms.iter().map(|(m, c)| (m, *c))
    }

    /// Every variable appearing in any term, in canonical order
    pub fn variables(&self) -> impl Iterator<Item = &VariableId> {
        self.terms.keys().flat_map(|m| m.vars().iter())
    }

    pub(crate) fn add_scaled(&mut self, other: &Polynomial, scale: f64) {
        for (monomial, coeff) in other.terms.iter() {
            self.add_term(monomial.clone(), coeff * scale);
        }
    }

    pub fn scale(&self, k: f64) -> Polynomial {
        let mut result = Polynomial::zero();
        result.add_scaled(self, k);
        result
    }

    pub fn checked_mul(&self, other: &Polynomial) -> Result<Polynomial> {
        let mut result = Polynomial::zero();
        for (m1, c1) in self.terms.iter() {
            for (m2, c2) in other.terms.iter() {
                match m1.checked_mul(m2) {
                    Some(monomial) => result.add_term(monomial, c1 * c2),
                    None => {
                        return compile_err!(
                            DegreeOverflow,
                            format!("'{m1} * {m2}' exceeds degree {MAX_DEGREE}")
                        );
                    }
                }
            }
        }
        Ok(result)
    }

    /// Split into (variable terms, constant term); used to normalize
    /// constraints so variables sit on the left and the constant on the
    /// right.
    pub fn split_constant(&self) -> (Polynomial, f64) {
        let mut vars = self.clone();
        let konst = vars.terms.remove(&Monomial::one()).unwrap_or(0.0);
        (vars, konst)
    }

    /// Evaluate at a point; absent variables read as 0
    pub fn evaluate(&self, values: &HashMap<VariableId, f64>) -> f64 {
        self.terms
            .iter()
            .map(|(monomial, coeff)| {
                let product: f64 = monomial
                    .vars()
                    .iter()
                    .map(|id| values.get(id).copied().unwrap_or(0.0))
                    .product();
                coeff * product
            })
            .sum()
    }
}

impl Add for Polynomial {
    type Output = Polynomial;

    fn add(mut self, rhs: Polynomial) -> Polynomial {
        self.add_scaled(&rhs, 1.0);
        self
    }
}

impl Sub for Polynomial {
    type Output = Polynomial;

    fn sub(mut self, rhs: Polynomial) -> Polynomial {
        self.add_scaled(&rhs, -1.0);
        self
    }
}

impl Neg for Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        self.scale(-1.0)
    }
}

impl Mul<f64> for Polynomial {
    type Output = Polynomial;

    fn mul(self, k: f64) -> Polynomial {
        self.scale(k)
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        for (i, (monomial, coeff)) in self.terms.iter().enumerate() {
            let coeff = if i == 0 {
                if *coeff < 0.0 {
                    write!(f, "-")?;
                }
                coeff.abs()
            } else {
                write!(f, "{}", if *coeff < 0.0 { " - " } else { " + " })?;
                coeff.abs()
            };
            if monomial.degree() == 0 {
                write!(f, "{coeff}")?;
            } else if coeff == 1.0 {
                write!(f, "{monomial}")?;
            } else {
                write!(f, "{coeff} {monomial}")?;
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::common::{Scalar, canonicalize};
    use proptest::prelude::*;
    use smallvec::smallvec;

    fn arb_var() -> impl Strategy<Value = VariableId> {
        (0u8..4).prop_map(|i| VariableId::new(canonicalize("x"), smallvec![Scalar::num(i as f64)]))
    }

    fn arb_monomial() -> impl Strategy<Value = Monomial> {
        prop_oneof![
            Just(Monomial::one()),
            arb_var().prop_map(Monomial::var),
            (arb_var(), arb_var()).prop_map(|(a, b)| Monomial::var(a)
                .checked_mul(&Monomial::var(b))
                .unwrap()),
        ]
    }

    // integral coefficients keep float addition exact, so the algebraic
    // laws hold structurally rather than approximately
    fn arb_poly() -> impl Strategy<Value = Polynomial> {
        proptest::collection::vec((arb_monomial(), -10i32..10), 0..5).prop_map(|terms| {
            let mut poly = Polynomial::zero();
            for (monomial, coeff) in terms {
                poly.add_term(monomial, coeff as f64);
            }
            poly
        })
    }

    proptest! {
        #[test]
        fn addition_commutes(a in arb_poly(), b in arb_poly()) {
            prop_assert_eq!(a.clone() + b.clone(), b + a);
        }

        #[test]
        fn addition_associates(a in arb_poly(), b in arb_poly(), c in arb_poly()) {
            let lhs = (a.clone() + b.clone()) + c.clone();
            let rhs = a + (b + c);
            prop_assert_eq!(lhs, rhs);
        }

        #[test]
        fn negation_is_additive_inverse(a in arb_poly()) {
            prop_assert!((a.clone() + (-a)).is_zero());
        }

        #[test]
        fn scale_by_one_is_identity(a in arb_poly()) {
            prop_assert_eq!(a.clone(), a.scale(1.0));
        }

        #[test]
        fn scale_distributes(a in arb_poly(), b in arb_poly(), k in -5i32..5) {
            let k = k as f64;
            let lhs = (a.clone() + b.clone()).scale(k);
            let rhs = a.scale(k) + b.scale(k);
            prop_assert_eq!(lhs, rhs);
        }

        #[test]
        fn zero_is_additive_identity(a in arb_poly()) {
            prop_assert_eq!(a.clone(), a + Polynomial::zero());
        }
    }
}
