// Copyright 2022 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Mapping between variable ids and the names that survive LP text.
//!
//! The LP format accepts a restricted character set and refuses names
//! that could be read as numbers, so serialization rewrites each id's
//! display form.  Rewriting can merge distinct ids onto one string; the
//! registry resolves merges with a suffix from a fixed-seed generator,
//! keeping the mapping deterministic, and remembers both directions so
//! solution values can be attributed back to ids.

use std::collections::HashMap;

use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::VariableId;
use crate::model::Model;

/// the LP format caps identifier length
pub(crate) const MAX_NAME_LEN: usize = 255;

const COLLISION_SEED: u64 = 7919;

fn is_legal_lp_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '"'
                | '#'
                | '$'
                | '%'
                | '&'
                | '('
                | ')'
                | '/'
                | ','
                | '.'
                | ';'
                | '?'
                | '@'
                | '_'
                | '`'
                | '\''
                | '{'
                | '}'
                | '|'
                | '~'
        )
}

/// A leading digit, period or exponent letter would make the name parse
/// as a number.
fn needs_guard(name: &str) -> bool {
    match name.chars().next() {
        None => true,
        Some(c) => c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E'),
    }
}

/// Rewrite a variable's display form into the LP legal character set.
/// Index brackets become parens so `x[1,2]` stays readable as `x(1,2)`.
pub(crate) fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '[' => out.push('('),
            ']' => out.push(')'),
            c if is_legal_lp_char(c) => out.push(c),
            _ => out.push('_'),
        }
    }
    if needs_guard(&out) {
        out.insert_str(0, "v_");
    }
    // all remaining chars are ASCII, so byte truncation is safe
    out.truncate(MAX_NAME_LEN);
    out
}

/// Bidirectional map between [VariableId]s and their serialized names.
#[derive(Clone, Debug)]
pub struct NameRegistry {
    by_id: HashMap<VariableId, String>,
    by_name: HashMap<String, VariableId>,
}

impl NameRegistry {
    /// Assign every variable in the model a unique LP name, in variable
    /// order.
    pub(crate) fn new(model: &Model) -> NameRegistry {
        let mut by_id = HashMap::with_capacity(model.variables().len());
        let mut by_name: HashMap<String, VariableId> =
            HashMap::with_capacity(model.variables().len());
        let mut rng = StdRng::seed_from_u64(COLLISION_SEED);

        for decl in model.variables() {
            let base = sanitize_name(&decl.id.to_string());
            let mut name = base.clone();
            while by_name.contains_key(&name) {
                let suffix: String = (&mut rng)
                    .sample_iter(Alphanumeric)
                    .take(4)
                    .map(char::from)
                    .collect();
                let stem = base.len().min(MAX_NAME_LEN - (suffix.len() + 1));
                name = format!("{}_{}", &base[..stem], suffix);
            }
            by_name.insert(name.clone(), decl.id.clone());
            by_id.insert(decl.id.clone(), name);
        }

        NameRegistry { by_id, by_name }
    }

    pub fn lp_name(&self, id: &VariableId) -> Option<&str> {
        self.by_id.get(id).map(|s| s.as_str())
    }

    pub fn variable_id(&self, name: &str) -> Option<&VariableId> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VariableId, &str)> {
        self.by_id.iter().map(|(id, name)| (id, name.as_str()))
    }
}
