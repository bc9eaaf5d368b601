// Copyright 2021 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::{Deserialize, Serialize};

use crate::ast::Expr;

/// The non-linear primitives the engine understands.  Each one compiles to
/// a fresh auxiliary variable plus encoding rows; none of them survive
/// into the finished model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BuiltinFn {
    Abs(Box<Expr>),
    Max(Vec<Expr>),
    Min(Vec<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl BuiltinFn {
    pub fn name(&self) -> &'static str {
        use BuiltinFn::*;
        match self {
            Abs(_) => "abs",
            Max(_) => "max",
            Min(_) => "min",
            And(_) => "and",
            Or(_) => "or",
        }
    }

    pub fn args(&self) -> Vec<&Expr> {
        use BuiltinFn::*;
        match self {
            Abs(e) => vec![e.as_ref()],
            Max(args) | Min(args) | And(args) | Or(args) => args.iter().collect(),
        }
    }
}

#[test]
fn test_builtin_names() {
    let abs = BuiltinFn::Abs(Box::new(Expr::Const(1.0)));
    assert_eq!("abs", abs.name());
    assert_eq!(1, abs.args().len());

    let max = BuiltinFn::Max(vec![Expr::Const(1.0), Expr::Const(2.0)]);
    assert_eq!("max", max.name());
    assert_eq!(2, max.args().len());
}
