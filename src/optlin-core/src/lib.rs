// Copyright 2021 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod common;
mod results;

// Re-export key types from common
pub use common::{
    Canonical, Error, ErrorCode, ErrorKind, Ident, Raw, Result, Scalar, VariableId, canonicalize,
};

// Re-export results types
pub use results::{Solution, SolveStatus};
