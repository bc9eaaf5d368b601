// Copyright 2021 The Optlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// Re-export all common types from optlin-core
pub use optlin_core::common::*;

// Macros for error creation - these need to stay in optlin-engine
// as they use crate-local paths

#[macro_export]
macro_rules! model_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Model,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Model, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! compile_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Compilation,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Compilation, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! var_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Variable,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);

#[test]
fn test_err_macros() {
    let result: Result<()> = compile_err!(UnboundName, "j".to_string());
    let err = result.unwrap_err();
    assert_eq!(ErrorKind::Compilation, err.kind);
    assert_eq!(ErrorCode::UnboundName, err.code);
    assert_eq!(Some("j".to_string()), err.details);

    let result: Result<()> = model_err!(NonLinearObjective);
    let err = result.unwrap_err();
    assert_eq!(ErrorKind::Model, err.kind);
    assert_eq!(None, err.details);

    let result: Result<()> = var_err!(DuplicateVariable, "x[1]".to_string());
    assert_eq!(ErrorKind::Variable, result.unwrap_err().kind);
}
