//! Assertion helpers for space tests

use crate::core_space::errors::SpaceError;
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a Result is Err and return the error
pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
        Err(e) => e,
    }
}

/// Assert that an Option is Some and return the value
pub fn assert_some<T>(option: Option<T>) -> T {
    match option {
        Some(value) => value,
        None => panic!("Expected Some, got None"),
    }
}

/// Assert that a result failed with the given `SpaceError::kind()`
pub fn assert_space_error<T: Debug>(result: Result<T, SpaceError>, kind: &str) -> SpaceError {
    let err = assert_err(result);
    assert_eq!(err.kind(), kind, "unexpected error: {err}");
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_ok() {
        let result: Result<i32, String> = Ok(42);
        assert_eq!(assert_ok(result), 42);
    }

    #[test]
    #[should_panic(expected = "Expected Ok")]
    fn test_assert_ok_panics() {
        let result: Result<i32, String> = Err("error".to_string());
        assert_ok(result);
    }

    #[test]
    fn test_assert_space_error() {
        let result: Result<(), SpaceError> = Err(SpaceError::Forbidden("nope".to_string()));
        assert_space_error(result, "forbidden");
    }

    #[test]
    #[should_panic(expected = "unexpected error")]
    fn test_assert_space_error_wrong_kind() {
        let result: Result<(), SpaceError> = Err(SpaceError::Conflict("dup".to_string()));
        assert_space_error(result, "forbidden");
    }
}
