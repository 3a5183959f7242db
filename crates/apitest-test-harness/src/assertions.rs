//! Assertion helpers for failing calls.

/// Assert that a result is an error whose message contains `expected`.
#[macro_export]
macro_rules! assert_error_contains {
    ($result:expr, $expected:expr) => {
        match $result {
            Ok(_) => panic!("Expected error but got Ok"),
            Err(e) => {
                let error_msg = format!("{}", e);
                assert!(
                    error_msg.contains($expected),
                    "Expected error message to contain '{}', but got: '{}'",
                    $expected,
                    error_msg
                );
            }
        }
    };
}
