//! Structural subset matching for JSON bodies.

use serde_json::Value;

/// Whether `expected` is contained in `actual`.
///
/// Objects match when every expected key matches; arrays match when every
/// expected element matches some element of the actual array; anything
/// else compares by equality.
pub fn contains_subset(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected.iter().all(|(key, value)| {
            actual
                .get(key)
                .map(|candidate| contains_subset(candidate, value))
                .unwrap_or(false)
        }),
        (Value::Array(actual), Value::Array(expected)) => expected
            .iter()
            .all(|value| actual.iter().any(|candidate| contains_subset(candidate, value))),
        (actual, expected) => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_subset() {
        let actual = json!({ "id": 1, "name": "virk", "meta": { "age": 22, "city": "Delhi" } });
        assert!(contains_subset(&actual, &json!({ "name": "virk" })));
        assert!(contains_subset(&actual, &json!({ "meta": { "city": "Delhi" } })));
        assert!(!contains_subset(&actual, &json!({ "name": "romain" })));
        assert!(!contains_subset(&actual, &json!({ "missing": null })));
    }

    #[test]
    fn test_array_subset() {
        let actual = json!([{ "id": 1, "title": "a" }, { "id": 2, "title": "b" }]);
        assert!(contains_subset(&actual, &json!([{ "id": 2 }])));
        assert!(contains_subset(&actual, &json!([])));
        assert!(!contains_subset(&actual, &json!([{ "id": 3 }])));
    }

    #[test]
    fn test_scalars() {
        assert!(contains_subset(&json!(1), &json!(1)));
        assert!(!contains_subset(&json!("1"), &json!(1)));
        assert!(!contains_subset(&json!({ "a": 1 }), &json!([1])));
    }
}
