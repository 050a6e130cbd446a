//! State comparator
//!
//! Equality between resource states is defined as byte equality of their
//! canonical JSON encoding. Struct fields serialize in declaration order,
//! so the encoding is deterministic; anything volatile a provider reports
//! (launch times, console URLs) must simply never be part of a state type.

use crate::error::Result;
use serde::Serialize;
use tracing::trace;

/// Whether two states are equal under the canonical encoding.
/// Length is checked first, then the full byte strings.
pub fn is_equal<T: Serialize>(actual: &T, expected: &T) -> Result<bool> {
    let actual_bytes = serde_json::to_vec(actual)?;
    let expected_bytes = serde_json::to_vec(expected)?;

    if actual_bytes.len() != expected_bytes.len() {
        trace!(
            actual_len = actual_bytes.len(),
            expected_len = expected_bytes.len(),
            "States differ in encoded length"
        );
        return Ok(false);
    }
    Ok(actual_bytes == expected_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Probe {
        name: String,
        count: u32,
        tags: Vec<String>,
    }

    #[test]
    fn identical_states_are_equal() {
        let a = Probe {
            name: "net".to_string(),
            count: 1,
            tags: vec!["x".to_string()],
        };
        let b = Probe {
            name: "net".to_string(),
            count: 1,
            tags: vec!["x".to_string()],
        };
        assert!(is_equal(&a, &b).unwrap());
    }

    #[test]
    fn any_field_difference_breaks_equality() {
        let a = Probe {
            name: "net".to_string(),
            count: 1,
            tags: vec![],
        };
        let b = Probe {
            name: "net".to_string(),
            count: 2,
            tags: vec![],
        };
        assert!(!is_equal(&a, &b).unwrap());
    }

    #[test]
    fn same_length_different_bytes_is_unequal() {
        let a = Probe {
            name: "aaaa".to_string(),
            count: 1,
            tags: vec![],
        };
        let b = Probe {
            name: "aaab".to_string(),
            count: 1,
            tags: vec![],
        };
        assert!(!is_equal(&a, &b).unwrap());
    }
}
