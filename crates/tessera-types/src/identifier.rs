//! Identifiers for newly created entities.
//!
//! Identifiers are random UUID v4 strings. They only disambiguate entities
//! inside one store and are not suitable as secrets or capability tokens.

use uuid::Uuid;

/// Generate a fresh entity identifier in hyphenated UUID v4 form.
pub fn generate() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_v4_shaped() {
        let id = generate();
        assert_eq!(id.len(), 36);
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(id.as_bytes()[14], b'4');
    }

    #[test]
    fn generated_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| generate()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
