//! Index definition reconciliation.
//!
//! Clusters upgraded in place still carry indexes written in the legacy
//! descriptor format, whose flag fields differ from what a fresh create
//! sends. When an index create collides with an existing name, the handle
//! fetches the existing descriptor and asks this module whether the collision
//! is a harmless duplicate of an equivalent legacy index or a genuine
//! conflict.

use bson::{Bson, Document};
use madrone_driver::fields::{INDEX_DEF, INDEX_KEY, LEGACY_UNIQUE, NOT_NULL, UNIQUE};

/// Decides whether `existing` is a legacy-format index equivalent to the
/// desired definition.
///
/// Equivalence requires the key patterns to be structurally equal, the
/// legacy uniqueness flag to match the desired `Unique` option, and the
/// desired definition to add `NotNull` where the existing one lacks it (the
/// one known legacy/new-format divergence). A descriptor this function
/// cannot read is never equivalent.
#[must_use]
pub fn equivalent_legacy_index(
    existing: &Document,
    desired_key: &Document,
    desired_options: &Document,
) -> bool {
    let Some(Bson::Document(definition)) = existing.get(INDEX_DEF) else {
        return false;
    };
    let Some(Bson::Document(existing_key)) = definition.get(INDEX_KEY) else {
        return false;
    };
    if existing_key != desired_key {
        return false;
    }
    if read_bool(definition, LEGACY_UNIQUE) != read_bool(desired_options, UNIQUE) {
        return false;
    }
    read_bool(desired_options, NOT_NULL) && !read_bool(definition, NOT_NULL)
}

fn read_bool(document: &Document, key: &str) -> bool {
    matches!(document.get(key), Some(Bson::Boolean(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use madrone_driver::fields::{INDEX_NAME, LEGACY_ENFORCED};

    fn legacy_descriptor(key: Document, unique: bool) -> Document {
        doc! {
            INDEX_DEF: {
                INDEX_NAME: "ix",
                INDEX_KEY: key,
                LEGACY_UNIQUE: unique,
                LEGACY_ENFORCED: false,
            }
        }
    }

    #[test]
    fn equivalent_when_key_and_unique_match_and_not_null_is_added() {
        let existing = legacy_descriptor(doc! { "a": 1 }, true);
        let options = doc! { UNIQUE: true, NOT_NULL: true };
        assert!(equivalent_legacy_index(&existing, &doc! { "a": 1 }, &options));
    }

    #[test]
    fn key_mismatch_is_a_conflict() {
        let existing = legacy_descriptor(doc! { "a": 1 }, true);
        let options = doc! { UNIQUE: true, NOT_NULL: true };
        assert!(!equivalent_legacy_index(&existing, &doc! { "b": 1 }, &options));
        assert!(!equivalent_legacy_index(
            &existing,
            &doc! { "a": 1, "b": 1 },
            &options
        ));
    }

    #[test]
    fn uniqueness_mismatch_is_a_conflict() {
        let existing = legacy_descriptor(doc! { "a": 1 }, false);
        let options = doc! { UNIQUE: true, NOT_NULL: true };
        assert!(!equivalent_legacy_index(&existing, &doc! { "a": 1 }, &options));
    }

    #[test]
    fn not_null_must_be_newly_added() {
        let existing = legacy_descriptor(doc! { "a": 1 }, true);

        // Desired definition without NotNull adds nothing over the legacy one.
        let options = doc! { UNIQUE: true };
        assert!(!equivalent_legacy_index(&existing, &doc! { "a": 1 }, &options));

        // An existing descriptor that already carries NotNull is not legacy.
        let mut modern = legacy_descriptor(doc! { "a": 1 }, true);
        if let Some(Bson::Document(def)) = modern.get_mut(INDEX_DEF) {
            def.insert(NOT_NULL, true);
        }
        let options = doc! { UNIQUE: true, NOT_NULL: true };
        assert!(!equivalent_legacy_index(&modern, &doc! { "a": 1 }, &options));
    }

    #[test]
    fn unreadable_descriptors_fail_closed() {
        let options = doc! { UNIQUE: true, NOT_NULL: true };
        assert!(!equivalent_legacy_index(
            &Document::new(),
            &doc! { "a": 1 },
            &options
        ));
        assert!(!equivalent_legacy_index(
            &doc! { INDEX_DEF: "corrupt" },
            &doc! { "a": 1 },
            &options
        ));
        assert!(!equivalent_legacy_index(
            &doc! { INDEX_DEF: { INDEX_KEY: 7 } },
            &doc! { "a": 1 },
            &options
        ));
    }
}
