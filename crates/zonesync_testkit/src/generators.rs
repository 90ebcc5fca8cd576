//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use crate::fixtures::Note;
use proptest::prelude::*;

/// Strategy for record names drawn from a small pool, so generated
/// operations collide often.
pub fn record_name_strategy() -> impl Strategy<Value = String> {
    (0u8..12).prop_map(|n| format!("note-{n}"))
}

/// Strategy for unsynced notes with distinct-enough content.
pub fn note_strategy() -> impl Strategy<Value = Note> {
    (
        record_name_strategy(),
        prop::string::string_regex("[A-Za-z ]{1,24}").expect("Invalid regex"),
        prop::string::string_regex("[a-z ]{0,64}").expect("Invalid regex"),
    )
        .prop_map(|(id, title, body)| Note::new(id, title).with_body(body))
}

/// Strategy for a sequence of delete requests, each a batch of ids.
pub fn deletion_batches_strategy() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec(record_name_strategy(), 1..5), 1..8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn generated_notes_are_unsynced() {
        let mut runner = TestRunner::default();
        for _ in 0..20 {
            let note = note_strategy().new_tree(&mut runner).unwrap().current();
            assert!(note.id.starts_with("note-"));
            assert!(note.metadata.is_none());
        }
    }
}
