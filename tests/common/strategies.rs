//! Proptest strategies shared by the property tests.

use proptest::prelude::*;

/// Label sets with unique keys
pub fn label_set_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_map("[a-z_]{1,8}", "[a-z0-9]{0,8}", 0..6)
        .prop_map(|labels| labels.into_iter().collect())
}

/// Offsets in milliseconds at which requests arrive, sorted ascending
pub fn arrival_offsets_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..3_000, 1..80).prop_map(|mut offsets| {
        offsets.sort_unstable();
        offsets
    })
}
