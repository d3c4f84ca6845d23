use std::collections::BTreeMap;

use proptest::prelude::*;
use fleetvisor::materialize::content_hash;
use fleetvisor::types::OutputConfigSet;

fn entries_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    proptest::collection::btree_map(
        "[a-z]{1,8}(/[a-z]{1,8})?\\.yaml",
        proptest::collection::vec(any::<u8>(), 0..64),
        1..8,
    )
}

fn insert_in_order(entries: impl Iterator<Item = (String, Vec<u8>)>) -> OutputConfigSet {
    let mut set = OutputConfigSet::new();
    for (k, v) in entries {
        set.insert(k, v);
    }
    set
}

proptest! {
    #[test]
    fn hash_ignores_insertion_order(entries in entries_strategy()) {
        let forward = insert_in_order(entries.clone().into_iter());
        let backward = insert_in_order(entries.into_iter().rev());
        prop_assert_eq!(content_hash(&forward), content_hash(&backward));
    }

    #[test]
    fn appending_a_byte_changes_the_hash(entries in entries_strategy(), pick in any::<prop::sample::Index>(), extra in any::<u8>()) {
        let original = insert_in_order(entries.clone().into_iter());

        let keys: Vec<String> = entries.keys().cloned().collect();
        let key = pick.get(&keys).clone();
        let mut changed = original.clone();
        changed.get_mut(&key).unwrap().push(extra);

        prop_assert_ne!(content_hash(&original), content_hash(&changed));
    }
}
