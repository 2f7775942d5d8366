//! Checks the order cache's LRU against the `lru` crate as a reference model.

use std::num::NonZeroUsize;

use orderline::cache::LruCache;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Get(u8),
    Put(u8, u32),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..12).prop_map(Op::Get),
        (0u8..12, any::<u32>()).prop_map(|(key, value)| Op::Put(key, value)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn matches_reference_lru(
        capacity in 1usize..6,
        ops in prop::collection::vec(arb_op(), 0..200),
    ) {
        let capacity = NonZeroUsize::new(capacity).expect("non-zero capacity");
        let mut cache = LruCache::new(capacity);
        let mut model = lru::LruCache::new(capacity);

        for op in ops {
            match op {
                Op::Get(key) => {
                    prop_assert_eq!(cache.get(&key).copied(), model.get(&key).copied());
                }
                Op::Put(key, value) => {
                    let existed = model.contains(&key);
                    let pushed = model.push(key, value);
                    let expected_eviction = if existed { None } else { pushed };
                    prop_assert_eq!(cache.put(key, value), expected_eviction);
                }
            }

            prop_assert!(cache.len() <= capacity.get());
            prop_assert_eq!(cache.len(), model.len());
            let keys: Vec<u8> = cache.keys_mru().copied().collect();
            let model_keys: Vec<u8> = model.iter().map(|(key, _)| *key).collect();
            prop_assert_eq!(keys, model_keys);
        }
    }

    #[test]
    fn most_recent_put_is_always_present(
        capacity in 1usize..4,
        keys in prop::collection::vec(0u8..20, 1..50),
    ) {
        let mut cache = LruCache::new(NonZeroUsize::new(capacity).expect("non-zero capacity"));
        for key in keys {
            cache.put(key, ());
            prop_assert!(cache.contains(&key));
            prop_assert_eq!(cache.keys_mru().next(), Some(&key));
        }
    }
}
