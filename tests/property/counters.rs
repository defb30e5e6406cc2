//! Counter store invariants.

use aegis_store::CounterStore;
use proptest::prelude::*;
use std::time::Duration;
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Within a window, counts are monotonic and exact.
    #[test]
    fn counts_are_monotonic_within_a_window(increments in 1usize..=50) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let store = CounterStore::in_memory();
            let ttl = Some(Duration::from_secs(60));

            let mut last = 0;
            for _ in 0..increments {
                let n = store.increment("k", ttl).await.unwrap();
                prop_assert!(n > last, "count must increase");
                last = n;
            }
            prop_assert_eq!(store.get_count("k").await.unwrap(), increments as u64);
            Ok(())
        })?;
    }

    /// Reset always returns the count to zero.
    #[test]
    fn reset_is_idempotent(increments in 0usize..=20) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let store = CounterStore::in_memory();
            for _ in 0..increments {
                store.increment("k", None).await.unwrap();
            }
            store.reset("k").await.unwrap();
            prop_assert_eq!(store.get_count("k").await.unwrap(), 0);
            store.reset("k").await.unwrap();
            prop_assert_eq!(store.get_count("k").await.unwrap(), 0);
            Ok(())
        })?;
    }

    /// Sample buffers never exceed their capacity and stay ordered.
    #[test]
    fn sample_buffers_are_bounded_and_ordered(
        pushes in 1usize..=100,
        cap in 1usize..=32,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let store = CounterStore::in_memory();
            for i in 0..pushes {
                store.push_sample("s", i as u64, 1.0, cap).await.unwrap();
            }
            let samples = store.range_samples("s", 0).await.unwrap();
            prop_assert!(samples.len() <= cap);
            prop_assert!(samples.windows(2).all(|w| w[0].ts_ms <= w[1].ts_ms));
            Ok(())
        })?;
    }
}
