//! Property-Based Tests for the Cache Tiers
//!
//! # Test Properties
//!
//! 1. **Lifetime Ordering**: `stored_at < fresh_until < expires_at` for any TTL and ratio
//! 2. **Capacity Bound**: L1 never holds more than `l1_max_size` entries
//! 3. **LRU Correctness**: the evicted key is always the least recently used one
//! 4. **Expiry**: a read at or after `expires_at` never returns the entry

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::{json, Value};

use super::entry::{CacheEntry, EntryMetadata, Lifetime};
use super::l1::{L1Cache, L1Lookup};
use super::{CacheConfig, InMemoryL3Store, MemoryL2Store, SetOptions, TieredCache};
use crate::clock::ManualClock;

// =============================================================================
// Property Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Get(u8),
    Insert(u8),
}

/// Operations over a small key space so hits, replacements and evictions all occur.
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8).prop_map(Op::Get),
        (0u8..8).prop_map(Op::Insert),
    ]
}

fn ratio_strategy() -> impl Strategy<Value = f64> {
    (1u32..1000).prop_map(|n| n as f64 / 1000.0)
}

fn key(n: u8) -> String {
    format!("k{}", n)
}

// =============================================================================
// Lifetime Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_lifetime_ordering(
        now in 0u64..1_000_000_000,
        ttl_ms in 0u64..10_000_000,
        ratio in ratio_strategy(),
    ) {
        let lifetime = Lifetime::new(now, Duration::from_millis(ttl_ms), ratio);

        prop_assert!(lifetime.stored_at < lifetime.fresh_until);
        prop_assert!(lifetime.fresh_until < lifetime.expires_at);
        prop_assert!(lifetime.is_fresh(now));
        prop_assert!(!lifetime.is_fresh(lifetime.fresh_until));
        prop_assert!(!lifetime.is_expired(lifetime.expires_at - 1));
        prop_assert!(lifetime.is_expired(lifetime.expires_at));
    }
}

// =============================================================================
// L1 Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_l1_matches_lru_model(
        capacity in 1usize..6,
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let l1: L1Cache<u8> = L1Cache::new(capacity);
        // Least recently used first
        let mut model: Vec<String> = Vec::new();
        let mut now = 1_000u64;

        for (step, op) in ops.into_iter().enumerate() {
            // Several operations share a millisecond; ordering must still hold
            if step % 3 == 0 {
                now += 1;
            }

            match op {
                Op::Get(n) => {
                    let k = key(n);
                    let hit = matches!(l1.get(&k, now), L1Lookup::Hit(_));
                    let position = model.iter().position(|m| *m == k);
                    prop_assert_eq!(hit, position.is_some());
                    if let Some(position) = position {
                        let touched = model.remove(position);
                        model.push(touched);
                    }
                }
                Op::Insert(n) => {
                    let k = key(n);
                    let entry = CacheEntry::new(
                        k.clone(),
                        n,
                        now,
                        Duration::from_secs(3600),
                        0.8,
                        EntryMetadata::default(),
                    );
                    let evicted = l1.insert(entry, now);

                    let expected = match model.iter().position(|m| *m == k) {
                        Some(position) => {
                            model.remove(position);
                            None
                        }
                        None if model.len() >= capacity => Some(model.remove(0)),
                        None => None,
                    };
                    model.push(k);
                    prop_assert_eq!(evicted, expected);
                }
            }

            prop_assert!(l1.len() <= capacity);
            prop_assert_eq!(l1.len(), model.len());
        }
    }
}

// =============================================================================
// Tiered Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_expired_entries_never_served(
        ttl_ms in 2u64..5_000,
        elapsed in 0u64..10_000,
    ) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache: TieredCache<Value> = TieredCache::builder(CacheConfig::default())
            .l2_store(Arc::new(MemoryL2Store::new()))
            .l3_store(Arc::new(InMemoryL3Store::new()))
            .clock(clock.clone())
            .build()
            .unwrap();

        let hit = tokio_test::block_on(async {
            cache
                .set_with("k", json!(ttl_ms), SetOptions::with_ttl(Duration::from_millis(ttl_ms)))
                .await;
            clock.advance(Duration::from_millis(elapsed));
            cache.get("k").await
        });

        prop_assert_eq!(hit.is_some(), elapsed < ttl_ms);
        if hit.is_none() {
            prop_assert!(!cache.l1().contains("k"));
        }
    }

    #[test]
    fn prop_tiered_capacity_bound(
        l1_max in 1usize..5,
        keys in prop::collection::vec(0u8..32, 1..100),
    ) {
        let config = CacheConfig {
            l1_max_size: l1_max,
            l2_max_size: l1_max * 2,
            ..Default::default()
        };
        let cache: TieredCache<Value> = TieredCache::in_memory(config).unwrap();

        tokio_test::block_on(async {
            for n in keys {
                cache.set(key(n), json!(n)).await;
            }
        });

        let stats = tokio_test::block_on(cache.stats());
        prop_assert!(stats.sizes.l1 <= l1_max);
        prop_assert!(stats.sizes.l2.unwrap_or(0) <= l1_max * 2);
    }
}
