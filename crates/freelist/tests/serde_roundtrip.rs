//! Property tests for serde JSON roundtrip of configuration and snapshots
#![cfg(feature = "serde")]

use nebula_freelist::{FreeListConfig, FreeListStats, RefillPolicy};
use proptest::prelude::*;

fn arb_config() -> impl Strategy<Value = FreeListConfig> {
    (1usize..4096, 0usize..64, 0usize..512, 0usize..64, 0usize..8, 0usize..1024).prop_map(
        |(element_size, link_offset, init, refill, growth, max)| {
            FreeListConfig::from_raw(element_size, link_offset, init, refill, growth, max)
        },
    )
}

proptest! {
    #[test]
    fn config_roundtrip(config in arb_config()) {
        let json = serde_json::to_string(&config).unwrap();
        let back: FreeListConfig = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(config, back);
    }

    #[test]
    fn resolved_policy_roundtrip(config in arb_config()) {
        let policy = config.resolve();
        let json = serde_json::to_string(&policy).unwrap();
        let back: RefillPolicy = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(policy, back);
    }
}

#[test]
fn config_deserializes_from_field_names() {
    let json = r#"{
        "element_size": 256,
        "link_offset": 0,
        "init_size": 0,
        "refill_size": 16,
        "growth_factor": 0,
        "max_refill_size": 128
    }"#;
    let config: FreeListConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config, FreeListConfig::new(256, 0).with_refill_size(16).with_max_refill_size(128));
    assert!(config.validate().is_ok());
}

#[test]
fn live_stats_export_as_json() {
    let pool = nebula_freelist::init(FreeListConfig::new(64, 0).with_init_size(8)).unwrap();
    let h = pool.allocate().unwrap();

    let json = serde_json::to_value(pool.stats()).unwrap();
    assert_eq!(json["capacity"], 8);
    assert_eq!(json["free"], 7);
    assert_eq!(json["allocated"], 1);
    assert_eq!(json["thread_safe"], false);

    let back: FreeListStats = serde_json::from_value(json).unwrap();
    assert_eq!(back, pool.stats());
    pool.free(h);
}
