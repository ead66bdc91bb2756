#![allow(dead_code)]

use proptest::prelude::*;

/// Strategy for generating non-empty event ids
pub fn event_id_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9-]{1,36}"
}

/// Strategy for generating sequences of event ids with repeats
pub fn event_id_stream_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("evt-[0-9]{1,3}", 1..300)
}

/// Strategy for generating (initial_ms, max_ms, multiplier) backoff parameters
pub fn backoff_params_strategy() -> impl Strategy<Value = (u64, u64, f64)> {
    (1u64..=5_000, 0u64..=120_000, 1.0f64..=10.0).prop_map(|(initial, extra, multiplier)| {
        (initial, initial + extra, multiplier)
    })
}

/// Strategy for generating raw `retryCount` header values
pub fn raw_retry_count_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..1_000).prop_map(|n| n.to_string()),
        Just(String::new()),
        Just("abc".to_string()),
        Just("-3".to_string()),
        Just(" 7 ".to_string()),
        "[a-z0-9 ]{0,6}",
    ]
}
