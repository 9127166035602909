//! Property-based test generators using proptest.

use crate::channel::Delivery;
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for short text documents.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z ]{0,16}").expect("Invalid regex")
}

/// Strategy for a sequence of successive contents of one text document.
pub fn text_history_strategy(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(text_strategy(), 1..=max_len.max(1))
}

/// Strategy for JSON documents with nested objects and arrays.
pub fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[a-z]{0,6}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-d]{1,3}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Strategy for a JSON object root, the usual shape of a synced document.
pub fn json_object_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-d]{1,3}", json_strategy(), 0..5)
        .prop_map(|map| Value::Object(map.into_iter().collect()))
}

/// Strategy for a delivery schedule where most messages arrive.
pub fn delivery_schedule_strategy(len: usize) -> impl Strategy<Value = Vec<Delivery>> {
    prop::collection::vec(
        prop_oneof![
            6 => Just(Delivery::Deliver),
            2 => Just(Delivery::Drop),
            1 => Just(Delivery::Duplicate),
        ],
        0..=len,
    )
}

/// Default proptest configuration for sync simulations.
pub fn simulation_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    }
}
