//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use crate::fixtures::{Customer, Order, OrderLine};
use argentdb_core::Key;
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for generating valid instance names.
///
/// Names are accepted by both the engine and the file driver.
pub fn instance_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,23}").expect("Invalid regex")
}

/// Strategy for generating keys of every kind.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        any::<i64>().prop_map(Key::Integer),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Key::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Key::Bytes),
        prop::array::uniform16(any::<u8>()).prop_map(|bytes| Key::Uuid(uuid::Uuid::from_bytes(bytes))),
    ]
}

/// Strategy for generating order lines.
pub fn order_line_strategy() -> impl Strategy<Value = OrderLine> {
    ("[A-Z]-[0-9]{1,4}", 1u32..100).prop_map(|(sku, qty)| OrderLine { sku, qty })
}

/// Strategy for generating an order with the given id.
pub fn order_strategy(id: i64) -> impl Strategy<Value = Order> {
    (
        "[a-z]{1,8}",
        any::<u64>(),
        prop::collection::vec(order_line_strategy(), 0..4),
    )
        .prop_map(move |(customer, total_cents, lines)| Order {
            id,
            customer,
            total_cents,
            lines,
        })
}

/// Strategy for generating a set of orders with distinct ids.
pub fn orders_strategy(max: usize) -> impl Strategy<Value = Vec<Order>> {
    prop::collection::btree_set(any::<i64>(), 0..=max).prop_flat_map(|ids| {
        ids.into_iter()
            .map(order_strategy)
            .collect::<Vec<_>>()
    })
}

/// Strategy for generating customers keyed by code.
pub fn customers_strategy(max: usize) -> impl Strategy<Value = BTreeMap<String, Customer>> {
    prop::collection::btree_map("[A-Z]{2}[0-9]{2}", "[A-Za-z ]{1,20}", 0..=max).prop_map(
        |names| {
            names
                .into_iter()
                .map(|(code, name)| {
                    let customer = Customer {
                        code: code.clone(),
                        name,
                    };
                    (code, customer)
                })
                .collect()
        },
    )
}
