//! Backup and restore across engines.

use argentdb_core::backup::{BACKUP_MAGIC, DIGEST_SIZE, FORMAT_VERSION};
use argentdb_core::{
    CoreError, EngineConfig, Key, KeySchema, LogLevel, RestorePhase, Schema, Store,
    TableDefinition, MAX_KEY_LEN,
};
use argentdb_testkit::prelude::*;

#[test]
fn orders_survive_a_fresh_engine() {
    let source = TestEngine::memory();
    let orders = source.register_orders("orders");
    scenarios::insert_orders(&orders, &scenarios::sample_orders());

    let mut bytes = Vec::new();
    let report = source.backup::<OrdersStore, _>(&mut bytes).unwrap();
    assert_eq!(report.instance, "orders");
    assert_eq!(report.owner_type, "shop.Orders");
    assert_eq!(report.tables, 2);
    assert_eq!(report.objects, 3);
    assert_eq!(report.bytes, bytes.len() as u64);

    let target = TestEngine::memory();
    let restored = target.register_orders("orders");
    let report = target.restore::<OrdersStore, _>(bytes.as_slice()).unwrap();
    assert_eq!(report.objects, 3);
    assert_eq!(report.phase, RestorePhase::Completed);
    assert!(report.skipped_tables.is_empty());

    assert_eq!(scenarios::read_orders(&restored), scenarios::sample_orders());
    let second = restored
        .get_as::<Order>(ORDERS_TABLE, &Key::from(2))
        .unwrap()
        .unwrap();
    assert_eq!(second.customer, "grace");
}

#[test]
fn restore_replaces_rather_than_merges() {
    let source = TestEngine::memory();
    let orders = source.register_orders("orders");
    scenarios::insert_orders(&orders, &scenarios::sample_orders()[..1]);
    let bytes = source.backup_bytes("orders");

    let target = TestEngine::memory();
    let restored = target.register_orders("orders");
    scenarios::populate_orders(&restored, 10);
    scenarios::insert_customer(&restored, "ZZ01", "Leftover");

    target.restore_instance("orders", bytes.as_slice()).unwrap();
    assert_eq!(restored.keys(ORDERS_TABLE).unwrap(), vec![Key::from(1)]);
    assert_eq!(restored.count(CUSTOMERS_TABLE).unwrap(), 0);
}

#[test]
fn empty_instance_roundtrips() {
    let source = TestEngine::memory();
    source.register_orders("orders");
    let bytes = source.backup_bytes("orders");

    let target = TestEngine::memory();
    let restored = target.register_orders("orders");
    scenarios::populate_orders(&restored, 2);

    let report = target.restore_instance("orders", bytes.as_slice()).unwrap();
    assert_eq!(report.objects, 0);
    assert_eq!(restored.count(ORDERS_TABLE).unwrap(), 0);
}

#[test]
fn oversized_keys_never_reach_a_backup() {
    let source = TestEngine::memory();
    let orders = source.register_orders("orders");

    let too_long = "C".repeat(70 * 1024);
    let customer = Customer {
        code: too_long.clone(),
        name: "Ada".into(),
    };
    assert!(matches!(
        orders.put_serde(CUSTOMERS_TABLE, too_long.as_str(), Customer::TYPE, &customer),
        Err(CoreError::InvalidOperation { .. })
    ));
    assert_eq!(orders.count(CUSTOMERS_TABLE).unwrap(), 0);

    let longest = "C".repeat(MAX_KEY_LEN as usize);
    scenarios::insert_customer(&orders, &longest, "Grace");
    let bytes = source.backup_bytes("orders");

    let target = TestEngine::memory();
    let restored = target.register_orders("orders");
    target.restore_instance("orders", bytes.as_slice()).unwrap();
    let back = restored
        .get_as::<Customer>(CUSTOMERS_TABLE, &Key::from(longest.as_str()))
        .unwrap()
        .unwrap();
    assert_eq!(back.name, "Grace");
}

#[test]
fn payloads_over_the_configured_limit_are_rejected_on_put() {
    let strict = TestEngine::with_config(EngineConfig::new().max_payload_size(8));
    let small = strict.register_orders("orders");
    assert!(matches!(
        small.put_serde(ORDERS_TABLE, 1, Order::TYPE, &Order::new(1, "ada", 100)),
        Err(CoreError::InvalidOperation { .. })
    ));
    assert_eq!(small.count(ORDERS_TABLE).unwrap(), 0);
}

#[test]
fn restore_into_differently_named_instance_is_logged() {
    let source = TestEngine::memory();
    let orders = source.register_orders("primary");
    scenarios::populate_orders(&orders, 3);
    let bytes = source.backup_bytes("primary");

    let target = TestEngine::memory();
    let replica = target.register_orders("replica");
    let report = target.restore_instance("replica", bytes.as_slice()).unwrap();

    assert_eq!(report.source_instance, "primary");
    assert_eq!(report.instance, "replica");
    assert_eq!(replica.count(ORDERS_TABLE).unwrap(), 3);
    assert!(target
        .log
        .contains(LogLevel::Information, "Restoring backup of 'primary' into 'replica'"));
}

#[test]
fn type_only_operations_require_a_single_instance() {
    let env = TestEngine::memory();
    assert!(matches!(
        env.backup::<OrdersStore, _>(Vec::new()),
        Err(CoreError::NoInstanceForType { .. })
    ));

    env.register_orders("west");
    env.register_orders("east");
    match env.backup::<OrdersStore, _>(Vec::new()) {
        Err(CoreError::AmbiguousType { instances, .. }) => {
            assert_eq!(instances, vec!["east".to_string(), "west".to_string()]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    assert!(matches!(
        env.restore::<OrdersStore, _>(&b""[..]),
        Err(CoreError::AmbiguousType { .. })
    ));

    // Named operations still work.
    let bytes = env.backup_bytes("west");
    env.restore_instance("east", bytes.as_slice()).unwrap();
}

#[test]
fn unsupported_version_leaves_target_untouched() {
    let source = TestEngine::memory();
    let orders = source.register_orders("orders");
    scenarios::populate_orders(&orders, 3);
    let mut bytes = source.backup_bytes("orders");
    bytes[4..6].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());

    let target = TestEngine::memory();
    let restored = target.register_orders("orders");
    scenarios::insert_orders(&restored, &scenarios::sample_orders());

    let result = target.restore_instance("orders", bytes.as_slice());
    assert!(matches!(result, Err(CoreError::Version { found, .. }) if found == FORMAT_VERSION + 1));
    assert_eq!(scenarios::read_orders(&restored), scenarios::sample_orders());
    assert!(target.log.contains(LogLevel::Error, "Restore of 'orders' failed"));
}

#[test]
fn foreign_stream_is_invalid_format() {
    let target = TestEngine::memory();
    target.register_orders("orders");

    let result = target.restore_instance("orders", &b"PK\x03\x04 not a backup"[..]);
    assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
}

#[test]
fn truncated_stream_is_invalid_format() {
    let source = TestEngine::memory();
    let orders = source.register_orders("orders");
    scenarios::populate_orders(&orders, 5);
    let bytes = source.backup_bytes("orders");
    assert_eq!(&bytes[..4], BACKUP_MAGIC);

    let target = TestEngine::memory();
    let restored = target.register_orders("orders");
    scenarios::insert_orders(&restored, &scenarios::sample_orders());

    let cut = &bytes[..bytes.len() / 2];
    assert!(matches!(
        target.restore_instance("orders", cut),
        Err(CoreError::InvalidFormat { .. })
    ));
    assert_eq!(restored.count(ORDERS_TABLE).unwrap(), 3);
}

#[test]
fn digest_mismatch_is_rejected() {
    let source = TestEngine::memory();
    let orders = source.register_orders("orders");
    scenarios::populate_orders(&orders, 3);
    let mut bytes = source.backup_bytes("orders");
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;

    let target = TestEngine::memory();
    let restored = target.register_orders("orders");
    assert!(matches!(
        target.restore_instance("orders", bytes.as_slice()),
        Err(CoreError::ChecksumMismatch)
    ));
    assert_eq!(restored.count(ORDERS_TABLE).unwrap(), 0);

    let info = target.inspect_backup(bytes.as_slice()).unwrap();
    assert!(!info.digest_valid);
}

#[test]
fn digest_check_can_be_disabled() {
    let source = TestEngine::memory();
    let orders = source.register_orders("orders");
    scenarios::populate_orders(&orders, 3);
    let mut bytes = source.backup_bytes("orders");
    let footer = bytes.len() - DIGEST_SIZE;
    bytes[footer] ^= 0x01;

    let target = TestEngine::with_config(EngineConfig::new().verify_digest(false));
    let restored = target.register_orders("orders");
    target.restore_instance("orders", bytes.as_slice()).unwrap();
    assert_eq!(restored.count(ORDERS_TABLE).unwrap(), 3);
    assert!(target.log.contains(LogLevel::Warning, "digest mismatch"));
}

#[test]
fn inspect_reports_headers_without_restoring() {
    let env = TestEngine::memory();
    let orders = env.register_orders("orders");
    scenarios::populate_orders(&orders, 4);
    scenarios::insert_customer(&orders, "AB12", "Ada");
    let bytes = env.backup_bytes("orders");

    let info = env.inspect_backup(bytes.as_slice()).unwrap();
    assert_eq!(info.header.format_version, FORMAT_VERSION);
    assert_eq!(info.header.owner_type, "shop.Orders");
    assert_eq!(info.header.instance_name, "orders");
    assert_eq!(info.object_count(), 5);
    assert_eq!(info.bytes, bytes.len() as u64);
    assert!(info.digest_valid);

    let names: Vec<&str> = info.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec![ORDERS_TABLE, CUSTOMERS_TABLE]);
}

#[test]
fn restore_into_other_type_is_rejected() {
    let source = TestEngine::memory();
    source.register_orders("orders");
    let bytes = source.backup_bytes("orders");

    let target = TestEngine::memory();
    target.register_catalog("orders");
    assert!(matches!(
        target.restore_instance("orders", bytes.as_slice()),
        Err(CoreError::TypeMismatch { .. })
    ));
}

/// Older layout of the orders schema with an extra table.
struct OrdersWithArchive;

impl Schema for OrdersWithArchive {
    const TYPE_NAME: &'static str = "shop.Orders";

    fn tables() -> Vec<TableDefinition> {
        let mut tables = Orders::tables();
        tables.push(TableDefinition::new(
            "archive",
            KeySchema::integer("id"),
            Order::TYPE,
        ));
        tables
    }
}

#[test]
fn unknown_tables_are_skipped() {
    let source = TestEngine::memory();
    let old = source
        .register_database::<Store<OrdersWithArchive>>("orders", None)
        .unwrap()
        .downcast::<Store<OrdersWithArchive>>()
        .unwrap();
    scenarios::populate_orders(&old, 2);
    old.put_serde("archive", 9, Order::TYPE, &Order::new(9, "old", 1))
        .unwrap();
    let bytes = source.backup_bytes("orders");

    let target = TestEngine::memory();
    let restored = target.register_orders("orders");
    let report = target.restore_instance("orders", bytes.as_slice()).unwrap();

    assert_eq!(report.skipped_tables, vec!["archive".to_string()]);
    assert_eq!(report.objects, 2);
    assert_eq!(restored.count(ORDERS_TABLE).unwrap(), 2);
    assert!(target.log.contains(LogLevel::Warning, "Skipping table 'archive'"));
}

#[test]
fn abstract_tables_keep_concrete_types() {
    let source = TestEngine::memory();
    let catalog = source.register_catalog("catalog");
    let (book, album) = scenarios::populate_catalog(&catalog);
    let bytes = source.backup_bytes("catalog");

    let target = TestEngine::memory();
    let restored = target.register_catalog("catalog");
    target.restore_instance("catalog", bytes.as_slice()).unwrap();

    assert_eq!(scenarios::product_type(&restored, "B-1").as_deref(), Some(Book::TYPE));
    assert_eq!(scenarios::product_type(&restored, "A-1").as_deref(), Some(Album::TYPE));
    assert_eq!(
        restored.get_as::<Book>(PRODUCTS_TABLE, &Key::from("B-1")).unwrap(),
        Some(book)
    );
    assert_eq!(
        restored.get_as::<Album>(PRODUCTS_TABLE, &Key::from("A-1")).unwrap(),
        Some(album)
    );
}

#[test]
fn concurrent_backups_of_different_instances() {
    let env = TestEngine::memory();
    let orders = env.register_orders("orders");
    let catalog = env.register_catalog("catalog");
    scenarios::populate_orders(&orders, 50);
    scenarios::populate_catalog(&catalog);

    let (orders_bytes, catalog_bytes) = std::thread::scope(|s| {
        let a = s.spawn(|| env.backup_bytes("orders"));
        let b = s.spawn(|| env.backup_bytes("catalog"));
        (a.join().unwrap(), b.join().unwrap())
    });

    let target = TestEngine::memory();
    let restored_orders = target.register_orders("orders");
    let restored_catalog = target.register_catalog("catalog");
    target.restore_instance("orders", orders_bytes.as_slice()).unwrap();
    target.restore_instance("catalog", catalog_bytes.as_slice()).unwrap();

    assert_eq!(scenarios::read_orders(&restored_orders), scenarios::read_orders(&orders));
    assert_eq!(restored_catalog.count(PRODUCTS_TABLE).unwrap(), 2);
}

#[test]
fn backups_are_deterministic() {
    let env = TestEngine::memory();
    let orders = env.register_orders("orders");
    scenarios::populate_orders(&orders, 20);
    assert_eq!(env.backup_bytes("orders"), env.backup_bytes("orders"));
}
