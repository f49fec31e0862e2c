//! Test fixtures and engine helpers.
//!
//! Provides example schemas, an engine wrapper with automatic cleanup and a
//! log sink that records what the engine reported.

use argentdb_codec::{CborSerializer, CodecResult, Serializer, TypeName, Value};
use argentdb_core::{
    Engine, EngineConfig, KeySchema, LogLevel, LogSink, Schema, Store, TableDefinition,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{mpsc, Arc};
use tempfile::TempDir;

/// Table of [`Order`]s in the [`Orders`] schema.
pub const ORDERS_TABLE: &str = "orders";
/// Table of [`Customer`]s in the [`Orders`] schema.
pub const CUSTOMERS_TABLE: &str = "customers";
/// Table of [`Book`]s and [`Album`]s in the [`Catalog`] schema.
pub const PRODUCTS_TABLE: &str = "products";

// === Domain objects ===

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product code.
    pub sku: String,
    /// Quantity ordered.
    pub qty: u32,
}

/// An order, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order number.
    pub id: i64,
    /// Customer code.
    pub customer: String,
    /// Order total in cents.
    pub total_cents: u64,
    /// Ordered lines.
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Type token orders are stored under.
    pub const TYPE: &'static str = "Order";

    /// Creates an order with a single line.
    #[must_use]
    pub fn new(id: i64, customer: &str, total_cents: u64) -> Self {
        Self {
            id,
            customer: customer.to_string(),
            total_cents,
            lines: vec![OrderLine {
                sku: format!("SKU-{id}"),
                qty: 1,
            }],
        }
    }
}

/// A customer, keyed by `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer code.
    pub code: String,
    /// Display name.
    pub name: String,
}

impl Customer {
    /// Type token customers are stored under.
    pub const TYPE: &'static str = "Customer";
}

/// A book in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Product code.
    pub sku: String,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
}

impl Book {
    /// Type token books are stored under.
    pub const TYPE: &'static str = "Book";
}

/// An album in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    /// Product code.
    pub sku: String,
    /// Title.
    pub title: String,
    /// Number of tracks.
    pub tracks: u32,
}

impl Album {
    /// Type token albums are stored under.
    pub const TYPE: &'static str = "Album";
}

// === Schemas ===

/// Orders and customers.
pub struct Orders;

impl Schema for Orders {
    const TYPE_NAME: &'static str = "shop.Orders";

    fn tables() -> Vec<TableDefinition> {
        vec![
            TableDefinition::new(ORDERS_TABLE, KeySchema::integer("id"), Order::TYPE),
            TableDefinition::new(CUSTOMERS_TABLE, KeySchema::text("code"), Customer::TYPE),
        ]
    }
}

/// A product catalog whose table holds several concrete product types.
pub struct Catalog;

impl Schema for Catalog {
    const TYPE_NAME: &'static str = "shop.Catalog";

    fn tables() -> Vec<TableDefinition> {
        vec![
            TableDefinition::new(PRODUCTS_TABLE, KeySchema::text("sku"), "Product")
                .accepting([Book::TYPE, Album::TYPE]),
        ]
    }
}

/// Object store for the [`Orders`] schema.
pub type OrdersStore = Store<Orders>;

/// Object store for the [`Catalog`] schema.
pub type CatalogStore = Store<Catalog>;

// === Engine helpers ===

/// An engine with a capturing log sink and automatic cleanup.
pub struct TestEngine {
    /// The engine.
    pub engine: Engine,
    /// Everything the engine logged.
    pub log: Arc<MemoryLogSink>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// Creates an engine with the default in-memory configuration.
    pub fn memory() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates an engine whose instances default to file drivers in a
    /// fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = EngineConfig::new().file_root(temp_dir.path());
        Self::build(config, Some(temp_dir))
    }

    /// Creates an engine whose instances default to file drivers under
    /// `root`. The directory is not cleaned up.
    pub fn file_at(root: &Path) -> Self {
        Self::build(EngineConfig::new().file_root(root), None)
    }

    fn build(config: EngineConfig, temp_dir: Option<TempDir>) -> Self {
        init_tracing();
        let engine = Engine::new(config);
        let log = Arc::new(MemoryLogSink::new());
        engine.log_manager().register_sink(log.clone());
        Self {
            engine,
            log,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the temporary directory, if file-based.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Registers an [`Orders`] store under `name`.
    pub fn register_orders(&self, name: &str) -> Arc<OrdersStore> {
        self.engine
            .register_database::<OrdersStore>(name, None)
            .expect("Failed to register orders store")
            .downcast::<OrdersStore>()
            .expect("Registered instance should be an orders store")
    }

    /// Registers a [`Catalog`] store under `name`.
    pub fn register_catalog(&self, name: &str) -> Arc<CatalogStore> {
        self.engine
            .register_database::<CatalogStore>(name, None)
            .expect("Failed to register catalog store")
            .downcast::<CatalogStore>()
            .expect("Registered instance should be a catalog store")
    }

    /// Backs up the instance named `name` into memory.
    pub fn backup_bytes(&self, name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        self.engine
            .backup_instance(name, &mut out)
            .expect("Failed to back up instance");
        out
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test with a temporary in-memory engine.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&TestEngine) -> R,
{
    let env = TestEngine::memory();
    f(&env)
}

/// Installs a `tracing` subscriber that honours `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// === Logging ===

/// Log sink that keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLogSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured messages in order.
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().clone()
    }

    /// Messages logged at `level`.
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Returns whether a message at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl LogSink for MemoryLogSink {
    fn write(&self, level: LogLevel, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}

// === Serializers ===

/// CBOR under a different id, claiming every type.
///
/// Registering it after another serializer shows which one the engine
/// picked: streams written with it can only be read by engines that know
/// the `tagged-cbor` id.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedCbor;

impl TaggedCbor {
    /// Identifier recorded in streams.
    pub const ID: &'static str = "tagged-cbor";
}

impl Serializer for TaggedCbor {
    fn id(&self) -> &str {
        Self::ID
    }

    fn can_serialize(&self, _type_name: &TypeName) -> bool {
        true
    }

    fn serialize(&self, type_name: &TypeName, value: &Value) -> CodecResult<Vec<u8>> {
        CborSerializer.serialize(type_name, value)
    }

    fn deserialize(&self, type_name: &TypeName, bytes: &[u8]) -> CodecResult<Value> {
        CborSerializer.deserialize(type_name, bytes)
    }
}

// === Gated streams ===

/// Controls a [`GatedWriter`] or [`GatedReader`] from the test thread.
pub struct GateControl {
    started: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
}

impl GateControl {
    /// Blocks until the stream has been touched for the first time.
    pub fn wait_started(&self) {
        self.started
            .recv()
            .expect("Gated stream dropped before first use");
    }

    /// Lets the first stream call proceed.
    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

struct Gate {
    started: Option<mpsc::Sender<()>>,
    release: mpsc::Receiver<()>,
}

impl Gate {
    fn pass(&mut self) {
        if let Some(started) = self.started.take() {
            let _ = started.send(());
            let _ = self.release.recv();
        }
    }
}

fn gate() -> (Gate, GateControl) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    (
        Gate {
            started: Some(started_tx),
            release: release_rx,
        },
        GateControl {
            started: started_rx,
            release: release_tx,
        },
    )
}

/// A writer whose first call blocks until released.
pub struct GatedWriter<W> {
    inner: W,
    gate: Gate,
}

/// Wraps `inner` in a [`GatedWriter`].
pub fn gated_writer<W: Write>(inner: W) -> (GatedWriter<W>, GateControl) {
    let (gate, control) = gate();
    (GatedWriter { inner, gate }, control)
}

impl<W: Write> Write for GatedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.gate.pass();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A reader whose first call blocks until released.
pub struct GatedReader<R> {
    inner: R,
    gate: Gate,
}

/// Wraps `inner` in a [`GatedReader`].
pub fn gated_reader<R: Read>(inner: R) -> (GatedReader<R>, GateControl) {
    let (gate, control) = gate();
    (GatedReader { inner, gate }, control)
}

impl<R: Read> Read for GatedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.gate.pass();
        self.inner.read(buf)
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use argentdb_core::{Key, ObjectStore};

    /// The three orders used across engine scenarios.
    pub fn sample_orders() -> Vec<Order> {
        vec![
            Order::new(1, "ada", 1_250),
            Order::new(2, "grace", 9_900),
            Order::new(3, "ada", 42),
        ]
    }

    /// Stores `orders` in the orders table.
    pub fn insert_orders(store: &ObjectStore, orders: &[Order]) {
        for order in orders {
            store
                .put_serde(ORDERS_TABLE, order.id, Order::TYPE, order)
                .expect("Failed to put order");
        }
    }

    /// Stores `count` generated orders with ids `1..=count`.
    pub fn populate_orders(store: &ObjectStore, count: usize) -> Vec<Order> {
        let orders: Vec<Order> = (1..=count as i64)
            .map(|id| Order::new(id, &format!("customer-{}", id % 7), id.unsigned_abs() * 100))
            .collect();
        insert_orders(store, &orders);
        orders
    }

    /// Reads every order back, in key order.
    pub fn read_orders(store: &ObjectStore) -> Vec<Order> {
        store
            .keys(ORDERS_TABLE)
            .expect("Failed to list orders")
            .iter()
            .map(|key| {
                store
                    .get_as::<Order>(ORDERS_TABLE, key)
                    .expect("Failed to read order")
                    .expect("Listed order should exist")
            })
            .collect()
    }

    /// Stores one customer.
    pub fn insert_customer(store: &ObjectStore, code: &str, name: &str) {
        let customer = Customer {
            code: code.to_string(),
            name: name.to_string(),
        };
        store
            .put_serde(CUSTOMERS_TABLE, code, Customer::TYPE, &customer)
            .expect("Failed to put customer");
    }

    /// Stores one book and one album.
    pub fn populate_catalog(store: &ObjectStore) -> (Book, Album) {
        let book = Book {
            sku: "B-1".into(),
            title: "Dune".into(),
            author: "Herbert".into(),
        };
        let album = Album {
            sku: "A-1".into(),
            title: "Blue Train".into(),
            tracks: 5,
        };
        store
            .put_serde(PRODUCTS_TABLE, book.sku.as_str(), Book::TYPE, &book)
            .expect("Failed to put book");
        store
            .put_serde(PRODUCTS_TABLE, album.sku.as_str(), Album::TYPE, &album)
            .expect("Failed to put album");
        (book, album)
    }

    /// Type token of the product stored under `sku`.
    pub fn product_type(store: &ObjectStore, sku: &str) -> Option<String> {
        store
            .get(PRODUCTS_TABLE, &Key::from(sku))
            .expect("Failed to read product")
            .map(|object| object.type_name.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_engine() {
        let env = TestEngine::memory();
        let store = env.register_orders("orders");
        assert_eq!(store.count(ORDERS_TABLE).unwrap(), 0);
        assert!(env.path().is_none());
    }

    #[test]
    fn test_with_engine() {
        with_engine(|env| {
            let store = env.register_catalog("catalog");
            scenarios::populate_catalog(&store);
            assert_eq!(scenarios::product_type(&store, "A-1").as_deref(), Some("Album"));
        });
    }

    #[test]
    fn test_populated_scenario() {
        let env = TestEngine::memory();
        let store = env.register_orders("orders");
        let orders = scenarios::populate_orders(&store, 10);
        assert_eq!(scenarios::read_orders(&store), orders);
    }

    #[test]
    fn test_log_sink_captures_registration() {
        let env = TestEngine::memory();
        env.register_orders("orders");
        assert!(env.log.contains(LogLevel::Information, "orders"));
    }

    #[test]
    fn test_gated_writer_blocks_first_write() {
        let (mut writer, control) = gated_writer(Vec::new());
        let handle = std::thread::spawn(move || {
            writer.write_all(b"abc").unwrap();
            writer.inner
        });
        control.wait_started();
        control.release();
        assert_eq!(handle.join().unwrap(), b"abc");
    }
}
