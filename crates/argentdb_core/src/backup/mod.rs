//! Backup and restore streams.
//!
//! A backup is a full, point-in-time copy of one instance written to any
//! `std::io::Write`. Restore reads it back from any `std::io::Read` and
//! replaces the instance state as a whole.
//!
//! ## Stream Format (version 1)
//!
//! All integers are little-endian; `str` is a `u32` byte length followed by
//! UTF-8.
//!
//! ```text
//! header : magic "ARGB" | format_version u16 | owner_type str | instance_name str | table_count u32
//! table  : name str | key_field str | key_kind u8 | declared_type str | object_count u64
//! object : type_token str | serializer_id str | key | payload_len u32 | payload
//! key    : kind u8 | key_len u32 | key bytes
//! footer : SHA-256 of every preceding byte (32 bytes)
//! ```
//!
//! Key kinds are `1` integer (`i64` LE), `2` text (UTF-8), `3` bytes and
//! `4` UUID (16 bytes).
//!
//! ## Restore
//!
//! The magic and version are checked before anything else is read, and an
//! unsupported version fails with [`CoreError::Version`](crate::CoreError::Version).
//! Tables are decoded into a shadow snapshot and swapped in only after the
//! footer digest has been verified, so a restore that fails while reading
//! leaves the live instance untouched. A failure inside the final swap (for
//! example a driver refusing the write-through) is logged as possibly
//! partial.

mod format;
mod reader;
mod stream;
mod writer;

pub use format::{
    BackupInfo, BackupReport, RestorePhase, RestoreReport, StreamHeader, BACKUP_MAGIC,
    DIGEST_SIZE, FORMAT_VERSION, SUPPORTED_VERSIONS,
};
pub use reader::RestoreProgress;

pub(crate) use reader::{inspect, read_restore, RestoreOptions, RestoreTarget};
pub(crate) use writer::write_backup;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, CoreResult};
    use crate::instance::{
        DatabaseInstance, InstanceContext, InstanceFactory, InstanceType, RestoreGate,
    };
    use crate::log::LogManager;
    use crate::pipeline::{CodecPipeline, CodecView};
    use crate::store::{Schema, Store};
    use crate::task::CancelToken;
    use crate::log::LogLevel;
    use crate::types::{Key, KeySchema, TableDefinition};
    use argentdb_storage::{Driver, DriverResult, InMemoryDriver};
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    struct Ledger;

    impl Schema for Ledger {
        const TYPE_NAME: &'static str = "test.Ledger";

        fn tables() -> Vec<TableDefinition> {
            vec![
                TableDefinition::new("entries", KeySchema::integer("seq"), "Entry"),
                TableDefinition::new("accounts", KeySchema::text("code"), "Account"),
            ]
        }
    }

    struct Other;

    impl Schema for Other {
        const TYPE_NAME: &'static str = "test.Other";

        fn tables() -> Vec<TableDefinition> {
            vec![TableDefinition::new("entries", KeySchema::integer("seq"), "Entry")]
        }
    }

    fn open<S: Schema>(name: &str) -> Store<S> {
        Store::<S>::create(InstanceContext {
            name: name.into(),
            driver: Box::new(InMemoryDriver::new()),
            log: LogManager::new(),
            gate: RestoreGate::new(name),
            pipeline: CodecPipeline::new(),
            persist_on_write: true,
            max_payload_size: u32::MAX,
        })
        .unwrap()
    }

    const OPTIONS: RestoreOptions = RestoreOptions {
        max_payload_size: u32::MAX,
        verify_digest: true,
    };

    fn backup(store: &Store<Ledger>) -> Vec<u8> {
        let mut out = Vec::new();
        write_backup(
            &mut out,
            InstanceType::of::<Store<Ledger>>(),
            store.name(),
            &store.snapshot().unwrap(),
            &CodecView::default(),
            u32::MAX,
            None,
        )
        .unwrap();
        out
    }

    fn restore<S: Schema>(bytes: &[u8], store: &Store<S>) -> CoreResult<RestoreReport> {
        let target = RestoreTarget {
            owner: InstanceType::of::<Store<S>>(),
            name: store.name(),
            instance: store,
        };
        read_restore(
            bytes,
            &target,
            &CodecView::default(),
            OPTIONS,
            None,
            &RestoreProgress::new(),
            &LogManager::new(),
        )
    }

    #[test]
    fn roundtrip_replaces_state() {
        let source = open::<Ledger>("books");
        for seq in 1..=3 {
            source.put_serde("entries", seq, "Entry", &seq).unwrap();
        }
        source.put_serde("accounts", "cash", "Account", &"Cash").unwrap();
        let bytes = backup(&source);

        let target = open::<Ledger>("copy");
        target.put_serde("entries", 99, "Entry", &0).unwrap();
        let report = restore(&bytes, &target).unwrap();

        assert_eq!(report.objects, 4);
        assert_eq!(report.source_instance, "books");
        assert_eq!(report.phase, RestorePhase::Completed);
        assert_eq!(report.bytes, bytes.len() as u64);
        assert_eq!(
            target.keys("entries").unwrap(),
            vec![Key::from(1), Key::from(2), Key::from(3)]
        );
        assert_eq!(
            target.get_as::<String>("accounts", &Key::from("cash")).unwrap(),
            Some("Cash".to_string())
        );
    }

    #[test]
    fn empty_instance_roundtrips() {
        let bytes = backup(&open::<Ledger>("empty"));
        let target = open::<Ledger>("target");
        target.put_serde("entries", 1, "Entry", &1).unwrap();

        restore(&bytes, &target).unwrap();
        assert_eq!(target.count("entries").unwrap(), 0);
        assert_eq!(target.count("accounts").unwrap(), 0);
    }

    #[test]
    fn owner_type_must_match() {
        let bytes = backup(&open::<Ledger>("books"));
        let other = open::<Other>("other");
        assert!(matches!(
            restore(&bytes, &other),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_stream_leaves_target_untouched() {
        let source = open::<Ledger>("books");
        source.put_serde("entries", 1, "Entry", &"payload").unwrap();
        let mut bytes = backup(&source);
        let last_body_byte = bytes.len() - DIGEST_SIZE - 1;
        bytes[last_body_byte] ^= 0x01;

        let target = open::<Ledger>("target");
        target.put_serde("entries", 5, "Entry", &5).unwrap();
        let result = restore(&bytes, &target);

        assert!(result.is_err());
        assert_eq!(target.keys("entries").unwrap(), vec![Key::from(5)]);
    }

    /// Accepts reads but refuses every table write.
    struct ReadOnlyDisk(InMemoryDriver);

    impl Driver for ReadOnlyDisk {
        fn name(&self) -> &'static str {
            "read-only"
        }

        fn open(&mut self, instance: &str) -> DriverResult<()> {
            self.0.open(instance)
        }

        fn is_open(&self) -> bool {
            self.0.is_open()
        }

        fn read_table(&self, table: &str) -> DriverResult<Option<Vec<u8>>> {
            self.0.read_table(table)
        }

        fn write_table(&mut self, _table: &str, _data: &[u8]) -> DriverResult<()> {
            Err(io::Error::other("disk is read-only").into())
        }

        fn remove_table(&mut self, table: &str) -> DriverResult<()> {
            self.0.remove_table(table)
        }

        fn list_tables(&self) -> DriverResult<Vec<String>> {
            self.0.list_tables()
        }

        fn flush(&mut self) -> DriverResult<()> {
            self.0.flush()
        }

        fn close(&mut self) -> DriverResult<()> {
            self.0.close()
        }
    }

    #[test]
    fn failed_write_through_is_reported_as_partial() {
        let source = open::<Ledger>("books");
        source.put_serde("entries", 1, "Entry", &1).unwrap();
        let bytes = backup(&source);

        let target = Store::<Ledger>::create(InstanceContext {
            name: "mirror".into(),
            driver: Box::new(ReadOnlyDisk(InMemoryDriver::new())),
            log: LogManager::new(),
            gate: RestoreGate::new("mirror"),
            pipeline: CodecPipeline::new(),
            persist_on_write: true,
            max_payload_size: u32::MAX,
        })
        .unwrap();

        let log = LogManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        log.register_sink(Arc::new(move |level: LogLevel, msg: &str| {
            sink_seen.lock().push((level, msg.to_string()));
        }));
        let progress = RestoreProgress::new();
        let result = read_restore(
            bytes.as_slice(),
            &RestoreTarget {
                owner: InstanceType::of::<Store<Ledger>>(),
                name: "mirror",
                instance: &target,
            },
            &CodecView::default(),
            OPTIONS,
            None,
            &progress,
            &log,
        );

        assert!(matches!(result, Err(CoreError::Storage(_))));
        assert!(matches!(progress.phase(), RestorePhase::Failed(_)));
        assert_eq!(target.count("entries").unwrap(), 1);
        assert!(seen
            .lock()
            .iter()
            .any(|(level, msg)| *level == LogLevel::Error && msg.contains("may be partly live")));
    }

    #[test]
    fn inspect_reads_headers() {
        let source = open::<Ledger>("books");
        source.put_serde("entries", 1, "Entry", &1).unwrap();
        let bytes = backup(&source);

        let info = inspect(bytes.as_slice(), u32::MAX).unwrap();
        assert_eq!(info.header.owner_type, "test.Ledger");
        assert_eq!(info.header.instance_name, "books");
        assert_eq!(info.tables.len(), 2);
        assert_eq!(info.object_count(), 1);
        assert!(info.digest_valid);
    }

    #[test]
    fn cancelled_backup_fails() {
        let store = open::<Ledger>("books");
        let token = CancelToken::new();
        token.cancel();
        let result = write_backup(
            Vec::new(),
            InstanceType::of::<Store<Ledger>>(),
            "books",
            &store.snapshot().unwrap(),
            &CodecView::default(),
            u32::MAX,
            Some(token),
        );
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }
}
