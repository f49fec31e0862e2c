//! Reading backup streams.

use super::format::{BackupInfo, RestorePhase, RestoreReport, StreamHeader};
use super::stream::StreamReader;
use crate::error::{CoreError, CoreResult};
use crate::frame::{read_table_body, TableHeader};
use crate::instance::{DatabaseInstance, InstanceType};
use crate::log::LogManager;
use crate::pipeline::CodecView;
use crate::snapshot::{InstanceSnapshot, TableObjects, TableSnapshot};
use crate::task::CancelToken;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

/// Shared view of the phase a restore is in.
#[derive(Debug, Clone, Default)]
pub struct RestoreProgress {
    phase: Arc<Mutex<RestorePhase>>,
}

impl RestoreProgress {
    /// Creates a tracker in [`RestorePhase::Idle`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> RestorePhase {
        self.phase.lock().clone()
    }

    fn set(&self, phase: RestorePhase) {
        *self.phase.lock() = phase;
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RestoreOptions {
    pub max_payload_size: u32,
    pub verify_digest: bool,
}

/// The instance a restore writes into.
pub(crate) struct RestoreTarget<'a> {
    pub owner: InstanceType,
    pub name: &'a str,
    pub instance: &'a dyn DatabaseInstance,
}

/// Restores `reader` into `target`.
///
/// The stream is decoded into a shadow snapshot; the live instance is only
/// touched by the final `replace`, after the digest has been checked. If
/// that `replace` fails, the instance may already hold some or all of the
/// restored state.
pub(crate) fn read_restore<R: Read>(
    reader: R,
    target: &RestoreTarget<'_>,
    view: &CodecView,
    options: RestoreOptions,
    cancel: Option<CancelToken>,
    progress: &RestoreProgress,
    log: &LogManager,
) -> CoreResult<RestoreReport> {
    match run(reader, target, view, options, cancel, progress, log) {
        Ok(report) => {
            progress.set(RestorePhase::Completed);
            Ok(RestoreReport {
                phase: RestorePhase::Completed,
                ..report
            })
        }
        Err(e) => {
            let during = progress.phase();
            progress.set(RestorePhase::Failed(e.to_string()));
            log.error(format!(
                "Restore of '{}' failed while {during}: {e}",
                target.name
            ));
            Err(e)
        }
    }
}

fn run<R: Read>(
    reader: R,
    target: &RestoreTarget<'_>,
    view: &CodecView,
    options: RestoreOptions,
    cancel: Option<CancelToken>,
    progress: &RestoreProgress,
    log: &LogManager,
) -> CoreResult<RestoreReport> {
    progress.set(RestorePhase::ValidatingHeader);
    let mut input = StreamReader::new(reader, cancel);
    let header = StreamHeader::read_from(&mut input)?;
    if header.owner_type != target.owner.name() {
        return Err(CoreError::type_mismatch(
            target.owner.name(),
            header.owner_type,
        ));
    }
    if header.instance_name != target.name {
        log.info(format!(
            "Restoring backup of '{}' into '{}'",
            header.instance_name, target.name
        ));
    }

    progress.set(RestorePhase::StreamingTables);
    let definitions = target.instance.list_tables();
    let mut restored: HashMap<String, TableObjects> = HashMap::new();
    let mut skipped = Vec::new();
    let mut objects = 0u64;

    for _ in 0..header.table_count {
        let table = TableHeader::read_from(&mut input)?;
        if restored.contains_key(&table.name) || skipped.contains(&table.name) {
            return Err(CoreError::invalid_format(format!(
                "table '{}' appears twice in stream",
                table.name
            )));
        }
        let def = definitions.iter().find(|d| d.name == table.name);
        match read_table_body(&mut input, &table, def, view, options.max_payload_size)? {
            Some(body) => {
                objects += body.len() as u64;
                restored.insert(table.name, body);
            }
            None => {
                log.warn(format!(
                    "Skipping table '{}' ({} objects): not defined by '{}'",
                    table.name, table.object_count, target.name
                ));
                skipped.push(table.name);
            }
        }
    }

    let (digest_valid, bytes) = input.finish()?;
    if !digest_valid {
        if options.verify_digest {
            return Err(CoreError::ChecksumMismatch);
        }
        log.warn(format!("Backup digest mismatch ignored for '{}'", target.name));
    }

    let tables = restored.len();
    let shadow = InstanceSnapshot::new(
        definitions
            .into_iter()
            .map(|def| {
                let body = restored.remove(&def.name).unwrap_or_default();
                TableSnapshot::new(def, body)
            })
            .collect(),
    );
    if let Err(e) = target.instance.replace(shadow) {
        log.error(format!(
            "Restored state of '{}' may be partly live: applying it failed: {e}",
            target.name
        ));
        return Err(e);
    }

    Ok(RestoreReport {
        instance: target.name.to_string(),
        source_instance: header.instance_name,
        tables,
        objects,
        skipped_tables: skipped,
        bytes,
        phase: RestorePhase::StreamingTables,
    })
}

/// Reads a whole stream without decoding payloads.
pub(crate) fn inspect<R: Read>(reader: R, max_payload_size: u32) -> CoreResult<BackupInfo> {
    let mut input = StreamReader::new(reader, None);
    let header = StreamHeader::read_from(&mut input)?;
    let view = CodecView::default();
    let mut tables = Vec::new();
    for _ in 0..header.table_count {
        let table = TableHeader::read_from(&mut input)?;
        read_table_body(&mut input, &table, None, &view, max_payload_size)?;
        tables.push(table);
    }
    let (digest_valid, bytes) = input.finish()?;
    Ok(BackupInfo {
        header,
        tables,
        bytes,
        digest_valid,
    })
}
