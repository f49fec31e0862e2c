//! Writing backup streams.

use super::format::{BackupReport, StreamHeader, FORMAT_VERSION};
use super::stream::StreamWriter;
use crate::error::{CoreError, CoreResult};
use crate::frame::write_table;
use crate::instance::InstanceType;
use crate::pipeline::CodecView;
use crate::snapshot::InstanceSnapshot;
use crate::task::CancelToken;
use std::io::Write;

/// Streams `snapshot` of instance `name` into `writer`.
///
/// The snapshot is already isolated from the live instance, so nothing here
/// takes a lock. Payloads over `max_payload` fail the backup, since a restore
/// with the same limit would reject them.
pub(crate) fn write_backup<W: Write>(
    writer: W,
    owner: InstanceType,
    name: &str,
    snapshot: &InstanceSnapshot,
    view: &CodecView,
    max_payload: u32,
    cancel: Option<CancelToken>,
) -> CoreResult<BackupReport> {
    let table_count = u32::try_from(snapshot.tables.len())
        .map_err(|_| CoreError::invalid_operation("too many tables for one backup"))?;
    let mut out = StreamWriter::new(writer, cancel);

    StreamHeader {
        format_version: FORMAT_VERSION,
        owner_type: owner.name().to_string(),
        instance_name: name.to_string(),
        table_count,
    }
    .write_to(&mut out)?;

    let mut objects = 0u64;
    for table in &snapshot.tables {
        objects += write_table(&mut out, table, view, max_payload)?;
    }
    let bytes = out.finish()?;

    Ok(BackupReport {
        instance: name.to_string(),
        owner_type: owner.name().to_string(),
        tables: snapshot.tables.len(),
        objects,
        bytes,
    })
}
