//! Stream header and reports.

use crate::error::{CoreError, CoreResult};
use crate::frame::{
    read_array, read_str, read_u16, read_u32, write_all, write_str, write_u16, write_u32,
    TableHeader,
};
use std::fmt;
use std::io::{Read, Write};

/// Magic bytes opening every backup stream.
pub const BACKUP_MAGIC: [u8; 4] = *b"ARGB";
/// Format version written by this build.
pub const FORMAT_VERSION: u16 = 1;
/// Format versions this build can restore.
pub const SUPPORTED_VERSIONS: &[u16] = &[FORMAT_VERSION];
/// Size of the SHA-256 footer.
pub const DIGEST_SIZE: usize = 32;

/// Header of a backup stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Format version of the stream.
    pub format_version: u16,
    /// Owner-type id of the instance that was backed up.
    pub owner_type: String,
    /// Name of the instance that was backed up.
    pub instance_name: String,
    /// Number of tables that follow.
    pub table_count: u32,
}

impl StreamHeader {
    pub(crate) fn write_to<W: Write>(&self, w: &mut W) -> CoreResult<()> {
        write_all(w, &BACKUP_MAGIC)?;
        write_u16(w, self.format_version)?;
        write_str(w, &self.owner_type, "owner type")?;
        write_str(w, &self.instance_name, "instance name")?;
        write_u32(w, self.table_count)
    }

    /// Reads and validates magic and version before anything else.
    pub(crate) fn read_from<R: Read>(r: &mut R) -> CoreResult<Self> {
        let magic: [u8; 4] = read_array(r)?;
        if magic != BACKUP_MAGIC {
            return Err(CoreError::invalid_format("not an ArgentDB backup stream"));
        }
        let format_version = read_u16(r)?;
        if !SUPPORTED_VERSIONS.contains(&format_version) {
            return Err(CoreError::Version {
                found: format_version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }
        Ok(Self {
            format_version,
            owner_type: read_str(r, "owner type")?,
            instance_name: read_str(r, "instance name")?,
            table_count: read_u32(r)?,
        })
    }
}

/// Outcome of a finished backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Instance that was backed up.
    pub instance: String,
    /// Owner-type id written into the stream.
    pub owner_type: String,
    /// Tables written.
    pub tables: usize,
    /// Objects written.
    pub objects: u64,
    /// Bytes written, footer included.
    pub bytes: u64,
}

/// Where a restore is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RestorePhase {
    /// Not started.
    #[default]
    Idle,
    /// Reading and checking the stream header.
    ValidatingHeader,
    /// Decoding tables into the shadow state.
    StreamingTables,
    /// The restored state is live.
    Completed,
    /// The restore stopped. The live instance is unchanged unless applying
    /// the decoded state was what failed.
    Failed(String),
}

impl RestorePhase {
    /// Returns whether the phase is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::ValidatingHeader => f.write_str("validating header"),
            Self::StreamingTables => f.write_str("streaming tables"),
            Self::Completed => f.write_str("completed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome of a finished restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Instance that was restored.
    pub instance: String,
    /// Instance name recorded in the stream.
    pub source_instance: String,
    /// Tables restored.
    pub tables: usize,
    /// Objects restored.
    pub objects: u64,
    /// Stream tables with no counterpart in the instance.
    pub skipped_tables: Vec<String>,
    /// Bytes read, footer included.
    pub bytes: u64,
    /// Final phase.
    pub phase: RestorePhase,
}

/// Summary of a backup stream, read without restoring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    /// The stream header.
    pub header: StreamHeader,
    /// Header of each table, in stream order.
    pub tables: Vec<TableHeader>,
    /// Bytes read, footer included.
    pub bytes: u64,
    /// Whether the footer digest matches the content.
    pub digest_valid: bool,
}

impl BackupInfo {
    /// Total number of objects across tables.
    #[must_use]
    pub fn object_count(&self) -> u64 {
        self.tables.iter().map(|t| t.object_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> StreamHeader {
        StreamHeader {
            format_version: FORMAT_VERSION,
            owner_type: "shop.Orders".into(),
            instance_name: "orders".into(),
            table_count: 2,
        }
    }

    #[test]
    fn header_layout_is_fixed() {
        let mut buf = Vec::new();
        header().write_to(&mut buf).unwrap();

        assert_eq!(&buf[..4], b"ARGB");
        assert_eq!(&buf[4..6], &1u16.to_le_bytes());
        assert_eq!(&buf[6..10], &11u32.to_le_bytes());
        assert_eq!(&buf[10..21], b"shop.Orders");
        assert_eq!(StreamHeader::read_from(&mut buf.as_slice()).unwrap(), header());
    }

    #[test]
    fn unknown_version_fails_before_body() {
        let mut buf = Vec::new();
        header().write_to(&mut buf).unwrap();
        buf[4..6].copy_from_slice(&9u16.to_le_bytes());
        buf.truncate(6);

        assert!(matches!(
            StreamHeader::read_from(&mut buf.as_slice()),
            Err(CoreError::Version { found: 9, .. })
        ));
    }

    #[test]
    fn bad_magic_is_invalid_format() {
        assert!(matches!(
            StreamHeader::read_from(&mut &b"ENDB\x01\x00"[..]),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn phase_display() {
        assert_eq!(RestorePhase::StreamingTables.to_string(), "streaming tables");
        assert!(RestorePhase::Failed("x".into()).is_terminal());
        assert!(!RestorePhase::Idle.is_terminal());
    }
}
