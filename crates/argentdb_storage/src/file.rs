//! File-based storage driver for persistent instances.
//!
//! Layout under the driver root:
//!
//! ```text
//! <root>/
//! └─ <instance dir>/
//!    ├─ LOCK            # Advisory lock held while the driver is open
//!    ├─ <table>.tbl     # One blob per table
//!    └─ <table>.tbl.tmp # Transient, used for atomic replacement
//! ```
//!
//! Instance names made only of `[A-Za-z0-9_.-]` (not starting with `.`, at
//! most 128 bytes) are used as the directory name unchanged. Any other name
//! is percent-encoded, or replaced by `%%` and the hex SHA-256 of the name
//! when the encoding would be longer than 128 bytes. See
//! [`FileDriver::instance_dir_name`].

use crate::driver::{validate_table_name, Driver, MAX_NAME_LEN};
use crate::error::{DriverError, DriverResult};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const TABLE_EXT: &str = "tbl";
const TEMP_EXT: &str = "tbl.tmp";

/// Per-instance state held while the driver is open.
#[derive(Debug)]
struct OpenDir {
    instance: String,
    path: PathBuf,
    /// Held for exclusive access; released on drop.
    _lock: File,
}

/// A file-based storage driver.
///
/// Each instance gets its own directory under the root. The directory is
/// locked with an OS advisory lock while the driver is open, so two drivers
/// (in this or another process) can never own the same instance storage.
///
/// # Durability
///
/// `write_table` writes to a temporary file, syncs it and renames it over the
/// table file, so a crash leaves either the old or the new blob.
///
/// # Example
///
/// ```no_run
/// use argentdb_storage::{Driver, FileDriver};
/// use std::path::Path;
///
/// let mut driver = FileDriver::new(Path::new("data"));
/// driver.open("orders").unwrap();
/// driver.write_table("orders", b"persistent").unwrap();
/// driver.close().unwrap();
/// ```
#[derive(Debug)]
pub struct FileDriver {
    root: PathBuf,
    dir: Option<OpenDir>,
}

impl FileDriver {
    /// Creates a driver rooted at `root`. Nothing is touched until `open`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            dir: None,
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the instance directory, if open.
    #[must_use]
    pub fn instance_dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path.as_path())
    }

    fn open_dir(&self) -> DriverResult<&Path> {
        self.dir
            .as_ref()
            .map(|d| d.path.as_path())
            .ok_or(DriverError::NotOpen)
    }

    /// Directory name used for `instance` under the root.
    ///
    /// Distinct instance names always map to distinct directory names, and
    /// the result never contains a path separator or starts with `.`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidName`] for an empty name.
    pub fn instance_dir_name(instance: &str) -> DriverResult<String> {
        if instance.is_empty() {
            return Err(DriverError::InvalidName {
                name: String::new(),
                reason: "name is empty",
            });
        }
        if validate_table_name(instance).is_ok() {
            return Ok(instance.to_string());
        }

        let mut encoded = String::with_capacity(instance.len() * 3);
        for byte in instance.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-') {
                encoded.push(char::from(byte));
            } else {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }
        if encoded.len() <= MAX_NAME_LEN {
            return Ok(encoded);
        }

        let mut hashed = String::from("%%");
        for byte in Sha256::digest(instance.as_bytes()) {
            let _ = write!(hashed, "{byte:02x}");
        }
        Ok(hashed)
    }

    fn table_path(dir: &Path, table: &str) -> PathBuf {
        dir.join(format!("{table}.{TABLE_EXT}"))
    }
}

impl Driver for FileDriver {
    fn name(&self) -> &'static str {
        "file"
    }

    fn open(&mut self, instance: &str) -> DriverResult<()> {
        if let Some(dir) = &self.dir {
            return Err(DriverError::AlreadyOpen {
                instance: dir.instance.clone(),
            });
        }

        let path = self.root.join(Self::instance_dir_name(instance)?);
        fs::create_dir_all(&path)?;

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(DriverError::Locked { path });
        }

        debug!(instance, path = %path.display(), "file driver opened");
        self.dir = Some(OpenDir {
            instance: instance.to_string(),
            path,
            _lock: lock,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.dir.is_some()
    }

    fn read_table(&self, table: &str) -> DriverResult<Option<Vec<u8>>> {
        let dir = self.open_dir()?;
        validate_table_name(table)?;
        match fs::read(Self::table_path(dir, table)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_table(&mut self, table: &str, data: &[u8]) -> DriverResult<()> {
        let dir = self.open_dir()?;
        validate_table_name(table)?;

        let final_path = Self::table_path(dir, table);
        let temp_path = dir.join(format!("{table}.{TEMP_EXT}"));
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &final_path)?;
        Ok(())
    }

    fn remove_table(&mut self, table: &str) -> DriverResult<()> {
        let dir = self.open_dir()?;
        validate_table_name(table)?;
        match fs::remove_file(Self::table_path(dir, table)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_tables(&self) -> DriverResult<Vec<String>> {
        let dir = self.open_dir()?;
        let suffix = format!(".{TABLE_EXT}");
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(table) = file_name.strip_suffix(&suffix) {
                names.push(table.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn flush(&mut self) -> DriverResult<()> {
        let dir = self.open_dir()?;
        // Table files are synced on write; sync the directory entry renames.
        #[cfg(unix)]
        File::open(dir)?.sync_all()?;
        #[cfg(not(unix))]
        let _ = dir;
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.dir.is_some() {
            self.flush()?;
        }
        if let Some(dir) = self.dir.take() {
            debug!(path = %dir.path.display(), "file driver closed");
        }
        Ok(())
    }
}
