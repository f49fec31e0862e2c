//! Encrypted storage driver wrapper.
//!
//! Wraps any other driver and encrypts every table blob at rest with
//! AES-256-GCM.
//!
//! ## Security Model
//!
//! - Each table write is encrypted independently with a fresh random nonce
//! - Blob structure: `nonce (12 bytes) || ciphertext || tag (16 bytes)`
//! - The table name is bound as associated data, so a blob copied under a
//!   different table name fails authentication
//! - Keys are never stored; the application supplies them

use crate::driver::Driver;
use crate::error::{DriverError, DriverResult};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// HKDF info string for passphrase-derived keys.
const KDF_INFO: &[u8] = b"argentdb-driver-key-v1";

/// Encryption key for the encrypted driver.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> DriverResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(DriverError::Encryption(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a key from high-entropy key material with HKDF-SHA256.
    ///
    /// HKDF is not a password hash; feed it a generated passphrase or a
    /// secret from a key store, not a user-chosen password.
    ///
    /// # Errors
    ///
    /// Returns an error if HKDF expansion fails.
    pub fn derive(secret: &[u8], salt: &[u8]) -> DriverResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), secret);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(KDF_INFO, &mut bytes)
            .map_err(|_| DriverError::Encryption("HKDF expand failed".to_string()))?;
        Ok(Self { bytes })
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A driver that encrypts table blobs before handing them to an inner driver.
///
/// # Example
///
/// ```rust
/// use argentdb_storage::{Driver, EncryptedDriver, EncryptionKey, InMemoryDriver};
///
/// let key = EncryptionKey::generate();
/// let mut driver = EncryptedDriver::new(Box::new(InMemoryDriver::new()), key);
/// driver.open("vault").unwrap();
/// driver.write_table("secrets", b"plaintext").unwrap();
/// assert_eq!(driver.read_table("secrets").unwrap().unwrap(), b"plaintext");
/// ```
pub struct EncryptedDriver {
    inner: Box<dyn Driver>,
    cipher: Aes256Gcm,
}

impl EncryptedDriver {
    /// Wraps `inner`, encrypting with `key`.
    #[must_use]
    pub fn new(inner: Box<dyn Driver>, key: EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { inner, cipher }
    }

    /// Returns the wrapped driver.
    #[must_use]
    pub fn inner(&self) -> &dyn Driver {
        self.inner.as_ref()
    }

    fn encrypt(&self, table: &str, plaintext: &[u8]) -> DriverResult<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: table.as_bytes(),
                },
            )
            .map_err(|_| DriverError::Encryption("encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn decrypt(&self, table: &str, blob: &[u8]) -> DriverResult<Vec<u8>> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(DriverError::Encryption("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: table.as_bytes(),
                },
            )
            .map_err(|_| DriverError::Encryption("authentication failed".to_string()))
    }
}

impl Driver for EncryptedDriver {
    fn name(&self) -> &'static str {
        "encrypted"
    }

    fn open(&mut self, instance: &str) -> DriverResult<()> {
        self.inner.open(instance)
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn read_table(&self, table: &str) -> DriverResult<Option<Vec<u8>>> {
        match self.inner.read_table(table)? {
            Some(blob) => Ok(Some(self.decrypt(table, &blob)?)),
            None => Ok(None),
        }
    }

    fn write_table(&mut self, table: &str, data: &[u8]) -> DriverResult<()> {
        let blob = self.encrypt(table, data)?;
        self.inner.write_table(table, &blob)
    }

    fn remove_table(&mut self, table: &str) -> DriverResult<()> {
        self.inner.remove_table(table)
    }

    fn list_tables(&self) -> DriverResult<Vec<String>> {
        self.inner.list_tables()
    }

    fn flush(&mut self) -> DriverResult<()> {
        self.inner.flush()
    }

    fn close(&mut self) -> DriverResult<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryDriver;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn open_with(key: EncryptionKey, tables: BTreeMap<String, Vec<u8>>) -> EncryptedDriver {
        let mut driver =
            EncryptedDriver::new(Box::new(InMemoryDriver::with_tables(tables)), key);
        driver.open("vault").unwrap();
        driver
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::from_bytes(&[0x42u8; KEY_SIZE]).unwrap();
        let mut driver = open_with(key, BTreeMap::new());

        driver.write_table("t", b"Hello, encrypted world!").unwrap();
        assert_eq!(
            driver.read_table("t").unwrap().unwrap(),
            b"Hello, encrypted world!"
        );
    }

    #[test]
    fn stored_blob_is_not_plaintext() {
        let key = EncryptionKey::generate();
        let driver = open_with(key.clone(), BTreeMap::new());
        let blob = driver.encrypt("t", b"Secret data").unwrap();

        assert_eq!(blob.len(), NONCE_SIZE + b"Secret data".len() + TAG_SIZE);
        assert!(!blob.windows(6).any(|w| w == b"Secret"));
    }

    #[test]
    fn tampered_blob_fails() {
        let key = EncryptionKey::generate();
        let driver = open_with(key, BTreeMap::new());
        let mut blob = driver.encrypt("t", b"Secret data").unwrap();
        blob[NONCE_SIZE + 1] ^= 0xFF;

        assert!(matches!(
            driver.decrypt("t", &blob),
            Err(DriverError::Encryption(_))
        ));
    }

    #[test]
    fn blob_is_bound_to_table_name() {
        let key = EncryptionKey::generate();
        let driver = open_with(key, BTreeMap::new());
        let blob = driver.encrypt("a", b"Secret data").unwrap();

        assert!(driver.decrypt("b", &blob).is_err());
    }

    #[test]
    fn different_keys_fail() {
        let writer_key = EncryptionKey::from_bytes(&[0x42u8; KEY_SIZE]).unwrap();
        let writer = open_with(writer_key, BTreeMap::new());
        let blob = writer.encrypt("t", b"Secret data").unwrap();

        let mut tables = BTreeMap::new();
        tables.insert("t".to_string(), blob);
        let reader_key = EncryptionKey::from_bytes(&[0x43u8; KEY_SIZE]).unwrap();
        let reader = open_with(reader_key, tables);

        assert!(reader.read_table("t").is_err());
    }

    #[test]
    fn derived_keys_are_deterministic() {
        let a = EncryptionKey::derive(b"passphrase material", b"salt").unwrap();
        let b = EncryptionKey::derive(b"passphrase material", b"salt").unwrap();
        let c = EncryptionKey::derive(b"passphrase material", b"other").unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn invalid_key_size_rejected() {
        assert!(EncryptionKey::from_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let key = EncryptionKey::generate();
        assert!(format!("{key:?}").contains("REDACTED"));
    }

    proptest! {
        #[test]
        fn any_blob_roundtrips(
            table in "[a-z][a-z0-9_]{0,15}",
            plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
            key_bytes in any::<[u8; KEY_SIZE]>(),
        ) {
            let key = EncryptionKey::from_bytes(&key_bytes).unwrap();
            let mut driver = open_with(key, BTreeMap::new());
            driver.write_table(&table, &plaintext).unwrap();
            prop_assert_eq!(driver.read_table(&table).unwrap(), Some(plaintext.clone()));

            let blob = driver.encrypt(&table, &plaintext).unwrap();
            prop_assert_eq!(blob.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
        }
    }
}
