//! Core type definitions for ArgentDB.

use argentdb_codec::{TypeName, Value};
use std::fmt;
use uuid::Uuid;

/// The kind of key a table is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyKind {
    /// Signed 64-bit integer keys.
    Integer,
    /// UTF-8 text keys.
    Text,
    /// Raw byte keys.
    Bytes,
    /// UUID keys.
    Uuid,
}

impl KeyKind {
    /// Stable tag used in encoded tables and streams.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Integer => 1,
            Self::Text => 2,
            Self::Bytes => 3,
            Self::Uuid => 4,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Integer),
            2 => Some(Self::Text),
            3 => Some(Self::Bytes),
            4 => Some(Self::Uuid),
            _ => None,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Uuid => "uuid",
        })
    }
}

/// The key of one object within its table.
///
/// Keys of one kind order naturally; the derived order across kinds is only
/// used to keep maps total and never mixes within a table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Integer key.
    Integer(i64),
    /// Text key.
    Text(String),
    /// Byte key.
    Bytes(Vec<u8>),
    /// UUID key.
    Uuid(Uuid),
}

impl Key {
    /// Returns the kind of this key.
    #[must_use]
    pub const fn kind(&self) -> KeyKind {
        match self {
            Self::Integer(_) => KeyKind::Integer,
            Self::Text(_) => KeyKind::Text,
            Self::Bytes(_) => KeyKind::Bytes,
            Self::Uuid(_) => KeyKind::Uuid,
        }
    }

    /// Encodes the key body (without its kind tag).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Integer(n) => n.to_le_bytes().to_vec(),
            Self::Text(s) => s.as_bytes().to_vec(),
            Self::Bytes(b) => b.clone(),
            Self::Uuid(u) => u.as_bytes().to_vec(),
        }
    }

    /// Decodes a key body of the given kind.
    ///
    /// Returns `None` if the bytes are not a valid body for `kind`.
    #[must_use]
    pub fn from_bytes(kind: KeyKind, bytes: &[u8]) -> Option<Self> {
        match kind {
            KeyKind::Integer => <[u8; 8]>::try_from(bytes)
                .ok()
                .map(|b| Self::Integer(i64::from_le_bytes(b))),
            KeyKind::Text => std::str::from_utf8(bytes)
                .ok()
                .map(|s| Self::Text(s.to_string())),
            KeyKind::Bytes => Some(Self::Bytes(bytes.to_vec())),
            KeyKind::Uuid => Uuid::from_slice(bytes).ok().map(Self::Uuid),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Uuid> for Key {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// Describes how a table is keyed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeySchema {
    /// Name of the key field, informational.
    pub field: String,
    /// Kind every key of the table must have.
    pub kind: KeyKind,
}

impl KeySchema {
    /// Creates a key schema.
    #[must_use]
    pub fn new(field: impl Into<String>, kind: KeyKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    /// Integer-keyed schema.
    #[must_use]
    pub fn integer(field: impl Into<String>) -> Self {
        Self::new(field, KeyKind::Integer)
    }

    /// Text-keyed schema.
    #[must_use]
    pub fn text(field: impl Into<String>) -> Self {
        Self::new(field, KeyKind::Text)
    }

    /// UUID-keyed schema.
    #[must_use]
    pub fn uuid(field: impl Into<String>) -> Self {
        Self::new(field, KeyKind::Uuid)
    }
}

/// The definition of one table of an instance.
///
/// `declared_type` is the type a table is declared to hold; it may be
/// abstract, in which case `accepted_types` lists the concrete types that
/// can actually be loaded into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    /// Table name, unique within its instance.
    pub name: String,
    /// Key schema.
    pub key: KeySchema,
    /// Declared object type.
    pub declared_type: TypeName,
    /// Concrete loadable types; empty means only `declared_type`.
    pub accepted_types: Vec<TypeName>,
}

impl TableDefinition {
    /// Defines a table holding objects of exactly `declared_type`.
    #[must_use]
    pub fn new(name: impl Into<String>, key: KeySchema, declared_type: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            key,
            declared_type: declared_type.into(),
            accepted_types: Vec::new(),
        }
    }

    /// Sets the concrete types the table accepts.
    #[must_use]
    pub fn accepting<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeName>,
    {
        self.accepted_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Returns whether objects of `type_name` can be loaded into this table.
    #[must_use]
    pub fn accepts(&self, type_name: &str) -> bool {
        if self.accepted_types.is_empty() {
            self.declared_type == type_name
        } else {
            self.accepted_types.iter().any(|t| t == type_name)
        }
    }
}

/// One object as held by a table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// The object key.
    pub key: Key,
    /// The concrete object type.
    pub type_name: TypeName,
    /// The object value.
    pub value: Value,
}

impl StoredObject {
    /// Creates a stored object.
    #[must_use]
    pub fn new(key: impl Into<Key>, type_name: impl Into<TypeName>, value: Value) -> Self {
        Self {
            key: key.into(),
            type_name: type_name.into(),
            value,
        }
    }
}
