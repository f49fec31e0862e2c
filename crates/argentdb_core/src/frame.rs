//! Binary framing of tables and objects.
//!
//! The same framing is used for table blobs handed to drivers and for the
//! table section of backup streams. All integers are little-endian; strings
//! are a `u32` byte length followed by UTF-8.
//!
//! ```text
//! table  : name str | key_field str | key_kind u8 | declared_type str | object_count u64
//! object : type_token str | serializer_id str | key | payload_len u32 | payload
//! key    : kind u8 | key_len u32 | key bytes
//! ```

use crate::error::{CoreError, CoreResult};
use crate::pipeline::CodecView;
use crate::snapshot::{TableObjects, TableSnapshot};
use crate::types::{Key, KeyKind, KeySchema, StoredObject, TableDefinition};
use argentdb_codec::TypeName;
use std::io::{Read, Write};

/// Longest name, type token or serializer id that can be framed.
pub const MAX_STR_LEN: u32 = 64 * 1024;

/// Longest encoded key that can be framed.
pub const MAX_KEY_LEN: u32 = 64 * 1024;

pub(crate) fn write_all<W: Write>(w: &mut W, bytes: &[u8]) -> CoreResult<()> {
    w.write_all(bytes).map_err(CoreError::from_io)
}

pub(crate) fn write_u8<W: Write>(w: &mut W, v: u8) -> CoreResult<()> {
    write_all(w, &[v])
}

pub(crate) fn write_u16<W: Write>(w: &mut W, v: u16) -> CoreResult<()> {
    write_all(w, &v.to_le_bytes())
}

pub(crate) fn write_u32<W: Write>(w: &mut W, v: u32) -> CoreResult<()> {
    write_all(w, &v.to_le_bytes())
}

pub(crate) fn write_u64<W: Write>(w: &mut W, v: u64) -> CoreResult<()> {
    write_all(w, &v.to_le_bytes())
}

/// Fails if `len` bytes of `what` would be rejected by a reader limited to
/// `max`.
pub(crate) fn check_len(len: usize, max: u32, what: &str) -> CoreResult<u32> {
    match u32::try_from(len) {
        Ok(len) if len <= max => Ok(len),
        _ => Err(CoreError::invalid_operation(format!(
            "{what} length {len} exceeds limit {max}"
        ))),
    }
}

pub(crate) fn write_bytes<W: Write>(
    w: &mut W,
    bytes: &[u8],
    max: u32,
    what: &str,
) -> CoreResult<()> {
    write_u32(w, check_len(bytes.len(), max, what)?)?;
    write_all(w, bytes)
}

pub(crate) fn write_str<W: Write>(w: &mut W, s: &str, what: &str) -> CoreResult<()> {
    write_bytes(w, s.as_bytes(), MAX_STR_LEN, what)
}

pub(crate) fn read_array<R: Read, const N: usize>(r: &mut R) -> CoreResult<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(CoreError::from_io)?;
    Ok(buf)
}

pub(crate) fn read_u8<R: Read>(r: &mut R) -> CoreResult<u8> {
    Ok(read_array::<R, 1>(r)?[0])
}

pub(crate) fn read_u16<R: Read>(r: &mut R) -> CoreResult<u16> {
    read_array(r).map(u16::from_le_bytes)
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> CoreResult<u32> {
    read_array(r).map(u32::from_le_bytes)
}

pub(crate) fn read_u64<R: Read>(r: &mut R) -> CoreResult<u64> {
    read_array(r).map(u64::from_le_bytes)
}

pub(crate) fn read_bytes<R: Read>(r: &mut R, max: u32, what: &str) -> CoreResult<Vec<u8>> {
    let len = read_u32(r)?;
    if len > max {
        return Err(CoreError::invalid_format(format!(
            "{what} length {len} exceeds limit {max}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).map_err(CoreError::from_io)?;
    Ok(buf)
}

pub(crate) fn read_str<R: Read>(r: &mut R, what: &str) -> CoreResult<String> {
    let bytes = read_bytes(r, MAX_STR_LEN, what)?;
    String::from_utf8(bytes).map_err(|_| CoreError::invalid_format(format!("{what} is not UTF-8")))
}

fn write_key<W: Write>(w: &mut W, key: &Key) -> CoreResult<()> {
    write_u8(w, key.kind().tag())?;
    write_bytes(w, &key.to_bytes(), MAX_KEY_LEN, "key")
}

fn read_key<R: Read>(r: &mut R) -> CoreResult<Key> {
    let tag = read_u8(r)?;
    let kind = KeyKind::from_tag(tag)
        .ok_or_else(|| CoreError::invalid_format(format!("unknown key kind {tag}")))?;
    let body = read_bytes(r, MAX_KEY_LEN, "key")?;
    Key::from_bytes(kind, &body)
        .ok_or_else(|| CoreError::invalid_format(format!("malformed {kind} key")))
}

/// Framed header of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader {
    /// Table name.
    pub name: String,
    /// Key schema the table was written with.
    pub key: KeySchema,
    /// Declared type the table was written with.
    pub declared_type: TypeName,
    /// Number of object records that follow.
    pub object_count: u64,
}

impl TableHeader {
    pub(crate) fn for_snapshot(snapshot: &TableSnapshot) -> Self {
        Self {
            name: snapshot.definition.name.clone(),
            key: snapshot.definition.key.clone(),
            declared_type: snapshot.definition.declared_type.clone(),
            object_count: snapshot.len() as u64,
        }
    }

    pub(crate) fn write_to<W: Write>(&self, w: &mut W) -> CoreResult<()> {
        write_str(w, &self.name, "table name")?;
        write_str(w, &self.key.field, "key field")?;
        write_u8(w, self.key.kind.tag())?;
        write_str(w, self.declared_type.as_str(), "declared type")?;
        write_u64(w, self.object_count)
    }

    pub(crate) fn read_from<R: Read>(r: &mut R) -> CoreResult<Self> {
        let name = read_str(r, "table name")?;
        let field = read_str(r, "key field")?;
        let tag = read_u8(r)?;
        let kind = KeyKind::from_tag(tag).ok_or_else(|| {
            CoreError::invalid_format(format!("table '{name}' has unknown key kind {tag}"))
        })?;
        let declared_type = TypeName::new(read_str(r, "declared type")?);
        let object_count = read_u64(r)?;
        Ok(Self {
            name,
            key: KeySchema::new(field, kind),
            declared_type,
            object_count,
        })
    }
}

/// Framed record of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ObjectRecord {
    pub type_token: String,
    pub serializer_id: String,
    pub key: Key,
    pub payload: Vec<u8>,
}

impl ObjectRecord {
    pub(crate) fn encode(object: &StoredObject, view: &CodecView) -> CoreResult<Self> {
        let encoded = view.encode(object)?;
        Ok(Self {
            type_token: object.type_name.as_str().to_string(),
            serializer_id: encoded.serializer_id,
            key: object.key.clone(),
            payload: encoded.bytes,
        })
    }

    pub(crate) fn write_to<W: Write>(&self, w: &mut W, max_payload: u32) -> CoreResult<()> {
        write_str(w, &self.type_token, "type token")?;
        write_str(w, &self.serializer_id, "serializer id")?;
        write_key(w, &self.key)?;
        write_bytes(w, &self.payload, max_payload, "payload")
    }

    pub(crate) fn read_from<R: Read>(r: &mut R, max_payload: u32) -> CoreResult<Self> {
        let type_token = read_str(r, "type token")?;
        let serializer_id = read_str(r, "serializer id")?;
        let key = read_key(r)?;
        let payload = read_bytes(r, max_payload, "payload")?;
        Ok(Self {
            type_token,
            serializer_id,
            key,
            payload,
        })
    }
}

/// Writes one table: header, then every object in key order.
///
/// Fails before writing a record that a reader limited to `max_payload`
/// would reject.
pub(crate) fn write_table<W: Write>(
    w: &mut W,
    snapshot: &TableSnapshot,
    view: &CodecView,
    max_payload: u32,
) -> CoreResult<u64> {
    TableHeader::for_snapshot(snapshot).write_to(w)?;
    let mut written = 0u64;
    for object in snapshot.objects.values() {
        ObjectRecord::encode(object, view)?.write_to(w, max_payload)?;
        written += 1;
    }
    Ok(written)
}

/// Reads the objects following `header`.
///
/// With a `target` definition the objects are decoded into it. Without one
/// the records are consumed and dropped, and `None` is returned.
pub(crate) fn read_table_body<R: Read>(
    r: &mut R,
    header: &TableHeader,
    target: Option<&TableDefinition>,
    view: &CodecView,
    max_payload: u32,
) -> CoreResult<Option<TableObjects>> {
    if let Some(def) = target {
        if def.key.kind != header.key.kind {
            return Err(CoreError::invalid_format(format!(
                "table '{}' is keyed by {} but data is keyed by {}",
                def.name, def.key.kind, header.key.kind
            )));
        }
    }

    let mut objects = TableObjects::new();
    for _ in 0..header.object_count {
        let record = ObjectRecord::read_from(r, max_payload)?;
        if record.key.kind() != header.key.kind {
            return Err(CoreError::invalid_format(format!(
                "object key {} in table '{}' is not a {} key",
                record.key, header.name, header.key.kind
            )));
        }
        let Some(def) = target else {
            continue;
        };
        let (type_name, value) =
            view.decode(def, &record.type_token, &record.serializer_id, &record.payload)?;
        let key = record.key;
        if objects.contains_key(&key) {
            return Err(CoreError::invalid_format(format!(
                "duplicate key {key} in table '{}'",
                def.name
            )));
        }
        objects.insert(
            key.clone(),
            StoredObject {
                key,
                type_name,
                value,
            },
        );
    }
    Ok(target.map(|_| objects))
}

/// Encodes a table into a driver blob.
pub(crate) fn encode_table(
    snapshot: &TableSnapshot,
    view: &CodecView,
    max_payload: u32,
) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_table(&mut buf, snapshot, view, max_payload)?;
    Ok(buf)
}

/// Decodes a driver blob written by [`encode_table`] into `definition`.
pub(crate) fn decode_table(
    definition: &TableDefinition,
    mut bytes: &[u8],
    view: &CodecView,
    max_payload: u32,
) -> CoreResult<TableObjects> {
    let header = TableHeader::read_from(&mut bytes)?;
    if header.name != definition.name {
        return Err(CoreError::invalid_format(format!(
            "blob holds table '{}', expected '{}'",
            header.name, definition.name
        )));
    }
    let objects = read_table_body(&mut bytes, &header, Some(definition), view, max_payload)?
        .unwrap_or_default();
    if !bytes.is_empty() {
        return Err(CoreError::invalid_format(format!(
            "{} trailing bytes after table '{}'",
            bytes.len(),
            definition.name
        )));
    }
    Ok(objects)
}
