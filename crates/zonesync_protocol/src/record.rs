//! Remote record model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Owner name that resolves to the currently authenticated user.
pub const CURRENT_USER_OWNER: &str = "__defaultOwner__";

/// Payloads larger than this many bytes are stored as an [`Asset`]
/// instead of an inline [`FieldValue::Bytes`].
pub const INLINE_BYTES_LIMIT: usize = 1_000_000;

/// Identifies a zone (logical partition) of the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId {
    /// Zone name.
    pub zone_name: String,
    /// Owner of the zone.
    pub owner_name: String,
}

impl ZoneId {
    /// Creates a zone id, falling back to the current user when no owner is given.
    pub fn new(zone_name: impl Into<String>, owner_name: Option<String>) -> Self {
        Self {
            zone_name: zone_name.into(),
            owner_name: owner_name.unwrap_or_else(|| CURRENT_USER_OWNER.to_string()),
        }
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_name, self.zone_name)
    }
}

/// Identifies a record inside a zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    /// Record name, equal to the model id.
    pub record_name: String,
    /// Zone the record lives in.
    pub zone_id: ZoneId,
}

impl RecordId {
    /// Creates a record id.
    pub fn new(record_name: impl Into<String>, zone_id: ZoneId) -> Self {
        Self {
            record_name: record_name.into(),
            zone_id,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone_id, self.record_name)
    }
}

/// Provider-encoded system fields of a saved record.
///
/// The bytes are opaque to the engine; two snapshots are the same version
/// of a record exactly when their bytes are equal.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SystemFields(Vec<u8>);

impl SystemFields {
    /// Wraps provider bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the wrapper and returns the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for SystemFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemFields({} bytes)", self.0.len())
    }
}

/// What happens to a record when the record it references is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceAction {
    /// Nothing.
    None,
    /// The referencing record is deleted too.
    DeleteSelf,
}

/// A reference from one record to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced record.
    pub record_id: RecordId,
    /// Cascade behavior.
    pub action: ReferenceAction,
}

/// A blob transferred out-of-band and referenced from a record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Local file holding the blob.
    pub file_path: PathBuf,
}

impl Asset {
    /// Creates an asset backed by an existing file.
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    /// Reads the blob.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.file_path)
    }
}

/// A typed record field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// UTF-8 text.
    String(String),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// Inline bytes (at most [`INLINE_BYTES_LIMIT`]).
    Bytes(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// Reference to another record.
    Reference(Reference),
    /// Out-of-band blob.
    Asset(Asset),
    /// Homogeneous list.
    List(Vec<FieldValue>),
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

/// A record as exchanged with the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identity.
    pub id: RecordId,
    /// Record type tag, one per model type.
    pub record_type: String,
    fields: BTreeMap<String, FieldValue>,
    system_fields: Option<SystemFields>,
}

impl Record {
    /// Creates an empty record that has never been saved.
    pub fn new(record_type: impl Into<String>, id: RecordId) -> Self {
        Self {
            id,
            record_type: record_type.into(),
            fields: BTreeMap::new(),
            system_fields: None,
        }
    }

    /// Creates an empty record carrying previously saved system fields.
    ///
    /// Models that have been uploaded before must pass their metadata here,
    /// otherwise the store treats the save as a create and reports a conflict.
    pub fn with_system_fields(
        record_type: impl Into<String>,
        id: RecordId,
        system_fields: Option<SystemFields>,
    ) -> Self {
        Self {
            id,
            record_type: record_type.into(),
            fields: BTreeMap::new(),
            system_fields,
        }
    }

    /// Returns the record name.
    pub fn record_name(&self) -> &str {
        &self.id.record_name
    }

    /// Returns the system fields, if the record has been saved.
    pub fn system_fields(&self) -> Option<&SystemFields> {
        self.system_fields.as_ref()
    }

    /// Replaces the system fields. Used by stores when saving.
    pub fn set_system_fields(&mut self, system_fields: Option<SystemFields>) {
        self.system_fields = system_fields;
    }

    /// Returns a field.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Sets a field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Removes a field.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    /// Iterates over field names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns all fields.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Returns a string field.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns an integer field.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.fields.get(key) {
            Some(FieldValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns a timestamp field in milliseconds.
    pub fn get_timestamp(&self, key: &str) -> Option<i64> {
        match self.fields.get(key) {
            Some(FieldValue::Timestamp(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns an inline bytes field.
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        match self.fields.get(key) {
            Some(FieldValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    /// Copies every field of `other` over this record, keeping this record's
    /// identity and system fields.
    pub fn merge_fields_from(&mut self, other: &Record) {
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Stores a payload inline under `inline_key` or, when it exceeds
    /// [`INLINE_BYTES_LIMIT`], writes it to `staging_dir` and stores an
    /// [`Asset`] under `asset_key`. Only one of the two keys is set.
    pub fn set_payload(
        &mut self,
        inline_key: &str,
        asset_key: &str,
        data: Vec<u8>,
        staging_dir: &Path,
    ) -> io::Result<()> {
        if data.len() > INLINE_BYTES_LIMIT {
            fs::create_dir_all(staging_dir)?;
            let path = staging_dir.join(uuid::Uuid::new_v4().to_string());
            fs::write(&path, &data)?;
            self.fields.remove(inline_key);
            self.fields
                .insert(asset_key.to_string(), FieldValue::Asset(Asset::new(path)));
        } else {
            self.fields.remove(asset_key);
            self.fields
                .insert(inline_key.to_string(), FieldValue::Bytes(data));
        }
        Ok(())
    }

    /// Reads a payload written by [`Record::set_payload`], preferring the asset.
    pub fn payload(&self, inline_key: &str, asset_key: &str) -> io::Result<Option<Vec<u8>>> {
        if let Some(FieldValue::Asset(asset)) = self.fields.get(asset_key) {
            return asset.read().map(Some);
        }
        Ok(self.get_bytes(inline_key).map(<[u8]>::to_vec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_id(name: &str) -> RecordId {
        RecordId::new(name, ZoneId::new("Notes", None))
    }

    #[test]
    fn zone_defaults_to_current_user() {
        let zone = ZoneId::new("Notes", None);
        assert_eq!(zone.owner_name, CURRENT_USER_OWNER);

        let zone = ZoneId::new("Notes", Some("alice".into()));
        assert_eq!(zone.owner_name, "alice");
    }

    #[test]
    fn typed_field_accessors() {
        let mut record = Record::new("Note", record_id("n1"));
        record.set("title", "hello");
        record.set("count", 3i64);
        record.set("created", FieldValue::Timestamp(1_700_000_000_000));

        assert_eq!(record.get_string("title"), Some("hello"));
        assert_eq!(record.get_int("count"), Some(3));
        assert_eq!(record.get_timestamp("created"), Some(1_700_000_000_000));
        assert_eq!(record.get_string("count"), None);
        assert!(record.system_fields().is_none());
    }

    #[test]
    fn small_payload_stays_inline() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = Record::new("Note", record_id("n1"));
        record
            .set_payload("data", "asset", vec![7u8; 16], dir.path())
            .unwrap();

        assert!(matches!(record.get("data"), Some(FieldValue::Bytes(_))));
        assert!(record.get("asset").is_none());
        assert_eq!(
            record.payload("data", "asset").unwrap(),
            Some(vec![7u8; 16])
        );
    }

    #[test]
    fn large_payload_becomes_asset() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![1u8; INLINE_BYTES_LIMIT + 1];
        let mut record = Record::new("Note", record_id("n1"));
        record
            .set_payload("data", "asset", data.clone(), dir.path())
            .unwrap();

        assert!(record.get("data").is_none());
        assert!(matches!(record.get("asset"), Some(FieldValue::Asset(_))));
        assert_eq!(record.payload("data", "asset").unwrap(), Some(data));
    }

    #[test]
    fn payload_at_limit_is_inline() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = Record::new("Note", record_id("n1"));
        record
            .set_payload("data", "asset", vec![0u8; INLINE_BYTES_LIMIT], dir.path())
            .unwrap();
        assert!(matches!(record.get("data"), Some(FieldValue::Bytes(_))));
    }

    #[test]
    fn merge_keeps_identity_and_system_fields() {
        let fields = SystemFields::from_bytes(vec![1, 2, 3]);
        let mut server =
            Record::with_system_fields("Note", record_id("n1"), Some(fields.clone()));
        server.set("title", "server");
        server.set("pinned", true);

        let mut client = Record::new("Note", record_id("n1"));
        client.set("title", "client");

        server.merge_fields_from(&client);
        assert_eq!(server.get_string("title"), Some("client"));
        assert_eq!(server.get("pinned"), Some(&FieldValue::Bool(true)));
        assert_eq!(server.system_fields(), Some(&fields));
    }
}
