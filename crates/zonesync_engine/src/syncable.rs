//! Model conversion contract and the record type registry.

use crate::error::{SyncError, SyncResult};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use zonesync_protocol::{Record, RecordId, SystemFields, ZoneId};

/// Where a model's record is built.
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    /// Zone the record belongs to.
    pub zone_id: &'a ZoneId,
    /// Directory for payloads too large to inline.
    pub asset_staging_dir: &'a Path,
}

impl RecordContext<'_> {
    /// Returns the record id for a model id.
    pub fn record_id(&self, id: &str) -> RecordId {
        RecordId::new(id, self.zone_id.clone())
    }
}

/// A model type that can be synchronized.
///
/// # Example
///
/// ```rust,ignore
/// impl Syncable for Note {
///     const RECORD_TYPE: &'static str = "Note";
///
///     fn id(&self) -> &str { &self.id }
///     fn sync_metadata(&self) -> Option<&SystemFields> { self.metadata.as_ref() }
///     fn set_sync_metadata(&mut self, m: Option<SystemFields>) { self.metadata = m; }
///
///     fn to_record(&self, ctx: &RecordContext<'_>) -> SyncResult<Record> {
///         let mut record = Record::with_system_fields(
///             Self::RECORD_TYPE,
///             ctx.record_id(&self.id),
///             self.metadata.clone(),
///         );
///         record.set("title", self.title.as_str());
///         Ok(record)
///     }
///
///     fn from_record(record: &Record) -> SyncResult<Self> { ... }
/// }
/// ```
pub trait Syncable: Clone + Send + Sync + 'static {
    /// Record type tag, unique per model type.
    const RECORD_TYPE: &'static str;

    /// Stable model id, used as the record name.
    fn id(&self) -> &str;

    /// System fields of the last successful upload, `None` if never synced.
    fn sync_metadata(&self) -> Option<&SystemFields>;

    /// Replaces the sync metadata.
    fn set_sync_metadata(&mut self, metadata: Option<SystemFields>);

    /// Builds the record for this model.
    ///
    /// Models that were uploaded before must carry their metadata into the
    /// record (see [`Record::with_system_fields`]).
    fn to_record(&self, ctx: &RecordContext<'_>) -> SyncResult<Record>;

    /// Builds a model from a fetched record. The record's system fields
    /// should become the model's sync metadata.
    fn from_record(record: &Record) -> SyncResult<Self>;

    /// Merges two colliding snapshots into the record to resubmit.
    ///
    /// The default keeps the server copy and overwrites it with every
    /// field of the client copy.
    fn resolve_conflict(client: &Record, server: &Record) -> Record {
        client_wins(client, server)
    }
}

/// Conflict resolution that keeps the server record and applies every client
/// field on top of it.
pub fn client_wins(client: &Record, server: &Record) -> Record {
    let mut merged = server.clone();
    merged.merge_fields_from(client);
    merged
}

/// Conflict resolution that keeps the server record unchanged.
pub fn server_wins(_client: &Record, server: &Record) -> Record {
    server.clone()
}

/// Object-safe view of a [`Syncable`] model.
pub trait SyncModel: Send + Sync {
    /// Record type tag.
    fn record_type(&self) -> &'static str;
    /// Model id.
    fn id(&self) -> &str;
    /// Sync metadata.
    fn sync_metadata(&self) -> Option<&SystemFields>;
    /// Replaces the sync metadata.
    fn set_sync_metadata(&mut self, metadata: Option<SystemFields>);
    /// Builds the record for this model.
    fn to_record(&self, ctx: &RecordContext<'_>) -> SyncResult<Record>;
    /// Clones into a new box.
    fn clone_box(&self) -> Box<dyn SyncModel>;
    /// Borrows as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Converts into `Any` for downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Syncable> SyncModel for T {
    fn record_type(&self) -> &'static str {
        T::RECORD_TYPE
    }

    fn id(&self) -> &str {
        Syncable::id(self)
    }

    fn sync_metadata(&self) -> Option<&SystemFields> {
        Syncable::sync_metadata(self)
    }

    fn set_sync_metadata(&mut self, metadata: Option<SystemFields>) {
        Syncable::set_sync_metadata(self, metadata);
    }

    fn to_record(&self, ctx: &RecordContext<'_>) -> SyncResult<Record> {
        Syncable::to_record(self, ctx)
    }

    fn clone_box(&self) -> Box<dyn SyncModel> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl dyn SyncModel {
    /// Borrows the concrete model.
    pub fn downcast_ref<T: Syncable>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Unboxes the concrete model.
    pub fn downcast<T: Syncable>(self: Box<Self>) -> Option<T> {
        self.into_any().downcast::<T>().ok().map(|model| *model)
    }
}

impl Clone for Box<dyn SyncModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl fmt::Debug for dyn SyncModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncModel")
            .field("record_type", &self.record_type())
            .field("id", &self.id())
            .field("synced", &self.sync_metadata().is_some())
            .finish()
    }
}

/// Models grouped by record type.
pub type ModelsByType = HashMap<String, Vec<Box<dyn SyncModel>>>;

/// Type-erased decoder and resolver of one record type.
pub trait RecordCodec: Send + Sync {
    /// Builds a model from a record.
    fn decode(&self, record: &Record) -> SyncResult<Box<dyn SyncModel>>;

    /// Resolves a conflict between two snapshots.
    fn resolve_conflict(&self, client: &Record, server: &Record) -> Record;
}

struct TypedCodec<T>(PhantomData<fn() -> T>);

impl<T: Syncable> RecordCodec for TypedCodec<T> {
    fn decode(&self, record: &Record) -> SyncResult<Box<dyn SyncModel>> {
        Ok(Box::new(T::from_record(record)?))
    }

    fn resolve_conflict(&self, client: &Record, server: &Record) -> Record {
        T::resolve_conflict(client, server)
    }
}

/// Maps record type tags to their codecs.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    codecs: BTreeMap<String, Arc<dyn RecordCodec>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under [`Syncable::RECORD_TYPE`], replacing any earlier
    /// registration of that tag.
    pub fn register<T: Syncable>(&mut self) {
        self.codecs.insert(
            T::RECORD_TYPE.to_string(),
            Arc::new(TypedCodec::<T>(PhantomData)),
        );
    }

    /// Registered record types, sorted.
    pub fn record_types(&self) -> Vec<String> {
        self.codecs.keys().cloned().collect()
    }

    /// Returns true if `record_type` is registered.
    pub fn contains(&self, record_type: &str) -> bool {
        self.codecs.contains_key(record_type)
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Returns the codec of `record_type`.
    pub fn codec(&self, record_type: &str) -> SyncResult<Arc<dyn RecordCodec>> {
        self.codecs
            .get(record_type)
            .cloned()
            .ok_or_else(|| SyncError::UnregisteredRecordType(record_type.to_string()))
    }

    /// Decodes a record with its registered codec.
    pub fn decode(&self, record: &Record) -> SyncResult<Box<dyn SyncModel>> {
        self.codec(&record.record_type)?.decode(record)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.codecs.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag {
        id: String,
        label: String,
        metadata: Option<SystemFields>,
    }

    impl Syncable for Tag {
        const RECORD_TYPE: &'static str = "Tag";

        fn id(&self) -> &str {
            &self.id
        }

        fn sync_metadata(&self) -> Option<&SystemFields> {
            self.metadata.as_ref()
        }

        fn set_sync_metadata(&mut self, metadata: Option<SystemFields>) {
            self.metadata = metadata;
        }

        fn to_record(&self, ctx: &RecordContext<'_>) -> SyncResult<Record> {
            let mut record = Record::with_system_fields(
                Self::RECORD_TYPE,
                ctx.record_id(&self.id),
                self.metadata.clone(),
            );
            record.set("label", self.label.as_str());
            Ok(record)
        }

        fn from_record(record: &Record) -> SyncResult<Self> {
            let label = record.get_string("label").ok_or_else(|| {
                SyncError::decode(Self::RECORD_TYPE, record.record_name(), "missing label")
            })?;
            Ok(Self {
                id: record.record_name().to_string(),
                label: label.to_string(),
                metadata: record.system_fields().cloned(),
            })
        }
    }

    fn tag(id: &str, label: &str) -> Tag {
        Tag {
            id: id.into(),
            label: label.into(),
            metadata: None,
        }
    }

    fn zone() -> ZoneId {
        ZoneId::new("Notes", None)
    }

    #[test]
    fn registry_decodes_registered_types() {
        let mut registry = TypeRegistry::new();
        registry.register::<Tag>();
        assert_eq!(registry.record_types(), vec!["Tag".to_string()]);

        let zone = zone();
        let dir = std::env::temp_dir();
        let ctx = RecordContext {
            zone_id: &zone,
            asset_staging_dir: &dir,
        };
        let mut record = Syncable::to_record(&tag("t1", "work"), &ctx).unwrap();
        record.set_system_fields(Some(SystemFields::from_bytes(vec![1])));

        let model = registry.decode(&record).unwrap();
        assert_eq!(model.record_type(), "Tag");
        assert_eq!(model.id(), "t1");
        assert!(model.sync_metadata().is_some());

        let tag = model.downcast::<Tag>().unwrap();
        assert_eq!(tag.label, "work");
    }

    #[test]
    fn unknown_type_is_reported() {
        let registry = TypeRegistry::new();
        let record = Record::new("Photo", RecordId::new("p1", zone()));
        assert!(matches!(
            registry.decode(&record),
            Err(SyncError::UnregisteredRecordType(t)) if t == "Photo"
        ));
    }

    #[test]
    fn decode_failure_is_typed() {
        let mut registry = TypeRegistry::new();
        registry.register::<Tag>();
        let record = Record::new("Tag", RecordId::new("t1", zone()));
        assert!(matches!(registry.decode(&record), Err(SyncError::Decode { .. })));
    }

    #[test]
    fn default_resolver_prefers_client_fields() {
        let fields = SystemFields::from_bytes(vec![9]);
        let mut server =
            Record::with_system_fields("Tag", RecordId::new("t1", zone()), Some(fields.clone()));
        server.set("label", "server");
        server.set("color", "red");
        let mut client = Record::new("Tag", RecordId::new("t1", zone()));
        client.set("label", "client");

        let mut registry = TypeRegistry::new();
        registry.register::<Tag>();
        let merged = registry
            .codec("Tag")
            .unwrap()
            .resolve_conflict(&client, &server);

        assert_eq!(merged.get_string("label"), Some("client"));
        assert_eq!(merged.get_string("color"), Some("red"));
        assert_eq!(merged.system_fields(), Some(&fields));

        // Same inputs, same output
        assert_eq!(merged, Tag::resolve_conflict(&client, &server));
        assert_eq!(server_wins(&client, &server), server);
    }

    #[test]
    fn boxed_models_clone_and_downcast() {
        let model: Box<dyn SyncModel> = Box::new(tag("t1", "home"));
        let copy = model.clone();
        assert_eq!(copy.downcast_ref::<Tag>().unwrap().label, "home");
        assert!(format!("{:?}", model).contains("t1"));
    }
}
