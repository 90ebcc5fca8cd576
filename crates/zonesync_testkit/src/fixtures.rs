//! Test models.
//!
//! `Note` keeps the default client-wins resolver and carries an optional
//! attachment that becomes an asset when large. `Folder` resolves conflicts
//! in favor of the server.

use zonesync_engine::{server_wins, RecordContext, SyncError, SyncModel, SyncResult, Syncable};
use zonesync_protocol::{Record, SystemFields};

const ATTACHMENT_INLINE: &str = "attachment";
const ATTACHMENT_ASSET: &str = "attachmentAsset";

/// A note.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Model id.
    pub id: String,
    /// Title.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Optional binary attachment.
    pub attachment: Option<Vec<u8>>,
    /// Sync metadata.
    pub metadata: Option<SystemFields>,
}

impl Note {
    /// Creates an unsynced note with an empty body.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: String::new(),
            attachment: None,
            metadata: None,
        }
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the attachment.
    pub fn with_attachment(mut self, data: Vec<u8>) -> Self {
        self.attachment = Some(data);
        self
    }

    /// Boxes the note for the engine's erased APIs.
    pub fn boxed(self) -> Box<dyn SyncModel> {
        Box::new(self)
    }
}

impl Syncable for Note {
    const RECORD_TYPE: &'static str = "Note";

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
        record.set("title", self.title.as_str());
        record.set("body", self.body.as_str());
        if let Some(data) = &self.attachment {
            record.set_payload(
                ATTACHMENT_INLINE,
                ATTACHMENT_ASSET,
                data.clone(),
                ctx.asset_staging_dir,
            )?;
        }
        Ok(record)
    }

    fn from_record(record: &Record) -> SyncResult<Self> {
        let title = record.get_string("title").ok_or_else(|| {
            SyncError::decode(Self::RECORD_TYPE, record.record_name(), "missing title")
        })?;
        Ok(Self {
            id: record.record_name().to_string(),
            title: title.to_string(),
            body: record.get_string("body").unwrap_or_default().to_string(),
            attachment: record.payload(ATTACHMENT_INLINE, ATTACHMENT_ASSET)?,
            metadata: record.system_fields().cloned(),
        })
    }
}

/// A folder of notes.
#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    /// Model id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Sync metadata.
    pub metadata: Option<SystemFields>,
}

impl Folder {
    /// Creates an unsynced folder.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metadata: None,
        }
    }

    /// Boxes the folder for the engine's erased APIs.
    pub fn boxed(self) -> Box<dyn SyncModel> {
        Box::new(self)
    }
}

impl Syncable for Folder {
    const RECORD_TYPE: &'static str = "Folder";

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
        record.set("name", self.name.as_str());
        Ok(record)
    }

    fn from_record(record: &Record) -> SyncResult<Self> {
        let name = record.get_string("name").ok_or_else(|| {
            SyncError::decode(Self::RECORD_TYPE, record.record_name(), "missing name")
        })?;
        Ok(Self {
            id: record.record_name().to_string(),
            name: name.to_string(),
            metadata: record.system_fields().cloned(),
        })
    }

    fn resolve_conflict(client: &Record, server: &Record) -> Record {
        server_wins(client, server)
    }
}
