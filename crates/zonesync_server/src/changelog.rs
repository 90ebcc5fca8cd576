//! Per-zone change log and the encodings of tokens and system fields.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use zonesync_protocol::{ChangeToken, SystemFields};

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Saved,
    Deleted,
}

/// One entry of a zone's change log.
#[derive(Debug, Clone)]
pub(crate) struct ChangeEntry {
    pub seq: u64,
    pub record_name: String,
    pub record_type: String,
    pub kind: ChangeKind,
}

/// Change log of one zone.
///
/// Entries are kept in commit order. Only the newest entry of each record is
/// reported by [`ZoneLog::page_since`]; older entries still advance the
/// cursor so pages stay contiguous.
#[derive(Debug, Default)]
pub(crate) struct ZoneLog {
    entries: Vec<ChangeEntry>,
    latest: HashMap<String, u64>,
    next_seq: u64,
}

impl ZoneLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            latest: HashMap::new(),
            next_seq: 1,
        }
    }

    /// Appends an entry and returns its sequence number.
    pub fn append(&mut self, record_name: &str, record_type: &str, kind: ChangeKind) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(ChangeEntry {
            seq,
            record_name: record_name.to_string(),
            record_type: record_type.to_string(),
            kind,
        });
        self.latest.insert(record_name.to_string(), seq);
        seq
    }

    /// Highest sequence number issued so far.
    pub fn cursor(&self) -> u64 {
        self.next_seq - 1
    }

    /// Returns up to `limit` entries after `since`, keeping only the newest
    /// entry per record, plus the cursor after the page and whether more
    /// entries follow.
    pub fn page_since(&self, since: u64, limit: usize) -> (Vec<ChangeEntry>, u64, bool) {
        let start = self.entries.partition_point(|e| e.seq <= since);
        let end = (start + limit).min(self.entries.len());
        let window = &self.entries[start..end];

        let cursor = window.last().map_or(since, |e| e.seq);
        let visible = window
            .iter()
            .filter(|e| self.latest.get(&e.record_name) == Some(&e.seq))
            .cloned()
            .collect();
        (visible, cursor, end < self.entries.len())
    }
}

#[derive(Serialize, Deserialize)]
struct TokenBody {
    epoch: u64,
    seq: u64,
}

/// Encodes a change token for `seq` in `epoch`.
pub(crate) fn encode_token(epoch: u64, seq: u64) -> StoreResult<ChangeToken> {
    let mut bytes = Vec::new();
    ciborium::into_writer(&TokenBody { epoch, seq }, &mut bytes)
        .map_err(|e| StoreError::malformed("change token", e))?;
    Ok(ChangeToken::from_bytes(bytes))
}

/// Decodes a change token, rejecting tokens from another epoch.
pub(crate) fn decode_token(token: &ChangeToken, epoch: u64) -> StoreResult<u64> {
    let body: TokenBody = ciborium::from_reader(token.as_bytes())
        .map_err(|e| StoreError::malformed("change token", e))?;
    if body.epoch != epoch {
        return Err(StoreError::TokenExpired);
    }
    Ok(body.seq)
}

/// Server-side version of a saved record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RecordMeta {
    pub record_name: String,
    pub change_tag: u64,
}

impl RecordMeta {
    pub fn encode(&self) -> StoreResult<SystemFields> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| StoreError::malformed("system fields", e))?;
        Ok(SystemFields::from_bytes(bytes))
    }

    pub fn decode(fields: &SystemFields) -> StoreResult<Self> {
        ciborium::from_reader(fields.as_bytes())
            .map_err(|e| StoreError::malformed("system fields", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_contiguous() {
        let mut log = ZoneLog::new();
        for i in 0..5 {
            log.append(&format!("r{i}"), "Note", ChangeKind::Saved);
        }

        let (page, cursor, more) = log.page_since(0, 2);
        assert_eq!(page.len(), 2);
        assert_eq!(cursor, 2);
        assert!(more);

        let (page, cursor, more) = log.page_since(cursor, 2);
        assert_eq!(page[0].record_name, "r2");
        assert_eq!(cursor, 4);
        assert!(more);

        let (page, cursor, more) = log.page_since(cursor, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(cursor, 5);
        assert!(!more);
    }

    #[test]
    fn superseded_entries_are_hidden() {
        let mut log = ZoneLog::new();
        log.append("a", "Note", ChangeKind::Saved);
        log.append("b", "Note", ChangeKind::Saved);
        log.append("a", "Note", ChangeKind::Deleted);

        let (page, cursor, more) = log.page_since(0, 10);
        assert_eq!(cursor, 3);
        assert!(!more);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].record_name, "b");
        assert_eq!(page[1].kind, ChangeKind::Deleted);
    }

    #[test]
    fn empty_page_keeps_cursor() {
        let log = ZoneLog::new();
        let (page, cursor, more) = log.page_since(0, 10);
        assert!(page.is_empty());
        assert_eq!(cursor, 0);
        assert!(!more);
    }

    #[test]
    fn tokens_from_old_epoch_expire() {
        let token = encode_token(1, 42).unwrap();
        assert_eq!(decode_token(&token, 1).unwrap(), 42);
        assert!(matches!(decode_token(&token, 2), Err(StoreError::TokenExpired)));

        let garbage = ChangeToken::from_bytes(vec![0xff, 0x00]);
        assert!(matches!(
            decode_token(&garbage, 1),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn record_meta_round_trips() {
        let meta = RecordMeta {
            record_name: "n1".into(),
            change_tag: 7,
        };
        let fields = meta.encode().unwrap();
        assert_eq!(RecordMeta::decode(&fields).unwrap(), meta);
    }
}
