//! In-memory message and profile stores.
//!
//! The message store is a set keyed by event id with a timestamp-sorted
//! view; insert is idempotent. The profile store keeps the latest profile
//! per pubkey, no history.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::nostr::Event;

#[derive(Clone, Debug)]
pub struct MessageRecord {
    pub key: String,
    pub text: String,
    pub sender: String,
    pub timestamp_ms: u64,
    pub event: Event,
}

impl MessageRecord {
    pub fn from_event(key: String, ev: &Event) -> Self {
        Self {
            key,
            text: ev.content.clone(),
            sender: ev.pubkey.clone(),
            timestamp_ms: ev.created_at * 1000,
            event: ev.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MessageStore {
    records: HashMap<String, MessageRecord>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert keyed by `record.key`. Returns false when a record
    /// with that key already exists (the existing record is kept).
    pub fn insert(&mut self, record: MessageRecord) -> bool {
        if self.records.contains_key(&record.key) {
            return false;
        }
        self.records.insert(record.key.clone(), record);
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ascending by timestamp; ties break on the key so the view is stable.
    pub fn sorted(&self) -> Vec<MessageRecord> {
        let mut out: Vec<MessageRecord> = self.records.values().cloned().collect();
        out.sort_by(|a, b| {
            a.timestamp_ms
                .cmp(&b.timestamp_ms)
                .then_with(|| a.key.cmp(&b.key))
        });
        out
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub picture: String,
}

#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: HashMap<String, Profile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins per pubkey.
    pub fn upsert(&mut self, pubkey: &str, profile: Profile) {
        self.profiles.insert(pubkey.to_string(), profile);
    }

    pub fn get(&self, pubkey: &str) -> Option<Profile> {
        self.profiles.get(pubkey).cloned()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageRecord, MessageStore, Profile, ProfileStore};
    use crate::nostr::Event;

    fn event(id: &str, created_at: u64, content: &str) -> Event {
        Event {
            id: id.to_string(),
            pubkey: "pk".to_string(),
            created_at,
            kind: 1,
            tags: vec![],
            content: content.to_string(),
            sig: String::new(),
        }
    }

    #[test]
    fn insert_is_idempotent_by_key() {
        let mut store = MessageStore::new();
        let ev = event("a", 10, "first");
        assert!(store.insert(MessageRecord::from_event("a".to_string(), &ev)));
        let dup = event("a", 10, "second copy");
        assert!(!store.insert(MessageRecord::from_event("a".to_string(), &dup)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.sorted()[0].text, "first");
    }

    #[test]
    fn sorted_view_is_ascending_by_timestamp() {
        let mut store = MessageStore::new();
        for (id, ts) in [("c", 30u64), ("a", 10), ("b", 20)] {
            let ev = event(id, ts, id);
            store.insert(MessageRecord::from_event(id.to_string(), &ev));
        }
        let view = store.sorted();
        let stamps: Vec<u64> = view.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(stamps, vec![10_000, 20_000, 30_000]);
    }

    #[test]
    fn timestamp_is_milliseconds() {
        let ev = event("a", 7, "x");
        let rec = MessageRecord::from_event("a".to_string(), &ev);
        assert_eq!(rec.timestamp_ms, 7_000);
    }

    #[test]
    fn profile_last_write_wins() {
        let mut store = ProfileStore::new();
        store.upsert(
            "pk",
            Profile {
                name: "Alice".to_string(),
                ..Profile::default()
            },
        );
        store.upsert(
            "pk",
            Profile {
                name: "Alice2".to_string(),
                ..Profile::default()
            },
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("pk").expect("profile").name, "Alice2");
    }
}
