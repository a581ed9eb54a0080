//! Subscription registry.
//!
//! Tracks the channel feed and the monotonically growing set of author
//! pubkeys whose profiles the session follows. Both subscriptions use fixed
//! ids, so reissuing the profile filter replaces the relay-side
//! subscription instead of stacking a new one.

use std::collections::BTreeSet;

use crate::nostr::{self, Filter, KIND_CHANNEL_MESSAGE, KIND_PROFILE};

pub const CHANNEL_SUB_ID: &str = "channel-feed";
pub const PROFILE_SUB_ID: &str = "profile-feed";

#[derive(Debug)]
pub struct Subscriptions {
    channel_id: String,
    authors: BTreeSet<String>,
}

impl Subscriptions {
    pub fn new(channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            authors: BTreeSet::new(),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Channel-feed REQ, issued once per connection at open time.
    pub fn channel_req(&self) -> String {
        let filter = Filter {
            kinds: Some(vec![KIND_CHANNEL_MESSAGE]),
            authors: None,
            t: Some(vec![self.channel_id.clone()]),
        };
        nostr::frame_req(CHANNEL_SUB_ID, &[filter])
    }

    /// Bulk profile REQ over the entire author set, or None while the set is
    /// empty. The ordered set keeps reissued frames deterministic.
    pub fn profile_req(&self) -> Option<String> {
        if self.authors.is_empty() {
            return None;
        }
        let filter = Filter {
            kinds: Some(vec![KIND_PROFILE]),
            authors: Some(self.authors.iter().cloned().collect()),
            t: None,
        };
        Some(nostr::frame_req(PROFILE_SUB_ID, &[filter]))
    }

    /// Returns true only when the author is new; callers reissue the bulk
    /// subscription only on true. There is no removal path: the set is
    /// session-scoped and grows monotonically.
    pub fn add_author(&mut self, pubkey: &str) -> bool {
        if pubkey.is_empty() {
            return false;
        }
        self.authors.insert(pubkey.to_string())
    }

    pub fn authors(&self) -> Vec<String> {
        self.authors.iter().cloned().collect()
    }

    pub fn author_count(&self) -> usize {
        self.authors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{Subscriptions, CHANNEL_SUB_ID, PROFILE_SUB_ID};
    use serde_json::Value;

    #[test]
    fn channel_req_filters_kind_and_tag() {
        let subs = Subscriptions::new("site_test_example.com_/");
        let frame = subs.channel_req();
        let v: Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(v[0], "REQ");
        assert_eq!(v[1], CHANNEL_SUB_ID);
        assert_eq!(v[2]["kinds"][0], 1);
        assert_eq!(v[2]["#t"][0], "site_test_example.com_/");
    }

    #[test]
    fn profile_req_empty_until_first_author() {
        let mut subs = Subscriptions::new("chan");
        assert!(subs.profile_req().is_none());
        assert!(subs.add_author("aa"));
        let frame = subs.profile_req().expect("frame");
        let v: Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(v[1], PROFILE_SUB_ID);
        assert_eq!(v[2]["kinds"][0], 0);
        assert_eq!(v[2]["authors"][0], "aa");
    }

    #[test]
    fn duplicate_author_changes_nothing() {
        let mut subs = Subscriptions::new("chan");
        assert!(subs.add_author("aa"));
        let first = subs.profile_req().expect("frame");
        assert!(!subs.add_author("aa"));
        assert_eq!(subs.author_count(), 1);
        assert_eq!(subs.profile_req().expect("frame"), first);
    }

    #[test]
    fn bulk_req_covers_whole_set() {
        let mut subs = Subscriptions::new("chan");
        subs.add_author("bb");
        subs.add_author("aa");
        let frame = subs.profile_req().expect("frame");
        let v: Value = serde_json::from_str(&frame).expect("json");
        let authors = v[2]["authors"].as_array().expect("authors");
        assert_eq!(authors.len(), 2);
        // ordered set: deterministic frame regardless of insertion order
        assert_eq!(authors[0], "aa");
        assert_eq!(authors[1], "bb");
    }

    #[test]
    fn empty_pubkey_is_ignored() {
        let mut subs = Subscriptions::new("chan");
        assert!(!subs.add_author(""));
        assert_eq!(subs.author_count(), 0);
    }
}
