//! Inbound event router.
//!
//! Parses `["EVENT", sub_id, event]` relay frames, classifies by kind,
//! validates channel membership, deduplicates, and updates the stores.
//! Malformed payloads are discarded per message and never escape the
//! router boundary.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::channel;
use crate::factory;
use crate::nostr::{self, Event, KIND_CHANNEL_MESSAGE, KIND_PROFILE};
use crate::relay::RelayPool;
use crate::session::Session;
use crate::store::{MessageRecord, MessageStore, Profile, ProfileStore};
use crate::subscriptions::Subscriptions;
use crate::util;

pub struct Router {
    channel_id: String,
    verify_inbound: bool,
    session: Arc<Mutex<Session>>,
    subs: Arc<Mutex<Subscriptions>>,
    messages: Arc<Mutex<MessageStore>>,
    profiles: Arc<Mutex<ProfileStore>>,
    pool: RelayPool,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel_id: String,
        verify_inbound: bool,
        session: Arc<Mutex<Session>>,
        subs: Arc<Mutex<Subscriptions>>,
        messages: Arc<Mutex<MessageStore>>,
        profiles: Arc<Mutex<ProfileStore>>,
        pool: RelayPool,
    ) -> Self {
        Self {
            channel_id,
            verify_inbound,
            session,
            subs,
            messages,
            profiles,
            pool,
        }
    }

    /// Route one raw relay frame. Anything that is not a well-formed EVENT
    /// frame is dropped here without side effects.
    pub async fn handle_frame(&self, raw: &str) {
        let ev_val = match extract_event(raw) {
            Some(v) => v,
            None => return,
        };
        let ev: Event = match serde_json::from_value(ev_val) {
            Ok(ev) => ev,
            Err(err) => {
                tracing::debug!(error = %err, "inbound event shape invalid; dropped");
                return;
            }
        };
        if self.verify_inbound {
            match nostr::verify_event(&ev) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(id = %ev.id, "inbound event failed verification; dropped");
                    return;
                }
                Err(err) => {
                    tracing::debug!(error = %err, "inbound event unverifiable; dropped");
                    return;
                }
            }
        }

        match ev.kind {
            KIND_PROFILE => self.handle_profile(&ev).await,
            KIND_CHANNEL_MESSAGE => self.handle_channel_message(&ev).await,
            other => {
                tracing::debug!(kind = other, "inbound event kind ignored");
            }
        }
    }

    async fn handle_profile(&self, ev: &Event) {
        let mut profile: Profile = match serde_json::from_str(&ev.content) {
            Ok(p) => p,
            Err(err) => {
                tracing::debug!(pubkey = %ev.pubkey, error = %err, "profile content unparseable; dropped");
                return;
            }
        };
        if profile.name.trim().is_empty() {
            profile.name = factory::default_display_name(&ev.pubkey);
        }
        let name = profile.name.clone();
        {
            let mut profiles = self.profiles.lock().await;
            profiles.upsert(&ev.pubkey, profile);
        }

        // Self-profile bootstrap after sign-in.
        let mut session = self.session.lock().await;
        if session.pubkey().as_deref() == Some(ev.pubkey.as_str()) {
            session.set_display_name(&name);
        }
    }

    async fn handle_channel_message(&self, ev: &Event) {
        if !channel::in_channel(&ev.tags, &self.channel_id) {
            return;
        }

        let newly_followed = {
            let mut subs = self.subs.lock().await;
            subs.add_author(&ev.pubkey)
        };
        if newly_followed {
            let req = { self.subs.lock().await.profile_req() };
            if let Some(req) = req {
                let reached = self.pool.broadcast(&req);
                tracing::debug!(author = %ev.pubkey, relays = reached, "profile subscription reissued");
            }
        }

        let key = message_key(ev);
        let inserted = {
            let mut messages = self.messages.lock().await;
            messages.insert(MessageRecord::from_event(key.clone(), ev))
        };
        if !inserted {
            tracing::debug!(key = %key, "duplicate message ignored");
        }
    }
}

/// Accepts `["EVENT", sub_id, event]` and the two-element publish shape
/// `["EVENT", event]`; anything else yields None.
pub fn extract_event(frame: &str) -> Option<Value> {
    let v: Value = serde_json::from_str(frame).ok()?;
    let arr = v.as_array()?;
    if arr.first()?.as_str()? != "EVENT" {
        return None;
    }
    let ev = if arr.len() >= 3 { &arr[2] } else { arr.get(1)? };
    if !ev.is_object() {
        return None;
    }
    Some(ev.clone())
}

/// Store key for a routed message: the event id, or a synthesized
/// `received_{created_at}_{pk8}` fallback when the id is absent. With
/// verification enabled an event without a valid id never reaches this
/// point, so the fallback only matters in unverified mode.
fn message_key(ev: &Event) -> String {
    if !ev.id.is_empty() {
        return ev.id.clone();
    }
    format!(
        "received_{}_{}",
        ev.created_at,
        util::short_pubkey(&ev.pubkey)
    )
}

#[cfg(test)]
mod tests {
    use super::{extract_event, message_key};
    use crate::nostr::Event;

    #[test]
    fn extract_accepts_subscription_frames() {
        let frame = r#"["EVENT","sub",{"pubkey":"pk","created_at":1,"kind":1,"tags":[],"content":"x"}]"#;
        let ev = extract_event(frame).expect("event");
        assert_eq!(ev["content"], "x");
    }

    #[test]
    fn extract_rejects_other_frames() {
        assert!(extract_event("not json").is_none());
        assert!(extract_event(r#"{"kind":1}"#).is_none());
        assert!(extract_event(r#"["EOSE","sub"]"#).is_none());
        assert!(extract_event(r#"["EVENT","sub","not-an-object"]"#).is_none());
    }

    #[test]
    fn message_key_falls_back_without_id() {
        let ev = Event {
            id: String::new(),
            pubkey: "ab".repeat(32),
            created_at: 99,
            kind: 1,
            tags: vec![],
            content: "x".to_string(),
            sig: String::new(),
        };
        assert_eq!(message_key(&ev), "received_99_abababab");
    }
}
