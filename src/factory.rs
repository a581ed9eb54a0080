//! Assembly of well-formed, signed events for each supported kind.

use anyhow::Result;
use serde_json::json;

use crate::channel;
use crate::nostr::{self, Event};
use crate::session::User;
use crate::util;

pub const APP_NAME: &str = "sitechat";

/// Deterministic avatar URL derived from the pubkey prefix.
pub fn avatar_url(pubkey: &str) -> String {
    format!(
        "https://robohash.org/{}.png?set=set4",
        util::short_pubkey(pubkey)
    )
}

/// Fallback display name for authors without a known profile.
pub fn default_display_name(pubkey: &str) -> String {
    format!("User_{}", util::short_pubkey(pubkey))
}

/// Kind-0 profile metadata event: empty tags, JSON content with
/// name/about/picture.
pub fn build_profile_event(user: &User) -> Result<Event> {
    let content = json!({
        "name": user.name,
        "about": format!("{} user - {}", APP_NAME, user.name),
        "picture": avatar_url(&user.pubkey),
    })
    .to_string();
    let unsigned = nostr::build_unsigned_event(
        &user.pubkey,
        nostr::KIND_PROFILE,
        vec![],
        content,
        util::now_unix_seconds(),
    );
    nostr::sign_event(&unsigned, &user.sk_hex)
}

/// Kind-1 channel text note: content verbatim, membership marked by the
/// `["t", channel_id]` tag.
pub fn build_channel_message(user: &User, channel_id: &str, text: &str) -> Result<Event> {
    let unsigned = nostr::build_unsigned_event(
        &user.pubkey,
        nostr::KIND_CHANNEL_MESSAGE,
        channel::channel_tags(channel_id),
        text.to_string(),
        util::now_unix_seconds(),
    );
    nostr::sign_event(&unsigned, &user.sk_hex)
}
