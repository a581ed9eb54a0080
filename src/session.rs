//! Local identity owned by the application root.
//!
//! The session is passed by `Arc<Mutex<Session>>` handle into the relay
//! tasks and the router instead of living in module globals, so there is
//! exactly one source of truth for the signed-in user. The secret key stays
//! inside the process; nothing here persists across sessions.

use anyhow::Result;

use crate::nostr;

#[derive(Clone, Debug)]
pub struct User {
    pub name: String,
    pub pubkey: String,
    pub sk_hex: String,
}

#[derive(Debug, Default)]
pub struct Session {
    user: Option<User>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign in with imported key material. The key is normalized and the
    /// pubkey derived from it, so the identity always matches the signing
    /// key.
    pub fn login_with_key(&mut self, name: &str, sk_raw: &str) -> Result<User> {
        let bytes = nostr::normalize_secret_key(sk_raw)?;
        let sk_hex = hex::encode(bytes);
        let pubkey = nostr::pubkey_from_sk_hex(&sk_hex)?;
        let user = User {
            name: name.trim().to_string(),
            pubkey,
            sk_hex,
        };
        self.user = Some(user.clone());
        Ok(user)
    }

    /// Sign in with a freshly generated keypair.
    pub fn login_generated(&mut self, name: &str) -> User {
        let (pubkey, sk_hex) = nostr::generate_keypair();
        let user = User {
            name: name.trim().to_string(),
            pubkey,
            sk_hex,
        };
        self.user = Some(user.clone());
        user
    }

    pub fn user(&self) -> Option<User> {
        self.user.clone()
    }

    pub fn pubkey(&self) -> Option<String> {
        self.user.as_ref().map(|u| u.pubkey.clone())
    }

    /// Refresh the display name, e.g. from a received self-profile.
    pub fn set_display_name(&mut self, name: &str) {
        if let Some(user) = self.user.as_mut() {
            user.name = name.to_string();
        }
    }

    pub fn logout(&mut self) {
        self.user = None;
    }
}
