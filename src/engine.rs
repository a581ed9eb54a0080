//! Engine assembly.
//!
//! Wires the session handle, stores, subscription registry, relay pool,
//! and inbound router together, and owns the pump task that feeds raw
//! relay frames into the router. User actions flow build+sign -> local
//! echo -> broadcast; inbound frames flow router -> registry -> stores.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::channel;
use crate::factory;
use crate::nostr::{self, Event};
use crate::relay::{ConnState, RelayConfig, RelayContext, RelayPool};
use crate::router::Router;
use crate::session::Session;
use crate::store::{MessageRecord, MessageStore, Profile, ProfileStore};
use crate::subscriptions::Subscriptions;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub relays: Vec<String>,
    pub environment: String,
    pub host: String,
    pub path: String,
    /// Verify inbound event ids and signatures before trusting their
    /// content. On by default; turn off only for unverified relays.
    pub verify_inbound: bool,
    pub relay: RelayConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            environment: "prod".to_string(),
            host: "localhost".to_string(),
            path: "/".to_string(),
            verify_inbound: true,
            relay: RelayConfig::default(),
        }
    }
}

pub struct ChatEngine {
    channel_id: String,
    session: Arc<Mutex<Session>>,
    messages: Arc<Mutex<MessageStore>>,
    profiles: Arc<Mutex<ProfileStore>>,
    pool: RelayPool,
    router: Arc<Router>,
    pump: JoinHandle<()>,
}

impl ChatEngine {
    /// Derive the channel id, open the relay pool, and start the inbound
    /// pump. An empty relay list yields a purely local engine.
    pub fn start(cfg: EngineConfig, session: Arc<Mutex<Session>>) -> Self {
        let channel_id = channel::derive_channel_id(&cfg.environment, &cfg.host, &cfg.path);
        let subs = Arc::new(Mutex::new(Subscriptions::new(&channel_id)));
        let messages = Arc::new(Mutex::new(MessageStore::new()));
        let profiles = Arc::new(Mutex::new(ProfileStore::new()));

        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<String>();
        let ctx = RelayContext {
            subs: subs.clone(),
            session: session.clone(),
            inbound: inbound_tx,
        };
        let pool = RelayPool::connect(cfg.relays, ctx, cfg.relay);

        let router = Arc::new(Router::new(
            channel_id.clone(),
            cfg.verify_inbound,
            session.clone(),
            subs,
            messages.clone(),
            profiles.clone(),
            pool.clone(),
        ));

        let pump_router = router.clone();
        let pump = tokio::spawn(async move {
            while let Some(frame) = inbound_rx.recv().await {
                pump_router.handle_frame(&frame).await;
            }
        });

        tracing::info!(channel = %channel_id, relays = pool.len(), "engine started");

        Self {
            channel_id,
            session,
            messages,
            profiles,
            pool,
            router,
            pump,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn open_relays(&self) -> usize {
        self.pool.open_count()
    }

    pub fn relay_states(&self) -> Vec<(String, ConnState)> {
        self.pool.states()
    }

    /// Build, sign, locally echo, and broadcast a channel message. The
    /// sender always sees their own message immediately; with zero open
    /// relays the message simply stays local.
    pub async fn send_message(&self, text: &str) -> Result<Event> {
        let user = {
            let session = self.session.lock().await;
            session.user().ok_or_else(|| anyhow!("not signed in"))?
        };
        let ev = factory::build_channel_message(&user, &self.channel_id, text)?;

        {
            let mut messages = self.messages.lock().await;
            messages.insert(MessageRecord::from_event(ev.id.clone(), &ev));
        }

        let reached = self.pool.broadcast(&nostr::frame_event(&ev));
        if reached == 0 {
            tracing::debug!(id = %ev.id, "no open relays; message kept locally");
        } else {
            tracing::debug!(id = %ev.id, relays = reached, "message broadcast");
        }
        Ok(ev)
    }

    /// Build, sign, and broadcast the session's profile event; the local
    /// profile store is updated in the same step.
    pub async fn publish_profile(&self) -> Result<Event> {
        let user = {
            let session = self.session.lock().await;
            session.user().ok_or_else(|| anyhow!("not signed in"))?
        };
        let ev = factory::build_profile_event(&user)?;
        {
            let mut profiles = self.profiles.lock().await;
            profiles.upsert(
                &user.pubkey,
                Profile {
                    name: user.name.clone(),
                    about: format!("{} user - {}", factory::APP_NAME, user.name),
                    picture: factory::avatar_url(&user.pubkey),
                },
            );
        }
        let reached = self.pool.broadcast(&nostr::frame_event(&ev));
        tracing::debug!(relays = reached, "profile broadcast");
        Ok(ev)
    }

    /// Router entry for a raw relay frame; the pump uses this, and tests
    /// can feed frames directly.
    pub async fn handle_frame(&self, raw: &str) {
        self.router.handle_frame(raw).await;
    }

    /// Timestamp-ascending snapshot of the message list.
    pub async fn messages(&self) -> Vec<MessageRecord> {
        self.messages.lock().await.sorted()
    }

    pub async fn message_count(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn profile(&self, pubkey: &str) -> Option<Profile> {
        self.profiles.lock().await.get(pubkey)
    }

    /// Display name for a sender: profile name when known, pubkey-derived
    /// fallback otherwise.
    pub async fn display_name(&self, pubkey: &str) -> String {
        match self.profile(pubkey).await {
            Some(p) if !p.name.trim().is_empty() => p.name,
            _ => factory::default_display_name(pubkey),
        }
    }

    /// Close every open relay connection and stop the inbound pump.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        self.pump.abort();
    }
}

impl Drop for ChatEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
