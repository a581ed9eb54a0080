//! Sitechat engine library surface.
//!
//! This crate exposes the event engine of a site-scoped relay chat client:
//! - canonical event codec, signing, and verification
//! - event factory for profile and channel-message kinds
//! - relay connection pool and subscription registry
//! - inbound event router and in-memory stores

/// Channel-id derivation and membership checks.
pub mod channel;
/// Engine assembly: pool + router + stores behind one handle.
pub mod engine;
/// Construction of signed profile and channel-message events.
pub mod factory;
/// Event codec, Schnorr signing/verification, wire frames.
pub mod nostr;
/// Outbound relay pool with per-connection state machines.
pub mod relay;
/// Inbound frame routing into the stores.
pub mod router;
/// Local identity owned by the application root.
pub mod session;
/// Message and profile stores.
pub mod store;
/// Channel-feed and author-profile subscription registry.
pub mod subscriptions;
/// Shared utility helpers.
pub mod util;
