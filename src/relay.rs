//! Relay connection manager.
//!
//! One websocket task per configured relay url; connection attempts are
//! independent, so a dead relay never blocks the rest. Each connection runs
//! the state machine Connecting -> Open -> Closed with bounded
//! exponential-backoff reconnects. On open the task writes, in socket
//! order: the channel-feed REQ, the bulk profile REQ (when the author set
//! is non-empty), and the local user's profile event to this connection
//! alone. Ordered writes on one socket replace any need for grace timers.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::factory;
use crate::nostr;
use crate::session::Session;
use crate::subscriptions::Subscriptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Connecting = 0,
    Open = 1,
    Closed = 2,
}

impl ConnState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnState::Connecting,
            1 => ConnState::Open,
            _ => ConnState::Closed,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Consecutive failed connects tolerated before the handle parks in
    /// Closed.
    pub max_attempts: u32,
    pub retry_base: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_base: Duration::from_secs(1),
        }
    }
}

const RETRY_CAP: Duration = Duration::from_secs(30);

/// Shared state every relay task needs at open time, passed by handle from
/// the application root.
#[derive(Clone)]
pub struct RelayContext {
    pub subs: Arc<Mutex<Subscriptions>>,
    pub session: Arc<Mutex<Session>>,
    pub inbound: mpsc::UnboundedSender<String>,
}

enum Command {
    Frame(String),
    Shutdown,
}

#[derive(Clone)]
pub struct RelayPool {
    relays: Vec<RelayHandle>,
}

impl RelayPool {
    pub fn connect(urls: Vec<String>, ctx: RelayContext, cfg: RelayConfig) -> Self {
        let relays = urls
            .into_iter()
            .map(|url| RelayHandle::spawn(url, ctx.clone(), cfg.clone()))
            .collect();
        Self { relays }
    }

    pub fn empty() -> Self {
        Self { relays: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn open_count(&self) -> usize {
        self.relays
            .iter()
            .filter(|r| r.state() == ConnState::Open)
            .count()
    }

    pub fn states(&self) -> Vec<(String, ConnState)> {
        self.relays
            .iter()
            .map(|r| (r.url.clone(), r.state()))
            .collect()
    }

    /// Fan a frame out to every connection currently Open. Non-open
    /// connections are skipped silently; nothing is queued. Returns the
    /// number of connections reached.
    pub fn broadcast(&self, frame: &str) -> usize {
        let mut sent = 0;
        for relay in &self.relays {
            if relay.state() != ConnState::Open {
                continue;
            }
            if relay.tx.send(Command::Frame(frame.to_string())).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Close every open connection and stop reconnecting. In-flight sends
    /// to closing connections are discarded without error.
    pub fn shutdown(&self) {
        for relay in &self.relays {
            relay.stop.store(true, Ordering::Relaxed);
            let _ = relay.tx.send(Command::Shutdown);
        }
    }
}

#[derive(Clone)]
struct RelayHandle {
    url: String,
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<AtomicU8>,
    stop: Arc<AtomicBool>,
}

impl RelayHandle {
    fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn spawn(url: String, ctx: RelayContext, cfg: RelayConfig) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let state = Arc::new(AtomicU8::new(ConnState::Connecting as u8));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = Self {
            url: url.clone(),
            tx,
            state: state.clone(),
            stop: stop.clone(),
        };

        tokio::spawn(async move {
            let mut failures: u32 = 0;
            loop {
                if stop.load(Ordering::Relaxed) || discard_pending(&mut rx) {
                    break;
                }
                state.store(ConnState::Connecting as u8, Ordering::Relaxed);
                match connect_async(&url).await {
                    Ok((ws, _)) => {
                        failures = 0;
                        tracing::info!(relay = %url, "relay connected");
                        state.store(ConnState::Open as u8, Ordering::Relaxed);
                        let deliberate = run_connection(ws, &url, &ctx, &stop, &mut rx).await;
                        state.store(ConnState::Closed as u8, Ordering::Relaxed);
                        if deliberate {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(relay = %url, error = %err, "relay connect failed");
                    }
                }
                failures += 1;
                if failures >= cfg.max_attempts {
                    tracing::warn!(relay = %url, attempts = failures, "relay unreachable; giving up");
                    break;
                }
                let backoff = cfg
                    .retry_base
                    .saturating_mul(1u32 << (failures - 1).min(16))
                    .min(RETRY_CAP);
                sleep(backoff).await;
            }
            state.store(ConnState::Closed as u8, Ordering::Relaxed);
        });

        handle
    }
}

/// Drives one open connection until it drops. Returns true when the close
/// was deliberate (shutdown), false when the relay went away and a
/// reconnect may follow.
async fn run_connection(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: &str,
    ctx: &RelayContext,
    stop: &Arc<AtomicBool>,
    rx: &mut mpsc::UnboundedReceiver<Command>,
) -> bool {
    let (mut write, mut read) = ws.split();

    // The author set always covers the local user, so the on-open profile
    // REQ fetches any kind-0 backlog of our own before anyone else posts.
    let user = { ctx.session.lock().await.user() };
    if let Some(user) = &user {
        ctx.subs.lock().await.add_author(&user.pubkey);
    }
    let (channel_req, profile_req) = {
        let subs = ctx.subs.lock().await;
        (subs.channel_req(), subs.profile_req())
    };
    if let Err(err) = write.send(Message::Text(channel_req)).await {
        tracing::warn!(relay = %url, error = %err, "channel subscription send failed");
        return false;
    }
    if let Some(req) = profile_req {
        if let Err(err) = write.send(Message::Text(req)).await {
            tracing::warn!(relay = %url, error = %err, "profile subscription send failed");
            return false;
        }
    }
    if let Some(user) = user {
        // To this connection alone, not a pool-wide fan-out.
        match factory::build_profile_event(&user) {
            Ok(ev) => {
                if let Err(err) = write.send(Message::Text(nostr::frame_event(&ev))).await {
                    tracing::warn!(relay = %url, error = %err, "profile publish failed");
                    return false;
                }
            }
            Err(err) => {
                tracing::warn!(relay = %url, error = %err, "profile event build failed");
            }
        }
    }

    let mut acked = false;
    loop {
        if stop.load(Ordering::Relaxed) {
            let _ = write.close().await;
            return true;
        }
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Frame(frame)) => {
                        if let Err(err) = write.send(Message::Text(frame)).await {
                            tracing::warn!(relay = %url, error = %err, "relay send failed");
                            return false;
                        }
                    }
                    Some(Command::Shutdown) | None => {
                        let _ = write.close().await;
                        return true;
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(txt))) => {
                        if !acked && is_ok_frame(&txt) {
                            acked = true;
                            tracing::debug!(relay = %url, "relay acknowledged first publish");
                        }
                        let _ = ctx.inbound.send(txt);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(relay = %url, "relay closed connection");
                        return false;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(relay = %url, error = %err, "relay read failed");
                        return false;
                    }
                }
            }
        }
    }
}

/// Drops Frame commands queued while the connection was down; a send to a
/// closed connection is discarded, never replayed after a reconnect.
/// Returns true when a shutdown was queued in the meantime.
fn discard_pending(rx: &mut mpsc::UnboundedReceiver<Command>) -> bool {
    let mut shutdown = false;
    while let Ok(cmd) = rx.try_recv() {
        if matches!(cmd, Command::Shutdown) {
            shutdown = true;
        }
    }
    shutdown
}

fn is_ok_frame(frame: &str) -> bool {
    serde_json::from_str::<Value>(frame)
        .ok()
        .and_then(|v| v.as_array().and_then(|a| a.first().cloned()))
        .and_then(|head| head.as_str().map(|s| s == "OK"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{discard_pending, is_ok_frame, Command, ConnState, RelayPool};
    use tokio::sync::mpsc;

    #[test]
    fn empty_pool_broadcast_reaches_nobody() {
        let pool = RelayPool::empty();
        assert!(pool.is_empty());
        assert_eq!(pool.broadcast(r#"["EVENT",{}]"#), 0);
        assert_eq!(pool.open_count(), 0);
    }

    #[test]
    fn ok_frame_detection() {
        assert!(is_ok_frame(r#"["OK","abc",true,""]"#));
        assert!(!is_ok_frame(r#"["EVENT","sub",{}]"#));
        assert!(!is_ok_frame("not json"));
    }

    #[test]
    fn stale_frames_do_not_survive_a_reconnect() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Command::Frame("stale-1".to_string())).expect("send");
        tx.send(Command::Frame("stale-2".to_string())).expect("send");
        assert!(!discard_pending(&mut rx));
        assert!(rx.try_recv().is_err());

        tx.send(Command::Frame("stale-3".to_string())).expect("send");
        tx.send(Command::Shutdown).expect("send");
        assert!(discard_pending(&mut rx));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn conn_state_round_trips() {
        for state in [ConnState::Connecting, ConnState::Open, ConnState::Closed] {
            assert_eq!(ConnState::from_u8(state as u8), state);
        }
    }
}
