use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{info, warn};

use sitechat::engine::{ChatEngine, EngineConfig};
use sitechat::relay::RelayConfig;
use sitechat::session::Session;
use sitechat::{factory, util};

#[derive(Parser, Debug)]
#[command(name = "sitechat", version, about = "Headless site-scoped relay chat client")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "warn")]
    log_level: String,
    /// Relay url (repeatable), appended to the configured list.
    #[arg(long, action = ArgAction::Append)]
    relay: Vec<String>,
    /// Display name for this session.
    #[arg(long)]
    name: Option<String>,
    /// Secret key (64 hex chars, or free-form material to be normalized);
    /// a fresh keypair is generated when absent.
    #[arg(long)]
    sk: Option<String>,
    #[arg(long)]
    environment: Option<String>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    path: Option<String>,
    /// Accept inbound events without id/signature verification.
    #[arg(long, action = ArgAction::SetTrue)]
    no_verify: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct Config {
    #[serde(default)]
    relays: Vec<String>,
    #[serde(default = "default_environment")]
    environment: String,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_path")]
    path: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    sk_hex: String,
    #[serde(default = "default_verify_inbound")]
    verify_inbound: bool,
    #[serde(default = "default_relay_max_attempts")]
    relay_max_attempts: u32,
    #[serde(default = "default_relay_retry_base_secs")]
    relay_retry_base_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            relays: Vec::new(),
            environment: default_environment(),
            host: default_host(),
            path: default_path(),
            name: String::new(),
            sk_hex: String::new(),
            verify_inbound: default_verify_inbound(),
            relay_max_attempts: default_relay_max_attempts(),
            relay_retry_base_secs: default_relay_retry_base_secs(),
        }
    }
}

fn default_environment() -> String {
    "prod".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_verify_inbound() -> bool {
    true
}

fn default_relay_max_attempts() -> u32 {
    5
}

fn default_relay_retry_base_secs() -> u64 {
    1
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if std::env::var("RUST_LOG").is_err() {
        let level = util::normalize_log_level(&args.log_level)
            .ok_or_else(|| anyhow!("invalid log level: {}", args.log_level))?;
        std::env::set_var("RUST_LOG", level);
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut cfg = match args.config.as_ref() {
        Some(path) => load_config(path).unwrap_or_default(),
        None => Config::default(),
    };
    cfg.relays.extend(args.relay);
    if let Some(env) = args.environment {
        cfg.environment = env;
    }
    if let Some(host) = args.host {
        cfg.host = host;
    }
    if let Some(path) = args.path {
        cfg.path = path;
    }
    if let Some(name) = args.name {
        cfg.name = name;
    }
    if let Some(sk) = args.sk {
        cfg.sk_hex = sk;
    }
    if args.no_verify {
        cfg.verify_inbound = false;
    }

    if cfg.relays.is_empty() {
        warn!("no relays configured; messages stay local");
    }

    let session = Arc::new(Mutex::new(Session::new()));
    let user = {
        let mut guard = session.lock().await;
        if cfg.sk_hex.trim().is_empty() {
            guard.login_generated(&cfg.name)
        } else {
            guard.login_with_key(&cfg.name, &cfg.sk_hex)?
        }
    };
    let display_name = if user.name.is_empty() {
        let fallback = factory::default_display_name(&user.pubkey);
        session.lock().await.set_display_name(&fallback);
        fallback
    } else {
        user.name.clone()
    };
    info!(pubkey = %user.pubkey, name = %display_name, "signed in");

    let engine_cfg = EngineConfig {
        relays: cfg.relays.clone(),
        environment: cfg.environment.clone(),
        host: cfg.host.clone(),
        path: cfg.path.clone(),
        verify_inbound: cfg.verify_inbound,
        relay: RelayConfig {
            max_attempts: cfg.relay_max_attempts.max(1),
            retry_base: Duration::from_secs(cfg.relay_retry_base_secs.max(1)),
        },
    };
    let engine = Arc::new(ChatEngine::start(engine_cfg, session.clone()));
    info!(channel = %engine.channel_id(), "joined channel");

    if let Err(err) = engine.publish_profile().await {
        warn!(error = %err, "profile publish failed");
    }

    let printer = engine.clone();
    tokio::spawn(async move {
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            for record in printer.messages().await {
                if !seen.insert(record.key.clone()) {
                    continue;
                }
                let name = printer.display_name(&record.sender).await;
                println!("{}: {}", name, record.text);
            }
        }
    });

    let sender = engine.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if let Err(err) = sender.send_message(text).await {
                warn!(error = %err, "send failed");
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    engine.shutdown();
    info!("shutdown");
    Ok(())
}

fn load_config(path: &PathBuf) -> Option<Config> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
