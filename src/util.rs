use std::time::{SystemTime, UNIX_EPOCH};

pub fn normalize_log_level(level: &str) -> Option<&'static str> {
    match level.to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

pub fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// First 8 hex chars of a pubkey, for display fallbacks and avatar seeds.
pub fn short_pubkey(pubkey: &str) -> &str {
    if pubkey.len() >= 8 {
        &pubkey[..8]
    } else {
        pubkey
    }
}
