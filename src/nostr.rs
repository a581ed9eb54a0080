//! Event codec and signing primitives.
//!
//! Events are the atomic signed unit of protocol data: the `id` is the
//! SHA-256 digest of the canonical serialization
//! `[0, pubkey, created_at, kind, tags, content]`, and `sig` is a Schnorr
//! signature over those 32 id bytes, verifiable against the x-only pubkey.

use anyhow::{anyhow, Result};
use secp256k1::schnorr::Signature;
use secp256k1::{Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

/// Profile metadata (content is a JSON object with name/about/picture).
pub const KIND_PROFILE: u32 = 0;
/// Channel text note, scoped to a channel by a `["t", channel_id]` tag.
pub const KIND_CHANNEL_MESSAGE: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// Relay-side subscription filter. Only keys the engine uses are modeled;
/// absent keys are omitted from the wire encoding entirely.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(rename = "#t", skip_serializing_if = "Option::is_none")]
    pub t: Option<Vec<String>>,
}

pub fn build_unsigned_event(
    pubkey: &str,
    kind: u32,
    tags: Vec<Vec<String>>,
    content: String,
    created_at: u64,
) -> UnsignedEvent {
    UnsignedEvent {
        pubkey: pubkey.to_string(),
        created_at,
        kind,
        tags,
        content,
    }
}

/// Canonical content-addressed identifier: lowercase hex SHA-256 of the
/// compact JSON array `[0, pubkey, created_at, kind, tags, content]`.
/// Deterministic by construction; a serialization failure is a hard error,
/// never a degraded id.
pub fn event_id_hex(unsigned: &UnsignedEvent) -> Result<String> {
    let canonical = json!([
        0,
        unsigned.pubkey,
        unsigned.created_at,
        unsigned.kind,
        unsigned.tags,
        unsigned.content,
    ]);
    let raw =
        serde_json::to_string(&canonical).map_err(|e| anyhow!("event serialize failed: {e}"))?;
    let digest = Sha256::digest(raw.as_bytes());
    Ok(hex::encode(digest))
}

/// Normalize imported secret-key material to exactly 32 bytes.
///
/// A 64-hex-char string is decoded directly. Any other input is digested
/// with SHA-256 into 32 bytes; this keeps free-form imported secrets
/// deterministic without ad-hoc padding.
pub fn normalize_secret_key(raw: &str) -> Result<[u8; 32]> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("empty secret key"));
    }
    if trimmed.len() == 64 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        let bytes = hex::decode(trimmed).map_err(|e| anyhow!("invalid secret key hex: {e}"))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        return Ok(out);
    }
    Ok(Sha256::digest(trimmed.as_bytes()).into())
}

pub fn generate_keypair() -> (String, String) {
    let secp = Secp256k1::new();
    let (sk, _pk) = secp.generate_keypair(&mut rand::thread_rng());
    let sk_hex = hex::encode(sk.secret_bytes());
    let keypair = Keypair::from_secret_key(&secp, &sk);
    (xonly_pk_hex(&keypair), sk_hex)
}

pub fn pubkey_from_sk_hex(sk_hex: &str) -> Result<String> {
    let keypair = keypair_from_sk(sk_hex)?;
    Ok(xonly_pk_hex(&keypair))
}

/// Compute the id, then sign it. The id always exists before the signature
/// is produced; signing failures propagate instead of yielding a partial
/// event.
pub fn sign_event(unsigned: &UnsignedEvent, sk_hex: &str) -> Result<Event> {
    let id = event_id_hex(unsigned)?;
    let id_bytes = hex::decode(&id).map_err(|e| anyhow!("invalid event id hex: {e}"))?;
    let secp = Secp256k1::new();
    let keypair = keypair_from_sk(sk_hex)?;
    let sig = secp.sign_schnorr(&id_bytes, &keypair);
    Ok(Event {
        id,
        pubkey: unsigned.pubkey.clone(),
        created_at: unsigned.created_at,
        kind: unsigned.kind,
        tags: unsigned.tags.clone(),
        content: unsigned.content.clone(),
        sig: hex::encode(sig.as_ref() as &[u8]),
    })
}

/// Recompute the canonical id and Schnorr-verify the signature. A signature
/// that is not exactly 128 hex chars never passes.
pub fn verify_event(ev: &Event) -> Result<bool> {
    let unsigned = UnsignedEvent {
        pubkey: ev.pubkey.clone(),
        created_at: ev.created_at,
        kind: ev.kind,
        tags: ev.tags.clone(),
        content: ev.content.clone(),
    };
    if event_id_hex(&unsigned)? != ev.id {
        return Ok(false);
    }
    if ev.sig.len() != 128 {
        return Ok(false);
    }
    let id_bytes = hex::decode(&ev.id).map_err(|e| anyhow!("invalid event id hex: {e}"))?;
    if id_bytes.len() != 32 {
        return Err(anyhow!("invalid event id length"));
    }
    let sig_bytes = hex::decode(&ev.sig).map_err(|e| anyhow!("invalid signature hex: {e}"))?;
    let sig = Signature::from_slice(&sig_bytes).map_err(|_| anyhow!("invalid signature"))?;
    let pk_bytes = hex::decode(&ev.pubkey).map_err(|e| anyhow!("invalid pubkey hex: {e}"))?;
    let pk = XOnlyPublicKey::from_slice(&pk_bytes).map_err(|_| anyhow!("invalid pubkey"))?;
    let secp = Secp256k1::new();
    Ok(secp.verify_schnorr(&sig, &id_bytes, &pk).is_ok())
}

/// `["EVENT", event]` publish frame.
pub fn frame_event(ev: &Event) -> String {
    json!(["EVENT", ev]).to_string()
}

/// `["REQ", sub_id, filter...]` subscription frame.
pub fn frame_req(sub_id: &str, filters: &[Filter]) -> String {
    let mut arr = vec![json!("REQ"), json!(sub_id)];
    for f in filters {
        arr.push(json!(f));
    }
    serde_json::Value::Array(arr).to_string()
}

pub fn has_tag(tags: &[Vec<String>], key: &str, value: &str) -> bool {
    tags.iter().any(|t| {
        t.first().map(|v| v.as_str()) == Some(key) && t.get(1).map(|v| v.as_str()) == Some(value)
    })
}

fn keypair_from_sk(sk_hex: &str) -> Result<Keypair> {
    let bytes = normalize_secret_key(sk_hex)?;
    let sk = SecretKey::from_slice(&bytes).map_err(|_| anyhow!("invalid secret key"))?;
    let secp = Secp256k1::new();
    Ok(Keypair::from_secret_key(&secp, &sk))
}

fn xonly_pk_hex(keypair: &Keypair) -> String {
    let (pk, _) = XOnlyPublicKey::from_keypair(keypair);
    hex::encode(pk.serialize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_deterministic() {
        let pk = "ab".repeat(32);
        let unsigned = build_unsigned_event(&pk, 1, vec![], "hi".to_string(), 42);
        let a = event_id_hex(&unsigned).expect("id");
        let b = event_id_hex(&unsigned).expect("id");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn id_changes_with_content() {
        let pk = "ab".repeat(32);
        let a = build_unsigned_event(&pk, 1, vec![], "hi".to_string(), 42);
        let b = build_unsigned_event(&pk, 1, vec![], "ho".to_string(), 42);
        assert_ne!(event_id_hex(&a).unwrap(), event_id_hex(&b).unwrap());
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let (pk, sk) = generate_keypair();
        let unsigned = build_unsigned_event(&pk, 1, vec![], "hello".to_string(), 100);
        let ev = sign_event(&unsigned, &sk).expect("sign");
        assert_eq!(ev.sig.len(), 128);
        assert!(verify_event(&ev).expect("verify"));
    }

    #[test]
    fn verify_rejects_tampered_content() {
        let (pk, sk) = generate_keypair();
        let unsigned = build_unsigned_event(&pk, 1, vec![], "hello".to_string(), 100);
        let mut ev = sign_event(&unsigned, &sk).expect("sign");
        ev.content = "tampered".to_string();
        assert!(!verify_event(&ev).expect("verify"));
    }

    #[test]
    fn verify_rejects_short_signature() {
        let (pk, sk) = generate_keypair();
        let unsigned = build_unsigned_event(&pk, 1, vec![], "hello".to_string(), 100);
        let mut ev = sign_event(&unsigned, &sk).expect("sign");
        ev.sig = ev.sig[..64].to_string();
        assert!(!verify_event(&ev).expect("verify"));
    }

    #[test]
    fn normalize_accepts_64_hex() {
        let sk = "11".repeat(32);
        let bytes = normalize_secret_key(&sk).expect("normalize");
        assert_eq!(bytes, [0x11u8; 32]);
    }

    #[test]
    fn normalize_digests_other_input() {
        let a = normalize_secret_key("not hex at all").expect("normalize");
        let b = normalize_secret_key("not hex at all").expect("normalize");
        assert_eq!(a, b);
        assert!(normalize_secret_key("").is_err());
    }

    #[test]
    fn derived_pubkey_matches_signing_key() {
        let (pk, sk) = generate_keypair();
        assert_eq!(pubkey_from_sk_hex(&sk).expect("derive"), pk);
    }

    #[test]
    fn req_frame_omits_absent_filter_keys() {
        let filter = Filter {
            kinds: Some(vec![1]),
            authors: None,
            t: Some(vec!["chan".to_string()]),
        };
        let frame = frame_req("sub", &[filter]);
        let v: serde_json::Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(v[0], "REQ");
        assert_eq!(v[1], "sub");
        assert_eq!(v[2]["kinds"][0], 1);
        assert_eq!(v[2]["#t"][0], "chan");
        assert!(v[2].get("authors").is_none());
    }
}
