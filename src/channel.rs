//! Channel identity.
//!
//! A channel id is a deployment-scoped room key joined from environment,
//! host, and path. It is discoverable by design: any relay participant that
//! knows or guesses the inputs can join, so it carries no secrecy.

use crate::nostr;

/// Deterministic channel id: `site_{environment}_{host}_{path}`.
pub fn derive_channel_id(environment: &str, host: &str, path: &str) -> String {
    format!(
        "site_{}_{}_{}",
        environment.trim(),
        host.trim(),
        path.trim()
    )
}

/// Tag set marking channel membership on an outgoing message.
pub fn channel_tags(channel_id: &str) -> Vec<Vec<String>> {
    vec![vec!["t".to_string(), channel_id.to_string()]]
}

/// Exact `["t", channel_id]` membership test.
pub fn in_channel(tags: &[Vec<String>], channel_id: &str) -> bool {
    nostr::has_tag(tags, "t", channel_id)
}

#[cfg(test)]
mod tests {
    use super::{channel_tags, derive_channel_id, in_channel};

    #[test]
    fn channel_id_joins_environment_host_path() {
        assert_eq!(
            derive_channel_id("test", "example.com", "/"),
            "site_test_example.com_/"
        );
    }

    #[test]
    fn channel_id_trims_inputs() {
        assert_eq!(
            derive_channel_id(" prod ", " chat.example.org", "/rooms "),
            "site_prod_chat.example.org_/rooms"
        );
    }

    #[test]
    fn membership_requires_exact_match() {
        let tags = channel_tags("site_test_example.com_/");
        assert!(in_channel(&tags, "site_test_example.com_/"));
        assert!(!in_channel(&tags, "site_test_example.com_/other"));
        assert!(!in_channel(&[], "site_test_example.com_/"));
    }
}
