//! Channel naming for the ws-hub namespace
//!
//! Every channel is built as `{prefix}:{topic}`. The prefix is shared by all
//! listeners in a deployment and acts as a tenancy/version namespace; the
//! topic names the purpose of a listener or a publish target.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Prefix used when no configuration overrides it
pub const DEFAULT_PREFIX: &str = "ws-hub";

/// Separator between the prefix and the topic segments
pub const SEPARATOR: char = ':';

/// Topic segments used by the listeners
pub mod topics {
    /// New client registrations (exact subscription)
    pub const CLIENT_NEW: &str = "client-new";
    /// Per-client data channels, `client-data:{client_id}`
    pub const CLIENT_DATA: &str = "client-data";
    /// Data sent by any client (pattern subscription)
    pub const CLIENT_DATA_PATTERN: &str = "client-data:*";
    /// Group assignments published per client
    pub const GROUPS_NEW: &str = "groups-new";
}

/// Characters the broker treats as glob syntax in pattern subscriptions
const GLOB_CHARS: &[char] = &['*', '?', '[', ']', '\\'];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("Channel prefix cannot be empty")]
    EmptyPrefix,
    #[error("Channel prefix '{prefix}' contains reserved character '{ch}'")]
    ReservedChar { prefix: String, ch: char },
}

/// Process-wide channel namespace, passed explicitly to every listener
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelNamespace {
    prefix: Arc<str>,
}

impl ChannelNamespace {
    /// Build a namespace after checking the prefix is usable in both exact
    /// and pattern subscriptions
    pub fn new(prefix: &str) -> Result<Self, NamespaceError> {
        validate_prefix(prefix)?;
        Ok(Self {
            prefix: Arc::from(prefix),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build `{prefix}:{topic}`
    pub fn channel(&self, topic: &str) -> String {
        format!("{}{SEPARATOR}{topic}", self.prefix)
    }

    /// Build the group assignment target `{prefix}:groups-new:{client_id}`
    pub fn groups_new_channel(&self, client_id: &str) -> String {
        self.channel(&format!("{}{SEPARATOR}{client_id}", topics::GROUPS_NEW))
    }

    /// Strip this namespace from a channel, returning the topic part
    pub fn topic_of<'a>(&self, channel: &'a str) -> Option<&'a str> {
        channel
            .strip_prefix(self.prefix())
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
    }
}

impl Default for ChannelNamespace {
    fn default() -> Self {
        Self {
            prefix: Arc::from(DEFAULT_PREFIX),
        }
    }
}

impl fmt::Display for ChannelNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

pub fn validate_prefix(prefix: &str) -> Result<(), NamespaceError> {
    if prefix.is_empty() {
        return Err(NamespaceError::EmptyPrefix);
    }

    if let Some(ch) = prefix
        .chars()
        .find(|c| *c == SEPARATOR || GLOB_CHARS.contains(c) || c.is_whitespace())
    {
        return Err(NamespaceError::ReservedChar {
            prefix: prefix.to_string(),
            ch,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_namespace() {
        let ns = ChannelNamespace::default();
        assert_eq!(ns.prefix(), "ws-hub");
        assert_eq!(ns.channel(topics::CLIENT_NEW), "ws-hub:client-new");
        assert_eq!(
            ns.channel(topics::CLIENT_DATA_PATTERN),
            "ws-hub:client-data:*"
        );
    }

    #[test]
    fn test_client_data_pattern_covers_client_data_topic() {
        assert_eq!(
            topics::CLIENT_DATA_PATTERN,
            format!("{}{SEPARATOR}*", topics::CLIENT_DATA)
        );
    }

    #[test]
    fn test_groups_new_channel() {
        let ns = ChannelNamespace::new("tenant-a").unwrap();
        assert_eq!(
            ns.groups_new_channel("client42"),
            "tenant-a:groups-new:client42"
        );
    }

    #[test]
    fn test_topic_of() {
        let ns = ChannelNamespace::default();
        assert_eq!(
            ns.topic_of("ws-hub:client-data:abc"),
            Some("client-data:abc")
        );
        assert_eq!(ns.topic_of("ws-hubx:client-new"), None);
        assert_eq!(ns.topic_of("other:client-new"), None);
    }

    #[test]
    fn test_invalid_prefixes() {
        assert_eq!(ChannelNamespace::new(""), Err(NamespaceError::EmptyPrefix));
        assert!(matches!(
            ChannelNamespace::new("ws:hub"),
            Err(NamespaceError::ReservedChar { ch: ':', .. })
        ));
        assert!(matches!(
            ChannelNamespace::new("ws*"),
            Err(NamespaceError::ReservedChar { ch: '*', .. })
        ));
        assert!(matches!(
            ChannelNamespace::new("ws hub"),
            Err(NamespaceError::ReservedChar { ch: ' ', .. })
        ));
    }

    proptest! {
        #[test]
        fn test_channel_always_starts_with_prefix(
            prefix in "[a-z][a-z0-9_-]{0,15}",
            topic in "[a-z0-9:*-]{1,32}"
        ) {
            let ns = ChannelNamespace::new(&prefix).unwrap();
            let channel = ns.channel(&topic);
            prop_assert_eq!(ns.topic_of(&channel), Some(topic.as_str()));
        }
    }
}
