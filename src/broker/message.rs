//! Inbound message model shared by every broker adapter
//!
//! Adapters translate their wire items into [`InboundMessage`] without
//! interpreting the bytes. Decoding to text happens in the receive loop so a
//! malformed item can be skipped without tearing down the subscription.

use crate::error::{ListenerError, ListenerResult};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;

/// How a listener subscribes to its channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    /// One literal channel
    Exact,
    /// Every channel matching a glob-style pattern
    Pattern,
}

impl SubscriptionMode {
    /// Message kind a subscription in this mode delivers to its handler
    pub fn expected_kind(self) -> MessageKind {
        match self {
            SubscriptionMode::Exact => MessageKind::Message,
            SubscriptionMode::Pattern => MessageKind::PatternMessage,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionMode::Exact => "exact",
            SubscriptionMode::Pattern => "pattern",
        }
    }
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of an item delivered on a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Published on a channel subscribed exactly
    Message,
    /// Published on a channel matched by a pattern subscription
    PatternMessage,
    /// Control items such as `subscribe` / `psubscribe` confirmations
    Other(String),
}

impl MessageKind {
    /// Map the broker's item type name (`message`, `pmessage`, ...)
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "message" => MessageKind::Message,
            "pmessage" => MessageKind::PatternMessage,
            other => MessageKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Message => "message",
            MessageKind::PatternMessage => "pmessage",
            MessageKind::Other(kind) => kind,
        }
    }
}

/// Which part of a message failed to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageField {
    Channel,
    Pattern,
    Payload,
}

impl fmt::Display for MessageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageField::Channel => "channel",
            MessageField::Pattern => "pattern",
            MessageField::Payload => "payload",
        };
        f.write_str(name)
    }
}

/// Raw item received from a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub channel: Bytes,
    /// Pattern that matched, for pattern subscriptions
    pub pattern: Option<Bytes>,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn message(channel: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Message,
            channel: channel.into(),
            pattern: None,
            payload: payload.into(),
        }
    }

    pub fn pattern_message(
        pattern: impl Into<Bytes>,
        channel: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            kind: MessageKind::PatternMessage,
            channel: channel.into(),
            pattern: Some(pattern.into()),
            payload: payload.into(),
        }
    }

    /// Control item; the payload carries the subscription count as the
    /// broker reports it
    pub fn control(kind: &str, channel: impl Into<Bytes>, subscriptions: usize) -> Self {
        Self {
            kind: MessageKind::from_wire(kind),
            channel: channel.into(),
            pattern: None,
            payload: Bytes::from(subscriptions.to_string()),
        }
    }

    /// Decode channel, pattern and payload as UTF-8 text
    pub fn decode(&self) -> ListenerResult<DecodedMessage> {
        Ok(DecodedMessage {
            channel: decode_field(&self.channel, MessageField::Channel)?,
            pattern: self
                .pattern
                .as_ref()
                .map(|pattern| decode_field(pattern, MessageField::Pattern))
                .transpose()?,
            payload: decode_field(&self.payload, MessageField::Payload)?,
        })
    }
}

fn decode_field(bytes: &[u8], field: MessageField) -> ListenerResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|source| ListenerError::Decode { field, source })
}

/// Text view of an [`InboundMessage`] handed to listener handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub channel: String,
    pub pattern: Option<String>,
    pub payload: String,
}
