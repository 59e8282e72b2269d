//! Phoenix channel frames as spoken by the realtime endpoint.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const PHOENIX_TOPIC: &str = "phoenix";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Frame {
    pub fn new(topic: &str, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self::new(PHOENIX_TOPIC, "heartbeat", json!({}), reference)
    }

    pub fn join(topic: &str, config: Value, access_token: &str, reference: u64) -> Self {
        Self::new(
            topic,
            "phx_join",
            json!({ "config": config, "access_token": access_token }),
            reference,
        )
    }

    pub fn leave(topic: &str, reference: u64) -> Self {
        Self::new(topic, "phx_leave", json!({}), reference)
    }

    pub fn track(topic: &str, state: Value, reference: u64) -> Self {
        Self::new(
            topic,
            "presence",
            json!({ "type": "presence", "event": "track", "payload": state }),
            reference,
        )
    }

    pub fn untrack(topic: &str, reference: u64) -> Self {
        Self::new(
            topic,
            "presence",
            json!({ "type": "presence", "event": "untrack" }),
            reference,
        )
    }
}

/// `postgres_changes` subscription entry of a join config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostgresChangeFilter {
    pub event: String,
    pub schema: String,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl PostgresChangeFilter {
    pub fn inserts(table: &str) -> Self {
        Self {
            event: "INSERT".to_string(),
            schema: "public".to_string(),
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    pub postgres_changes: Vec<PostgresChangeFilter>,
    pub presence_key: Option<String>,
}

impl ChannelConfig {
    pub fn changes(filters: Vec<PostgresChangeFilter>) -> Self {
        Self {
            postgres_changes: filters,
            presence_key: None,
        }
    }

    pub fn presence(key: impl Into<String>) -> Self {
        Self {
            postgres_changes: Vec::new(),
            presence_key: Some(key.into()),
        }
    }

    pub fn to_join_config(&self) -> Value {
        json!({
            "broadcast": { "self": false, "ack": false },
            "presence": { "key": self.presence_key.clone().unwrap_or_default() },
            "postgres_changes": self.postgres_changes,
        })
    }
}

/// What a received frame means for the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    JoinOk,
    JoinError(String),
    Change {
        event: String,
        table: String,
        record: Value,
    },
    PresenceState(Value),
    PresenceDiff { joins: Value, leaves: Value },
    Closed(String),
    Ignored,
}

pub fn decode(frame: &Frame, topic: &str, join_ref: Option<&str>) -> Inbound {
    if frame.topic != topic {
        return Inbound::Ignored;
    }

    match frame.event.as_str() {
        "phx_reply" if join_ref.is_some() && frame.reference.as_deref() == join_ref => {
            match frame.payload["status"].as_str() {
                Some("ok") => Inbound::JoinOk,
                _ => Inbound::JoinError(frame.payload["response"].to_string()),
            }
        }
        "postgres_changes" => {
            let data = &frame.payload["data"];
            Inbound::Change {
                event: data["type"].as_str().unwrap_or_default().to_string(),
                table: data["table"].as_str().unwrap_or_default().to_string(),
                record: data["record"].clone(),
            }
        }
        "presence_state" => Inbound::PresenceState(frame.payload.clone()),
        "presence_diff" => Inbound::PresenceDiff {
            joins: frame.payload["joins"].clone(),
            leaves: frame.payload["leaves"].clone(),
        },
        "phx_error" => Inbound::Closed("channel error".to_string()),
        "phx_close" => Inbound::Closed("channel closed".to_string()),
        _ => Inbound::Ignored,
    }
}

/// Key-only view of channel presence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceKeys(BTreeSet<String>);

impl PresenceKeys {
    pub fn replace(&mut self, state: &Value) {
        self.0 = keys_of(state).collect();
    }

    /// Leaves go first: a key listed on both sides was re-tracked and stays.
    pub fn apply_diff(&mut self, joins: &Value, leaves: &Value) {
        for key in keys_of(leaves) {
            self.0.remove(&key);
        }
        for key in keys_of(joins) {
            self.0.insert(key);
        }
    }

    pub fn keys(&self) -> &BTreeSet<String> {
        &self.0
    }
}

fn keys_of(value: &Value) -> impl Iterator<Item = String> + '_ {
    value
        .as_object()
        .into_iter()
        .flat_map(|map| map.keys().cloned())
}
