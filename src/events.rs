//! Event Catalog
//!
//! Maps the bridge contract's event topics to semantic event kinds.

use alloy::primitives::B256;
use eyre::{eyre, Result};
use serde::Serialize;
use std::fmt;

/// Events emitted by the bridge contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Deposit,
    Creation,
    Withdraw,
    BridgeSet,
    BridgeFunded,
    Paid,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Deposit => "deposit",
            EventKind::Creation => "creation",
            EventKind::Withdraw => "withdraw",
            EventKind::BridgeSet => "bridge_set",
            EventKind::BridgeFunded => "bridge_funded",
            EventKind::Paid => "paid",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Topic identifiers for every bridge event, as supplied by configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTopics {
    pub deposit: B256,
    pub creation: B256,
    pub withdraw: B256,
    pub bridge_set: B256,
    pub bridge_funded: B256,
    pub paid: B256,
}

/// Immutable topic → kind lookup shared by all listeners
#[derive(Debug, Clone)]
pub struct EventCatalog {
    entries: [(B256, EventKind); 6],
}

impl EventCatalog {
    /// Build the catalog; two kinds may not share a topic
    pub fn new(topics: &EventTopics) -> Result<Self> {
        let entries = [
            (topics.deposit, EventKind::Deposit),
            (topics.creation, EventKind::Creation),
            (topics.withdraw, EventKind::Withdraw),
            (topics.bridge_set, EventKind::BridgeSet),
            (topics.bridge_funded, EventKind::BridgeFunded),
            (topics.paid, EventKind::Paid),
        ];

        for (i, (topic, kind)) in entries.iter().enumerate() {
            if let Some((_, other)) = entries[i + 1..].iter().find(|(t, _)| t == topic) {
                return Err(eyre!(
                    "Event topic {} configured for both {} and {}",
                    topic,
                    kind,
                    other
                ));
            }
        }

        Ok(Self { entries })
    }

    /// Classify a log topic; `None` for topics the bridge does not emit
    pub fn classify(&self, topic: &B256) -> Option<EventKind> {
        self.entries
            .iter()
            .find(|(t, _)| t == topic)
            .map(|(_, kind)| *kind)
    }
}

#[cfg(test)]
pub(crate) fn test_topics() -> EventTopics {
    EventTopics {
        deposit: B256::repeat_byte(0x01),
        creation: B256::repeat_byte(0x02),
        withdraw: B256::repeat_byte(0x03),
        bridge_set: B256::repeat_byte(0x04),
        bridge_funded: B256::repeat_byte(0x05),
        paid: B256::repeat_byte(0x06),
    }
}
