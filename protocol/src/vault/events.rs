//! Change notifications produced by the vault.
//!
//! Events are recorded only when an operation commits. A failed or rolled
//! back operation leaves no trace here. External indexers consume them
//! either by draining the vault's journal or through an [`EventSink`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Address, Amount};

/// One committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEvent {
    /// Assets entered the vault and shares were minted.
    Deposit {
        caller: Address,
        receiver: Address,
        assets: Amount,
        shares: Amount,
    },
    /// Shares were burned and assets paid out.
    Withdraw {
        caller: Address,
        receiver: Address,
        owner: Address,
        assets: Amount,
        shares: Amount,
    },
    /// The active strategy was replaced and its assets migrated.
    StrategyChanged {
        old: Address,
        new: Address,
        migrated_assets: Amount,
    },
    /// The opaque model tag changed.
    ModelIdUpdated { old: String, new: String },
    /// The privileged authority was replaced.
    AuthorityChanged { by: Address, authority: String },
    /// Shares moved between holders.
    SharesTransferred {
        from: Address,
        to: Address,
        shares: Amount,
    },
    /// A share allowance was set.
    SharesApproved {
        owner: Address,
        spender: Address,
        shares: Amount,
    },
}

/// A [`VaultEvent`] with journal metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event identifier.
    pub id: Uuid,
    /// Monotonic position in this vault's journal, starting at 1.
    pub sequence: u64,
    /// Commit time.
    pub recorded_at: DateTime<Utc>,
    /// The change itself.
    pub event: VaultEvent,
}

impl EventRecord {
    pub(crate) fn new(sequence: u64, event: VaultEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            recorded_at: Utc::now(),
            event,
        }
    }
}

/// Receives every committed event, in order.
///
/// Called while the vault's operation is still in flight, so a sink must
/// not call back into value-moving vault entry points; such calls are
/// rejected as re-entrant.
pub trait EventSink: Send + Sync {
    /// Handles one committed event.
    fn publish(&self, record: &EventRecord);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let ev = VaultEvent::StrategyChanged {
            old: Address::from("hold-a"),
            new: Address::from("hold-b"),
            migrated_assets: 42,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "strategy_changed");
        assert_eq!(json["migrated_assets"], 42);
        assert_eq!(json["new"], "hold-b");
    }
}
