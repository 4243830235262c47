use serde::{Deserialize, Serialize};

/// Per-conversation reconciliation state between the optimistic store and the
/// durable source.
///
/// The optimistic store is a write-ahead cache; the durable source refreshes
/// on its own cadence. Rather than re-deriving "who is fresher" from message
/// flags on every render, each conversation carries an explicit state that
/// advances on three events: the user sends, the backend confirms
/// persistence, and a durable fetch resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local mutations exist that the backend has not confirmed yet.
    #[default]
    LocalOnly,
    /// The backend confirmed persistence but the durable view has not caught
    /// up; the optimistic list is strictly ahead.
    LocalAheadOfDurable,
    /// The durable view reflects everything written locally.
    DurableAuthoritative,
}

impl SyncState {
    /// A send puts unconfirmed local writes in front of everything.
    pub fn on_send(self) -> Self {
        SyncState::LocalOnly
    }

    /// The `persisted` chunk arrived: the write is confirmed but the durable
    /// view may still lag.
    pub fn on_persist_confirmed(self) -> Self {
        SyncState::LocalAheadOfDurable
    }

    /// A durable fetch resolved. Only a fetch that actually contains the
    /// confirmed write hands authority to the durable source.
    pub fn on_durable_fetch_resolved(self, matched: bool) -> Self {
        if matched {
            SyncState::DurableAuthoritative
        } else {
            self
        }
    }
}
