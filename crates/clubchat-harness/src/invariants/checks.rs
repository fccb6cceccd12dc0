//! Standard invariant checks.

use std::collections::HashSet;

use clubchat_client::{RoomSnapshot, StreamState};

use super::{Invariant, InvariantResult, Violation};

/// No message id appears twice in the log.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        let mut seen = HashSet::new();
        for entry in &state.entries {
            let id = &entry.message.message_id;
            if !seen.insert(id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("message {id} appears more than once"),
                });
            }
        }
        Ok(())
    }
}

/// A subscription only exists on a connected session.
pub struct SubscriptionRequiresConnection;

impl Invariant for SubscriptionRequiresConnection {
    fn name(&self) -> &'static str {
        "subscription_requires_connection"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        if state.stream == StreamState::Subscribed && !state.status.is_connected() {
            return Err(Violation {
                invariant: self.name(),
                message: format!("subscribed while {}", state.status),
            });
        }
        Ok(())
    }
}

/// The room is only subscribed once the local user is a member.
pub struct JoinedBeforeSubscribed;

impl Invariant for JoinedBeforeSubscribed {
    fn name(&self) -> &'static str {
        "joined_before_subscribed"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        if state.stream == StreamState::Subscribed && !state.joined {
            let room = state.target.as_ref().map(ToString::to_string).unwrap_or_default();
            return Err(Violation {
                invariant: self.name(),
                message: format!("subscribed to {room} before joining"),
            });
        }
        Ok(())
    }
}

/// Without a target there is no subscription and no pending backfill.
pub struct TargetlessIsQuiet;

impl Invariant for TargetlessIsQuiet {
    fn name(&self) -> &'static str {
        "targetless_is_quiet"
    }

    fn check(&self, state: &RoomSnapshot) -> InvariantResult {
        if state.target.is_some() {
            return Ok(());
        }
        if state.stream == StreamState::Subscribed || state.backfill_pending {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "no room open but stream is {:?} (backfill pending: {})",
                    state.stream, state.backfill_pending
                ),
            });
        }
        Ok(())
    }
}
