//! History reconciliation.
//!
//! Live delivery is gated while the backfill is outstanding: frames that
//! arrive in that window are deduplicated into a pending buffer instead of the
//! log. When the backfill lands it replaces the log and the buffer is replayed
//! through the same dedup path, so the log reads in server order followed by
//! whatever arrived live since. If the backfill fails the buffer is flushed
//! as-is and the room keeps working on live frames alone.

use clubchat_proto::ChatMessage;

use crate::stream::MessageLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backfill {
    Gated { requested: bool },
    Open,
}

/// Gate between the backfill and live frames.
#[derive(Debug, Clone)]
pub struct HistoryReconciler {
    state: Backfill,
    pending: MessageLog,
}

impl Default for HistoryReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryReconciler {
    /// Gated, no backfill requested.
    pub fn new() -> Self {
        Self { state: Backfill::Gated { requested: false }, pending: MessageLog::new() }
    }

    /// Whether live frames are being buffered.
    pub fn is_gated(&self) -> bool {
        matches!(self.state, Backfill::Gated { .. })
    }

    /// Gated and no backfill issued yet.
    pub fn needs_request(&self) -> bool {
        self.state == Backfill::Gated { requested: false }
    }

    /// Record that the backfill has been issued.
    pub fn mark_requested(&mut self) {
        self.state = Backfill::Gated { requested: true };
    }

    /// Close the gate again for a fresh backfill (after a reconnect).
    ///
    /// No-op while a backfill is already outstanding.
    pub fn regate(&mut self) {
        if self.state == Backfill::Open {
            self.state = Backfill::Gated { requested: false };
        }
    }

    /// Buffer a live message while gated. Returns false for duplicates of the
    /// log or of the buffer.
    pub fn buffer(&mut self, log: &MessageLog, message: ChatMessage) -> bool {
        if log.contains(&message.message_id) {
            return false;
        }
        self.pending.append(message)
    }

    /// Messages waiting for the backfill.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Backfill arrived: replace the log and replay the buffer. Returns how
    /// many buffered messages were new.
    pub fn land(&mut self, log: &mut MessageLog, backfill: Vec<ChatMessage>) -> usize {
        log.replace(backfill);
        self.open(log)
    }

    /// Backfill failed: keep the log and flush the buffer into it.
    pub fn abandon(&mut self, log: &mut MessageLog) -> usize {
        self.open(log)
    }

    fn open(&mut self, log: &mut MessageLog) -> usize {
        self.state = Backfill::Open;
        let mut appended = 0;
        for message in self.pending.take() {
            if log.append(message) {
                appended += 1;
            }
        }
        appended
    }
}

#[cfg(test)]
mod tests {
    use clubchat_proto::{MessageId, MessageKind};

    use super::*;

    fn message(id: &str) -> ChatMessage {
        ChatMessage {
            message_id: MessageId::new(id),
            room_id: "r1".into(),
            user_id: None,
            nickname: None,
            message: id.to_string(),
            kind: MessageKind::Talk,
            created_at: None,
        }
    }

    fn ids(log: &MessageLog) -> Vec<&str> {
        log.entries().iter().map(|m| m.message_id.as_str()).collect()
    }

    #[test]
    fn backfill_then_replay() {
        let mut log = MessageLog::new();
        let mut history = HistoryReconciler::new();
        assert!(history.needs_request());
        history.mark_requested();
        assert!(!history.needs_request());

        // m3 is live and also part of the backfill; m4 is only live.
        assert!(history.buffer(&log, message("m3")));
        assert!(history.buffer(&log, message("m4")));
        assert!(!history.buffer(&log, message("m4")));

        let replayed = history.land(&mut log, vec![message("m1"), message("m2"), message("m3")]);
        assert_eq!(replayed, 1);
        assert_eq!(ids(&log), ["m1", "m2", "m3", "m4"]);
        assert!(!history.is_gated());
    }

    #[test]
    fn failed_backfill_flushes_buffer() {
        let mut log = MessageLog::new();
        let mut history = HistoryReconciler::new();
        history.mark_requested();
        history.buffer(&log, message("live"));

        assert_eq!(history.abandon(&mut log), 1);
        assert_eq!(ids(&log), ["live"]);
        assert_eq!(history.pending_len(), 0);
    }

    #[test]
    fn regate_only_when_open() {
        let mut log = MessageLog::new();
        let mut history = HistoryReconciler::new();
        history.mark_requested();
        history.regate();
        assert!(!history.needs_request(), "outstanding backfill is kept");

        history.land(&mut log, Vec::new());
        history.regate();
        assert!(history.needs_request());
    }
}
