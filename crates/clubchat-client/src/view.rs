//! Read model.
//!
//! The session exposes its state as a [`RoomSnapshot`] that presentation code
//! renders however it likes. Nothing here mutates the session.

use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone};
use clubchat_core::ConnectionStatus;
use clubchat_proto::{ChatMessage, RoomDirectory, RoomMember, UserId};

use crate::{
    event::{RoomEpoch, RoomTarget},
    stream::StreamState,
};

/// Name shown for senders without a nickname.
pub const ANONYMOUS: &str = "anonymous";

/// Who a log entry is from, from the local user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribution {
    /// Membership change announcement.
    System,
    /// Written by the local user.
    Own,
    /// Written by someone else.
    Other,
    /// Self identity unresolved; own and other cannot be told apart.
    Unknown,
}

impl Attribution {
    /// Classify `message` for `self_id`.
    pub fn of(message: &ChatMessage, self_id: Option<&UserId>) -> Self {
        if message.kind.is_membership_change() {
            return Self::System;
        }
        match self_id {
            None => Self::Unknown,
            Some(me) if message.user_id.as_ref().is_some_and(|id| id.as_str() == me.as_str()) => {
                Self::Own
            },
            Some(_) => Self::Other,
        }
    }
}

/// One message of the log with its attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// The message.
    pub message: ChatMessage,
    /// Sender classification.
    pub attribution: Attribution,
}

impl LogEntry {
    /// Nickname, or [`ANONYMOUS`].
    pub fn sender_name(&self) -> &str {
        self.message.nickname.as_deref().filter(|name| !name.trim().is_empty()).unwrap_or(ANONYMOUS)
    }
}

/// Label of a day section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayLabel {
    /// Same calendar day as now.
    Today,
    /// The day before.
    Yesterday,
    /// Any other day.
    Date(NaiveDate),
}

impl DayLabel {
    /// Label for `day` seen from `today`.
    pub fn for_day(day: NaiveDate, today: NaiveDate) -> Self {
        if day == today {
            Self::Today
        } else if today.pred_opt() == Some(day) {
            Self::Yesterday
        } else {
            Self::Date(day)
        }
    }
}

impl fmt::Display for DayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Today => f.write_str("Today"),
            Self::Yesterday => f.write_str("Yesterday"),
            Self::Date(day) => write!(f, "{}", day.format("%A, %b %-d, %Y")),
        }
    }
}

/// Consecutive log entries from the same calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySection<'a> {
    /// Day of the entries.
    pub label: DayLabel,
    /// Entries in log order.
    pub entries: &'a [LogEntry],
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomSnapshot {
    /// Open room.
    pub target: Option<RoomTarget>,
    /// Epoch of the open room.
    pub epoch: RoomEpoch,
    /// Connection status.
    pub status: ConnectionStatus,
    /// Subscription lifecycle.
    pub stream: StreamState,
    /// Local user, when resolved.
    pub self_id: Option<UserId>,
    /// Whether the local user is a member of the open room.
    pub joined: bool,
    /// Whether live frames are held back for the history backfill.
    pub backfill_pending: bool,
    /// Message log in order.
    pub entries: Vec<LogEntry>,
    /// Last fetched member list.
    pub members: Vec<RoomMember>,
    /// Last loaded room directory.
    pub directory: Option<RoomDirectory>,
}

impl RoomSnapshot {
    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether the send control should be enabled.
    pub fn can_send(&self) -> bool {
        self.target.is_some() && self.status.is_connected()
    }

    /// Group entries into day sections in log order, as seen from `now`.
    ///
    /// A new section starts whenever the day changes from the previous
    /// entry, so out-of-order timestamps produce repeated labels rather than
    /// reordered messages. Entries without a timestamp stay in the running
    /// section.
    pub fn sections<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<DaySection<'_>> {
        let tz = now.timezone();
        let today = now.date_naive();

        let mut sections = Vec::new();
        let mut start = 0;
        let mut current: Option<NaiveDate> = None;

        for (idx, entry) in self.entries.iter().enumerate() {
            let day = entry
                .message
                .created_at
                .as_ref()
                .map(|ts| ts.at().with_timezone(&tz).date_naive())
                .or(current)
                .unwrap_or(today);

            if current != Some(day) {
                if let Some(previous) = current {
                    sections.push(DaySection {
                        label: DayLabel::for_day(previous, today),
                        entries: &self.entries[start..idx],
                    });
                }
                start = idx;
                current = Some(day);
            }
        }

        if let Some(day) = current {
            sections.push(DaySection {
                label: DayLabel::for_day(day, today),
                entries: &self.entries[start..],
            });
        }
        sections
    }
}
