//! STOMP heart-beat header values.
//!
//! A `heart-beat:cx,cy` header says "I can send a beat every `cx` ms" and
//! "I want to receive a beat every `cy` ms". Zero means "cannot"/"do not
//! want". Both peers announce their values; the effective intervals are the
//! larger of the two matching halves, and a direction is disabled when either
//! side announces zero.

use std::time::Duration;

use crate::errors::{ProtocolError, Result};

/// One peer's heart-beat announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartBeat {
    /// Smallest interval at which this peer can send beats.
    pub send_every: Duration,
    /// Interval at which this peer wants to receive beats.
    pub expect_every: Duration,
}

/// Effective heart-beat intervals for one side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NegotiatedHeartBeat {
    /// How often we must write something. `None` when disabled.
    pub outgoing: Option<Duration>,
    /// How often the peer promised to write something. `None` when disabled.
    pub incoming: Option<Duration>,
}

impl HeartBeat {
    /// Announcement that disables heart-beats in both directions.
    pub const DISABLED: Self = Self { send_every: Duration::ZERO, expect_every: Duration::ZERO };

    /// Create an announcement.
    pub fn new(send_every: Duration, expect_every: Duration) -> Self {
        Self { send_every, expect_every }
    }

    /// Parse a `heart-beat` header value.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || ProtocolError::InvalidHeartBeat(value.to_string());
        let (send, expect) = value.split_once(',').ok_or_else(invalid)?;
        let send: u64 = send.trim().parse().map_err(|_| invalid())?;
        let expect: u64 = expect.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(Duration::from_millis(send), Duration::from_millis(expect)))
    }

    /// Header value in milliseconds (`cx,cy`).
    pub fn header_value(&self) -> String {
        format!("{},{}", self.send_every.as_millis(), self.expect_every.as_millis())
    }

    /// Effective intervals from our point of view, given the peer's
    /// announcement.
    pub fn negotiate(&self, peer: &Self) -> NegotiatedHeartBeat {
        NegotiatedHeartBeat {
            outgoing: effective(self.send_every, peer.expect_every),
            incoming: effective(self.expect_every, peer.send_every),
        }
    }
}

fn effective(ours: Duration, theirs: Duration) -> Option<Duration> {
    if ours.is_zero() || theirs.is_zero() { None } else { Some(ours.max(theirs)) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format() {
        let beat = HeartBeat::parse("10000, 5000").unwrap();
        assert_eq!(beat.send_every, Duration::from_secs(10));
        assert_eq!(beat.expect_every, Duration::from_secs(5));
        assert_eq!(beat.header_value(), "10000,5000");
    }

    #[test]
    fn negotiation_takes_larger_interval() {
        let ours = HeartBeat::new(Duration::from_secs(10), Duration::from_secs(10));
        let server = HeartBeat::new(Duration::from_secs(4), Duration::from_secs(20));

        let negotiated = ours.negotiate(&server);
        assert_eq!(negotiated.outgoing, Some(Duration::from_secs(20)));
        assert_eq!(negotiated.incoming, Some(Duration::from_secs(10)));
    }

    #[test]
    fn zero_disables_direction() {
        let ours = HeartBeat::new(Duration::from_secs(10), Duration::from_secs(10));
        let negotiated = ours.negotiate(&HeartBeat::DISABLED);
        assert_eq!(negotiated, NegotiatedHeartBeat::default());
    }

    #[test]
    fn reject_garbage() {
        assert!(HeartBeat::parse("ten,five").is_err());
        assert!(HeartBeat::parse("10000").is_err());
    }
}
