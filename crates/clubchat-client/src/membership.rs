//! Room membership coordination.
//!
//! Decides whether the local user must join before subscribing and keeps the
//! member list fresh. Membership is compared on normalized ids, so a member
//! listed as `7` matches a self id resolved as `"7"`.

use std::{collections::VecDeque, ops::Sub, time::Duration};

use clubchat_proto::{RoomMember, Timestamp, UserId};

/// Progress of the join for the open room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinState {
    /// Not decided yet.
    #[default]
    Unknown,
    /// Join call in flight.
    Joining,
    /// Member of the room.
    Joined,
    /// Join call failed; the room stays read-only.
    Failed,
}

/// Outcome of [`Membership::ensure_joined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    /// Self is in the member list; no join call.
    AlreadyMember,
    /// Issue a join call now.
    Join,
    /// Decided earlier; nothing to do.
    Settled,
}

/// Member list and join state of the open room.
#[derive(Debug, Clone)]
pub struct Membership<I> {
    members: Vec<RoomMember>,
    loaded: bool,
    join: JoinState,
    /// Members are refetched after a join to learn our join time.
    awaiting_refetch: bool,
    /// When each pending delayed refresh was scheduled.
    refreshes: VecDeque<I>,
}

impl<I> Default for Membership<I> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            loaded: false,
            join: JoinState::Unknown,
            awaiting_refetch: false,
            refreshes: VecDeque::new(),
        }
    }
}

impl<I> Membership<I>
where
    I: Copy + Sub<Output = Duration>,
{
    /// Nothing loaded, join undecided.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last fetched member list.
    pub fn members(&self) -> &[RoomMember] {
        &self.members
    }

    /// Whether the entry fetch finished (successfully or not).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Join progress.
    pub fn join_state(&self) -> JoinState {
        self.join
    }

    /// Whether the local user is a member.
    pub fn is_joined(&self) -> bool {
        self.join == JoinState::Joined
    }

    /// Replace the member list with a fresh fetch.
    pub fn set_members(&mut self, members: Vec<RoomMember>) {
        self.members = members;
        self.loaded = true;
    }

    /// Entry fetch failed; proceed without a member list.
    pub fn mark_unavailable(&mut self) {
        self.loaded = true;
    }

    /// Member record of `user`.
    pub fn member(&self, user: &UserId) -> Option<&RoomMember> {
        self.members.iter().find(|member| member.user_id.as_str() == user.as_str())
    }

    /// Whether `user` is in the member list.
    pub fn contains(&self, user: &UserId) -> bool {
        self.member(user).is_some()
    }

    /// Join time of `user`, when known.
    pub fn joined_at(&self, user: Option<&UserId>) -> Option<Timestamp> {
        user.and_then(|user| self.member(user)).and_then(|member| member.joined_at.clone())
    }

    /// Decide whether a join call is needed.
    ///
    /// Only acts once per room: later calls return `Settled`, so at most one
    /// join is ever in flight. An unknown self id cannot be found in the list
    /// and always leads to a join, which the server treats as idempotent.
    pub fn ensure_joined(&mut self, self_id: Option<&UserId>) -> JoinDecision {
        if self.join != JoinState::Unknown {
            return JoinDecision::Settled;
        }
        if self_id.is_some_and(|id| self.contains(id)) {
            self.join = JoinState::Joined;
            return JoinDecision::AlreadyMember;
        }
        self.join = JoinState::Joining;
        JoinDecision::Join
    }

    /// Join call succeeded (or the server said we already were a member).
    pub fn join_succeeded(&mut self) {
        self.join = JoinState::Joined;
        self.awaiting_refetch = true;
    }

    /// Join call failed.
    pub fn join_failed(&mut self) {
        self.join = JoinState::Failed;
    }

    /// Post-join refetch finished.
    pub fn refetch_done(&mut self) {
        self.awaiting_refetch = false;
    }

    /// Whether the join time lookup can be trusted for the backfill.
    pub fn history_ready(&self) -> bool {
        self.loaded
            && !self.awaiting_refetch
            && matches!(self.join, JoinState::Joined | JoinState::Failed)
    }

    /// Schedule one delayed refetch.
    pub fn schedule_refresh(&mut self, now: I) {
        self.refreshes.push_back(now);
    }

    /// Number of refetches waiting for their delay.
    pub fn pending_refreshes(&self) -> usize {
        self.refreshes.len()
    }

    /// Remove refetches whose delay has passed and return how many.
    pub fn take_due_refreshes(&mut self, now: I, delay: Duration) -> usize {
        let mut due = 0;
        while self.refreshes.front().is_some_and(|&scheduled| now - scheduled >= delay) {
            self.refreshes.pop_front();
            due += 1;
        }
        due
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use clubchat_proto::ClubRole;

    use super::*;

    fn member(id: &str, joined_at: Option<&str>) -> RoomMember {
        RoomMember {
            user_id: UserId::new(id),
            nickname: Some(format!("user-{id}")),
            club_role: ClubRole::default(),
            joined_at: joined_at.map(|ts| Timestamp::parse(ts).unwrap()),
        }
    }

    #[test]
    fn present_member_skips_join_and_stays_settled() {
        let mut membership: Membership<Instant> = Membership::new();
        membership.set_members(vec![member("7", None)]);

        let self_id = UserId::from(7);
        assert_eq!(membership.ensure_joined(Some(&self_id)), JoinDecision::AlreadyMember);
        assert_eq!(membership.ensure_joined(Some(&self_id)), JoinDecision::Settled);
        assert!(membership.is_joined());
    }

    #[test]
    fn absent_member_joins_once() {
        let mut membership: Membership<Instant> = Membership::new();
        membership.set_members(vec![member("1", None)]);

        let self_id = UserId::new("2");
        assert_eq!(membership.ensure_joined(Some(&self_id)), JoinDecision::Join);
        assert_eq!(membership.ensure_joined(Some(&self_id)), JoinDecision::Settled);
        assert_eq!(membership.join_state(), JoinState::Joining);
        assert!(!membership.history_ready());

        membership.join_succeeded();
        assert!(!membership.history_ready(), "waits for the post-join refetch");
        membership.refetch_done();
        assert!(membership.history_ready());
    }

    #[test]
    fn unknown_self_joins() {
        let mut membership: Membership<Instant> = Membership::new();
        membership.mark_unavailable();
        assert_eq!(membership.ensure_joined(None), JoinDecision::Join);
    }

    #[test]
    fn joined_at_of_self() {
        let mut membership: Membership<Instant> = Membership::new();
        membership.set_members(vec![
            member("1", Some("2024-05-01T09:00:00")),
            member("2", None),
        ]);

        let at = membership.joined_at(Some(&UserId::from(1))).unwrap();
        assert_eq!(at.as_str(), "2024-05-01T09:00:00");
        assert!(membership.joined_at(Some(&UserId::from(2))).is_none());
        assert!(membership.joined_at(None).is_none());
    }

    #[test]
    fn refreshes_fire_after_delay() {
        let t0 = Instant::now();
        let delay = Duration::from_millis(500);
        let mut membership: Membership<Instant> = Membership::new();
        membership.schedule_refresh(t0);
        membership.schedule_refresh(t0 + Duration::from_millis(100));

        assert_eq!(membership.take_due_refreshes(t0 + Duration::from_millis(499), delay), 0);
        assert_eq!(membership.take_due_refreshes(t0 + Duration::from_millis(500), delay), 1);
        assert_eq!(membership.take_due_refreshes(t0 + Duration::from_secs(1), delay), 1);
        assert_eq!(membership.pending_refreshes(), 0);
    }
}
