//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties of the session's read model that must hold
//! after every event, whatever order transports, frames, and REST responses
//! arrive in. [`Scenario`](crate::Scenario) runs the registered checks after
//! each event it feeds.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.check_all(&session.snapshot())?;
//! ```

mod checks;

use clubchat_client::RoomSnapshot;

pub use checks::{
    JoinedBeforeSubscribed, SubscriptionRequiresConnection, TargetlessIsQuiet, UniqueMessageIds,
};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a [`RoomSnapshot`].
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    fn check(&self, state: &RoomSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the session invariants.
    ///
    /// Includes:
    /// - [`UniqueMessageIds`]: the log never repeats a message id
    /// - [`SubscriptionRequiresConnection`]: subscribed implies connected
    /// - [`JoinedBeforeSubscribed`]: no subscription without membership
    /// - [`TargetlessIsQuiet`]: a closed view has no live work
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(UniqueMessageIds);
        registry.add(SubscriptionRequiresConnection);
        registry.add(JoinedBeforeSubscribed);
        registry.add(TargetlessIsQuiet);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &RoomSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation found.
    pub fn assert_all(&self, state: &RoomSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
