//! Subscription lifecycle
//!
//! ```text
//!   New ──start_consume──► Consuming
//!    │                        │
//!    └──────── close ─────────┴──► Closed (terminal)
//! ```
//!
//! The state lives in an atomic so `close()` can take effect immediately,
//! even while a broker operation for the same connection is in flight.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a subscription connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Connected, no queue consumer yet
    New,
    /// Queue asserted and consumer attached; bindings may change
    Consuming,
    /// Teardown started; no further broker operations admitted
    Closed,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SubscriptionState::New,
            1 => SubscriptionState::Consuming,
            _ => SubscriptionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SubscriptionState::New => 0,
            SubscriptionState::Consuming => 1,
            SubscriptionState::Closed => 2,
        }
    }
}

/// Atomic cell holding a [`SubscriptionState`]
///
/// All transition rules live here: `New → Consuming` once, `Closed` from
/// anywhere, nothing out of `Closed`.
#[derive(Debug)]
pub struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub fn new() -> Self {
        Self(AtomicU8::new(SubscriptionState::New.as_u8()))
    }

    /// Current state
    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Whether `start_consume` may proceed
    pub fn can_start(&self) -> bool {
        self.state() == SubscriptionState::New
    }

    /// Whether bindings may be mutated
    pub fn admits_mutation(&self) -> bool {
        self.state() == SubscriptionState::Consuming
    }

    /// Transition `New → Consuming`.
    ///
    /// Returns `false` if the connection was closed in the meantime.
    pub fn mark_consuming(&self) -> bool {
        self.0
            .compare_exchange(
                SubscriptionState::New.as_u8(),
                SubscriptionState::Consuming.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Transition to `Closed`.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let prev = self.0.swap(SubscriptionState::Closed.as_u8(), Ordering::AcqRel);
        SubscriptionState::from_u8(prev) != SubscriptionState::Closed
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
