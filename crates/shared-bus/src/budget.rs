//! # Send Budget
//!
//! Hard cap on the number of envelopes a bus accepts.
//!
//! Unlike a token bucket there is no refill: once `accepted == limit` every
//! further send is rejected until the bus is re-initialized. The counter is
//! also the envelope id seed, so acquiring a slot yields the sequence number
//! of the envelope about to be appended.

/// Counter of accepted sends against a fixed limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendBudget {
    /// Maximum accepted sends.
    limit: u64,
    /// Sends accepted so far. Never decremented.
    accepted: u64,
}

impl SendBudget {
    /// Create an untouched budget.
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self { limit, accepted: 0 }
    }

    /// Try to consume one slot.
    ///
    /// Returns the 1-based sequence number of the accepted send, or `None`
    /// when the budget is exhausted. A rejection leaves the counter unchanged.
    pub fn try_acquire(&mut self) -> Option<u64> {
        if self.accepted >= self.limit {
            return None;
        }
        self.accepted += 1;
        Some(self.accepted)
    }

    /// Sends accepted so far.
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Configured limit.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Slots left before sends are rejected.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.accepted)
    }

    /// Check if the next send would be rejected.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}
