//! Join latch.
//!
//! The signaling channel may report `connect` more than once for the same
//! membership. The latch lets exactly one of them start a join; it is
//! released only when the membership ends or the link is lost.

/// Guards against concurrent or repeated joins.
#[derive(Debug, Default)]
pub struct JoinLatch {
    engaged: bool,
}

impl JoinLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engage the latch. Returns `false` if it was already engaged.
    pub fn try_acquire(&mut self) -> bool {
        !std::mem::replace(&mut self.engaged, true)
    }

    pub fn release(&mut self) {
        self.engaged = false;
    }

    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }
}
