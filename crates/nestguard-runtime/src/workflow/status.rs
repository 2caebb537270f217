//! Single-word approval status with compare-and-swap transitions

use std::sync::atomic::{AtomicU8, Ordering};

use nestguard_core::ApprovalStatus;

#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) fn new(status: ApprovalStatus) -> Self {
        Self(AtomicU8::new(status.as_u8()))
    }

    pub(crate) fn load(&self) -> ApprovalStatus {
        decode(self.0.load(Ordering::Acquire))
    }

    /// Move `from` -> `to` atomically
    ///
    /// On failure returns the status actually observed. A terminal status is
    /// only ever moved back to pending by the winner of the transition, when
    /// its write to the store failed.
    pub(crate) fn transition(
        &self,
        from: ApprovalStatus,
        to: ApprovalStatus,
    ) -> Result<(), ApprovalStatus> {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(decode)
    }
}

// Only `new` and `transition` write, both from valid statuses.
fn decode(value: u8) -> ApprovalStatus {
    ApprovalStatus::from_u8(value).unwrap_or(ApprovalStatus::Expired)
}
