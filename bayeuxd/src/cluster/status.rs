//! Lifecycle guard shared by backbone implementations.

use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::sleep;
use std::time::Duration;

/// How long a caller racing a transition sleeps between checks.
pub(crate) const TRANSITION_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ComponentStatus {
    Stopped = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
}

impl ComponentStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ComponentStatus::Starting,
            2 => ComponentStatus::Started,
            3 => ComponentStatus::Stopping,
            _ => ComponentStatus::Stopped,
        }
    }
}

/// Atomic [`ComponentStatus`] with compare-and-set transitions.
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new() -> Self {
        StatusCell(AtomicU8::new(ComponentStatus::Stopped as u8))
    }

    pub fn get(&self) -> ComponentStatus {
        ComponentStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, status: ComponentStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    /// Moves `from -> to`, or returns the status actually observed.
    pub fn transition(
        &self,
        from: ComponentStatus,
        to: ComponentStatus,
    ) -> Result<(), ComponentStatus> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ComponentStatus::from_u8)
    }

    /// Claims the `from -> to` transition, waiting out any transition that is
    /// already in flight. Returns `false` when the component is already in
    /// `settled`, so there is nothing to do.
    pub fn claim(
        &self,
        from: ComponentStatus,
        to: ComponentStatus,
        settled: ComponentStatus,
    ) -> bool {
        loop {
            match self.transition(from, to) {
                Ok(()) => return true,
                Err(observed) if observed == settled => return false,
                Err(_) => sleep(TRANSITION_WAIT),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn transition_reports_observed_status() {
        let status = StatusCell::new();
        assert_eq!(
            status.transition(ComponentStatus::Started, ComponentStatus::Stopping),
            Err(ComponentStatus::Stopped)
        );
        assert_eq!(
            status.transition(ComponentStatus::Stopped, ComponentStatus::Starting),
            Ok(())
        );
        assert_eq!(status.get(), ComponentStatus::Starting);
    }

    #[test]
    fn claim_returns_false_when_settled() {
        let status = StatusCell::new();
        assert!(!status.claim(
            ComponentStatus::Started,
            ComponentStatus::Stopping,
            ComponentStatus::Stopped
        ));
    }

    #[test]
    fn claim_waits_for_in_flight_transition() {
        let status = Arc::new(StatusCell::new());
        status.set(ComponentStatus::Starting);

        let finisher = {
            let status = status.clone();
            thread::spawn(move || {
                sleep(Duration::from_millis(150));
                status.set(ComponentStatus::Started);
            })
        };

        assert!(status.claim(
            ComponentStatus::Started,
            ComponentStatus::Stopping,
            ComponentStatus::Stopped
        ));
        assert_eq!(status.get(), ComponentStatus::Stopping);
        finisher.join().unwrap();
    }
}
