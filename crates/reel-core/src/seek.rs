//! Seek queuing until the engine is ready

use tracing::{debug, trace};

use crate::types::{PendingSeek, SeekTarget};

/// Holds at most one pending seek and tracks the seek in flight.
#[derive(Debug, Default)]
pub struct SeekCoordinator {
    pending: Option<PendingSeek>,
    in_flight: Option<SeekTarget>,
}

impl SeekCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the target to issue now, or `None` when the request was
    /// queued. A queued request replaces any earlier pending one.
    pub fn request(&mut self, target: SeekTarget, engine_ready: bool) -> Option<SeekTarget> {
        if engine_ready {
            if let Some(superseded) = self.pending.take() {
                debug!(seek = %superseded.target, "pending seek superseded");
            }
            return Some(target);
        }
        if let Some(previous) = self.pending.replace(PendingSeek::new(target)) {
            debug!(previous = %previous.target, seek = %target, "pending seek overwritten");
        } else {
            trace!(seek = %target, "seek deferred until engine is ready");
        }
        None
    }

    /// Take the pending seek for replay. Callers leave it queued until the
    /// media is seekable.
    pub fn take_pending(&mut self) -> Option<PendingSeek> {
        self.pending.take()
    }

    pub fn begin(&mut self, target: SeekTarget) {
        self.in_flight = Some(target);
    }

    /// Close the seek in flight. A failed seek also drops anything pending.
    pub fn complete(&mut self, success: bool) -> Option<SeekTarget> {
        if !success {
            if let Some(dropped) = self.pending.take() {
                debug!(seek = %dropped.target, "pending seek dropped after failed seek");
            }
        }
        self.in_flight.take()
    }

    pub fn pending(&self) -> Option<&PendingSeek> {
        self.pending.as_ref()
    }

    pub fn pending_target(&self) -> Option<SeekTarget> {
        self.pending.map(|p| p.target)
    }

    pub fn is_seeking(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_when_ready() {
        let mut seeks = SeekCoordinator::new();
        assert_eq!(
            seeks.request(SeekTarget::Relative(5.0), true),
            Some(SeekTarget::Relative(5.0))
        );
        assert!(seeks.pending().is_none());
    }

    #[test]
    fn test_defer_then_replay() {
        let mut seeks = SeekCoordinator::new();
        assert_eq!(seeks.request(SeekTarget::Relative(20.0), false), None);
        assert_eq!(seeks.pending_target(), Some(SeekTarget::Relative(20.0)));

        let replay = seeks.take_pending().unwrap();
        assert_eq!(replay.target, SeekTarget::Relative(20.0));
        assert!(seeks.pending().is_none());
        assert!(seeks.take_pending().is_none());
    }

    #[test]
    fn test_pending_survives_until_taken() {
        let mut seeks = SeekCoordinator::new();
        seeks.request(SeekTarget::Relative(20.0), false);
        assert_eq!(seeks.pending_target(), Some(SeekTarget::Relative(20.0)));
        assert_eq!(seeks.pending_target(), Some(SeekTarget::Relative(20.0)));
        assert!(!seeks.is_seeking());
        assert_eq!(seeks.take_pending().unwrap().target, SeekTarget::Relative(20.0));
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let mut seeks = SeekCoordinator::new();
        seeks.request(SeekTarget::Relative(10.0), false);
        seeks.request(SeekTarget::Relative(30.0), false);
        assert_eq!(seeks.take_pending().unwrap().target, SeekTarget::Relative(30.0));
    }

    #[test]
    fn test_immediate_seek_clears_pending() {
        let mut seeks = SeekCoordinator::new();
        seeks.request(SeekTarget::Relative(10.0), false);
        seeks.request(SeekTarget::Relative(40.0), true);
        assert!(seeks.take_pending().is_none());
    }

    #[test]
    fn test_failed_seek_drops_pending() {
        let mut seeks = SeekCoordinator::new();
        seeks.begin(SeekTarget::Absolute(12.0));
        seeks.request(SeekTarget::Relative(50.0), false);
        assert!(seeks.is_seeking());

        assert_eq!(seeks.complete(false), Some(SeekTarget::Absolute(12.0)));
        assert!(!seeks.is_seeking());
        assert!(seeks.pending().is_none());
    }
}
