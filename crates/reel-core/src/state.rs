//! Playback state machine
//!
//! Reconciles noisy engine signals into one of five [`PlaybackState`]s.
//! Every input returns the resulting [`Transition`], or `None` when the
//! signal re-affirms the current state or is ignored; callers publish
//! events only for transitions.

use tracing::{debug, trace};

use crate::types::{BufferingState, EngineStatus, PlaybackState, PlaybackType};

/// A state change that actually happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PlaybackState,
    pub to: PlaybackState,
    /// False when a stop is in progress: stop publishes its own events
    pub announce: bool,
}

#[derive(Debug, Default)]
pub struct PlaybackStateMachine {
    state: PlaybackState,
    status: EngineStatus,
    stopping: bool,
    failed: bool,
    buffer_empty: bool,
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == EngineStatus::Ready
    }

    /// True once the engine reported a terminal failure this session
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Record an engine status. Returns true when the engine just became ready.
    pub fn on_status(&mut self, status: EngineStatus) -> bool {
        if self.failed || status == self.status {
            return false;
        }
        trace!(from = ?self.status, to = ?status, "engine status changed");
        self.status = status;
        status == EngineStatus::Ready
    }

    pub fn on_rate(&mut self, rate: f64, prior: bool) -> Option<Transition> {
        if self.failed {
            return None;
        }
        if prior {
            trace!(rate, "advance rate notice");
            return None;
        }

        if rate == 0.0 {
            let pausable = matches!(self.state, PlaybackState::Playing | PlaybackState::Stalling);
            if self.status == EngineStatus::Unknown || !pausable {
                return None;
            }
            return self.enter(PlaybackState::Paused);
        }

        match self.state {
            PlaybackState::Idle | PlaybackState::Paused if self.buffer_empty => {
                self.enter(PlaybackState::Stalling)
            }
            PlaybackState::Idle | PlaybackState::Paused => self.enter(PlaybackState::Playing),
            _ => None,
        }
    }

    pub fn on_buffering(&mut self, buffering: BufferingState) -> Option<Transition> {
        if self.failed {
            return None;
        }
        self.buffer_empty = buffering == BufferingState::BufferEmpty;

        match (buffering, self.state) {
            (_, PlaybackState::Paused) => None,
            (BufferingState::LikelyToKeepUp, PlaybackState::Stalling) => {
                self.enter(PlaybackState::Playing)
            }
            (BufferingState::BufferEmpty, PlaybackState::Idle | PlaybackState::Playing) => {
                self.enter(PlaybackState::Stalling)
            }
            _ => None,
        }
    }

    /// An explicit pause takes effect without waiting for the rate signal
    pub fn on_pause_requested(&mut self) -> Option<Transition> {
        if self.failed || !matches!(self.state, PlaybackState::Playing | PlaybackState::Stalling) {
            return None;
        }
        self.enter(PlaybackState::Paused)
    }

    /// Engine played to the end of media
    pub fn on_ended(&mut self) -> Option<Transition> {
        if self.failed {
            return None;
        }
        self.enter(PlaybackState::Idle)
    }

    /// Record a terminal failure. Returns the state before the failure the
    /// first time, `None` when a failure was already reported.
    ///
    /// A failure while idle leaves the state idle.
    pub fn on_failure(&mut self) -> Option<PlaybackState> {
        if self.failed {
            return None;
        }
        let previous = self.state;
        self.failed = true;
        self.status = EngineStatus::Failed;
        if previous != PlaybackState::Idle {
            self.state = PlaybackState::Error;
        }
        debug!(from = %previous, to = %self.state, "engine failure");
        Some(previous)
    }

    /// Mark a stop in progress: a pause entered now is not announced
    pub fn begin_stop(&mut self) {
        self.stopping = true;
    }

    /// Complete a stop: back to idle with a fresh session
    pub fn finish_stop(&mut self) -> Option<Transition> {
        let transition = self.transition_to(PlaybackState::Idle, false);
        self.stopping = false;
        self.failed = false;
        self.buffer_empty = false;
        self.status = EngineStatus::Unknown;
        transition
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn can_play(&self) -> bool {
        !self.failed && !matches!(self.state, PlaybackState::Playing | PlaybackState::Error)
    }

    pub fn can_pause(&self, playback_type: PlaybackType, dvr_available: bool) -> bool {
        let pausable = matches!(self.state, PlaybackState::Playing | PlaybackState::Stalling);
        pausable && (playback_type != PlaybackType::Live || dvr_available)
    }

    pub fn can_seek(&self, playback_type: PlaybackType, dvr_available: bool, duration: f64) -> bool {
        if self.failed || self.state == PlaybackState::Error {
            return false;
        }
        match playback_type {
            PlaybackType::Live => dvr_available,
            PlaybackType::Vod => duration > 0.0,
            PlaybackType::Unknown => false,
        }
    }

    fn enter(&mut self, to: PlaybackState) -> Option<Transition> {
        let announce = !self.stopping;
        self.transition_to(to, announce)
    }

    fn transition_to(&mut self, to: PlaybackState, announce: bool) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        if !from.can_transition_to(to) {
            debug!(%from, %to, "transition rejected");
            return None;
        }
        self.state = to;
        trace!(%from, %to, announce, "state changed");
        Some(Transition { from, to, announce })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_machine() -> PlaybackStateMachine {
        let mut machine = PlaybackStateMachine::new();
        machine.on_status(EngineStatus::Ready);
        machine
    }

    #[test]
    fn test_initial_state() {
        let machine = PlaybackStateMachine::new();
        assert_eq!(machine.state(), PlaybackState::Idle);
        assert!(machine.can_play());
        assert!(!machine.is_ready());
    }

    #[test]
    fn test_ready_reported_once() {
        let mut machine = PlaybackStateMachine::new();
        assert!(machine.on_status(EngineStatus::Ready));
        assert!(!machine.on_status(EngineStatus::Ready));
    }

    #[test]
    fn test_idle_to_stalling_to_playing() {
        let mut machine = ready_machine();
        let t = machine.on_buffering(BufferingState::BufferEmpty).unwrap();
        assert_eq!((t.from, t.to), (PlaybackState::Idle, PlaybackState::Stalling));

        assert!(machine.on_buffering(BufferingState::BufferEmpty).is_none());

        let t = machine.on_buffering(BufferingState::LikelyToKeepUp).unwrap();
        assert_eq!(t.to, PlaybackState::Playing);
    }

    #[test]
    fn test_rate_zero_pauses_only_when_running() {
        let mut machine = PlaybackStateMachine::new();
        machine.on_rate(1.0, false);
        // Status still unknown
        assert!(machine.on_rate(0.0, false).is_none());

        let mut machine = ready_machine();
        assert!(machine.on_rate(0.0, false).is_none());
        machine.on_rate(1.0, false);
        assert_eq!(machine.state(), PlaybackState::Playing);
        let t = machine.on_rate(0.0, false).unwrap();
        assert_eq!(t.to, PlaybackState::Paused);
        assert!(t.announce);
    }

    #[test]
    fn test_rate_resume_honours_empty_buffer() {
        let mut machine = ready_machine();
        machine.on_rate(1.0, false);
        machine.on_rate(0.0, false);
        machine.on_buffering(BufferingState::BufferEmpty);
        assert_eq!(machine.state(), PlaybackState::Paused);

        let t = machine.on_rate(1.0, false).unwrap();
        assert_eq!(t.to, PlaybackState::Stalling);
    }

    #[test]
    fn test_prior_rate_is_advisory() {
        let mut machine = ready_machine();
        assert!(machine.on_rate(1.0, true).is_none());
        assert_eq!(machine.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_explicit_pause_then_rate_zero_absorbed() {
        let mut machine = ready_machine();
        assert!(machine.on_pause_requested().is_none());
        machine.on_rate(1.0, false);
        let t = machine.on_pause_requested().unwrap();
        assert_eq!(t.to, PlaybackState::Paused);
        assert!(machine.on_rate(0.0, false).is_none());
    }

    #[test]
    fn test_pause_during_stop_is_silent() {
        let mut machine = ready_machine();
        machine.on_rate(1.0, false);
        machine.begin_stop();
        let t = machine.on_rate(0.0, false).unwrap();
        assert_eq!(t.to, PlaybackState::Paused);
        assert!(!t.announce);

        let t = machine.finish_stop().unwrap();
        assert_eq!(t.to, PlaybackState::Idle);
        assert_eq!(machine.status(), EngineStatus::Unknown);
    }

    #[test]
    fn test_failure_is_terminal_and_reported_once() {
        let mut machine = ready_machine();
        machine.on_rate(1.0, false);
        assert_eq!(machine.on_failure(), Some(PlaybackState::Playing));
        assert_eq!(machine.state(), PlaybackState::Error);
        assert_eq!(machine.on_failure(), None);

        assert!(machine.on_buffering(BufferingState::BufferEmpty).is_none());
        assert!(machine.on_rate(0.0, false).is_none());
        assert!(!machine.can_play());
        assert!(!machine.can_seek(PlaybackType::Vod, false, 100.0));

        machine.finish_stop();
        assert_eq!(machine.state(), PlaybackState::Idle);
        assert!(machine.can_play());
    }

    #[test]
    fn test_failure_while_idle_keeps_idle() {
        let mut machine = PlaybackStateMachine::new();
        assert_eq!(machine.on_failure(), Some(PlaybackState::Idle));
        assert_eq!(machine.state(), PlaybackState::Idle);
        assert!(!machine.can_play());
    }

    #[test]
    fn test_can_pause_live_requires_dvr() {
        let mut machine = ready_machine();
        machine.on_rate(1.0, false);
        assert!(!machine.can_pause(PlaybackType::Live, false));
        assert!(machine.can_pause(PlaybackType::Live, true));
        assert!(machine.can_pause(PlaybackType::Vod, false));
    }

    #[test]
    fn test_can_seek_by_type() {
        let machine = ready_machine();
        assert!(machine.can_seek(PlaybackType::Vod, false, 10.0));
        assert!(!machine.can_seek(PlaybackType::Vod, false, 0.0));
        assert!(machine.can_seek(PlaybackType::Live, true, 0.0));
        assert!(!machine.can_seek(PlaybackType::Live, false, 0.0));
        assert!(!machine.can_seek(PlaybackType::Unknown, true, 10.0));
    }

    #[test]
    fn test_end_of_media_returns_to_idle() {
        let mut machine = ready_machine();
        machine.on_rate(1.0, false);
        let t = machine.on_ended().unwrap();
        assert_eq!((t.from, t.to), (PlaybackState::Playing, PlaybackState::Idle));
    }
}
