//! Playback - orchestrates one source on one engine
//!
//! Coordinates:
//! - engine signals into the state machine
//! - seekable ranges into the DVR tracker
//! - seek requests through the seek coordinator
//! - audio and subtitle track discovery and selection
//! - every resulting event through the playback's bus
//!
//! No `RefCell` borrow is held while an event is triggered: listeners may
//! call straight back into the playback.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use tracing::{debug, error, instrument, trace, warn};

use crate::bus::{EventBus, EventHub, EventSource};
use crate::dvr::{DvrWindow, DvrWindowTracker};
use crate::engine::{EngineSignal, MediaEngine, SignalReceiver};
use crate::error::EngineError;
use crate::events::{payload, Event};
use crate::options::Options;
use crate::seek::SeekCoordinator;
use crate::state::{PlaybackStateMachine, Transition};
use crate::types::*;

/// Tracks of one type offered by the media
#[derive(Debug, Default)]
struct MediaTracks {
    options: Vec<MediaOption>,
    selected: Option<MediaOption>,
}

/// A single source playing on a single engine
pub struct Playback {
    bus: EventBus,
    options: RefCell<Options>,
    engine: RefCell<Box<dyn MediaEngine>>,
    machine: RefCell<PlaybackStateMachine>,
    dvr: RefCell<DvrWindowTracker>,
    seeks: RefCell<SeekCoordinator>,
    /// On-demand duration in seconds
    duration: Cell<f64>,
    muted: Cell<bool>,
    audio: RefCell<MediaTracks>,
    subtitles: RefCell<MediaTracks>,
    ready_announced: Cell<bool>,
    live_start_applied: Cell<bool>,
    destroyed: Cell<bool>,
}

impl Playback {
    /// Create a playback publishing on `hub`
    pub fn new(hub: &EventHub, options: Options, engine: Box<dyn MediaEngine>) -> Rc<Self> {
        let name = format!("playback:{}", engine.name());
        let playback = Rc::new(Self {
            bus: EventBus::new(hub, name),
            dvr: RefCell::new(DvrWindowTracker::new(options.min_dvr_size)),
            options: RefCell::new(options),
            engine: RefCell::new(engine),
            machine: RefCell::new(PlaybackStateMachine::new()),
            seeks: RefCell::new(SeekCoordinator::new()),
            duration: Cell::new(0.0),
            muted: Cell::new(false),
            audio: RefCell::new(MediaTracks::default()),
            subtitles: RefCell::new(MediaTracks::default()),
            ready_announced: Cell::new(false),
            live_start_applied: Cell::new(false),
            destroyed: Cell::new(false),
        });
        playback.forget_start_at_once_playing();
        playback
    }

    /// `startAt` only applies to the first start of a source
    fn forget_start_at_once_playing(self: &Rc<Self>) {
        let weak: Weak<Self> = Rc::downgrade(self);
        let registered = self.bus.once(Event::Playing, move |_| {
            if let Some(playback) = weak.upgrade() {
                playback.options.borrow_mut().start_at = None;
            }
        });
        if let Err(e) = registered {
            warn!(error = %e, "could not watch for first playing");
        }
    }

    pub fn name(&self) -> &str {
        self.bus.name()
    }

    pub fn state(&self) -> PlaybackState {
        self.machine.borrow().state()
    }

    pub fn playback_type(&self) -> PlaybackType {
        self.dvr.borrow().playback_type()
    }

    pub fn options(&self) -> Options {
        self.options.borrow().clone()
    }

    /// Duration in seconds: DVR window length for live streams
    pub fn duration(&self) -> f64 {
        let dvr = self.dvr.borrow();
        match dvr.playback_type() {
            PlaybackType::Live => dvr.window_duration(),
            _ => self.duration.get(),
        }
    }

    /// Playback-relative position in seconds
    pub fn position(&self) -> f64 {
        let time = self.engine.borrow().current_time();
        self.dvr.borrow().position(time)
    }

    pub fn is_dvr_available(&self) -> bool {
        self.dvr.borrow().is_available()
    }

    pub fn is_dvr_in_use(&self) -> bool {
        let time = self.engine.borrow().current_time();
        let paused = self.state() == PlaybackState::Paused;
        self.dvr.borrow().is_in_use(time, paused)
    }

    pub fn dvr_window(&self) -> Option<DvrWindow> {
        self.dvr.borrow().window()
    }

    pub fn current_live_date(&self) -> Option<DateTime<Utc>> {
        let date = self.engine.borrow().current_date();
        let position = self.position();
        self.dvr.borrow().current_live_date(date, position)
    }

    pub fn epoch_dvr_window_start(&self) -> f64 {
        let date = self.engine.borrow().current_date();
        let position = self.position();
        self.dvr.borrow().epoch_window_start(date, position)
    }

    pub fn is_epoch_inside_dvr_window(&self, epoch: f64) -> bool {
        let date = self.engine.borrow().current_date();
        let position = self.position();
        self.dvr.borrow().is_epoch_inside_window(epoch, date, position)
    }

    pub fn pending_seek(&self) -> Option<SeekTarget> {
        self.seeks.borrow().pending_target()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    /// Tracks discovered so far. Subtitle lists end with the `off` option.
    pub fn media_options(&self, option_type: MediaOptionType) -> Vec<MediaOption> {
        self.tracks(option_type).borrow().options.clone()
    }

    pub fn selected_media_option(&self, option_type: MediaOptionType) -> Option<MediaOption> {
        self.tracks(option_type).borrow().selected.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn can_play(&self) -> bool {
        !self.destroyed.get() && self.machine.borrow().can_play()
    }

    pub fn can_pause(&self) -> bool {
        let dvr = self.dvr.borrow();
        !self.destroyed.get()
            && self
                .machine
                .borrow()
                .can_pause(dvr.playback_type(), dvr.is_available())
    }

    pub fn can_seek(&self) -> bool {
        let duration = self.duration();
        let dvr = self.dvr.borrow();
        !self.destroyed.get()
            && self
                .machine
                .borrow()
                .can_seek(dvr.playback_type(), dvr.is_available(), duration)
    }

    #[instrument(skip(self), fields(playback = %self.name()))]
    pub fn play(&self) {
        if !self.can_play() {
            debug!(state = %self.state(), "play ignored");
            return;
        }
        self.bus.trigger(Event::WillPlay);
        self.engine.borrow_mut().play();
    }

    #[instrument(skip(self), fields(playback = %self.name()))]
    pub fn pause(&self) {
        if !self.can_pause() {
            debug!(state = %self.state(), playback_type = %self.playback_type(), "pause ignored");
            return;
        }
        self.bus.trigger(Event::WillPause);
        self.engine.borrow_mut().pause();
        let transition = self.machine.borrow_mut().on_pause_requested();
        self.publish_transition(transition);
    }

    /// Stop playback and release the engine. The session starts over.
    #[instrument(skip(self), fields(playback = %self.name()))]
    pub fn stop(&self) {
        if self.destroyed.get() {
            debug!("stop ignored after destroy");
            return;
        }
        self.bus.trigger(Event::WillStop);

        self.machine.borrow_mut().begin_stop();
        self.engine.borrow_mut().pause();
        let paused = self.machine.borrow_mut().on_pause_requested();
        self.publish_transition(paused);
        let idle = self.machine.borrow_mut().finish_stop();
        self.publish_transition(idle);

        self.engine.borrow_mut().release();
        self.seeks.borrow_mut().reset();
        self.dvr.borrow_mut().reset();
        self.duration.set(0.0);
        self.live_start_applied.set(false);
        self.ready_announced.set(false);
        *self.audio.borrow_mut() = MediaTracks::default();
        *self.subtitles.borrow_mut() = MediaTracks::default();

        self.bus.trigger(Event::DidStop);
    }

    /// Seek to `time` seconds into the playable range
    #[instrument(skip(self), fields(playback = %self.name()))]
    pub fn seek(&self, time: f64) {
        self.seek_to(SeekTarget::Relative(time));
    }

    /// Resume and jump to the live head
    #[instrument(skip(self), fields(playback = %self.name()))]
    pub fn seek_to_live_edge(&self) {
        self.play();
        self.seek_to(SeekTarget::LiveEdge);
    }

    pub fn seek_to(&self, target: SeekTarget) {
        if self.destroyed.get() {
            debug!(seek = %target, "seek ignored after destroy");
            return;
        }
        let ready = self.machine.borrow().is_ready();
        if !ready {
            self.seeks.borrow_mut().request(target, false);
            return;
        }
        if !self.can_seek() {
            let waiting = self.seeks.borrow().pending().is_some();
            if waiting {
                self.seeks.borrow_mut().request(target, false);
                return;
            }
            debug!(seek = %target, state = %self.state(), playback_type = %self.playback_type(), "seek ignored");
            return;
        }
        let issue = self.seeks.borrow_mut().request(target, true);
        if let Some(target) = issue {
            self.issue_seek(target);
        }
    }

    /// Switch to one of the discovered tracks
    #[instrument(skip(self), fields(playback = %self.name()))]
    pub fn select_media_option(&self, option: &MediaOption) {
        if self.destroyed.get() {
            return;
        }
        let known = self
            .tracks(option.option_type)
            .borrow()
            .options
            .contains(option);
        if !known {
            debug!(language = %option.language, "unknown track ignored");
            return;
        }
        self.apply_media_option(option);
        let event = match option.option_type {
            MediaOptionType::Audio => Event::DidSelectAudio,
            MediaOptionType::Subtitle => Event::DidSelectSubtitle,
        };
        self.bus.trigger_with(event, payload::media_option(option));
    }

    pub fn mute(&self, enabled: bool) {
        if self.destroyed.get() {
            return;
        }
        self.muted.set(enabled);
        self.engine.borrow_mut().set_muted(enabled);
    }

    /// Release the engine and every registration this playback holds.
    /// Signals delivered afterwards are ignored.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.seeks.borrow_mut().reset();
        self.engine.borrow_mut().release();
        self.bus.stop_listening();
        debug!(playback = %self.name(), "playback destroyed");
    }

    /// Feed one engine signal
    pub fn handle_signal(&self, signal: EngineSignal) {
        if self.destroyed.get() {
            trace!(signal = signal.kind(), "signal after destroy ignored");
            return;
        }
        let failed = self.machine.borrow().is_failed();
        if failed {
            trace!(signal = signal.kind(), "signal after failure ignored");
            return;
        }
        trace!(?signal, "engine signal");

        match signal {
            EngineSignal::StatusChanged { status } => self.on_status(status),
            EngineSignal::RateChanged { rate, prior } => {
                let transition = self.machine.borrow_mut().on_rate(rate, prior);
                self.publish_transition(transition);
            }
            EngineSignal::BufferingChanged { state } => {
                let transition = self.machine.borrow_mut().on_buffering(state);
                self.publish_transition(transition);
            }
            EngineSignal::SeekableRangesUpdated { ranges } => self.on_seekable_ranges(&ranges),
            EngineSignal::LoadedRangesUpdated { ranges } => {
                if let Some(range) = ranges.first() {
                    self.bus.trigger_with(
                        Event::DidUpdateBuffer,
                        payload::buffer(range.start, range.end(), range.duration),
                    );
                }
            }
            EngineSignal::DurationResolved { duration } => self.on_duration(duration),
            EngineSignal::TimeUpdated { time } => {
                let position = self.dvr.borrow().position(time);
                self.bus
                    .trigger_with(Event::DidUpdatePosition, payload::position(position));
            }
            EngineSignal::SeekCompleted { time, success } => self.on_seek_completed(time, success),
            EngineSignal::PlayedToEnd => {
                let transition = self.machine.borrow_mut().on_ended();
                if transition.is_some() {
                    self.bus.trigger(Event::DidComplete);
                }
            }
            EngineSignal::Failed { error } => self.on_failure(error),
            EngineSignal::MediaOptionsDiscovered { option_type, options } => {
                self.on_media_options(option_type, options)
            }
        }
    }

    fn on_status(&self, status: EngineStatus) {
        if status == EngineStatus::Failed {
            self.on_failure(EngineError::new("STATUS_FAILED", "engine reported failed status"));
            return;
        }
        let became_ready = self.machine.borrow_mut().on_status(status);
        if !became_ready {
            return;
        }
        if !self.ready_announced.replace(true) {
            self.bus.trigger(Event::Ready);
        }
        self.on_engine_ready();
    }

    fn on_engine_ready(&self) {
        let waiting = self.seeks.borrow().pending().is_some();
        let start_at = self.options.borrow().start_at;
        if let Some(start_at) = start_at.filter(|_| !waiting) {
            debug!(start_at, "queueing start position");
            self.seeks
                .borrow_mut()
                .request(SeekTarget::Relative(start_at), false);
        }
        self.replay_pending_seek();
    }

    /// Issue the queued seek once the engine is ready and the media is
    /// seekable. Until then it stays queued for the next duration or
    /// seekable range update.
    fn replay_pending_seek(&self) {
        let Some(target) = self.seeks.borrow().pending_target() else {
            return;
        };
        if !self.machine.borrow().is_ready() {
            return;
        }
        if !self.can_seek() {
            debug!(seek = %target, playback_type = %self.playback_type(), "pending seek waits for seekable media");
            return;
        }
        let pending = self.seeks.borrow_mut().take_pending();
        if let Some(pending) = pending {
            trace!(seek = %pending.target, requested_at = %pending.requested_at, "replaying pending seek");
            self.issue_seek(pending.target);
        }
    }

    fn on_duration(&self, duration: MediaDuration) {
        self.dvr.borrow_mut().set_playback_type(duration.playback_type());
        if let MediaDuration::Finite(seconds) = duration {
            self.duration.set(seconds);
        }
        self.bus
            .trigger_with(Event::DidUpdateDuration, payload::duration(self.duration()));
        self.check_dvr_availability();
        self.replay_pending_seek();
    }

    fn on_seekable_ranges(&self, ranges: &[TimeRange]) {
        let updated = self.dvr.borrow_mut().on_seekable_ranges_updated(ranges);
        if !updated {
            return;
        }
        self.bus
            .trigger_with(Event::SeekableUpdate, payload::seekable(ranges));
        self.check_dvr_availability();
        self.replay_pending_seek();
    }

    fn on_media_options(&self, option_type: MediaOptionType, mut options: Vec<MediaOption>) {
        options.retain(|option| option.option_type == option_type);
        let (default_language, event) = {
            let configured = self.options.borrow();
            match option_type {
                MediaOptionType::Audio => (configured.default_audio_source.clone(), Event::DidFindAudio),
                MediaOptionType::Subtitle => (configured.default_subtitle.clone(), Event::DidFindSubtitle),
            }
        };
        if option_type == MediaOptionType::Subtitle
            && !options.is_empty()
            && !options.iter().any(MediaOption::is_off)
        {
            options.push(MediaOption::subtitles_off());
        }

        let default = default_language
            .and_then(|language| options.iter().find(|o| o.language == language).cloned());
        debug!(%option_type, count = options.len(), selected = ?default.as_ref().map(|o| o.language.as_str()), "tracks discovered");

        let has_default = default.is_some();
        let published = payload::media_options(&options, has_default);
        self.tracks(option_type).borrow_mut().options = options;
        if let Some(option) = default {
            self.apply_media_option(&option);
        }
        self.bus.trigger_with(event, published);
    }

    fn on_seek_completed(&self, time: f64, success: bool) {
        let target = self.seeks.borrow_mut().complete(success);
        if !success {
            debug!(seek = ?target, time, "engine could not complete seek");
            return;
        }
        let position = self.dvr.borrow().position(time);
        self.bus.trigger_with(Event::DidSeek, payload::position(position));
        self.publish_dvr_status();
        self.check_dvr_availability();
    }

    fn on_failure(&self, error: EngineError) {
        let Some(previous) = self.machine.borrow_mut().on_failure() else {
            return;
        };
        error!(code = %error.code, message = %error.message, from = %previous, "playback failed");
        self.seeks.borrow_mut().reset();
        self.bus.trigger_with(Event::Error, payload::error(&error));
    }

    fn issue_seek(&self, target: SeekTarget) {
        let (absolute, intended) = {
            let dvr = self.dvr.borrow();
            let absolute = dvr.resolve(target);
            (absolute, dvr.position(absolute))
        };
        debug!(seek = %target, absolute, "seeking");

        self.bus.trigger_with(Event::WillSeek, payload::position(intended));
        self.seeks.borrow_mut().begin(target);
        self.engine.borrow_mut().seek(absolute);
        self.bus
            .trigger_with(Event::DidUpdatePosition, payload::position(intended));
    }

    fn tracks(&self, option_type: MediaOptionType) -> &RefCell<MediaTracks> {
        match option_type {
            MediaOptionType::Audio => &self.audio,
            MediaOptionType::Subtitle => &self.subtitles,
        }
    }

    fn apply_media_option(&self, option: &MediaOption) {
        {
            let mut engine = self.engine.borrow_mut();
            match option.option_type {
                MediaOptionType::Audio => engine.select_audio(option),
                MediaOptionType::Subtitle => engine.select_subtitle(option),
            }
        }
        self.tracks(option.option_type).borrow_mut().selected = Some(option.clone());
    }

    fn publish_transition(&self, transition: Option<Transition>) {
        let Some(transition) = transition else {
            return;
        };
        if !transition.announce {
            return;
        }
        match transition.to {
            PlaybackState::Playing => {
                self.bus.trigger(Event::Playing);
                self.check_dvr_availability();
            }
            PlaybackState::Paused => {
                self.bus.trigger(Event::DidPause);
                self.publish_dvr_status();
            }
            PlaybackState::Stalling => {
                self.bus.trigger(Event::Stalling);
            }
            PlaybackState::Idle | PlaybackState::Error => {}
        }
    }

    fn check_dvr_availability(&self) {
        let change = self.dvr.borrow_mut().availability_change();
        let Some(available) = change else {
            return;
        };
        self.bus.trigger_with(
            Event::DidChangeDvrAvailability,
            payload::dvr_available(available),
        );
        if available {
            self.apply_live_start_time();
        }
    }

    fn publish_dvr_status(&self) {
        if !self.is_dvr_available() {
            return;
        }
        let in_use = self.is_dvr_in_use();
        self.bus
            .trigger_with(Event::DidChangeDvrStatus, payload::dvr_in_use(in_use));
    }

    fn apply_live_start_time(&self) {
        if self.live_start_applied.replace(true) {
            return;
        }
        let live_start_time = self.options.borrow().live_start_time;
        let Some(epoch) = live_start_time else {
            return;
        };
        if let Some(pending) = self.seeks.borrow().pending_target() {
            debug!(epoch, seek = %pending, "live start time skipped, seek already queued");
            return;
        }
        if !self.is_epoch_inside_dvr_window(epoch) {
            debug!(epoch, "live start time outside dvr window");
            return;
        }
        let offset = epoch - self.epoch_dvr_window_start();
        debug!(epoch, offset, "applying live start time");
        self.seek(offset);
    }
}

impl EventSource for Playback {
    fn event_bus(&self) -> &EventBus {
        &self.bus
    }
}

impl std::fmt::Debug for Playback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playback")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("playback_type", &self.playback_type())
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}

/// Deliver signals from `signals` to `playback` until the channel closes or
/// the playback goes away. Run it on the playback's thread. Returns the
/// number of signals delivered.
pub async fn pump_signals(playback: Weak<Playback>, mut signals: SignalReceiver) -> usize {
    let mut delivered = 0;
    while let Some(signal) = signals.recv().await {
        let Some(playback) = playback.upgrade() else {
            debug!("playback dropped, signal pump stopping");
            break;
        };
        if playback.is_destroyed() {
            debug!("playback destroyed, signal pump stopping");
            break;
        }
        playback.handle_signal(signal);
        delivered += 1;
    }
    signals.close();
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCommand, RecordingEngine};

    fn playback(options: Options) -> (Rc<Playback>, RecordingEngine) {
        let engine = RecordingEngine::new();
        let playback = Playback::new(&EventHub::new(), options, Box::new(engine.clone()));
        (playback, engine)
    }

    fn recorder(playback: &Playback) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        for event in Event::ALL {
            let log = Rc::clone(&log);
            playback
                .event_bus()
                .on(event, move |_| log.borrow_mut().push(event.to_string()))
                .unwrap();
        }
        log
    }

    fn start_vod(playback: &Playback, duration: f64) {
        playback.handle_signal(EngineSignal::DurationResolved {
            duration: MediaDuration::Finite(duration),
        });
        playback.handle_signal(EngineSignal::StatusChanged { status: EngineStatus::Ready });
    }

    #[test]
    fn test_play_issues_will_play() {
        let (playback, engine) = playback(Options::new());
        let log = recorder(&playback);
        playback.play();
        assert_eq!(*log.borrow(), vec!["willPlay"]);
        assert_eq!(engine.commands(), vec![EngineCommand::Play]);
    }

    #[test]
    fn test_start_at_applied_on_ready() {
        let (playback, engine) = playback(Options::new().with_start_at(30.0));
        start_vod(&playback, 100.0);
        assert_eq!(engine.seeks(), vec![30.0]);
    }

    #[test]
    fn test_start_at_forgotten_after_playing() {
        let (playback, _engine) = playback(Options::new().with_start_at(30.0));
        start_vod(&playback, 100.0);
        playback.handle_signal(EngineSignal::RateChanged { rate: 1.0, prior: false });
        assert_eq!(playback.state(), PlaybackState::Playing);
        assert_eq!(playback.options().start_at, None);
    }

    #[test]
    fn test_pending_seek_wins_over_start_at() {
        let (playback, engine) = playback(Options::new().with_start_at(30.0));
        playback.seek(5.0);
        start_vod(&playback, 100.0);
        assert_eq!(engine.seeks(), vec![5.0]);
    }

    #[test]
    fn test_ready_announced_once() {
        let (playback, _engine) = playback(Options::new());
        let log = recorder(&playback);
        playback.handle_signal(EngineSignal::StatusChanged { status: EngineStatus::Ready });
        playback.handle_signal(EngineSignal::StatusChanged { status: EngineStatus::Ready });
        assert_eq!(*log.borrow(), vec!["ready"]);
    }

    #[test]
    fn test_stop_sequence() {
        let (playback, engine) = playback(Options::new());
        start_vod(&playback, 100.0);
        playback.handle_signal(EngineSignal::RateChanged { rate: 1.0, prior: false });
        let log = recorder(&playback);

        playback.stop();
        assert_eq!(*log.borrow(), vec!["willStop", "didStop"]);
        assert_eq!(playback.state(), PlaybackState::Idle);
        assert_eq!(engine.commands(), vec![EngineCommand::Pause, EngineCommand::Release]);
        assert_eq!(playback.duration(), 0.0);
    }

    #[test]
    fn test_played_to_end() {
        let (playback, _engine) = playback(Options::new());
        start_vod(&playback, 100.0);
        playback.handle_signal(EngineSignal::RateChanged { rate: 1.0, prior: false });
        let log = recorder(&playback);
        playback.handle_signal(EngineSignal::PlayedToEnd);
        assert_eq!(*log.borrow(), vec!["didComplete"]);
        assert_eq!(playback.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_failed_status_becomes_error_event() {
        let (playback, _engine) = playback(Options::new());
        let log = recorder(&playback);
        playback.handle_signal(EngineSignal::StatusChanged { status: EngineStatus::Failed });
        playback.handle_signal(EngineSignal::RateChanged { rate: 1.0, prior: false });
        assert_eq!(*log.borrow(), vec!["error"]);
        assert!(!playback.can_play());
    }

    #[test]
    fn test_mute_forwards_to_engine() {
        let (playback, engine) = playback(Options::new());
        playback.mute(true);
        assert!(playback.is_muted());
        assert_eq!(engine.commands(), vec![EngineCommand::SetMuted { muted: true }]);
    }

    #[test]
    fn test_destroy_silences_playback() {
        let (playback, engine) = playback(Options::new());
        let log = recorder(&playback);
        playback.destroy();
        playback.destroy();

        playback.handle_signal(EngineSignal::StatusChanged { status: EngineStatus::Ready });
        playback.play();
        assert!(log.borrow().is_empty());
        assert_eq!(engine.commands(), vec![EngineCommand::Release]);
        assert_eq!(playback.event_bus().listener_count(), 0);
    }

    fn discover(playback: &Playback, option_type: MediaOptionType, options: Vec<MediaOption>) {
        playback.handle_signal(EngineSignal::MediaOptionsDiscovered { option_type, options });
    }

    #[test]
    fn test_default_audio_selected_on_discovery() {
        let (playback, engine) = playback(Options::new().with_default_audio_source("en"));
        let found = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&found);
        playback
            .event_bus()
            .on(Event::DidFindAudio, move |p| *sink.borrow_mut() = p.cloned())
            .unwrap();

        discover(
            &playback,
            MediaOptionType::Audio,
            vec![MediaOption::audio("Portuguese", "pt"), MediaOption::audio("English", "en")],
        );

        assert_eq!(
            engine.commands(),
            vec![EngineCommand::SelectAudio { language: "en".into() }]
        );
        assert_eq!(
            playback.selected_media_option(MediaOptionType::Audio),
            Some(MediaOption::audio("English", "en"))
        );
        let found = found.borrow();
        assert_eq!(payload::flag(found.as_ref(), "hasDefaultSelected"), Some(true));
    }

    #[test]
    fn test_subtitles_get_off_option() {
        let (playback, engine) = playback(Options::new().with_default_subtitle("fr"));
        let log = recorder(&playback);
        discover(&playback, MediaOptionType::Subtitle, vec![MediaOption::subtitle("Portuguese", "pt")]);

        assert_eq!(*log.borrow(), vec!["didFindSubtitle"]);
        assert_eq!(
            playback.media_options(MediaOptionType::Subtitle),
            vec![MediaOption::subtitle("Portuguese", "pt"), MediaOption::subtitles_off()]
        );
        assert_eq!(playback.selected_media_option(MediaOptionType::Subtitle), None);
        assert!(engine.commands().is_empty());

        discover(&playback, MediaOptionType::Subtitle, vec![]);
        assert!(playback.media_options(MediaOptionType::Subtitle).is_empty());
    }

    #[test]
    fn test_select_media_option() {
        let (playback, engine) = playback(Options::new());
        discover(&playback, MediaOptionType::Subtitle, vec![MediaOption::subtitle("Portuguese", "pt")]);
        let log = recorder(&playback);

        playback.select_media_option(&MediaOption::subtitle("Klingon", "tlh"));
        assert!(log.borrow().is_empty());

        playback.select_media_option(&MediaOption::subtitles_off());
        assert_eq!(*log.borrow(), vec!["didSelectSubtitle"]);
        assert_eq!(
            engine.commands(),
            vec![EngineCommand::SelectSubtitle { language: "off".into() }]
        );
        assert!(playback
            .selected_media_option(MediaOptionType::Subtitle)
            .is_some_and(|option| option.is_off()));
    }

    #[test]
    fn test_stop_forgets_tracks() {
        let (playback, _engine) = playback(Options::new());
        discover(&playback, MediaOptionType::Audio, vec![MediaOption::audio("English", "en")]);
        playback.stop();
        assert!(playback.media_options(MediaOptionType::Audio).is_empty());
    }

    #[test]
    fn test_buffer_update_uses_first_range() {
        let (playback, _engine) = playback(Options::new());
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        playback
            .event_bus()
            .on(Event::DidUpdateBuffer, move |p| {
                *sink.borrow_mut() = payload::number(p, "end_position");
            })
            .unwrap();

        playback.handle_signal(EngineSignal::LoadedRangesUpdated {
            ranges: vec![TimeRange::new(0.0, 12.0), TimeRange::new(40.0, 5.0)],
        });
        assert_eq!(*seen.borrow(), Some(12.0));

        playback.handle_signal(EngineSignal::LoadedRangesUpdated { ranges: vec![] });
        assert_eq!(*seen.borrow(), Some(12.0));
    }
}
