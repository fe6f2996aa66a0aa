//! Media engine boundary
//!
//! The platform engine is opaque: the core sends it commands through
//! [`MediaEngine`] and receives asynchronous [`EngineSignal`]s back, either
//! by direct calls on the owning thread or through [`signal_channel`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{EngineError, Error, Result};
use crate::types::{BufferingState, EngineStatus, MediaDuration, MediaOption, MediaOptionType, TimeRange};

/// Commands the core issues to the platform engine.
///
/// Implementations must not call back into the playback synchronously from
/// inside a command; results arrive later as signals.
pub trait MediaEngine {
    fn name(&self) -> &str {
        "engine"
    }

    fn play(&mut self);

    fn pause(&mut self);

    /// Seek to an absolute engine time; `f64::INFINITY` means the live head
    fn seek(&mut self, time: f64);

    /// Current engine time in seconds
    fn current_time(&self) -> f64;

    /// Program date of the current frame, for live streams that carry one
    fn current_date(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_muted(&mut self, muted: bool);

    /// Switch the audible track. Engines without alternative tracks ignore it.
    fn select_audio(&mut self, _option: &MediaOption) {}

    /// Switch the legible track; the `off` option disables subtitles
    fn select_subtitle(&mut self, _option: &MediaOption) {}

    /// Free decoder and network resources
    fn release(&mut self);
}

/// Raw signals reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum EngineSignal {
    StatusChanged {
        status: EngineStatus,
    },
    /// `prior` marks an advance notice sent before the rate actually changes
    RateChanged {
        rate: f64,
        #[serde(default)]
        prior: bool,
    },
    BufferingChanged {
        state: BufferingState,
    },
    SeekableRangesUpdated {
        ranges: Vec<TimeRange>,
    },
    LoadedRangesUpdated {
        ranges: Vec<TimeRange>,
    },
    DurationResolved {
        duration: MediaDuration,
    },
    TimeUpdated {
        time: f64,
    },
    SeekCompleted {
        time: f64,
        success: bool,
    },
    PlayedToEnd,
    Failed {
        error: EngineError,
    },
    /// The tracks of one type the media offers
    MediaOptionsDiscovered {
        #[serde(rename = "type")]
        option_type: MediaOptionType,
        options: Vec<MediaOption>,
    },
}

impl EngineSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineSignal::StatusChanged { .. } => "status_changed",
            EngineSignal::RateChanged { .. } => "rate_changed",
            EngineSignal::BufferingChanged { .. } => "buffering_changed",
            EngineSignal::SeekableRangesUpdated { .. } => "seekable_ranges_updated",
            EngineSignal::LoadedRangesUpdated { .. } => "loaded_ranges_updated",
            EngineSignal::DurationResolved { .. } => "duration_resolved",
            EngineSignal::TimeUpdated { .. } => "time_updated",
            EngineSignal::SeekCompleted { .. } => "seek_completed",
            EngineSignal::PlayedToEnd => "played_to_end",
            EngineSignal::Failed { .. } => "failed",
            EngineSignal::MediaOptionsDiscovered { .. } => "media_options_discovered",
        }
    }
}

/// Create a channel that carries signals from engine threads to the
/// playback's thread.
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalSender { tx }, SignalReceiver { rx })
}

/// Sending half, `Send + Clone`, held by engine callbacks
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<EngineSignal>,
}

impl SignalSender {
    pub fn send(&self, signal: EngineSignal) -> Result<()> {
        self.tx.send(signal).map_err(|_| Error::SignalChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, drained on the playback's thread
#[derive(Debug)]
pub struct SignalReceiver {
    rx: mpsc::UnboundedReceiver<EngineSignal>,
}

impl SignalReceiver {
    pub async fn recv(&mut self) -> Option<EngineSignal> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EngineSignal> {
        self.rx.try_recv().ok()
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Command received by a [`RecordingEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    Play,
    Pause,
    Seek { time: f64 },
    SetMuted { muted: bool },
    SelectAudio { language: String },
    SelectSubtitle { language: String },
    Release,
}

#[derive(Debug, Default)]
struct Recording {
    commands: RefCell<Vec<EngineCommand>>,
    time: Cell<f64>,
    date: Cell<Option<DateTime<Utc>>>,
}

/// Scriptable engine that records every command it receives.
///
/// Clones share state: keep one handle, box another into the playback.
/// A finite seek moves `current_time` to the target immediately.
#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
    recording: Rc<Recording>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<EngineCommand> {
        self.recording.commands.borrow().clone()
    }

    /// Targets of every seek issued so far
    pub fn seeks(&self) -> Vec<f64> {
        self.recording
            .commands
            .borrow()
            .iter()
            .filter_map(|command| match command {
                EngineCommand::Seek { time } => Some(*time),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, command: &EngineCommand) -> usize {
        self.recording
            .commands
            .borrow()
            .iter()
            .filter(|c| *c == command)
            .count()
    }

    pub fn clear(&self) {
        self.recording.commands.borrow_mut().clear();
    }

    pub fn set_current_time(&self, time: f64) {
        self.recording.time.set(time);
    }

    pub fn set_current_date(&self, date: Option<DateTime<Utc>>) {
        self.recording.date.set(date);
    }

    fn record(&self, command: EngineCommand) {
        self.recording.commands.borrow_mut().push(command);
    }
}

impl MediaEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn play(&mut self) {
        self.record(EngineCommand::Play);
    }

    fn pause(&mut self) {
        self.record(EngineCommand::Pause);
    }

    fn seek(&mut self, time: f64) {
        if time.is_finite() {
            self.recording.time.set(time);
        }
        self.record(EngineCommand::Seek { time });
    }

    fn current_time(&self) -> f64 {
        self.recording.time.get()
    }

    fn current_date(&self) -> Option<DateTime<Utc>> {
        self.recording.date.get()
    }

    fn set_muted(&mut self, muted: bool) {
        self.record(EngineCommand::SetMuted { muted });
    }

    fn select_audio(&mut self, option: &MediaOption) {
        self.record(EngineCommand::SelectAudio { language: option.language.clone() });
    }

    fn select_subtitle(&mut self, option: &MediaOption) {
        self.record(EngineCommand::SelectSubtitle { language: option.language.clone() });
    }

    fn release(&mut self) {
        self.record(EngineCommand::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_recording_engine_shares_state() {
        let handle = RecordingEngine::new();
        let mut boxed: Box<dyn MediaEngine> = Box::new(handle.clone());

        boxed.play();
        boxed.seek(42.0);
        boxed.seek(f64::INFINITY);

        assert_eq!(handle.seeks(), vec![42.0, f64::INFINITY]);
        assert_eq!(handle.current_time(), 42.0);
        assert_eq!(handle.count(&EngineCommand::Play), 1);
    }

    #[test]
    fn test_signal_json_shape() {
        let signal: EngineSignal =
            serde_json::from_str(r#"{"signal":"rate_changed","rate":1.0}"#).unwrap();
        assert_eq!(signal, EngineSignal::RateChanged { rate: 1.0, prior: false });

        let signal: EngineSignal = serde_json::from_str(
            r#"{"signal":"seekable_ranges_updated","ranges":[{"start":0.0,"duration":45.0}]}"#,
        )
        .unwrap();
        assert_eq!(signal.kind(), "seekable_ranges_updated");

        let signal: EngineSignal =
            serde_json::from_str(r#"{"signal":"duration_resolved","duration":"indefinite"}"#)
                .unwrap();
        assert_eq!(
            signal,
            EngineSignal::DurationResolved { duration: MediaDuration::Indefinite }
        );
    }

    #[test]
    fn test_media_options_signal_shape() {
        let signal: EngineSignal = serde_json::from_str(
            r#"{"signal":"media_options_discovered","type":"subtitle","options":[{"name":"Portuguese","type":"subtitle","language":"pt"}]}"#,
        )
        .unwrap();
        assert_eq!(
            signal,
            EngineSignal::MediaOptionsDiscovered {
                option_type: MediaOptionType::Subtitle,
                options: vec![MediaOption::subtitle("Portuguese", "pt")],
            }
        );
        assert_eq!(signal.kind(), "media_options_discovered");
    }

    #[tokio::test]
    async fn test_signal_channel_crosses_threads() {
        let (tx, mut rx) = signal_channel();
        let worker = tx.clone();
        std::thread::spawn(move || {
            worker
                .send(EngineSignal::TimeUpdated { time: 1.5 })
                .unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(rx.recv().await, Some(EngineSignal::TimeUpdated { time: 1.5 }));
        drop(rx);
        assert_err!(tx.send(EngineSignal::PlayedToEnd));
    }

    #[tokio::test]
    async fn test_send_while_open() {
        let (tx, mut rx) = signal_channel();
        assert_ok!(tx.send(EngineSignal::PlayedToEnd));
        assert_eq!(rx.try_recv(), Some(EngineSignal::PlayedToEnd));
        assert_eq!(rx.try_recv(), None);
    }
}
