//! DVR window tracking for live streams

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

use crate::types::{PlaybackType, SeekTarget, TimeRange};

/// Distance from the live head, in seconds, still considered "at live"
pub const LIVE_HEAD_TOLERANCE: f64 = 5.0;

/// Rewindable range of a live stream, in engine time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DvrWindow {
    pub start: f64,
    pub end: f64,
}

impl DvrWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Turns seekable-range updates into a stable availability signal and
/// window-relative position math.
#[derive(Debug, Clone)]
pub struct DvrWindowTracker {
    playback_type: PlaybackType,
    window: Option<DvrWindow>,
    min_dvr_size: f64,
    /// `None` until the first availability report
    last_availability: Option<bool>,
}

impl DvrWindowTracker {
    pub fn new(min_dvr_size: f64) -> Self {
        Self {
            playback_type: PlaybackType::Unknown,
            window: None,
            min_dvr_size,
            last_availability: None,
        }
    }

    pub fn set_playback_type(&mut self, playback_type: PlaybackType) {
        self.playback_type = playback_type;
    }

    pub fn playback_type(&self) -> PlaybackType {
        self.playback_type
    }

    pub fn min_dvr_size(&self) -> f64 {
        self.min_dvr_size
    }

    /// Recompute the window from a seekable-range set. The window spans the
    /// summed range durations back from the furthest range end. Empty sets
    /// are ignored; returns whether the window was updated.
    pub fn on_seekable_ranges_updated(&mut self, ranges: &[TimeRange]) -> bool {
        if ranges.is_empty() {
            trace!("empty seekable ranges ignored");
            return false;
        }
        let end = ranges.iter().map(TimeRange::end).fold(f64::NEG_INFINITY, f64::max);
        let duration: f64 = ranges.iter().map(|range| range.duration).sum();
        self.window = Some(DvrWindow {
            start: end - duration,
            end,
        });
        trace!(start = end - duration, end, "dvr window updated");
        true
    }

    pub fn window(&self) -> Option<DvrWindow> {
        self.window
    }

    pub fn window_duration(&self) -> f64 {
        self.window.map(|w| w.duration()).unwrap_or(0.0)
    }

    pub fn is_available(&self) -> bool {
        self.playback_type == PlaybackType::Live
            && self.window.is_some_and(|w| w.duration() >= self.min_dvr_size)
    }

    pub fn last_availability(&self) -> Option<bool> {
        self.last_availability
    }

    /// Compare availability with the last report. Returns the new value when
    /// it changed; stays silent while no window has been seen.
    pub fn availability_change(&mut self) -> Option<bool> {
        self.window?;
        let available = self.is_available();
        if self.last_availability == Some(available) {
            return None;
        }
        debug!(available, previous = ?self.last_availability, "dvr availability changed");
        self.last_availability = Some(available);
        Some(available)
    }

    /// Playback position: window-relative with DVR, 0 on a live stream
    /// without DVR, engine time otherwise.
    pub fn position(&self, engine_time: f64) -> f64 {
        match self.window {
            Some(window) if self.is_available() => engine_time - window.start,
            _ if self.playback_type == PlaybackType::Live => 0.0,
            _ => engine_time,
        }
    }

    pub fn absolute_seek_target(&self, relative: f64) -> f64 {
        match self.window {
            Some(window) if self.is_available() => window.start + relative,
            _ => relative,
        }
    }

    /// Window end when known, otherwise the live head itself
    pub fn live_edge(&self) -> f64 {
        self.window.map(|w| w.end).unwrap_or(f64::INFINITY)
    }

    /// Engine time for a seek target
    pub fn resolve(&self, target: SeekTarget) -> f64 {
        match target {
            SeekTarget::Relative(time) => self.absolute_seek_target(time),
            SeekTarget::Absolute(time) => time,
            SeekTarget::LiveEdge => self.live_edge(),
        }
    }

    /// Paused inside the window, or behind the live head by more than the
    /// tolerance
    pub fn is_in_use(&self, engine_time: f64, paused: bool) -> bool {
        if !self.is_available() {
            return false;
        }
        if paused {
            return true;
        }
        self.window
            .map(|w| w.end - LIVE_HEAD_TOLERANCE > engine_time)
            .unwrap_or(false)
    }

    /// Wall-clock date of the live head
    pub fn current_live_date(
        &self,
        engine_date: Option<DateTime<Utc>>,
        position: f64,
    ) -> Option<DateTime<Utc>> {
        if self.playback_type != PlaybackType::Live {
            return None;
        }
        let ahead = self.window_duration() - position;
        engine_date.map(|date| date + seconds(ahead))
    }

    /// Epoch seconds of the window start
    pub fn epoch_window_start(&self, engine_date: Option<DateTime<Utc>>, position: f64) -> f64 {
        engine_date
            .map(|date| epoch_seconds(date) - position)
            .unwrap_or(0.0)
    }

    pub fn is_epoch_inside_window(
        &self,
        epoch: f64,
        engine_date: Option<DateTime<Utc>>,
        position: f64,
    ) -> bool {
        let offset = epoch - self.epoch_window_start(engine_date, position);
        offset > 0.0 && offset < self.window_duration()
    }

    /// Forget the window and availability history
    pub fn reset(&mut self) {
        self.window = None;
        self.last_availability = None;
        self.playback_type = PlaybackType::Unknown;
    }
}

fn seconds(value: f64) -> Duration {
    Duration::milliseconds((value * 1000.0).round() as i64)
}

pub(crate) fn epoch_seconds(date: DateTime<Utc>) -> f64 {
    date.timestamp_millis() as f64 / 1000.0
}
