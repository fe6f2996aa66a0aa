//! Core types for Reel Player

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a playback session
    SessionId
);

uuid_id!(
    /// Opaque token returned by `on`/`once`/`listen_to`
    ListenerId
);

uuid_id!(
    /// Identity of a component owning an event bus
    ComponentId
);

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing playing (initial, after stop or end of media)
    #[default]
    Idle,
    /// Content is playing
    Playing,
    /// Playback paused
    Paused,
    /// Waiting for data
    Stalling,
    /// Terminal failure for the current session
    Error,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            // From Idle
            (Idle, Stalling) | (Idle, Playing) |
            // From Playing
            (Playing, Paused) | (Playing, Stalling) | (Playing, Idle) |
            // From Paused
            (Paused, Playing) | (Paused, Stalling) | (Paused, Idle) |
            // From Stalling
            (Stalling, Playing) | (Stalling, Paused) | (Stalling, Idle) |
            // From Error
            (Error, Idle)
        ) || (target == Error && *self != Idle && *self != Error)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stalling => write!(f, "stalling"),
            PlaybackState::Error => write!(f, "error"),
        }
    }
}

/// Kind of media being played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackType {
    #[default]
    Unknown,
    Vod,
    Live,
}

impl std::fmt::Display for PlaybackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackType::Unknown => write!(f, "unknown"),
            PlaybackType::Vod => write!(f, "vod"),
            PlaybackType::Live => write!(f, "live"),
        }
    }
}

/// Engine readiness as reported by the media engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    #[default]
    Unknown,
    Ready,
    Failed,
}

/// Buffer health as reported by the media engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferingState {
    /// Enough data buffered to keep up with playback
    LikelyToKeepUp,
    /// Playback buffer ran dry
    BufferEmpty,
}

/// A `[start, start + duration]` interval of media time, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub duration: f64,
}

impl TimeRange {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }

    /// Build a range from its two ends
    pub fn from_bounds(start: f64, end: f64) -> Self {
        Self {
            start,
            duration: end - start,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Media duration as resolved by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaDuration {
    /// On-demand media of known length
    Finite(f64),
    /// Live stream
    Indefinite,
}

impl MediaDuration {
    pub fn playback_type(&self) -> PlaybackType {
        match self {
            MediaDuration::Finite(_) => PlaybackType::Vod,
            MediaDuration::Indefinite => PlaybackType::Live,
        }
    }
}

/// Where a seek should land.
///
/// Targets stay symbolic until the seek is issued, so a DVR window that
/// appears after the request is still honoured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "time", rename_all = "snake_case")]
pub enum SeekTarget {
    /// Seconds relative to the playable range (DVR window start for live)
    Relative(f64),
    /// Engine time in seconds
    Absolute(f64),
    /// The live head
    LiveEdge,
}

impl std::fmt::Display for SeekTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeekTarget::Relative(t) => write!(f, "relative({t})"),
            SeekTarget::Absolute(t) => write!(f, "absolute({t})"),
            SeekTarget::LiveEdge => write!(f, "live_edge"),
        }
    }
}

/// The single outstanding seek request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingSeek {
    pub target: SeekTarget,
    /// Diagnostics only
    pub requested_at: DateTime<Utc>,
}

impl PendingSeek {
    pub fn new(target: SeekTarget) -> Self {
        Self {
            target,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaOptionType {
    Audio,
    Subtitle,
}

impl std::fmt::Display for MediaOptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaOptionType::Audio => write!(f, "audio"),
            MediaOptionType::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// An alternative audio or subtitle track offered by the media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaOption {
    pub name: String,
    #[serde(rename = "type")]
    pub option_type: MediaOptionType,
    /// Language tag as the engine reports it, e.g. `pt` or `en-US`
    pub language: String,
}

impl MediaOption {
    pub const OFF_LANGUAGE: &'static str = "off";

    pub fn new(name: impl Into<String>, option_type: MediaOptionType, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            option_type,
            language: language.into(),
        }
    }

    pub fn audio(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self::new(name, MediaOptionType::Audio, language)
    }

    pub fn subtitle(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self::new(name, MediaOptionType::Subtitle, language)
    }

    /// The entry appended to every subtitle list to turn subtitles off
    pub fn subtitles_off() -> Self {
        Self::subtitle("Off", Self::OFF_LANGUAGE)
    }

    pub fn is_off(&self) -> bool {
        self.option_type == MediaOptionType::Subtitle && self.language == Self::OFF_LANGUAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(ListenerId::new(), ListenerId::new());
        assert_ne!(ComponentId::new(), ComponentId::new());
    }

    #[test]
    fn test_state_transitions() {
        use PlaybackState::*;
        assert!(Idle.can_transition_to(Stalling));
        assert!(Stalling.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Paused));
        assert!(Playing.can_transition_to(Error));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Error.can_transition_to(Playing));
        assert!(!Playing.can_transition_to(Playing));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&PlaybackState::Stalling).unwrap();
        assert_eq!(json, "\"stalling\"");
        assert_eq!(PlaybackState::default(), PlaybackState::Idle);
    }

    #[test]
    fn test_time_range_bounds() {
        let range = TimeRange::from_bounds(60.0, 120.0);
        assert_eq!(range.duration, 60.0);
        assert_eq!(range.end(), 120.0);
    }

    #[test]
    fn test_seek_target_serde() {
        let target: SeekTarget =
            serde_json::from_str(r#"{"kind":"relative","time":20.0}"#).unwrap();
        assert_eq!(target, SeekTarget::Relative(20.0));
        let edge: SeekTarget = serde_json::from_str(r#"{"kind":"live_edge"}"#).unwrap();
        assert_eq!(edge, SeekTarget::LiveEdge);
    }

    #[test]
    fn test_media_option_json_shape() {
        let option: MediaOption =
            serde_json::from_str(r#"{"name":"English","type":"audio","language":"en"}"#).unwrap();
        assert_eq!(option, MediaOption::audio("English", "en"));
        assert!(!option.is_off());
        assert!(MediaOption::subtitles_off().is_off());
    }
}
