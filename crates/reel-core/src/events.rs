//! Well-known event names and payload builders

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::EngineError;
use crate::types::{MediaOption, TimeRange};

/// Loosely-typed string-keyed payload passed to listeners
pub type EventPayload = Map<String, Value>;

/// Events published by playbacks and players.
///
/// Any non-empty string is a valid event name on the bus; these are the
/// names the core itself publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Event {
    // Playback
    Ready,
    WillPlay,
    Playing,
    WillPause,
    DidPause,
    Stalling,
    WillStop,
    DidStop,
    DidComplete,
    Error,
    WillSeek,
    DidSeek,
    DidUpdatePosition,
    DidUpdateBuffer,
    DidUpdateDuration,
    SeekableUpdate,
    DidChangeDvrAvailability,
    DidChangeDvrStatus,
    DidFindAudio,
    DidFindSubtitle,
    DidSelectAudio,
    DidSelectSubtitle,
    // Player / container
    DidUpdateOptions,
    WillLoadSource,
    DidLoadSource,
    DidNotLoadSource,
    WillChangePlayback,
    DidChangePlayback,
    WillDestroy,
    DidDestroy,
}

impl Event {
    pub const ALL: [Event; 30] = [
        Event::Ready,
        Event::WillPlay,
        Event::Playing,
        Event::WillPause,
        Event::DidPause,
        Event::Stalling,
        Event::WillStop,
        Event::DidStop,
        Event::DidComplete,
        Event::Error,
        Event::WillSeek,
        Event::DidSeek,
        Event::DidUpdatePosition,
        Event::DidUpdateBuffer,
        Event::DidUpdateDuration,
        Event::SeekableUpdate,
        Event::DidChangeDvrAvailability,
        Event::DidChangeDvrStatus,
        Event::DidFindAudio,
        Event::DidFindSubtitle,
        Event::DidSelectAudio,
        Event::DidSelectSubtitle,
        Event::DidUpdateOptions,
        Event::WillLoadSource,
        Event::DidLoadSource,
        Event::DidNotLoadSource,
        Event::WillChangePlayback,
        Event::DidChangePlayback,
        Event::WillDestroy,
        Event::DidDestroy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Ready => "ready",
            Event::WillPlay => "willPlay",
            Event::Playing => "playing",
            Event::WillPause => "willPause",
            Event::DidPause => "didPause",
            Event::Stalling => "stalling",
            Event::WillStop => "willStop",
            Event::DidStop => "didStop",
            Event::DidComplete => "didComplete",
            Event::Error => "error",
            Event::WillSeek => "willSeek",
            Event::DidSeek => "didSeek",
            Event::DidUpdatePosition => "didUpdatePosition",
            Event::DidUpdateBuffer => "didUpdateBuffer",
            Event::DidUpdateDuration => "didUpdateDuration",
            Event::SeekableUpdate => "seekableUpdate",
            Event::DidChangeDvrAvailability => "didChangeDvrAvailability",
            Event::DidChangeDvrStatus => "didChangeDvrStatus",
            Event::DidFindAudio => "didFindAudio",
            Event::DidFindSubtitle => "didFindSubtitle",
            Event::DidSelectAudio => "didSelectAudio",
            Event::DidSelectSubtitle => "didSelectSubtitle",
            Event::DidUpdateOptions => "didUpdateOptions",
            Event::WillLoadSource => "willLoadSource",
            Event::DidLoadSource => "didLoadSource",
            Event::DidNotLoadSource => "didNotLoadSource",
            Event::WillChangePlayback => "willChangePlayback",
            Event::DidChangePlayback => "didChangePlayback",
            Event::WillDestroy => "willDestroy",
            Event::DidDestroy => "didDestroy",
        }
    }

    /// Short description used by `reel-cli events`
    pub fn description(&self) -> &'static str {
        match self {
            Event::Ready => "engine became ready, once per session",
            Event::WillPlay => "play command about to reach the engine",
            Event::Playing => "state entered playing",
            Event::WillPause => "pause command about to reach the engine",
            Event::DidPause => "state entered paused",
            Event::Stalling => "state entered stalling",
            Event::WillStop => "stop requested",
            Event::DidStop => "stop completed, engine released",
            Event::DidComplete => "engine played to the end of media",
            Event::Error => "terminal engine failure {error}",
            Event::WillSeek => "seek about to be issued {position}",
            Event::DidSeek => "engine finished seeking {position}",
            Event::DidUpdatePosition => "playback position changed {position}",
            Event::DidUpdateBuffer => "loaded range changed {start_position, end_position, duration}",
            Event::DidUpdateDuration => "media duration resolved {duration}",
            Event::SeekableUpdate => "seekable ranges changed {seekableTimeRanges}",
            Event::DidChangeDvrAvailability => "DVR window appeared or vanished {available}",
            Event::DidChangeDvrStatus => "DVR in-use status {inUse}",
            Event::DidFindAudio => "audio tracks discovered {options, hasDefaultSelected}",
            Event::DidFindSubtitle => "subtitle tracks discovered {options, hasDefaultSelected}",
            Event::DidSelectAudio => "audio track switched {mediaOption}",
            Event::DidSelectSubtitle => "subtitle track switched {mediaOption}",
            Event::DidUpdateOptions => "player options replaced",
            Event::WillLoadSource => "source load requested",
            Event::DidLoadSource => "an engine accepted the source",
            Event::DidNotLoadSource => "no engine accepted the source",
            Event::WillChangePlayback => "active playback about to be replaced",
            Event::DidChangePlayback => "active playback replaced",
            Event::WillDestroy => "player teardown started",
            Event::DidDestroy => "player teardown finished",
        }
    }
}

impl AsRef<str> for Event {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload builders for the well-known events
pub mod payload {
    use super::*;

    fn single(key: &str, value: Value) -> EventPayload {
        let mut map = EventPayload::new();
        map.insert(key.to_string(), value);
        map
    }

    /// `{position}` for willSeek, didSeek and didUpdatePosition
    pub fn position(position: f64) -> EventPayload {
        single("position", json!(position))
    }

    pub fn duration(duration: f64) -> EventPayload {
        single("duration", json!(duration))
    }

    pub fn dvr_available(available: bool) -> EventPayload {
        single("available", json!(available))
    }

    pub fn dvr_in_use(in_use: bool) -> EventPayload {
        single("inUse", json!(in_use))
    }

    pub fn buffer(start_position: f64, end_position: f64, duration: f64) -> EventPayload {
        let mut map = EventPayload::new();
        map.insert("start_position".into(), json!(start_position));
        map.insert("end_position".into(), json!(end_position));
        map.insert("duration".into(), json!(duration));
        map
    }

    pub fn seekable(ranges: &[TimeRange]) -> EventPayload {
        let pairs: Vec<Value> = ranges.iter().map(|r| json!([r.start, r.end()])).collect();
        single("seekableTimeRanges", Value::Array(pairs))
    }

    pub fn error(error: &EngineError) -> EventPayload {
        single("error", json!(error))
    }

    /// `{options, hasDefaultSelected}` for didFindAudio and didFindSubtitle
    pub fn media_options(options: &[MediaOption], has_default_selected: bool) -> EventPayload {
        let mut map = single("options", json!(options));
        map.insert("hasDefaultSelected".into(), json!(has_default_selected));
        map
    }

    pub fn media_option(option: &MediaOption) -> EventPayload {
        single("mediaOption", json!(option))
    }

    /// Read a numeric field back out of a payload
    pub fn number(payload: Option<&EventPayload>, key: &str) -> Option<f64> {
        payload?.get(key)?.as_f64()
    }

    pub fn flag(payload: Option<&EventPayload>, key: &str) -> Option<bool> {
        payload?.get(key)?.as_bool()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_serde() {
        for event in Event::ALL {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json, Value::String(event.as_str().to_string()));
        }
    }

    #[test]
    fn test_buffer_payload_keys() {
        let p = payload::buffer(0.0, 12.5, 120.0);
        assert_eq!(payload::number(Some(&p), "end_position"), Some(12.5));
        assert_eq!(payload::number(Some(&p), "duration"), Some(120.0));
    }

    #[test]
    fn test_seekable_payload_pairs() {
        let p = payload::seekable(&[TimeRange::new(10.0, 50.0)]);
        assert_eq!(p["seekableTimeRanges"], json!([[10.0, 60.0]]));
    }

    #[test]
    fn test_media_options_payload() {
        let options = [MediaOption::subtitle("Portuguese", "pt"), MediaOption::subtitles_off()];
        let p = payload::media_options(&options, true);
        assert_eq!(p["options"][1]["language"], "off");
        assert_eq!(payload::flag(Some(&p), "hasDefaultSelected"), Some(true));

        let p = payload::media_option(&options[0]);
        assert_eq!(p["mediaOption"]["type"], "subtitle");
    }

    #[test]
    fn test_error_payload_carries_detail() {
        let p = payload::error(&EngineError::new("E1", "decoder died"));
        assert_eq!(p["error"]["code"], "E1");
        assert_eq!(p["error"]["message"], "decoder died");
    }
}
