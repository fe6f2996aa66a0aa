//! Player options

use serde_json::{json, Map, Value};
use url::Url;

use crate::error::{Error, Result};

/// Recognized option keys
pub mod keys {
    pub const SOURCE_URL: &str = "sourceUrl";
    pub const MIME_TYPE: &str = "mimeType";
    pub const MIN_DVR_SIZE: &str = "minDvrSize";
    pub const START_AT: &str = "startAt";
    pub const LIVE_START_TIME: &str = "liveStartTime";
    pub const DEFAULT_AUDIO_SOURCE: &str = "defaultAudioSource";
    pub const DEFAULT_SUBTITLE: &str = "defaultSubtitle";
}

/// Options consumed by the playback core.
///
/// Built from a loosely-typed JSON object. Numeric options accept numbers or
/// numeric strings; unrecognized keys are kept in `extra` for plugins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub source: Option<Url>,
    pub mime_type: Option<String>,
    /// Seconds; DVR is available whenever a window of at least this size exists
    pub min_dvr_size: f64,
    /// Initial position in seconds, applied once when the engine is ready
    pub start_at: Option<f64>,
    /// Epoch seconds to start a live stream at, if inside the DVR window
    pub live_start_time: Option<f64>,
    /// Language of the audio track to select once tracks are discovered
    pub default_audio_source: Option<String>,
    pub default_subtitle: Option<String>,
    pub extra: Map<String, Value>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a source URL, MIME type detected from its extension
    pub fn for_source(source: &str) -> Result<Self> {
        Ok(Self {
            source: Some(parse_url(source)?),
            ..Self::default()
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::invalid_option("options", "expected a JSON object"));
        };

        let source = match map.remove(keys::SOURCE_URL) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(parse_url(&s)?),
            Some(_) => return Err(Error::invalid_option(keys::SOURCE_URL, "expected a string")),
        };

        let mime_type = match map.remove(keys::MIME_TYPE) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => return Err(Error::invalid_option(keys::MIME_TYPE, "expected a string")),
        };

        let min_dvr_size = match map.remove(keys::MIN_DVR_SIZE) {
            None | Some(Value::Null) => 0.0,
            Some(v) => validate_min_dvr_size(number(keys::MIN_DVR_SIZE, &v)?)?,
        };

        let start_at = map
            .remove(keys::START_AT)
            .filter(|v| !v.is_null())
            .map(|v| number(keys::START_AT, &v))
            .transpose()?;

        let live_start_time = map
            .remove(keys::LIVE_START_TIME)
            .filter(|v| !v.is_null())
            .map(|v| number(keys::LIVE_START_TIME, &v))
            .transpose()?;

        let default_audio_source = string(&mut map, keys::DEFAULT_AUDIO_SOURCE)?;
        let default_subtitle = string(&mut map, keys::DEFAULT_SUBTITLE)?;

        Ok(Self {
            source,
            mime_type,
            min_dvr_size,
            start_at,
            live_start_time,
            default_audio_source,
            default_subtitle,
            extra: map,
        })
    }

    pub fn with_min_dvr_size(mut self, seconds: f64) -> Result<Self> {
        self.min_dvr_size = validate_min_dvr_size(seconds)?;
        Ok(self)
    }

    pub fn with_start_at(mut self, seconds: f64) -> Self {
        self.start_at = Some(seconds);
        self
    }

    pub fn with_live_start_time(mut self, epoch_seconds: f64) -> Self {
        self.live_start_time = Some(epoch_seconds);
        self
    }

    pub fn with_default_audio_source(mut self, language: impl Into<String>) -> Self {
        self.default_audio_source = Some(language.into());
        self
    }

    pub fn with_default_subtitle(mut self, language: impl Into<String>) -> Self {
        self.default_subtitle = Some(language.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Explicit MIME type, or the one implied by the source extension
    pub fn resolved_mime_type(&self) -> Option<String> {
        self.mime_type
            .clone()
            .or_else(|| self.source.as_ref().and_then(detect_mime_type).map(String::from))
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        if let Some(source) = &self.source {
            map.insert(keys::SOURCE_URL.into(), json!(source.as_str()));
        }
        if let Some(mime_type) = &self.mime_type {
            map.insert(keys::MIME_TYPE.into(), json!(mime_type));
        }
        map.insert(keys::MIN_DVR_SIZE.into(), json!(self.min_dvr_size));
        if let Some(start_at) = self.start_at {
            map.insert(keys::START_AT.into(), json!(start_at));
        }
        if let Some(live_start_time) = self.live_start_time {
            map.insert(keys::LIVE_START_TIME.into(), json!(live_start_time));
        }
        if let Some(language) = &self.default_audio_source {
            map.insert(keys::DEFAULT_AUDIO_SOURCE.into(), json!(language));
        }
        if let Some(language) = &self.default_subtitle {
            map.insert(keys::DEFAULT_SUBTITLE.into(), json!(language));
        }
        Value::Object(map)
    }
}

fn parse_url(source: &str) -> Result<Url> {
    Url::parse(source).map_err(|e| Error::invalid_option(keys::SOURCE_URL, e.to_string()))
}

fn string(map: &mut Map<String, Value>, key: &str) -> Result<Option<String>> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(Error::invalid_option(key, "expected a string")),
    }
}

fn number(key: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(Error::invalid_option(key, format!("expected a number, got {value}"))),
    }
}

fn validate_min_dvr_size(seconds: f64) -> Result<f64> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(Error::invalid_option(
            keys::MIN_DVR_SIZE,
            format!("must be a non-negative number of seconds, got {seconds}"),
        ));
    }
    Ok(seconds)
}

/// MIME type for well-known media extensions
pub fn detect_mime_type(url: &Url) -> Option<&'static str> {
    let extension = url.path().rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "mp4" => Some("video/mp4"),
        "m3u8" => Some("application/x-mpegurl"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::from_value(json!({})).unwrap();
        assert_eq!(options.min_dvr_size, 0.0);
        assert!(options.start_at.is_none());
        assert!(options.source.is_none());
    }

    #[test]
    fn test_numbers_and_numeric_strings() {
        let options = Options::from_value(json!({
            "minDvrSize": 60,
            "startAt": "15.5",
            "liveStartTime": 1_700_000_000.0,
        }))
        .unwrap();
        assert_eq!(options.min_dvr_size, 60.0);
        assert_eq!(options.start_at, Some(15.5));
        assert_eq!(options.live_start_time, Some(1_700_000_000.0));
    }

    #[test]
    fn test_rejects_bad_min_dvr_size() {
        let err = Options::from_value(json!({ "minDvrSize": -1 })).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { ref key, .. } if key == "minDvrSize"));
        assert!(Options::from_value(json!({ "minDvrSize": "lots" })).is_err());
        assert!(Options::new().with_min_dvr_size(f64::NAN).is_err());
    }

    #[test]
    fn test_default_track_languages() {
        let options = Options::from_value(json!({
            "defaultAudioSource": "en",
            "defaultSubtitle": "pt",
        }))
        .unwrap();
        assert_eq!(options.default_audio_source.as_deref(), Some("en"));
        assert_eq!(options.default_subtitle.as_deref(), Some("pt"));
        assert_eq!(options.to_value()["defaultSubtitle"], "pt");
        assert!(Options::from_value(json!({ "defaultSubtitle": 3 })).is_err());
    }

    #[test]
    fn test_unknown_keys_kept() {
        let options = Options::from_value(json!({ "poster": "p.png", "startAt": 3 })).unwrap();
        assert_eq!(options.extra["poster"], "p.png");
        assert!(!options.extra.contains_key("startAt"));
    }

    #[test]
    fn test_mime_detection() {
        let hls = Options::for_source("https://cdn.example.com/live/master.m3u8").unwrap();
        assert_eq!(hls.resolved_mime_type().as_deref(), Some("application/x-mpegurl"));

        let mp4 = Options::for_source("https://cdn.example.com/vod/movie.MP4").unwrap();
        assert_eq!(mp4.resolved_mime_type().as_deref(), Some("video/mp4"));

        let explicit = mp4.with_mime_type("video/quicktime");
        assert_eq!(explicit.resolved_mime_type().as_deref(), Some("video/quicktime"));
    }

    #[test]
    fn test_invalid_source_url() {
        assert!(Options::for_source("not a url").is_err());
    }

    #[test]
    fn test_to_value_keeps_recognized_keys() {
        let options = Options::for_source("https://cdn.example.com/a.mp4")
            .unwrap()
            .with_start_at(10.0);
        let value = options.to_value();
        assert_eq!(value["sourceUrl"], "https://cdn.example.com/a.mp4");
        assert_eq!(value["startAt"], 10.0);
        assert_eq!(Options::from_value(value).unwrap(), options);
    }
}
