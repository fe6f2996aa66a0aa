//! Reel Core - Playback orchestration for Reel
//!
//! This crate provides the core of the player on top of a platform media
//! engine:
//! - Event bus with listener lifecycle management
//! - Playback state machine driven by engine signals
//! - DVR window tracking for live streams
//! - Seek queuing until the engine is ready and the media seekable
//! - Audio and subtitle track discovery and selection
//! - Player source loading and plugin registry
//! - Analytics plugin (feature `analytics`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Reel Core                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   engine signals ──► ┌──────────────┐                           │
//! │                      │    State     │                           │
//! │                      │   Machine    │                           │
//! │                      └──────┬───────┘                           │
//! │                             │                                   │
//! │  ┌──────────────┐    ┌──────┴──────┐    ┌──────────────┐        │
//! │  │     DVR      │◄───┤  Playback   ├───►│     Seek     │        │
//! │  │   Tracker    │    │             │    │ Coordinator  │        │
//! │  └──────────────┘    └──────┬──────┘    └──────────────┘        │
//! │                             │                                   │
//! │  ┌──────────────┐    ┌──────┴──────┐    ┌──────────────┐        │
//! │  │   Plugins    ├───►│    Event    │◄───┤    Player    │        │
//! │  │  (analytics) │    │     Bus     │    │              │        │
//! │  └──────────────┘    └─────────────┘    └──────────────┘        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is single-threaded. Engines running on other threads
//! deliver their signals through [`engine::signal_channel`] and
//! [`playback::pump_signals`].

pub mod error;
pub mod types;
pub mod events;
pub mod bus;
pub mod options;
pub mod engine;
pub mod state;
pub mod dvr;
pub mod seek;
pub mod playback;
pub mod player;
pub mod plugin;
#[cfg(feature = "analytics")]
pub mod analytics;

pub use error::{EngineError, Error, Result};
pub use types::*;
pub use events::{Event, EventPayload};
pub use bus::{EventBus, EventHub, EventSource};
pub use options::Options;
pub use engine::{signal_channel, EngineSignal, MediaEngine, RecordingEngine};
pub use state::PlaybackStateMachine;
pub use dvr::DvrWindowTracker;
pub use seek::SeekCoordinator;
pub use playback::{pump_signals, Playback};
pub use player::{EngineFactory, Player};
pub use plugin::{Plugin, PluginKind, PluginRegistry};
#[cfg(feature = "analytics")]
pub use analytics::{AnalyticsEvent, AnalyticsPlugin, PlaybackMetrics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library; logs the version
pub fn init() {
    tracing::info!(version = VERSION, "Reel Core initialized");
}
