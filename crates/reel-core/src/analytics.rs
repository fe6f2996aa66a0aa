//! Analytics plugin
//!
//! Listens to the active playback and captures:
//! - Quality of Experience (QoE) metrics
//! - Error tracking
//! - DVR usage

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::bus::{EventBus, EventHub};
use crate::error::Result;
use crate::events::{payload, Event, EventPayload};
use crate::playback::Playback;
use crate::plugin::{Plugin, PluginKind};
use crate::types::SessionId;

pub const PLUGIN_NAME: &str = "analytics";

/// Analytics event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    /// Engine ready for the first time
    Ready,

    /// Playback started or resumed
    Play { position: f64 },

    /// Playback paused
    Pause { position: f64 },

    /// Rebuffering started
    Stall { position: f64 },

    /// Seek completed
    Seek { position: f64 },

    /// End of media
    Complete,

    /// Playback stopped by the user
    Stop,

    /// Error occurred
    Error { code: String, message: String },

    /// DVR window appeared or vanished
    DvrAvailability { available: bool },

    /// Viewer moved into or out of the DVR window
    DvrStatus { in_use: bool },
}

/// Analytics event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEventRecord {
    /// Unique event ID
    pub id: Uuid,
    /// Session ID
    pub session_id: SessionId,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Sequence number
    pub sequence: u64,
    /// The event
    #[serde(flatten)]
    pub event: AnalyticsEvent,
}

/// Counters for the current session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackMetrics {
    pub play_count: u32,
    pub pause_count: u32,
    pub stall_count: u32,
    pub seek_count: u32,
    pub error_count: u32,
    pub completed: bool,
}

impl PlaybackMetrics {
    /// Calculate QoE score (0-100)
    pub fn qoe_score(&self) -> f64 {
        let mut score = 100.0;

        // Each stall costs 10 points
        score -= self.stall_count as f64 * 10.0;

        // Errors are the worst experience
        score -= self.error_count as f64 * 25.0;

        // Frequent seeking hints at navigation trouble
        score -= (self.seek_count as f64 * 2.0).min(10.0);

        score.clamp(0.0, 100.0)
    }

    fn record(&mut self, event: &AnalyticsEvent) {
        match event {
            AnalyticsEvent::Play { .. } => self.play_count += 1,
            AnalyticsEvent::Pause { .. } => self.pause_count += 1,
            AnalyticsEvent::Stall { .. } => self.stall_count += 1,
            AnalyticsEvent::Seek { .. } => self.seek_count += 1,
            AnalyticsEvent::Error { .. } => self.error_count += 1,
            AnalyticsEvent::Complete => self.completed = true,
            _ => {}
        }
    }
}

struct AnalyticsState {
    session_id: SessionId,
    sequence: u64,
    buffer: Vec<AnalyticsEventRecord>,
    metrics: PlaybackMetrics,
}

impl AnalyticsState {
    fn record(&mut self, event: AnalyticsEvent) {
        self.sequence += 1;
        self.metrics.record(&event);
        debug!(session_id = %self.session_id, sequence = self.sequence, ?event, "analytics event");
        self.buffer.push(AnalyticsEventRecord {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            timestamp: Utc::now(),
            sequence: self.sequence,
            event,
        });
    }
}

type Mapper = fn(Option<&EventPayload>, &Playback) -> Option<AnalyticsEvent>;

/// Records playback events for the active playback.
///
/// Callbacks hold only weak references: a destroyed plugin or playback
/// turns them into no-ops.
pub struct AnalyticsPlugin {
    bus: EventBus,
    state: Rc<RefCell<AnalyticsState>>,
}

impl AnalyticsPlugin {
    pub fn new(hub: &EventHub) -> Self {
        Self {
            bus: EventBus::new(hub, PLUGIN_NAME),
            state: Rc::new(RefCell::new(AnalyticsState {
                session_id: SessionId::new(),
                sequence: 0,
                buffer: Vec::new(),
                metrics: PlaybackMetrics::default(),
            })),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.state.borrow().session_id
    }

    pub fn metrics(&self) -> PlaybackMetrics {
        self.state.borrow().metrics.clone()
    }

    /// Buffered records
    pub fn records(&self) -> Vec<AnalyticsEventRecord> {
        self.state.borrow().buffer.clone()
    }

    /// Return and clear buffered records
    pub fn drain(&self) -> Vec<AnalyticsEventRecord> {
        std::mem::take(&mut self.state.borrow_mut().buffer)
    }

    fn record_on(&self, playback: &Rc<Playback>, event: Event, map: Mapper) -> Result<()> {
        let state: Weak<RefCell<AnalyticsState>> = Rc::downgrade(&self.state);
        let source: Weak<Playback> = Rc::downgrade(playback);
        self.bus.listen_to(playback, event, move |payload| {
            let (Some(state), Some(playback)) = (state.upgrade(), source.upgrade()) else {
                return;
            };
            if let Some(event) = map(payload, &playback) {
                state.borrow_mut().record(event);
            }
        })?;
        Ok(())
    }
}

impl Plugin for AnalyticsPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Container
    }

    /// Start a new session on `playback`
    fn bind(&mut self, playback: &Rc<Playback>) -> Result<()> {
        self.bus.stop_listening();
        {
            let mut state = self.state.borrow_mut();
            state.session_id = SessionId::new();
            state.sequence = 0;
            state.metrics = PlaybackMetrics::default();
        }

        self.record_on(playback, Event::Ready, |_, _| Some(AnalyticsEvent::Ready))?;
        self.record_on(playback, Event::Playing, |_, p| {
            Some(AnalyticsEvent::Play { position: p.position() })
        })?;
        self.record_on(playback, Event::DidPause, |_, p| {
            Some(AnalyticsEvent::Pause { position: p.position() })
        })?;
        self.record_on(playback, Event::Stalling, |_, p| {
            Some(AnalyticsEvent::Stall { position: p.position() })
        })?;
        self.record_on(playback, Event::DidSeek, |data, p| {
            let position = payload::number(data, "position").unwrap_or_else(|| p.position());
            Some(AnalyticsEvent::Seek { position })
        })?;
        self.record_on(playback, Event::DidComplete, |_, _| Some(AnalyticsEvent::Complete))?;
        self.record_on(playback, Event::DidStop, |_, _| Some(AnalyticsEvent::Stop))?;
        self.record_on(playback, Event::Error, |data, _| {
            let error = data?.get("error")?;
            Some(AnalyticsEvent::Error {
                code: error.get("code")?.as_str()?.to_string(),
                message: error.get("message")?.as_str()?.to_string(),
            })
        })?;
        self.record_on(playback, Event::DidChangeDvrAvailability, |data, _| {
            payload::flag(data, "available").map(|available| AnalyticsEvent::DvrAvailability { available })
        })?;
        self.record_on(playback, Event::DidChangeDvrStatus, |data, _| {
            payload::flag(data, "inUse").map(|in_use| AnalyticsEvent::DvrStatus { in_use })
        })?;

        debug!(session_id = %self.session_id(), playback = %playback.name(), "analytics bound");
        Ok(())
    }

    fn destroy(&mut self) {
        self.bus.stop_listening();
    }

    fn snapshot(&self) -> serde_json::Value {
        let state = self.state.borrow();
        json!({
            "session_id": state.session_id,
            "records": state.buffer.len(),
            "metrics": state.metrics,
            "qoe_score": state.metrics.qoe_score(),
        })
    }
}
