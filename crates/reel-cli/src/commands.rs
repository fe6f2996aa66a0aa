//! CLI command implementations

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context};
use reel_core::engine::EngineCommand;
use reel_core::{
    pump_signals, signal_channel, EngineFactory, EngineSignal, Event, EventBus, EventSource,
    MediaEngine, MediaOptionType, Options, Playback, Player, PluginRegistry, RecordingEngine,
    SeekTarget,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::Tabled;
use tracing::{debug, info, warn};

use crate::output::{self, OutputFormat};

/// A recorded session: options, source and the steps to replay
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// Falls back to `options.sourceUrl`
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default = "empty_object")]
    pub options: Value,
    pub steps: Vec<Step>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// One trace step: an engine signal or a user command
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Signal(EngineSignal),
    Command(UserCommand),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UserCommand {
    Play,
    Pause,
    Stop,
    Seek { time: f64 },
    SeekToLiveEdge,
    Mute { enabled: bool },
    /// Switch to the discovered audio track with this language
    SelectAudio { language: String },
    SelectSubtitle { language: String },
}

/// One published event
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct EventRow {
    /// Index of the step that caused the event; 0 while loading
    pub step: usize,
    pub component: String,
    pub event: String,
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub source: String,
    pub final_state: String,
    pub playback_type: String,
    pub duration: f64,
    pub position: f64,
    pub dvr_available: bool,
    pub dvr_in_use: bool,
    pub pending_seek: Option<SeekTarget>,
    pub events: Vec<EventRow>,
    pub engine_commands: Vec<EngineCommand>,
    pub analytics: Option<Value>,
}

#[derive(Debug, Serialize, Tabled)]
struct EventInfo {
    name: &'static str,
    description: &'static str,
}

/// Hands out the same recording engine for every playable source
struct SimulatedEngines {
    engine: RecordingEngine,
}

impl EngineFactory for SimulatedEngines {
    fn name(&self) -> &str {
        "simulated"
    }

    fn can_play(&self, options: &Options) -> bool {
        options.resolved_mime_type().is_some()
    }

    fn create(&self, _options: &Options) -> reel_core::Result<Box<dyn MediaEngine>> {
        Ok(Box::new(self.engine.clone()))
    }
}

/// Collects every well-known event from the components it watches
struct EventCollector {
    bus: EventBus,
    step: Rc<Cell<usize>>,
    rows: Rc<RefCell<Vec<EventRow>>>,
}

impl EventCollector {
    fn new(player: &Player) -> Self {
        Self {
            bus: EventBus::new(player.hub(), "collector"),
            step: Rc::new(Cell::new(0)),
            rows: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn watch(&self, source: &impl EventSource) -> anyhow::Result<()> {
        let component = source.event_bus().name().to_string();
        for event in Event::ALL {
            let rows = Rc::clone(&self.rows);
            let step = Rc::clone(&self.step);
            let component = component.clone();
            self.bus.listen_to(source, event, move |payload| {
                let payload = payload
                    .map(|p| Value::Object(p.clone()).to_string())
                    .unwrap_or_default();
                rows.borrow_mut().push(EventRow {
                    step: step.get(),
                    component: component.clone(),
                    event: event.to_string(),
                    payload,
                });
            })?;
        }
        Ok(())
    }

    fn set_step(&self, step: usize) {
        self.step.set(step);
    }

    fn rows(&self) -> Vec<EventRow> {
        self.rows.borrow().clone()
    }
}

impl Trace {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading trace {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing trace {}", path.display()))
    }
}

/// Replay a trace and print the event stream
pub async fn simulate(trace_path: &Path, options_path: Option<&Path>, format: &str) -> anyhow::Result<()> {
    let trace = Trace::load(trace_path)?;
    let options_value = match options_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading options {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing options {}", path.display()))?
        }
        None => trace.options.clone(),
    };
    let options = Options::from_value(options_value).context("invalid options")?;

    let report = run(&trace, options).await?;
    print_report(&report, OutputFormat::from(format))
}

/// Drive a player through `trace`. Consecutive signals travel through the
/// signal channel, as they would from an engine thread.
pub async fn run(trace: &Trace, options: Options) -> anyhow::Result<SimulationReport> {
    let source = match (&trace.source, &options.source) {
        (Some(source), _) => source.clone(),
        (None, Some(url)) => url.to_string(),
        (None, None) => bail!("trace has no source and options have no sourceUrl"),
    };
    let mime_type = trace.mime_type.clone().or_else(|| options.mime_type.clone());

    let mut registry = PluginRegistry::new();
    registry.init();
    let engine = RecordingEngine::new();
    let player = Player::new(options, &registry).with_engine_factory(SimulatedEngines {
        engine: engine.clone(),
    });

    let collector = EventCollector::new(&player);
    collector.watch(&player)?;
    let playback = player
        .load(&source, mime_type.as_deref())
        .with_context(|| format!("loading {source}"))?;
    collector.watch(&playback)?;
    info!(source = %source, steps = trace.steps.len(), "replaying trace");

    let mut batch: Vec<(usize, EngineSignal)> = Vec::new();
    for (index, step) in trace.steps.iter().enumerate() {
        let number = index + 1;
        match step {
            Step::Signal(signal) => batch.push((number, signal.clone())),
            Step::Command(command) => {
                deliver(&playback, &collector, std::mem::take(&mut batch)).await?;
                collector.set_step(number);
                apply(&playback, command);
            }
        }
    }
    deliver(&playback, &collector, batch).await?;

    let report = SimulationReport {
        source,
        final_state: playback.state().to_string(),
        playback_type: playback.playback_type().to_string(),
        duration: playback.duration(),
        position: playback.position(),
        dvr_available: playback.is_dvr_available(),
        dvr_in_use: playback.is_dvr_in_use(),
        pending_seek: playback.pending_seek(),
        events: collector.rows(),
        engine_commands: engine.commands(),
        analytics: player.plugin_snapshot("analytics"),
    };
    Ok(report)
}

/// Deliver signals one at a time so each event is attributed to its step
async fn deliver(
    playback: &Rc<Playback>,
    collector: &EventCollector,
    batch: Vec<(usize, EngineSignal)>,
) -> anyhow::Result<()> {
    for (number, signal) in batch {
        collector.set_step(number);
        let (tx, rx) = signal_channel();
        tx.send(signal)?;
        drop(tx);
        let delivered = pump_signals(Rc::downgrade(playback), rx).await;
        debug!(step = number, delivered, "signal delivered");
    }
    Ok(())
}

fn apply(playback: &Playback, command: &UserCommand) {
    debug!(?command, "user command");
    match command {
        UserCommand::Play => playback.play(),
        UserCommand::Pause => playback.pause(),
        UserCommand::Stop => playback.stop(),
        UserCommand::Seek { time } => playback.seek(*time),
        UserCommand::SeekToLiveEdge => playback.seek_to_live_edge(),
        UserCommand::Mute { enabled } => playback.mute(*enabled),
        UserCommand::SelectAudio { language } => select(playback, MediaOptionType::Audio, language),
        UserCommand::SelectSubtitle { language } => {
            select(playback, MediaOptionType::Subtitle, language)
        }
    }
}

fn select(playback: &Playback, option_type: MediaOptionType, language: &str) {
    let option = playback
        .media_options(option_type)
        .into_iter()
        .find(|option| option.language == language);
    match option {
        Some(option) => playback.select_media_option(&option),
        None => warn!(%option_type, language, "no such track, command skipped"),
    }
}

fn print_report(report: &SimulationReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", output::to_json(report)?),
        OutputFormat::Table => {
            println!("{}", output::to_table(&report.events));
            print_summary(report);
        }
        OutputFormat::Text => {
            println!("{}", output::heading("Events"));
            for row in &report.events {
                println!("  [{:>3}] {:<22} {:<26} {}", row.step, row.component, row.event, row.payload);
            }
            println!();
            print_summary(report);
        }
    }
    Ok(())
}

fn print_summary(report: &SimulationReport) {
    println!("{}", output::heading("Final State"));
    println!("{}", output::field("Source", &report.source));
    println!("{}", output::field("State", &report.final_state));
    println!("{}", output::field("Type", &report.playback_type));
    println!("{}", output::field("Duration", format!("{:.2}s", report.duration)));
    println!("{}", output::field("Position", format!("{:.2}s", report.position)));
    println!("{}", output::field("DVR available", report.dvr_available));
    println!("{}", output::field("DVR in use", report.dvr_in_use));
    if let Some(seek) = &report.pending_seek {
        println!("{}", output::field("Pending seek", seek));
    }
    println!("{}", output::field("Engine commands", report.engine_commands.len()));
    if let Some(analytics) = &report.analytics {
        println!("{}", output::field("QoE score", &analytics["qoe_score"]));
    }
}

/// List the well-known events
pub fn events(format: &str) -> anyhow::Result<()> {
    let rows: Vec<EventInfo> = Event::ALL
        .iter()
        .map(|event| EventInfo {
            name: event.as_str(),
            description: event.description(),
        })
        .collect();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&rows)?),
        OutputFormat::Table => println!("{}", output::to_table(&rows)),
        OutputFormat::Text => {
            for row in &rows {
                println!("  {:<26} {}", row.name, row.description);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE_TRACE: &str = r#"{
        "source": "https://cdn.example.com/live/master.m3u8",
        "options": { "minDvrSize": 60 },
        "steps": [
            { "signal": "duration_resolved", "duration": "indefinite" },
            { "signal": "status_changed", "status": "ready" },
            { "signal": "rate_changed", "rate": 1.0 },
            { "signal": "seekable_ranges_updated", "ranges": [{ "start": 0.0, "duration": 45.0 }] },
            { "command": "pause" },
            { "signal": "seekable_ranges_updated", "ranges": [{ "start": 0.0, "duration": 90.0 }] },
            { "command": "seek", "time": 20.0 },
            { "signal": "seek_completed", "time": 20.0, "success": true }
        ]
    }"#;

    fn parse(json: &str) -> Trace {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_steps_parse_as_signal_or_command() {
        let trace = parse(LIVE_TRACE);
        assert!(matches!(trace.steps[0], Step::Signal(EngineSignal::DurationResolved { .. })));
        assert!(matches!(trace.steps[4], Step::Command(UserCommand::Pause)));
        assert!(matches!(trace.steps[6], Step::Command(UserCommand::Seek { time }) if time == 20.0));
    }

    #[tokio::test]
    async fn test_live_trace_replay() {
        let trace = parse(LIVE_TRACE);
        let options = Options::from_value(trace.options.clone()).unwrap();
        let report = run(&trace, options).await.unwrap();

        let names: Vec<&str> = report.events.iter().map(|r| r.event.as_str()).collect();
        assert!(names.starts_with(&["willLoadSource", "willChangePlayback", "didChangePlayback", "didLoadSource"]));

        // Pause at step 5 is refused: 45s window is below minDvrSize
        assert!(!report.events.iter().any(|r| r.step == 5));

        let availability: Vec<&str> = report
            .events
            .iter()
            .filter(|r| r.event == "didChangeDvrAvailability")
            .map(|r| r.payload.as_str())
            .collect();
        assert_eq!(availability, vec![r#"{"available":false}"#, r#"{"available":true}"#]);

        assert_eq!(report.final_state, "playing");
        assert!(report.dvr_available);
        assert_eq!(report.engine_commands, vec![EngineCommand::Seek { time: 20.0 }]);
        assert!(report.events.iter().any(|r| r.step == 8 && r.event == "didSeek"));
    }

    #[tokio::test]
    async fn test_track_selection_replay() {
        let trace = parse(
            r#"{
            "source": "https://cdn.example.com/vod/movie.mp4",
            "options": { "defaultAudioSource": "en" },
            "steps": [
                { "signal": "media_options_discovered", "type": "audio", "options": [
                    { "name": "English", "type": "audio", "language": "en" },
                    { "name": "Portuguese", "type": "audio", "language": "pt" }
                ] },
                { "command": "select_audio", "language": "pt" },
                { "command": "select_subtitle", "language": "pt" }
            ]
        }"#,
        );
        let options = Options::from_value(trace.options.clone()).unwrap();
        let report = run(&trace, options).await.unwrap();

        assert_eq!(
            report.engine_commands,
            vec![
                EngineCommand::SelectAudio { language: "en".into() },
                EngineCommand::SelectAudio { language: "pt".into() },
            ]
        );
        assert!(report.events.iter().any(|r| r.step == 1 && r.event == "didFindAudio"));
        assert!(report.events.iter().any(|r| r.step == 2 && r.event == "didSelectAudio"));
        assert!(!report.events.iter().any(|r| r.step == 3));
    }

    #[tokio::test]
    async fn test_source_from_options() {
        let trace = parse(r#"{ "options": { "sourceUrl": "https://cdn.example.com/a.mp4" }, "steps": [] }"#);
        let options = Options::from_value(trace.options.clone()).unwrap();
        let report = run(&trace, options).await.unwrap();
        assert_eq!(report.source, "https://cdn.example.com/a.mp4");
        assert_eq!(report.final_state, "idle");
    }

    #[tokio::test]
    async fn test_missing_source_is_an_error() {
        let trace = parse(r#"{ "steps": [] }"#);
        assert!(run(&trace, Options::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_unplayable_source_is_an_error() {
        let trace = parse(r#"{ "source": "https://cdn.example.com/stream", "steps": [] }"#);
        assert!(run(&trace, Options::new()).await.is_err());
    }
}
