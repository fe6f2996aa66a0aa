//! Basic playback example
//!
//! Drives a live playback with a recording engine and prints every event
//! the playback publishes.
//!
//! Run with: cargo run -p reel-core --example basic_playback

use reel_core::{
    BufferingState, EngineSignal, EngineStatus, Event, EventHub, EventSource, MediaDuration,
    Options, Playback, RecordingEngine, TimeRange,
};

fn main() -> reel_core::Result<()> {
    println!("Reel Core - Basic Playback Example");
    println!("==================================\n");

    tracing_subscriber::fmt()
        .with_env_filter("reel_core=debug")
        .init();

    let engine = RecordingEngine::new();
    let options = Options::for_source("https://cdn.example.com/live/master.m3u8")?
        .with_min_dvr_size(60.0)?;
    let playback = Playback::new(&EventHub::new(), options, Box::new(engine.clone()));

    for event in Event::ALL {
        playback.event_bus().on(event, move |payload| match payload {
            Some(payload) => println!("  {:<26} {}", event, serde_json::Value::Object(payload.clone())),
            None => println!("  {}", event),
        })?;
    }

    println!("Engine signals:");
    playback.handle_signal(EngineSignal::DurationResolved { duration: MediaDuration::Indefinite });
    playback.handle_signal(EngineSignal::StatusChanged { status: EngineStatus::Ready });
    playback.handle_signal(EngineSignal::BufferingChanged { state: BufferingState::BufferEmpty });
    playback.handle_signal(EngineSignal::RateChanged { rate: 1.0, prior: false });
    playback.handle_signal(EngineSignal::BufferingChanged { state: BufferingState::LikelyToKeepUp });
    playback.handle_signal(EngineSignal::SeekableRangesUpdated {
        ranges: vec![TimeRange::from_bounds(1000.0, 1090.0)],
    });

    println!("\nUser pauses and rewinds 30s into the window:");
    playback.pause();
    playback.seek(30.0);
    playback.handle_signal(EngineSignal::SeekCompleted { time: 1030.0, success: true });

    println!("\nState:");
    println!("  State:          {}", playback.state());
    println!("  Type:           {}", playback.playback_type());
    println!("  Duration:       {:.1}s", playback.duration());
    println!("  Position:       {:.1}s", playback.position());
    println!("  DVR available:  {}", playback.is_dvr_available());
    println!("  DVR in use:     {}", playback.is_dvr_in_use());
    println!("  Engine seeks:   {:?}", engine.seeks());

    playback.destroy();
    Ok(())
}
