use anyhow::{Context, Result};
use livecall::call::{CallCollaborators, CallConfig, CallSession};
use livecall::sim::{ScriptedConnector, StaticGreeting, TimedSink, ToneSource};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long the demo call lasts before hanging up
const CALL_LENGTH: Duration = Duration::from_secs(8);

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livecall=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let use_devices = std::env::args().any(|arg| arg == "--devices");
    info!("Starting livecall demo (devices: {})", use_devices);

    let config = CallConfig::new();
    let output_rate = config.output_sample_rate;

    let connector = ScriptedConnector::new()
        .with_connect_delay(Duration::from_millis(300))
        .with_pause(Duration::from_millis(800))
        .with_agent_turn(
            "What are your opening hours?",
            "We are open from nine to five, Monday to Friday.",
            3,
            0.6,
            output_rate,
        )
        .with_pause(Duration::from_millis(1500))
        .with_agent_turn("Thanks, bye!", "Goodbye!", 1, 0.4, output_rate);
    let tap = connector.tap();

    let collaborators = if use_devices {
        device_collaborators(connector, output_rate)?
    } else {
        CallCollaborators {
            connector: Box::new(connector),
            greeting: Arc::new(StaticGreeting::tone(1.0, output_rate)),
            source: Box::new(ToneSource::new(220.0)),
            sink: Box::new(TimedSink::new()),
        }
    };

    let (session, handle) =
        CallSession::new(config, collaborators).context("Failed to set up the call")?;
    info!("Call {} created", handle.id());

    let hangup = handle.clone();
    thread::spawn(move || {
        thread::sleep(CALL_LENGTH);
        if let Err(e) = hangup.end_call() {
            tracing::warn!("Hang up failed: {}", e);
        }
    });

    session.run().context("Call loop failed")?;

    let snapshot = handle.state().snapshot();
    println!("Call ended ({}), {} media frames sent", snapshot.status, tap.frame_count());
    if let Some(message) = snapshot.permission_error {
        println!("{}", message);
    }
    for entry in snapshot.transcript {
        println!("{}: {}", entry.speaker, entry.text);
    }

    Ok(())
}

#[cfg(feature = "audio-io")]
fn device_collaborators(connector: ScriptedConnector, output_rate: u32) -> Result<CallCollaborators> {
    use livecall::audio::{CpalFrameSink, CpalFrameSource};

    Ok(CallCollaborators {
        connector: Box::new(connector),
        greeting: Arc::new(StaticGreeting::tone(1.0, output_rate)),
        source: Box::new(CpalFrameSource::new().context("No microphone")?),
        sink: Box::new(CpalFrameSink::new().context("No speaker")?),
    })
}

#[cfg(not(feature = "audio-io"))]
fn device_collaborators(
    _connector: ScriptedConnector,
    _output_rate: u32,
) -> Result<CallCollaborators> {
    anyhow::bail!("Built without the audio-io feature")
}
