//! Live topic monitor.
//!
//! Demonstrates:
//! - Building a Bridge for a board host
//! - Several consumers sharing one subscription
//! - Reacting to change notifications
//! - Publishing a mode switch through the detected sink
//!
//! Usage:
//!   cargo run --example monitor -- --host 10.0.0.5
//!   cargo run --example monitor -- --host 10.0.0.5 --port 9999 --topic /imu
//!   cargo run --example monitor -- --host 10.0.0.5 --debug --no-wait

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::Context;
use rosboard_bridge::{
    Bridge, BridgeEvent, ConnectionState, DEFAULT_PORT, OutboundMessage, ReconnectPolicy,
    SubscribeOptions, detect_sink,
};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_TOPIC: &str = "/rosout";

const MODE_TOPIC: &str = "/mode_switch";

// ============================================================================
// Args
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    host: Option<String>,
    port: u16,
    topic: String,
    debug: bool,
    no_wait: bool,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut args = Self {
            host: None,
            port: DEFAULT_PORT,
            topic: DEFAULT_TOPIC.to_owned(),
            debug: false,
            no_wait: false,
        };

        let mut raw = std::env::args().skip(1);
        while let Some(arg) = raw.next() {
            match arg.as_str() {
                "--host" => args.host = raw.next(),
                "--port" => {
                    let port = raw.next().context("--port needs a value")?;
                    args.port = port.parse().context("invalid --port")?;
                }
                "--topic" => args.topic = raw.next().context("--topic needs a value")?,
                "--debug" => args.debug = true,
                "--no-wait" => args.no_wait = true,
                other => anyhow::bail!("unknown argument {other}"),
            }
        }

        Ok(args)
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "rosboard_bridge=debug"
    } else {
        "rosboard_bridge=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("[ERROR] {e:#}");
            std::process::exit(2);
        }
    };
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== ROSboard Monitor ===\n");

    // ========================================================================
    // Build Bridge
    // ========================================================================

    let mut builder = Bridge::builder()
        .port(args.port)
        .reconnect_policy(ReconnectPolicy::exponential(
            Duration::from_secs(1),
            Duration::from_secs(30),
            Some(5),
        ));
    if let Some(host) = &args.host {
        builder = builder.host(host.as_str());
    }
    let bridge = builder.build().context("building bridge")?;

    println!("[1] Board: {}", bridge.address().unwrap_or_else(|| "<unconfigured>".into()));

    // ========================================================================
    // Listen
    // ========================================================================

    let reader = bridge.clone();
    let watched = args.topic.clone();
    bridge.on_change(move |event| match event {
        BridgeEvent::StatusChanged(state) => println!("    status -> {state}"),
        BridgeEvent::TopicsReplaced => println!("    {} topics advertised", reader.topics().len()),
        BridgeEvent::MessageUpdated { topic } if *topic == watched => {
            if let Some(sample) = reader.latest(topic) {
                println!("    {topic}: {}", sample.to_value());
            }
        }
        BridgeEvent::ErrorRecorded(error) => println!("    error: {error}"),
        _ => {}
    });

    // ========================================================================
    // Subscribe Twice
    // ========================================================================

    println!("[2] Subscribing to {} from two consumers...", args.topic);
    bridge.subscribe(&args.topic, SubscribeOptions::with_rate(5.0));
    bridge.subscribe(&args.topic, SubscribeOptions::default());
    println!("    refcount = {}", bridge.refcount(&args.topic));

    tokio::time::sleep(Duration::from_secs(3)).await;

    if bridge.status() != ConnectionState::Connected {
        println!("    not connected yet ({})", bridge.status());
    }

    // ========================================================================
    // Publish
    // ========================================================================

    let sink = detect_sink();
    println!("[3] Publishing mode switch via {}...", sink.name());
    if let Err(e) = sink.publish(MODE_TOPIC, &OutboundMessage::mode_switch(true, "wheel")?).await {
        println!("    publish failed: {e}");
    }

    // ========================================================================
    // Wait
    // ========================================================================

    if args.no_wait {
        println!("[--no-wait] Skipping wait");
    } else {
        println!("Press Ctrl+C to exit...");
        tokio::signal::ctrl_c().await.ok();
    }

    bridge.unsubscribe(&args.topic);
    bridge.unsubscribe(&args.topic);
    bridge.disconnect(true);

    println!("\n=== Done ===");
    Ok(())
}
