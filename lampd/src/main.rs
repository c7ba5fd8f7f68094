#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use eyre::Result;
use humantime::parse_duration;
use tokio::sync::mpsc;
use tracing::info;

use crate::engine::{Runner, StreamOptions};
use crate::hal::StubSink;
use crate::lamp::Lamp;
use crate::store::{DeviceState, JsonFile};

mod control;
mod engine;
mod hal;
mod lamp;
mod menu;
mod simulation;
mod store;
mod stream;

const SYSLOG_IDENTIFIER: &str = "lampd";

/// Capacity of the engine event queue. Audio frames are dropped on
/// overflow; control messages wait for a slot.
const ENGINE_CAPACITY: usize = 8;
const TRANSPORT_CAPACITY: usize = 8;

/// Utility args
#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "RGB lamp daemon",
    long_about = "Drives the lamp LEDs from pub/sub commands, the rotary encoder and the FFT audio stream"
)]
struct Args {
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
enum SubCommand {
    /// Lamp daemon, reacting to control messages and the audio stream
    Daemon(DaemonArgs),

    /// Scripted feature show, for bring-up without a control transport
    Simulation(SimulationArgs),
}

#[derive(Parser, Debug)]
struct DaemonArgs {
    /// Host of the FFT streaming server
    #[arg(long, env = "LAMPD_FFT_HOST", default_value = "127.0.0.1")]
    fft_host: String,

    /// Port of the FFT streaming server
    #[arg(long, env = "LAMPD_FFT_PORT", default_value_t = 12345)]
    fft_port: u16,

    /// Device id used to filter control messages
    #[arg(long, env = "LAMPD_DEVICE_ID", default_value = "demo-lamp")]
    device_id: String,

    /// Path of the persisted state file
    #[arg(long, env = "LAMPD_STATE_FILE", default_value = "state.json")]
    state_file: PathBuf,
}

#[derive(Parser, Debug)]
struct SimulationArgs {
    #[clap(flatten)]
    daemon: DaemonArgs,

    /// Delay between scripted steps
    #[arg(long, default_value = "6s", value_parser = parse_duration)]
    step_delay: Duration,
}

async fn main_inner(args: Args) -> Result<()> {
    let (daemon_args, simulate) = match args.subcmd {
        SubCommand::Daemon(daemon_args) => (daemon_args, None),
        SubCommand::Simulation(SimulationArgs { daemon, step_delay }) => {
            (daemon, Some(step_delay))
        }
    };

    let state = DeviceState::load(
        &daemon_args.state_file,
        DeviceState::default_lamp(&daemon_args.device_id),
    )
    .await;

    let (engine_tx, engine_rx) = mpsc::channel(ENGINE_CAPACITY);
    let (broadcast_tx, broadcast_rx) = mpsc::channel(control::BROADCAST_CAPACITY);
    let (persist_tx, persist_rx) = mpsc::channel(TRANSPORT_CAPACITY);

    // The pub/sub transport is an external collaborator: it feeds raw
    // payloads into `inbound_tx` and drains `outbound_rx`. Until one is
    // attached, the inbound endpoint stays parked and outbound messages are
    // logged away.
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(TRANSPORT_CAPACITY);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(TRANSPORT_CAPACITY);
    let _transport_inbound = inbound_tx;

    tokio_spawn(
        "control-inbound",
        control::dispatch_inbound(
            state.id.clone(),
            state.feature_ids(),
            inbound_rx,
            engine_tx.clone(),
        ),
    );
    tokio_spawn(
        "control-outbound",
        control::broadcast_changes(state.id.clone(), broadcast_rx, outbound_tx),
    );
    tokio_spawn(
        "state-persist",
        store::persist_task(
            state.clone(),
            JsonFile::new(daemon_args.state_file.clone()),
            persist_rx,
        ),
    );
    tokio_spawn("transport-drain", async move {
        while let Some(message) = outbound_rx.recv().await {
            tracing::debug!("broadcast: {message}");
        }
    });

    let mut runner = Runner::new(
        Lamp::new(StubSink),
        StreamOptions {
            host: daemon_args.fft_host.clone(),
            port: daemon_args.fft_port,
        },
        engine_tx.clone(),
        broadcast_tx,
        persist_tx,
    );
    runner.restore(state.initial_features()).await;

    if let Some(step_delay) = simulate {
        tokio_spawn(
            "simulation",
            simulation::feature_show(engine_tx.clone(), step_delay),
        );
    }

    info!("lampd up as {}", state.id);
    engine::event_loop(engine_rx, runner).await
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let telemetry = lamp_telemetry::TelemetryConfig::new()
        .with_journald(SYSLOG_IDENTIFIER)
        .init();

    let args = Args::parse();
    let result = main_inner(args).await;
    telemetry.flush().await;
    result
}

/// Just like `tokio::spawn()`, but if we are using unstable tokio features, we give
/// the task a readable `name`.
fn tokio_spawn<F>(name: &'static str, future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let _name = name; // Deal with "unused" variable;
    #[cfg(tokio_unstable)]
    return tokio::task::Builder::new()
        .name(_name)
        .spawn(future)
        .expect("failed to spawn async task");
    #[cfg(not(tokio_unstable))]
    return tokio::spawn(future);
}
