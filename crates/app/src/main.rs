use std::{f64::consts::TAU, path::PathBuf};

use clap::{Parser, Subcommand};
use maplooper_core::{
    AppConfig, BeatClock, Direction, LoopUnit, Network, SignalSpec, SignalType, SignalValue,
};
use tracing_subscriber::EnvFilter;

const FADER: &str = "controller/fader";
const RECORD: &str = "controller/record";
const MODULATION: &str = "controller/modulation";
const PITCH: &str = "synth/pitch";

fn main() -> maplooper_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Defaults => {
            println!("{}", AppConfig::default().to_json_pretty()?);
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> maplooper_core::Result<()> {
    let config = match &args.config {
        Some(path) => AppConfig::from_path(path)?,
        None => AppConfig::default(),
    };
    let positive = |value: f64| value.is_finite() && value > 0.0;
    if !positive(args.tick_hz) || !positive(args.bpm) {
        return Err("tick-hz and bpm must be positive".into());
    }
    tracing::info!(name = %args.name, bpm = args.bpm, beats = args.beats, "starting loop");

    let network = Network::new(config.network.clone());
    let looper = network.device("maplooper");
    let mut unit = LoopUnit::with_config(&args.name, &looper, &config.looper)?;
    unit.map_input(FADER)?;
    unit.map_record(RECORD)?;
    unit.map_modulation(MODULATION)?;
    unit.map_output(PITCH)?;

    let element_type = config.looper.element_type;
    let vector_len = config.looper.vector_len;
    let controller = network.device("controller");
    let fader = controller.create_signal(SignalSpec::new(
        FADER,
        Direction::Out,
        element_type,
        vector_len,
    ))?;
    let record = controller.create_signal(
        SignalSpec::new(RECORD, Direction::Out, SignalType::Float, 1).with_range(0.0, 1.0),
    )?;
    let modulation = controller.create_signal(
        SignalSpec::new(MODULATION, Direction::Out, SignalType::Float, 1).with_range(0.0, 1.0),
    )?;
    let synth = network.device("synth");
    let pitch = synth.create_signal(SignalSpec::new(
        PITCH,
        Direction::In,
        element_type,
        vector_len,
    ))?;

    let mut clock = BeatClock::new(args.bpm);
    let tick = 1.0 / args.tick_hz;
    let mut missed = 0;
    while clock.beats() < args.beats {
        network.poll()?;

        let beats = clock.beats();
        let recording = if beats < args.record_beats { 1.0 } else { 0.0 };
        controller.set_value(record, SignalValue::float(recording))?;
        controller.set_value(modulation, SignalValue::float(args.modulation.clamp(0.0, 1.0) as f32))?;
        controller.set_value(fader, fader_value(element_type, vector_len, beats, args.record_beats))?;

        let report = unit.update(beats)?;
        missed += report.missed;
        if report.advanced {
            let value = network.value(pitch)?;
            tracing::debug!(step = report.step, recording, ?value, "step");
        }

        clock.advance(tick);
    }

    tracing::info!(
        steps = unit.last_update(),
        missed,
        maps = network.map_count()?,
        "finished loop"
    );
    Ok(())
}

/// Sine sweep across the recording window, phase-shifted per element.
fn fader_value(element_type: SignalType, vector_len: usize, beats: f64, period: f64) -> SignalValue {
    let period = if period > 0.0 { period } else { 1.0 };
    let scale = match element_type {
        SignalType::Float => 1.0,
        SignalType::Int => 127.0,
    };
    let samples: Vec<f64> = (0..vector_len)
        .map(|i| {
            let phase = beats / period + i as f64 / vector_len as f64;
            scale * (0.5 + 0.5 * (TAU * phase).sin())
        })
        .collect();
    SignalValue::from_f64(element_type, &samples)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Live-looping unit for networked instruments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a simulated controller and replay it to a simulated synth.
    Run(RunArgs),
    /// Print the default configuration as JSON.
    Defaults,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Name prefix for the unit's signals.
    #[arg(short, long, default_value = "loop")]
    name: String,
    #[arg(long, default_value_t = 120.0)]
    bpm: f64,
    /// Transport length, in beats.
    #[arg(long, default_value_t = 8.0)]
    beats: f64,
    /// Update calls per second.
    #[arg(long, default_value_t = 200.0)]
    tick_hz: f64,
    /// Beats recorded before switching to replay.
    #[arg(long, default_value_t = 1.0)]
    record_beats: f64,
    /// Modulation weight in [0, 1].
    #[arg(long, default_value_t = 0.0)]
    modulation: f64,
}
