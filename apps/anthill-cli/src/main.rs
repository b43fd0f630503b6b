use std::{env, path::PathBuf, sync::Arc};

use anyhow::Result;
use anthill_archive::LogArchive;
use anthill_governor::{ColonyPopulation, SimulationState};
use anthill_ops::{ensure_log_dir, init_tracing, TelemetryRecorder};
use anthill_session::Session;
use anthill_settings::{DeferredKeyValueStore, FileKeyValueStore, SettingsStore};
use anthill_types::{
    config::AnthillConfig,
    settings::{RecoveryMethod, SettingsPatch},
};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

mod load;

use load::SyntheticLoad;

#[derive(Parser)]
#[command(name = "anthill", about = "Ant colony performance governor and log archive")]
struct Cli {
    /// Path to a TOML config; falls back to $ANTHILL_CONFIG, then configs/dev.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the debug-log archive over HTTP.
    Serve,
    /// Drive a synthetic colony through the governor and archive the result.
    Simulate {
        #[arg(long, default_value_t = 600)]
        ticks: u32,
        #[arg(long, default_value_t = 100)]
        ants: usize,
        #[arg(long, default_value_t = 5.0)]
        base_frame_ms: f64,
        #[arg(long, default_value_t = 1.5)]
        per_ant_ms: f64,
        #[arg(long, value_enum)]
        recovery_method: Option<MethodArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    ReduceAnts,
    SimplifyPhysics,
    SkipFrames,
}

impl From<MethodArg> for RecoveryMethod {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::ReduceAnts => RecoveryMethod::ReduceAnts,
            MethodArg::SimplifyPhysics => RecoveryMethod::SimplifyPhysics,
            MethodArg::SkipFrames => RecoveryMethod::SkipFrames,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config);
    init_tracing(&config.ops)?;

    match cli.command {
        Command::Serve => {
            ensure_log_dir(&config.archive.log_dir)?;
            anthill_network::serve(&config.server, LogArchive::new(&config.archive)).await?;
        }
        Command::Simulate {
            ticks,
            ants,
            base_frame_ms,
            per_ant_ms,
            recovery_method,
        } => {
            let load = SyntheticLoad {
                base_frame_ms,
                per_ant_ms,
            };
            simulate(&config, ticks, ants, load, recovery_method.map(Into::into)).await?;
        }
    }
    Ok(())
}

async fn simulate(
    config: &AnthillConfig,
    ticks: u32,
    ants: usize,
    load: SyntheticLoad,
    method: Option<RecoveryMethod>,
) -> Result<()> {
    let backing = Arc::new(FileKeyValueStore::new(&config.session.settings_dir));
    let (storage, writer) = DeferredKeyValueStore::spawn(backing);
    let mut settings = SettingsStore::open(config.session.settings_key.clone(), storage);
    if let Some(method) = method {
        settings.update(&SettingsPatch {
            recovery_method: Some(method),
            ..SettingsPatch::default()
        })?;
    }

    let mut session = Session::new(
        config.session.clone(),
        settings,
        TelemetryRecorder::new(config.telemetry.clone()),
        ColonyPopulation::with_counts(ants / 5, ants - ants / 5),
        Arc::new(LogArchive::new(&config.archive)),
    )?;

    let mut now = Utc::now().timestamp_millis();
    for _ in 0..ticks {
        let frame_ms = load.frame_ms(
            session.simulation().population(),
            session.settings().current(),
        );
        // A frame longer than the freeze threshold trips the watchdog first.
        let frame_end = now + frame_ms.ceil() as i64;
        session.watchdog(frame_end);
        session.tick(frame_ms, frame_end);
        now = frame_end;
    }

    info!(
        "Simulation finished: {} ants, {:.1} FPS, last action {:?}",
        session.simulation().population(),
        session.recorder().current_fps().unwrap_or(0.0),
        session.governor().last_action()
    );

    // Queued settings writes drain only once the session drops the store.
    let archived = session.save_snapshot().await;
    drop(session);
    writer.await?;

    let identifier = archived??;
    println!("{identifier}");
    Ok(())
}

fn load_config(from_args: Option<PathBuf>) -> AnthillConfig {
    let from_env = env::var("ANTHILL_CONFIG").ok().map(PathBuf::from);
    let path = from_args
        .or(from_env)
        .unwrap_or_else(|| PathBuf::from("configs/dev.toml"));
    match AnthillConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                AnthillConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            AnthillConfig::default()
        }
    }
}
