//! Machine Health Core - Main Entry Point
//!
//! Sensor ingestion, failure scoring and change detection for one machine.

mod logic;
pub mod constants;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use logic::config::{Overrides, PipelineConfig};
use logic::error::{PipelineError, PipelineResult};
use logic::monitor::{run_monitor, ChangeDetectionMonitor};
use logic::pipeline::shutdown::shutdown_runtime;
use logic::pipeline::{select_source, Pipeline, ShutdownCoordinator};
use logic::scoring::{AnomalyScorer, OnnxClassifier};
use logic::sink::CsvSink;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion pipeline (and the change monitor unless disabled)
    Run {
        /// Use the synthetic generator instead of the device
        #[arg(long)]
        mock: bool,

        /// Device endpoint: a tty/FIFO path or tcp://host:port
        #[arg(long)]
        port: Option<String>,

        /// Directory for record, alert and snapshot files
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Run only the change-detection monitor
    Monitor {
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Print statistics for the last N days of a machine's records
    Report {
        /// Machine id (defaults to MACHINE_ID / host name)
        #[arg(long)]
        machine: Option<String>,

        #[arg(long, default_value_t = logic::report::DEFAULT_REPORT_DAYS)]
        days: i64,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run {
        mock: false,
        port: None,
        data_dir: None,
    });

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start the async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(execute(command));
    shutdown_runtime(runtime, constants::get_shutdown_grace());

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn execute(command: Command) -> PipelineResult<()> {
    match command {
        Command::Run {
            mock,
            port,
            data_dir,
        } => run_pipeline(Overrides { mock, port, data_dir }).await,
        Command::Monitor { data_dir } => {
            run_monitor_only(Overrides {
                data_dir,
                ..Default::default()
            })
            .await
        }
        Command::Report {
            machine,
            days,
            data_dir,
        } => print_report(machine, days, data_dir),
    }
}

/// The data directory must exist (or be creatable) and accept writes.
fn ensure_writable(dir: &Path) -> PipelineResult<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| PipelineError::fatal(format!("cannot create data directory {}: {}", dir.display(), e)))?;

    let probe = dir.join(format!(".write-probe-{}", std::process::id()));
    std::fs::write(&probe, b"ok")
        .and_then(|_| std::fs::remove_file(&probe))
        .map_err(|e| PipelineError::fatal(format!("data directory {} is not writable: {}", dir.display(), e)))
}

fn build_scorer(config: &PipelineConfig) -> PipelineResult<AnomalyScorer> {
    match &config.classifier_model {
        Some(path) => {
            let classifier = OnnxClassifier::load(path)
                .map_err(|e| PipelineError::fatal(format!("classifier unavailable: {}", e)))?;
            Ok(AnomalyScorer::with_classifier(Arc::new(classifier), config.machine_type))
        }
        None => {
            log::info!("No classifier configured, scoring with rules only");
            Ok(AnomalyScorer::rules_only())
        }
    }
}

/// Build the monitor on the blocking pool (it may hash and copy the target).
async fn build_monitor(config: logic::config::MonitorConfig) -> PipelineResult<ChangeDetectionMonitor> {
    tokio::task::spawn_blocking(move || ChangeDetectionMonitor::from_config(config))
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
        .map_err(PipelineError::from)
}

async fn run_pipeline(overrides: Overrides) -> PipelineResult<()> {
    log::info!("Starting {} v{}...", constants::APP_NAME, constants::APP_VERSION);

    let config = PipelineConfig::from_env(&overrides)?;
    ensure_writable(&config.data_dir)?;
    let scorer = build_scorer(&config)?;
    let sink = CsvSink::new(&config.data_dir)
        .map_err(|e| PipelineError::fatal(format!("sink unavailable: {}", e)))?;

    log::info!("Machine: {} (type {:?})", config.machine_id, config.machine_type);
    log::info!("Data directory: {}", config.data_dir.display());

    let coordinator = ShutdownCoordinator::new();
    let listener = coordinator.clone();
    tokio::spawn(async move { listener.listen_for_termination().await });

    let source = select_source(&config).await;

    let monitor = if config.monitor_enabled {
        match build_monitor(config.monitor.clone()).await {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                log::error!("Change monitor disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let summary = Pipeline::new(config, coordinator)
        .run(source, scorer, Box::new(sink), monitor)
        .await;

    if summary.reader.is_none() || summary.consumer.is_none() {
        log::warn!("Some tasks did not finish cleanly within the grace period");
    }
    log::info!("Shutdown complete");
    Ok(())
}

async fn run_monitor_only(overrides: Overrides) -> PipelineResult<()> {
    let config = PipelineConfig::from_env(&overrides)?;
    config.monitor.validate()?;

    let monitor = build_monitor(config.monitor).await?;

    let coordinator = ShutdownCoordinator::new();
    let listener = coordinator.clone();
    tokio::spawn(async move { listener.listen_for_termination().await });

    run_monitor(monitor, coordinator.signal()).await;
    coordinator.mark_stopped();
    Ok(())
}

fn print_report(machine: Option<String>, days: i64, data_dir: Option<PathBuf>) -> PipelineResult<()> {
    let data_dir = data_dir
        .or_else(|| constants::env_opt("DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(constants::default_data_dir);
    let machine = machine.unwrap_or_else(constants::get_machine_id);

    let report = logic::report::machine_report(&data_dir, &machine, days, chrono::Utc::now())?;
    let json = serde_json::to_string_pretty(&report).map_err(logic::error::MonitorError::from)?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_under_a_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, "plain file").unwrap();

        let err = ensure_writable(&blocker.join("data")).unwrap_err();
        assert!(matches!(err, PipelineError::FatalConfig(_)));
    }

    #[test]
    fn test_writable_data_dir_is_created_and_left_clean() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested").join("data");

        ensure_writable(&data_dir).unwrap();
        assert!(data_dir.is_dir());
        assert_eq!(std::fs::read_dir(&data_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_classifier_model_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::with_defaults(dir.path().to_path_buf(), "m1".to_string());
        config.classifier_model = Some(dir.path().join("absent.onnx"));

        let err = build_scorer(&config).err().expect("missing model must be rejected");
        assert!(matches!(err, PipelineError::FatalConfig(_)));
    }

    #[test]
    fn test_no_classifier_scores_with_rules() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::with_defaults(dir.path().to_path_buf(), "m1".to_string());
        assert!(!build_scorer(&config).unwrap().has_classifier());
    }
}
