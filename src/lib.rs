//! Host-side capture/analysis pipeline: one binary, one long-lived service
//! per subcommand, sharing a common storage layout, config, and error type.

pub mod action;
pub mod archiver;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod incident;
pub mod kpi;
pub mod locking;
pub mod monitor;
pub mod objectstore;
pub mod registry;
pub mod sidecar;
pub mod storage;
pub mod transcript;
pub mod zapping;

use clap::Parser;
use cli::{Cli, Command, ConfigAction, RegistryAction};
use config::Config;
pub use error::{Error, Result};
use incident::{IncidentManager, NullAlertStore};
use kpi::{KpiExecutorDeps, NullKpiResultStore, NullVerificationExecutor};
use monitor::FrameMonitor;
use objectstore::{NullObjectStore, ObjectStore};
use registry::Registry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::{DeviceInfo, FileClass, StorageLayout, get_capture_base_directories, get_device_info_from_capture_folder};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use transcript::{NullDubber, NullTranscriber, NullTranscriptManifest, NullTranslator, NullVolumeProbe, TranscriptDeps};
use zapping::{NullBannerAi, NullZapResultStore, ZapContext, ZapInput, ZappingDeps};

/// Parses CLI arguments, wires up logging and signal handling, and
/// dispatches to the requested long-lived service.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = ctrlc::set_handler(|| {
        locking::cleanup_all_locks();
        std::process::exit(130);
    }) {
        warn!(error = %e, "failed to install ctrl-c handler");
    }

    let config = load_config(cli.config.as_deref())?;
    config::validate_config(&config)?;

    match cli.command {
        Command::Monitor => run_monitor(&config),
        Command::Archiver { once, json } => run_archiver(&config, once, json),
        Command::Kpi => run_kpi(&config),
        Command::Transcript => run_transcript(&config),
        Command::Zap { capture_folder, frame_filename, blackscreen_duration_ms } => {
            run_zap(&config, &capture_folder, &frame_filename, blackscreen_duration_ms)
        }
        Command::Registry { action } => run_registry(&config, action),
        Command::Config { action } => run_config(cli.config.as_deref(), action),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    path.map_or_else(config::load_default_config, config::load_config_file)
}

/// Installs a `tracing-subscriber` filter writing structured logs to
/// stderr. Honors `RUST_LOG` first, falling back to `-q`/`-v` counts.
fn init_logging(verbose: u8, quiet: bool) {
    let filter_str = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn host_name() -> String {
    hostname::get().map(|h| h.to_string_lossy().into_owned()).unwrap_or_else(|_| "unknown-host".to_string())
}

fn new_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| Error::Internal { message: format!("failed to create async runtime: {e}") })
}

fn new_object_store(config: &Config) -> Arc<dyn ObjectStore> {
    if config.object_store.is_configured() {
        warn!("object_store is configured but no backend is wired up; uploads will be skipped");
    }
    Arc::new(NullObjectStore)
}

/// One resolved device's identity plus the storage paths derived from it,
/// built once at service startup from `active_captures.conf`.
struct ResolvedDevice {
    info: DeviceInfo,
    device_root: PathBuf,
    metadata_dir: PathBuf,
}

fn resolve_devices(conf_path: &Path, fallback_root: Option<&Path>) -> Result<Vec<ResolvedDevice>> {
    let capture_dirs = get_capture_base_directories(conf_path, fallback_root)?;
    let mut resolved = Vec::new();
    for dir in &capture_dirs {
        let Some(folder_name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match get_device_info_from_capture_folder(folder_name) {
            Ok(info) => {
                let metadata_dir = StorageLayout::new(dir).resolve(FileClass::Metadata);
                resolved.push(ResolvedDevice { info, device_root: dir.clone(), metadata_dir });
            }
            Err(e) => warn!(capture_dir = %dir.display(), error = %e, "skipping unresolvable device"),
        }
    }
    Ok(resolved)
}

fn run_monitor(config: &Config) -> Result<()> {
    let host = host_name();
    let alert_store: Arc<dyn incident::AlertStore> = Arc::new(NullAlertStore);
    if config.database.is_configured() {
        warn!("database is configured but no alert-store backend is wired up; alerts will not persist");
    }
    let incident_manager = Arc::new(IncidentManager::new(alert_store, host.clone()));
    let resolved = incident_manager.resolve_all_on_startup()?;
    if resolved > 0 {
        info!(resolved, "resolved active incidents on cold boot");
    }

    let object_store = new_object_store(config);
    let monitor = Arc::new(FrameMonitor::new(incident_manager, object_store.clone(), config.tunables.clone()));

    let conf_path = PathBuf::from(constants::ACTIVE_CAPTURES_CONF);
    let resolved = resolve_devices(&conf_path, None)?;
    let mut by_device_id: HashMap<String, (DeviceInfo, PathBuf, PathBuf)> = HashMap::new();
    for device in resolved {
        by_device_id.insert(device.info.device_id.clone(), (device.info, device.device_root, device.metadata_dir));
    }
    let by_device_id = Arc::new(by_device_id);
    let default_team_id = config.registry.default_team_id;

    let runtime = new_runtime()?;
    runtime.block_on(monitor::run_forever(conf_path, None, monitor, move |device_id, trigger| {
        let Some((info, device_root, metadata_dir)) = by_device_id.get(&device_id) else {
            warn!(%device_id, "zap trigger for unresolved device, skipping");
            return;
        };
        let ctx = ZapContext {
            device_id: info.device_id.clone(),
            device_name: info.device_name.clone(),
            device_model: info.device_model.clone().unwrap_or_default(),
            host_name: host.clone(),
            device_root: device_root.clone(),
            metadata_dir: metadata_dir.clone(),
        };
        let input = ZapInput::from_monitor_trigger(&trigger);
        let deps = ZappingDeps {
            banner: Arc::new(NullBannerAi),
            object_store: object_store.clone(),
            store: Arc::new(NullZapResultStore),
            default_team_id,
        };
        match zapping::detect_and_record_zapping(&ctx, &input, &deps) {
            Ok(outcome) => info!(%device_id, zapping_detected = outcome.zapping_detected, "zap trigger processed"),
            Err(e) => warn!(%device_id, error = %e, "zap detection failed"),
        }
    }))
}

fn run_archiver(config: &Config, once: bool, json: bool) -> Result<()> {
    let conf_path = PathBuf::from(constants::ACTIVE_CAPTURES_CONF);
    if once {
        let report = archiver::run_cycle(&conf_path, None, &config.tunables);
        if json {
            println!("{}", serde_json::to_string_pretty(&report).map_err(|e| Error::Internal { message: e.to_string() })?);
        } else {
            for dir in &report.directories {
                println!(
                    "{}: archived={} manifests_updated={} folders_cleaned={} errors={}",
                    dir.capture_dir.display(),
                    dir.archived,
                    dir.manifests_updated,
                    dir.folders_cleaned,
                    dir.errors.len()
                );
                for error in &dir.errors {
                    println!("  error: {error}");
                }
            }
        }
        Ok(())
    } else {
        let runtime = new_runtime()?;
        runtime.block_on(archiver::run_forever(conf_path, None, config.tunables.clone()));
        Ok(())
    }
}

fn run_kpi(config: &Config) -> Result<()> {
    let deps = KpiExecutorDeps {
        verification: Arc::new(NullVerificationExecutor),
        object_store: new_object_store(config),
        result_store: Arc::new(NullKpiResultStore),
        working_root: PathBuf::from(constants::kpi::WORKING_ROOT),
    };

    let runtime = new_runtime()?;
    runtime.block_on(kpi::run_forever(PathBuf::from(constants::kpi::QUEUE_DIR), move |request| {
        match kpi::process_request(&request, &deps) {
            Ok(outcome) => info!(execution_result_id = %request.execution_result_id, ?outcome, "kpi request processed"),
            Err(e) => warn!(execution_result_id = %request.execution_result_id, error = %e, "kpi request failed"),
        }
    }))
}

fn run_transcript(config: &Config) -> Result<()> {
    let host = host_name();
    let alert_store: Arc<dyn incident::AlertStore> = Arc::new(NullAlertStore);
    let incident_manager = Arc::new(IncidentManager::new(alert_store, host));
    let object_store = new_object_store(config);
    let monitor = Arc::new(FrameMonitor::new(incident_manager, object_store, config.tunables.clone()));
    let probe: Arc<dyn transcript::VolumeProbe> = Arc::new(NullVolumeProbe);

    let conf_path = PathBuf::from(constants::ACTIVE_CAPTURES_CONF);
    let resolved = resolve_devices(&conf_path, None)?;
    let devices: Vec<DeviceInfo> = resolved.iter().map(|d| d.info.clone()).collect();

    let deps = TranscriptDeps {
        transcriber: Arc::new(NullTranscriber),
        translator: Arc::new(NullTranslator),
        dubber: Arc::new(NullDubber),
        manifest: Arc::new(NullTranscriptManifest),
        volume_probe: probe.clone(),
    };

    let runtime = new_runtime()?;
    runtime.block_on(async move {
        let mut tasks = Vec::new();

        for device in &resolved {
            let layout = StorageLayout::new(&device.device_root);
            let paths = transcript::TranscriptPaths {
                audio_temp_dir: layout.resolve(FileClass::Audio).join("temp"),
                audio_dir: layout.resolve(FileClass::Audio),
                metadata_dir: device.metadata_dir.clone(),
                capture_folder: device
                    .device_root
                    .file_name()
                    .map_or_else(|| device.info.device_id.clone(), |n| n.to_string_lossy().into_owned()),
                device_id: device.info.device_id.clone(),
            };
            let deps = deps.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = transcript::run_queue_forever(paths, deps).await {
                    warn!(error = %e, "transcript queue worker exited");
                }
            }));
        }

        let audio_monitor = Arc::clone(&monitor);
        let audio_probe = probe.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = transcript::run_audio_detector_forever(devices, audio_monitor, audio_probe).await {
                warn!(error = %e, "audio detector worker exited");
            }
        }));

        for task in tasks {
            let _ = task.await;
        }
    });
    Ok(())
}

fn run_zap(config: &Config, capture_folder: &str, frame_filename: &str, blackscreen_duration_ms: u64) -> Result<()> {
    let host = host_name();
    let info = get_device_info_from_capture_folder(capture_folder)?;
    let device_root = info.capture_path.clone();
    let layout = StorageLayout::new(&device_root);
    let captures_dir = layout.resolve(FileClass::Captures);
    let metadata_dir = layout.resolve(FileClass::Metadata);
    let after_frame = captures_dir.join(frame_filename);

    let ctx = ZapContext {
        device_id: info.device_id.clone(),
        device_name: info.device_name.clone(),
        device_model: info.device_model.clone().unwrap_or_default(),
        host_name: host,
        device_root,
        metadata_dir,
    };
    let input = ZapInput {
        after_frame,
        blackscreen_duration_ms,
        action_info: None,
        audio_silence_duration_ms: None,
        transition_images: zapping::TransitionImages::default(),
    };
    let deps = ZappingDeps {
        banner: Arc::new(NullBannerAi),
        object_store: new_object_store(config),
        store: Arc::new(NullZapResultStore),
        default_team_id: config.registry.default_team_id,
    };

    let outcome = zapping::detect_and_record_zapping(&ctx, &input, &deps)?;
    println!(
        "zapping_detected={} zap_id={}",
        outcome.zapping_detected,
        outcome.zap_id.as_deref().unwrap_or("-")
    );
    Ok(())
}

fn run_registry(config: &Config, action: RegistryAction) -> Result<()> {
    match action {
        RegistryAction::Serve { bind_addr } => {
            let bind_addr = bind_addr.unwrap_or_else(|| config.registry.bind_addr.clone());
            let registry = Arc::new(Registry::new());
            let runtime = new_runtime()?;
            runtime.block_on(registry::server::serve(registry, &bind_addr))
        }
        RegistryAction::ListHosts => {
            let bind_addr = config.registry.bind_addr.clone();
            let runtime = new_runtime()?;
            runtime.block_on(async move {
                let url = format!("http://{bind_addr}/server/system/getAllHosts");
                let client = reqwest::Client::new();
                let response = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| Error::Internal { message: format!("registry request failed: {e}") })?;
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| Error::Internal { message: format!("invalid registry response: {e}") })?;
                println!("{}", serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string()));
                Ok(())
            })
        }
    }
}

fn run_config(config_path: Option<&Path>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => {
            config::save_default_config(&Config::default())?;
            let path = config::config_file_path()?;
            println!("wrote default configuration to {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let toml = toml::to_string_pretty(&config).map_err(|source| Error::ConfigSerialize { source })?;
            println!("{toml}");
            Ok(())
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path.to_path_buf(),
                None => config::config_file_path()?,
            };
            println!("{}", path.display());
            Ok(())
        }
    }
}
