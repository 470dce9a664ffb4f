use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use dashd::config::{Settings, SettingsOverrides};
use dashd::net::{MulticastSender, Receiver};
use dashd::signals::{self, TerminationSignals};
use dashd::watch::{NotifyWatchRegistry, EVENT_CHANNEL_CAPACITY};
use dashd::{logging, queue};
use dashd_core::{spawn_housekeeping, Pipeline, PipelineConfig};
use dashd_types::{Domain, MessageType};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::{mpsc, watch};

/// dash-d collector - republishes local sensor state files on a multicast group
#[derive(Parser, Debug, Clone)]
#[command(name = "dashd-collector")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory sensors write their *.json state files into
    #[arg(short = 'q', long = "queue-directory", value_name = "DIRECTORY")]
    queue_directory: Option<PathBuf>,

    /// Write the log to dash-d.log in this directory instead of the console
    #[arg(short = 'l', long = "log-directory", value_name = "DIRECTORY")]
    log_directory: Option<PathBuf>,

    /// Multicast port
    #[arg(short = 'P', long = "port", value_name = "PORT")]
    port: Option<u16>,

    /// IPv4 address of the multicast group
    #[arg(long = "ipv4", value_name = "ADDRESS")]
    ipv4: Option<String>,

    /// IPv6 address of the multicast group
    #[arg(long = "ipv6", value_name = "ADDRESS")]
    ipv6: Option<String>,

    /// Remove leftover sensor files from the queue directory at startup
    #[arg(long = "clean-on-startup")]
    clean_on_startup: bool,

    /// Report sensors that stop updating as offline
    #[arg(long = "detect-offline")]
    detect_offline: bool,

    /// Silence, in multiples of a sensor's average update interval, before it is reported offline
    #[arg(long = "offline-multiplier", value_name = "N")]
    offline_multiplier: Option<u32>,

    /// Settings file to use instead of the per-user default
    #[arg(short = 's', long = "settings", value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Save the given options as the new defaults and exit
    #[arg(long = "update-settings")]
    update_settings: bool,

    /// Print events received on the multicast group instead of collecting
    #[arg(long = "listen")]
    listen: bool,

    /// Debug verbosity level (0=quiet, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0")]
    debug: u8,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            queue_directory: self.queue_directory.clone(),
            log_directory: self.log_directory.clone(),
            port: self.port,
            ipv4_group: self.ipv4.clone(),
            ipv6_group: self.ipv6.clone(),
            clean_on_startup: self.clean_on_startup,
            offline_detection: self.detect_offline,
            offline_multiplier: self.offline_multiplier,
        }
    }
}

fn main() -> ExitCode {
    // Files stamped at or before this instant belong to a previous run
    let start_time = Utc::now();
    let cli = Cli::parse();

    let settings_path = match cli.settings.clone().map(Ok).unwrap_or_else(Settings::settings_path) {
        Ok(path) => path,
        Err(e) => return fail_early(cli.debug, e),
    };
    let mut settings = match Settings::load_or_init(&settings_path) {
        Ok(settings) => settings,
        Err(e) => return fail_early(cli.debug, e.context(format!("Could not load settings \"{}\"", settings_path.display()))),
    };
    settings.apply(cli.overrides());

    if let Err(e) = logging::init(cli.debug, settings.log_directory.as_deref()) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    warn!("Starting dash-d collector v{}", env!("CARGO_PKG_VERSION"));

    if cli.update_settings {
        return match settings.save_to_path(&settings_path) {
            Ok(()) => {
                info!("Settings saved to \"{}\"", settings_path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Could not save settings \"{}\": {:#}", settings_path.display(), e);
                ExitCode::FAILURE
            }
        };
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = if cli.listen {
        runtime.block_on(listen(settings))
    } else {
        runtime.block_on(collect(settings, start_time))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Report an error that happened before logging was configured
fn fail_early(debug: u8, e: anyhow::Error) -> ExitCode {
    if logging::init(debug, None).is_ok() {
        error!("{:#}", e);
    } else {
        eprintln!("{:#}", e);
    }
    ExitCode::FAILURE
}

/// Host name published as the domain name
fn domain_name() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("Could not determine host name: {}", e);
            "localhost".to_string()
        }
    }
}

/// Watch the queue directory and publish until a termination signal arrives
async fn collect(settings: Settings, start_time: chrono::DateTime<Utc>) -> Result<()> {
    let group = settings.validate()?;
    let queue_directory = queue::prepare(&settings.queue_directory)?;
    info!("Watching queue location \"{}\".", queue_directory.display());

    if settings.clean_on_startup {
        let removed = queue::clean(&queue_directory)
            .with_context(|| format!("Could not clean queue directory \"{}\"", queue_directory.display()))?;
        info!("Removed {} leftover sensor file(s)", removed.len());
    }

    let domain = Domain::new(settings.domain_id, domain_name());
    info!("Publishing as domain \"{}\" ({})", domain.name, domain.id);

    let sender = MulticastSender::new(group, settings.port, domain)?;
    info!("Sending sensor data to {} ({}).", sender.target(), group.family());

    let termination = TerminationSignals::register()?;

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let registry = NotifyWatchRegistry::new(&queue_directory, events_tx.clone())?;

    let mut config = PipelineConfig::new(&queue_directory);
    config.start_time = start_time;
    config.offline_detection = settings.offline_detection_enabled;
    config.offline_multiplier = settings.offline_multiplier;
    if config.offline_detection {
        info!(
            "Offline detection enabled (multiplier {}, checked every {:?})",
            config.offline_multiplier,
            settings.housekeeping_interval()
        );
    }

    let mut pipeline = Pipeline::new(config, sender, registry);
    pipeline.reconcile();

    let housekeeping = spawn_housekeeping(events_tx, settings.housekeeping_interval());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener = signals::spawn_listener(termination, shutdown_tx);

    pipeline.run(events_rx, shutdown_rx).await;

    housekeeping.abort();
    listener.abort();
    Ok(())
}

/// Log every event seen on the multicast group
async fn listen(settings: Settings) -> Result<()> {
    let group = settings.multicast_group()?;
    let mut termination = TerminationSignals::register()?;
    let mut receiver = Receiver::bind(group, settings.port).await?;
    println!("Listening on {}:{}", receiver.group(), settings.port);

    loop {
        tokio::select! {
            name = termination.recv() => {
                info!("Received {}, shutting down", name);
                return Ok(());
            }
            received = receiver.recv() => {
                let (event, from) = received?;
                let sensor = event.sensor_name.as_deref().unwrap_or("-");
                match event.kind {
                    MessageType::Sensor => println!(
                        "[{} {} via {}] {} is {}: {}",
                        event.domain.name,
                        event.domain.id,
                        from,
                        sensor,
                        event.sensor_state.unwrap_or_default(),
                        event.sensor_message.as_deref().unwrap_or("")
                    ),
                    kind => println!("[{} {} via {}] {} {}", event.domain.name, event.domain.id, from, kind, sensor),
                }
            }
        }
    }
}
