mod cli;
mod error;
mod mqtt;

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use stbridge_api::CredentialStore;
use stbridge_config::{Config, FileCredentialStore};
use stbridge_core::{Bridge, DriverRegistry, INBOUND_CHANNEL_SIZE, Probe};

use crate::cli::{CheckConfigArgs, Cli, Command, GlobalOpts, LogFormat};
use crate::error::BridgeError;
use crate::mqtt::{MqttTransport, mqtt_options};

const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Must outlive every log call so the file writer flushes.
    let _guard = init_tracing(&cli.global);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(global: &GlobalOpts) -> Option<WorkerGuard> {
    let level = match global.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (writer, guard) = match &global.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file = path
                .file_name()
                .map_or_else(|| OsString::from("stbridge.log"), OsStr::to_os_string);
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match global.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(global.log_file.is_none())
                    .with_writer(writer),
            )
            .init(),
    }
    guard
}

async fn run(cli: Cli) -> Result<(), BridgeError> {
    let config_file = cli
        .global
        .config
        .clone()
        .unwrap_or_else(stbridge_config::config_path);
    let config = stbridge_config::load_config_from(&config_file)?;

    match cli.command.unwrap_or_default() {
        Command::Run => run_bridge(&config, &config_file).await,
        Command::CheckConfig(args) => check_config(&config, &config_file, &args).await,
    }
}

fn credential_store(config: &Config, config_file: &Path) -> Arc<dyn CredentialStore> {
    Arc::new(FileCredentialStore::new(
        config.token_file(config_file),
        config.seed_credentials(),
    ))
}

// ── run ─────────────────────────────────────────────────────────────

async fn run_bridge(config: &Config, config_file: &Path) -> Result<(), BridgeError> {
    let bridge_config = config.to_bridge_config(env!("CARGO_PKG_VERSION"))?;

    let cancel = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
    let (mqtt, mut event_loop) =
        MqttTransport::start(mqtt_options(config), inbound_tx, cancel.clone());

    let bridge = Bridge::connect(
        bridge_config,
        credential_store(config, config_file),
        mqtt.clone(),
    )?;
    bridge.start(inbound_rx).await;
    info!(
        config = %config_file.display(),
        devices = config.devices.len(),
        version = env!("CARGO_PKG_VERSION"),
        "stbridge running"
    );

    shutdown_signal().await?;
    info!("shutting down");

    bridge.shutdown().await;
    mqtt.disconnect().await;
    if tokio::time::timeout(DISCONNECT_GRACE, &mut event_loop)
        .await
        .is_err()
    {
        warn!("broker did not acknowledge disconnect in time");
        cancel.cancel();
        let _ = event_loop.await;
    }
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

// ── check-config ────────────────────────────────────────────────────

async fn check_config(
    config: &Config,
    config_file: &Path,
    args: &CheckConfigArgs,
) -> Result<(), BridgeError> {
    let bridge_config = config.to_bridge_config(env!("CARGO_PKG_VERSION"))?;
    let token_file = config.token_file(config_file);

    println!("config:  {}", config_file.display());
    println!("broker:  {}:{}", config.mqtt.host, config.mqtt.port);
    println!("topics:  {}/...", bridge_config.topics().device_root("<device>"));
    println!(
        "tokens:  {}{}",
        token_file.display(),
        if token_file.is_file() {
            ""
        } else {
            " (not created yet)"
        }
    );
    println!("devices: {}", bridge_config.devices.len());
    println!("drivers: {}", DriverRegistry::builtin().names().collect::<Vec<_>>().join(", "));

    if args.print {
        let rendered = stbridge_config::to_toml(&config.redacted())?;
        println!("\n{rendered}");
    }
    if !args.probe {
        return Ok(());
    }

    let client =
        stbridge_core::build_client(&bridge_config.api, credential_store(config, config_file))?;
    if !client.tokens().credentials().can_refresh() {
        println!("\nwarning: no refresh credentials, the access token cannot be renewed");
    }
    let registry = DriverRegistry::builtin();
    let total = bridge_config.devices.len();
    let mut failed = 0;
    for device in &bridge_config.devices {
        match stbridge_core::probe(&client, &registry, &device.device_id).await {
            Ok(probe) => {
                if !print_probe(&probe) {
                    failed += 1;
                }
            }
            Err(e) => {
                println!("\n{}: {e}", device.device_id);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(BridgeError::ProbeFailed { failed, total });
    }
    Ok(())
}

/// Print one probe result; `false` when the device cannot be bridged.
fn print_probe(probe: &Probe) -> bool {
    let id = &probe.device_id;
    match (probe.driver, &probe.fields) {
        (None, _) => {
            println!("\n{id}: no driver recognizes this device");
            false
        }
        (Some(driver), Some(Err(e))) => {
            println!("\n{id}: {driver}, status not translatable: {e}");
            false
        }
        (Some(driver), fields) => {
            println!("\n{id}: {driver}");
            if let Some(Ok(fields)) = fields {
                for (topic, value) in fields.entries() {
                    let name: &str = topic.as_ref();
                    println!("  {name:<20} {value}");
                }
            }
            true
        }
    }
}
