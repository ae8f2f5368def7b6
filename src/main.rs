//! Thermo bridge binary.
//!
//! Connects to the temperature controller, keeps the latest status reading,
//! and serves browser subscribers over WebSocket.
//!
//! ```bash
//! thermo-bridge --device 192.168.1.40:46879 --port 8081
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use thermo_core::{StatusMailbox, SystemClock};
use thermo_device::{DeviceConfig, DeviceLink};
use thermo_server::{ServerConfig, StdoutSink};
use thermo_settings::BridgeSettings;
use thermo_telemetry::TelemetryConfig;
use tokio_util::sync::CancellationToken;

/// Temperature controller to WebSocket bridge
#[derive(Parser, Debug)]
#[command(name = "thermo-bridge")]
#[command(version)]
struct Args {
    /// Settings file (defaults to ~/.thermo-bridge/settings.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Controller address as host:port
    #[arg(short, long)]
    device: Option<String>,

    /// HTTP/WebSocket port
    #[arg(short, long)]
    port: Option<u16>,
}

impl Args {
    fn apply(&self, settings: &mut BridgeSettings) -> anyhow::Result<()> {
        if let Some(level) = &self.log_level {
            settings.logging.level = level.clone();
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Some(device) = &self.device {
            let Some((host, port)) = device.rsplit_once(':') else {
                bail!("--device must be host:port, got {device:?}");
            };
            settings.device.host = host.to_string();
            settings.device.port = port
                .parse()
                .with_context(|| format!("invalid controller port {port:?}"))?;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => thermo_settings::load_settings_from_path(path),
        None => thermo_settings::load_settings(),
    }
    .context("failed to load settings")?;
    args.apply(&mut settings)?;

    let telemetry =
        TelemetryConfig::with_level_name(&settings.logging.level, settings.logging.json)
            .with_module_levels(&settings.logging.module_levels);
    thermo_telemetry::init_telemetry(&telemetry);

    tracing::info!(
        device = %settings.device.addr(),
        setpoint = settings.device.setpoint,
        "starting thermo bridge"
    );

    let cancel = CancellationToken::new();
    let mailbox = Arc::new(StatusMailbox::new());

    let link = Arc::new(DeviceLink::new(
        DeviceConfig::from(&settings.device),
        Arc::clone(&mailbox),
    ));
    let link_state = link.subscribe_state();
    let link_task = tokio::spawn({
        let link = Arc::clone(&link);
        let cancel = cancel.clone();
        async move { link.run(cancel).await }
    });

    let handle = thermo_server::start(
        ServerConfig::from(&settings.server),
        mailbox,
        link_state,
        Arc::new(StdoutSink),
        Arc::new(SystemClock),
    )
    .await
    .context("failed to start server")?;

    tracing::info!(port = handle.port, "thermo bridge ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    cancel.cancel();
    handle.shutdown();
    let _ = link_task.await;

    Ok(())
}
