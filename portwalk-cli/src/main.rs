//! portwalk - list, find and monitor serial ports

mod output;
mod settings;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use portwalk_core::{PortDetails, PortError};
use portwalk_detect::scanner::list_ports_with;
use portwalk_detect::{find_port, poll_for_port, DiscoveryConfig};
use portwalk_session::Session;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings::Settings;

#[derive(Parser)]
#[command(name = "portwalk", version, about = "Serial port discovery and monitoring")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports with their USB identity
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Only show USB-backed ports
        #[arg(long)]
        usb_only: bool,
    },
    /// Print the name of the first port with the given VID/PID
    Find {
        /// USB vendor ID, four hex digits (e.g. 0403)
        #[arg(long, value_parser = parse_usb_id)]
        vid: String,
        /// USB product ID, four hex digits (e.g. 6001)
        #[arg(long, value_parser = parse_usb_id)]
        pid: String,
        /// Keep looking for up to this many seconds
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
    },
    /// Print everything received on a port until Ctrl-C
    Monitor {
        /// Port name (e.g. /dev/ttyUSB0, COM3)
        port: String,
        /// Baud rate, overriding the settings file
        #[arg(long)]
        baud: Option<u32>,
        /// Show received bytes as a hex dump
        #[arg(long)]
        hex: bool,
    },
}

/// Accept exactly four hex digits
fn parse_usb_id(s: &str) -> Result<String, String> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    if s.len() == 4 && s.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(s.to_ascii_uppercase())
    } else {
        Err(format!("expected four hex digits, got '{s}'"))
    }
}

fn discovery_config(settings: &Settings) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::platform();
    config
        .skip_patterns
        .extend(settings.skip_patterns.iter().cloned());
    config
}

fn scan(config: &DiscoveryConfig) -> Result<Vec<PortDetails>> {
    list_ports_with(config).context("failed to enumerate serial ports")
}

fn list(settings: &Settings, json: bool, usb_only: bool) -> Result<()> {
    let mut ports = scan(&discovery_config(settings))?;
    if usb_only {
        ports.retain(PortDetails::is_usb);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
    } else if ports.is_empty() {
        eprintln!("No serial ports found");
    } else {
        for port in &ports {
            println!("{}", output::format_port(port));
        }
    }
    Ok(())
}

async fn find(settings: &Settings, vid: &str, pid: &str, wait: Option<u64>) -> Result<()> {
    let config = discovery_config(settings);
    let name = match wait {
        None => find_port(&scan(&config)?, vid, pid).map(|p| p.name.clone()),
        Some(secs) => poll_for_port(
            || list_ports_with(&config),
            vid,
            pid,
            Duration::from_secs(secs),
            Duration::from_millis(settings.poll_interval_ms),
        )
        .await
        .context("failed to enumerate serial ports")?,
    };

    match name {
        Some(name) => {
            println!("{name}");
            Ok(())
        }
        None => bail!("no port with VID {vid} PID {pid}"),
    }
}

async fn monitor(settings: &Settings, port: &str, baud: Option<u32>, hex: bool) -> Result<()> {
    let mut mode = settings.mode;
    if let Some(baud) = baud {
        mode.baud_rate = baud;
    }
    let hex = hex || settings.show_hex;

    let session = Arc::new(
        Session::open(port, mode)
            .await
            .with_context(|| format!("failed to open {port}"))?,
    );
    tracing::info!(port, %mode, "Monitoring (Ctrl-C to stop)");

    let closer = {
        let session = session.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = session.close().await;
            }
        })
    };

    let mut buf = [0u8; 1024];
    let mut stdout = std::io::stdout();
    loop {
        match session.read(&mut buf).await {
            Ok(n) => {
                if hex {
                    stdout.write_all(output::format_hex(&buf[..n]).as_bytes())?;
                } else {
                    stdout.write_all(&buf[..n])?;
                }
                stdout.flush()?;
            }
            Err(PortError::PortClosed) => break,
            Err(e) => return Err(e).context("read failed"),
        }
    }

    closer.abort();
    session.close().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "portwalk=info,portwalk_detect=info,portwalk_session=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load();

    match cli.command {
        Command::List { json, usb_only } => list(&settings, json, usb_only),
        Command::Find { vid, pid, wait } => find(&settings, &vid, &pid, wait).await,
        Command::Monitor { port, baud, hex } => monitor(&settings, &port, baud, hex).await,
    }
}
