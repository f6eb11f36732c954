use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tabled::{Table, Tabled};

use nest::config;
use nest::{Credentials, NormalizedStatus, SessionManager};

#[derive(Parser)]
#[command(name = "nest")]
#[command(about = "A CLI for polling Nest thermostats")]
#[command(version)]
struct Cli {
    /// Username for the Nest account
    #[arg(long, env = "NEST_USERNAME")]
    username: Option<String>,

    /// Password for the Nest account (optional, will prompt if not provided)
    #[arg(long, env = "NEST_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Path to a configuration file (defaults to ~/.nest.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the status of every structure once
    Status,
    /// Keep polling and printing the status on a fixed interval
    Watch {
        /// Seconds between polls (overrides poll_interval_secs from the config file)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Table,
    Json,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Structure")]
    structure: String,
    #[tabled(rename = "Away")]
    away: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Temp")]
    temperature: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Humidity")]
    humidity: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };
    debug!("Using configuration: {:?}", config);

    let username = cli.username.ok_or_else(|| {
        anyhow::anyhow!(
            "Username is required. Provide via --username or NEST_USERNAME environment variable."
        )
    })?;

    let password = match cli.password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };

    let mut manager = SessionManager::from_config(Credentials::new(username, password), &config)?;
    login(&mut manager).await?;

    match cli.command {
        Commands::Status => {
            let normalized = manager.poll().await?;
            print_status(&normalized, cli.format)?;
        }
        Commands::Watch { interval } => {
            let interval = match interval {
                Some(0) => return Err(anyhow::anyhow!("--interval must be greater than zero")),
                Some(secs) => Duration::from_secs(secs),
                None => config.poll_interval(),
            };
            watch(&manager, interval, cli.format).await?;
        }
    }

    Ok(())
}

async fn login(manager: &mut SessionManager) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Logging in...");

    info!("Authenticating with {}...", manager.base_url());
    match manager.login().await {
        Ok(handle) => {
            spinner.finish_and_clear();
            debug!("Logged in as user {}", handle.user_id);
            Ok(())
        }
        Err(e) => {
            spinner.finish_and_clear();
            Err(e.into())
        }
    }
}

/// Poll until interrupted. A failed fetch skips the cycle; any other error ends the loop.
async fn watch(manager: &SessionManager, interval: Duration, format: OutputFormat) -> Result<()> {
    info!("Polling every {}s", interval.as_secs());

    loop {
        match manager.poll().await {
            Ok(normalized) => print_status(&normalized, format)?,
            Err(e) if e.is_recoverable() => {
                warn!("Skipping this poll: {}", e);
                eprintln!("Failed to fetch status, retrying in {}s: {}", interval.as_secs(), e);
            }
            Err(e) => return Err(e.into()),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted, stopping");
                return Ok(());
            }
        }
    }
}

fn print_status(normalized: &NormalizedStatus, format: OutputFormat) -> Result<()> {
    let status = &normalized.status;

    match format {
        OutputFormat::Text => print!("{}", status),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(status)?),
        OutputFormat::Table => {
            if status.device_count() == 0 {
                println!("No devices found for this account.");
            } else {
                let rows: Vec<DeviceRow> = status
                    .structures()
                    .iter()
                    .flat_map(|structure| {
                        structure.devices.iter().map(move |device| DeviceRow {
                            structure: structure.name.clone(),
                            away: if structure.away { "Yes" } else { "No" }.to_string(),
                            device: device.name.clone(),
                            time: device
                                .local_time()
                                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                                .unwrap_or_else(|| "Unknown".to_string()),
                            temperature: format!("{:.1}", device.current_temperature),
                            target: format!(
                                "{:.1} ({})",
                                device.target_temperature, device.target_temperature_type
                            ),
                            humidity: format!("{:.1}", device.current_humidity),
                        })
                    })
                    .collect();
                println!("{}", Table::new(&rows));
            }
        }
    }

    for fault in &normalized.faults {
        eprintln!("warning: skipped {}", fault);
    }

    Ok(())
}
