use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use log::info;
use tokio::sync::mpsc;

mod config;
mod eligibility;
mod manager;
mod messages;
mod mqtt;
mod registry;
mod scheduler;
mod snapshot;
mod state_store;
mod tracker;

use eligibility::Eligibility;

/// Keep refreshing zwave dimmers until their lights report a settled state
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log refreshes instead of publishing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Info)
            .init();
    } else {
        pretty_env_logger::init();
    }

    let cli = Cli::parse();

    let config_contents = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;
    let config: config::AppConfig = toml::de::from_str(&config_contents)
        .with_context(|| format!("parsing {}", cli.config.display()))?;

    let settings = config.tracking_settings();
    let eligibility = if settings.filter_devices {
        Eligibility::allowlist(config.device_types())
    } else {
        Eligibility::Any
    };

    let (mqtt_client, mut eventloop) = mqtt::MqttClient::new(&config.mqtt, &settings.refresh_service);
    mqtt_client.subscribe().await?;

    let (tx, rx) = mpsc::unbounded_channel();

    let listener = mqtt_client.clone();
    let events_tx = tx.clone();
    tokio::task::spawn(async move {
        listener.event_loop(&mut eventloop, events_tx).await;
    });

    if cli.dry_run {
        info!("Dry run, refreshes will only be logged");
        manager::Manager::new(&settings, eligibility, manager::DryRun, tx)
            .run_loop(rx)
            .await?;
    } else {
        manager::Manager::new(&settings, eligibility, mqtt_client.clone(), tx)
            .run_loop(rx)
            .await?;
    }

    mqtt_client.disconnect().await?;

    Ok(())
}
