//! zonesync - keep DNS records and access policies pointed at the current public IP.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;
use zonesync::config::Config;
use zonesync::detector::{IpDetector, IpResolver};
use zonesync::monitor::Monitor;
use zonesync::notify::Notifier;
use zonesync::provider::{CloudflareClient, ProviderApi, RecordType};
use zonesync::reconciler::Reconciler;

#[derive(Parser)]
#[command(name = "zonesync")]
#[command(about = "Dynamic DNS and access-policy reconciler for Cloudflare zones")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current public IPs and configured record state
    Status,

    /// Run a single reconciliation pass
    Update,

    /// Run reconciliation passes on an interval until stopped
    Monitor {
        /// Interval between passes in minutes (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Validate configuration and API credentials
    Validate,
}

fn get_config_path(cli_path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_path {
        return path;
    }

    // Default locations
    let candidates = [
        dirs::config_dir().map(|p| p.join("zonesync/config.toml")),
        Some(PathBuf::from("/etc/zonesync/config.toml")),
        Some(PathBuf::from("config.toml")),
    ];

    for candidate in candidates.into_iter().flatten() {
        if candidate.exists() {
            return candidate;
        }
    }

    // Return default even if it doesn't exist
    dirs::config_dir()
        .map(|p| p.join("zonesync/config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

fn build_reconciler(config: &Config) -> Reconciler {
    Reconciler::new(
        Box::new(IpDetector::from_config(config)),
        Box::new(CloudflareClient::new(config.resolved_api_token())),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = get_config_path(cli.config);
    let config = Config::load_from(&config_path)?;

    match cli.command {
        Commands::Status => cmd_status(config).await?,
        Commands::Update => cmd_update(config).await?,
        Commands::Monitor { interval } => cmd_monitor(config, interval).await?,
        Commands::Validate => cmd_validate(config).await?,
    }

    Ok(())
}

async fn cmd_status(config: Config) -> anyhow::Result<()> {
    let detector = IpDetector::from_config(&config);
    let client = CloudflareClient::new(config.resolved_api_token());

    println!("zonesync Status");
    println!("===============\n");

    let ips = detector.resolve_public_ips().await;
    match ips.ipv4 {
        Some(ip) => println!("Public IPv4: {}", ip),
        None => println!("Public IPv4: (unresolved)"),
    }
    match ips.ipv6 {
        Some(ip) => println!("Public IPv6: {}", ip),
        None => println!("Public IPv6: (unresolved)"),
    }

    println!("\nZones:");
    println!("------");

    for zone in &config.zones {
        println!("  {} ({} managed records)", zone.zone_name, zone.record_ids.len());

        let (a_records, aaaa_records) = tokio::join!(
            client.list_records(&zone.zone_id, RecordType::A),
            client.list_records(&zone.zone_id, RecordType::AAAA),
        );

        match (a_records, aaaa_records) {
            (Ok(mut records), Ok(aaaa)) => {
                records.extend(aaaa);
                for record in records
                    .iter()
                    .filter(|r| zone.record_ids.contains(&r.id))
                {
                    println!("    {} {}: {}", record.record_type, record.name, record.content);
                }
            }
            (Err(e), _) | (_, Err(e)) => println!("    error: {}", e),
        }
    }

    Ok(())
}

async fn cmd_update(config: Config) -> anyhow::Result<()> {
    let monitor = build_monitor(&config, config.update_interval());
    let summary = monitor.run_once(&config).await;

    if summary.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

async fn cmd_monitor(config: Config, interval_mins: Option<u64>) -> anyhow::Result<()> {
    let interval = interval_mins
        .map(|mins| Duration::from_secs(mins * 60))
        .unwrap_or_else(|| config.update_interval());

    let monitor = build_monitor(&config, interval);

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = lines.next_line() => {}
        }
        let _ = tx.send(true);
    });

    println!("Press Enter or Ctrl-C to stop.");
    monitor.run(&config, rx).await;
    println!("Stopped.");

    Ok(())
}

fn build_monitor(config: &Config, interval: Duration) -> Monitor {
    let mut monitor = Monitor::new(build_reconciler(config), interval);
    if !config.notify_endpoints.is_empty() {
        monitor = monitor.with_notifier(Notifier::new(config.notify_endpoints.clone()));
    }
    monitor
}

async fn cmd_validate(config: Config) -> anyhow::Result<()> {
    let client = CloudflareClient::new(config.resolved_api_token());

    println!("Validating configuration...\n");

    let mut all_valid = true;

    print!("  API token: ");
    match client.verify_token().await {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED - {}", e);
            all_valid = false;
        }
    }

    for zone in &config.zones {
        print!("  zone {} ({}): ", zone.zone_name, zone.zone_id);

        match client.list_records(&zone.zone_id, RecordType::A).await {
            Ok(records) => {
                let known: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
                let missing: Vec<_> = zone
                    .record_ids
                    .iter()
                    .filter(|id| !known.contains(&id.as_str()))
                    .collect();
                if missing.is_empty() {
                    println!("OK");
                } else {
                    // AAAA-only records are not in the A listing; just note them.
                    println!("OK ({} record id(s) not found among A records)", missing.len());
                }
            }
            Err(e) => {
                println!("FAILED - {}", e);
                all_valid = false;
            }
        }
    }

    println!();

    if all_valid {
        println!("Configuration validated successfully.");
    } else {
        println!("Some checks failed.");
        std::process::exit(1);
    }

    Ok(())
}
