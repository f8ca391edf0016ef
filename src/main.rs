//! Binary entrypoint for the Meshgate CLI.
//!
//! Commands:
//! - `start` - run the bridge (store, maintenance task, drain loops)
//! - `init` - create a starter `meshgate.toml`
//! - `status` - print node/message counts from the store
//!
//! See the library crate docs for module-level details: `meshgate::`.
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use meshgate::bridge::{run_hourly_summary, Bridge, BridgeConfig};
use meshgate::chat::LogChat;
use meshgate::config::Config;
use meshgate::db::{Database, MaintenanceConfig};
use meshgate::mesh::{DetachedMesh, MeshTransport};

#[derive(Parser)]
#[command(name = "meshgate")]
#[command(about = "A bridge between Meshtastic mesh networks and group-chat channels")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "meshgate.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge
    Start,
    /// Initialize a new configuration file
    Init,
    /// Show store status and statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config early to configure logging (except for Init which writes it)
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting Meshgate v{}", env!("CARGO_PKG_VERSION"));
            run_bridge(config).await?;
        }
        Commands::Init => {
            info!("Initializing new bridge configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            show_status(&config).await?;
        }
    }

    Ok(())
}

async fn run_bridge(config: Config) -> Result<()> {
    let db = Database::open(&config.database.path).await?;

    let maintenance = db.start_maintenance(MaintenanceConfig {
        interval: Duration::from_secs(config.database.maintenance_interval_seconds),
        retention_days: config.database.retention_days,
        vacuum_threshold_mb: config.database.vacuum_threshold_mb,
    });

    // The radio and chat backends are provided by external SDK glue that
    // feeds decoded packets into the channel below. Without one attached the
    // bridge still runs: sends are logged and skipped, the loops keep
    // ticking.
    let mut mesh = DetachedMesh;
    if !config.mesh.host.is_empty() {
        warn!(
            "Radio host {} configured but no radio backend is linked into this build",
            config.mesh.host
        );
    }
    if !mesh.connect().await {
        warn!("Radio link unavailable; bridge continuing without device");
    }
    let chat = LogChat;

    let summary_window = config.bridge.active_node_threshold_minutes;
    let (bridge, handle) = Bridge::new(BridgeConfig::from_config(&config), db.clone(), mesh, chat);

    let (_packet_tx, packet_rx) = tokio::sync::mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let summary_task = tokio::spawn(run_hourly_summary(
        db.clone(),
        handle.clone(),
        summary_window,
        shutdown_rx.clone(),
    ));
    let bridge_task = tokio::spawn(bridge.run(packet_rx, shutdown_rx));

    info!("Bridge running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(10), bridge_task)
        .await
        .is_err()
    {
        warn!("Bridge loop did not stop in time");
    }
    if tokio::time::timeout(Duration::from_secs(5), summary_task)
        .await
        .is_err()
    {
        warn!("Summary loop did not stop in time");
    }
    maintenance.stop().await;
    db.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn show_status(config: &Config) -> Result<()> {
    let db = Database::open(&config.database.path).await?;

    let nodes = db.get_all_nodes().await;
    let active = db
        .get_active_nodes(config.bridge.active_node_threshold_minutes)
        .await;
    let stats = db.get_message_statistics(24).await;
    let summary = db
        .get_telemetry_summary(config.bridge.active_node_threshold_minutes)
        .await;

    println!("Meshgate status ({})", config.database.path);
    println!("  nodes known:      {}", nodes.len());
    println!(
        "  nodes active:     {} (last {} min)",
        active.len(),
        config.bridge.active_node_threshold_minutes
    );
    println!("  messages (24h):   {}", stats.total_messages);
    println!("  unique senders:   {}", stats.unique_senders);
    match summary.avg_battery {
        Some(avg) => println!("  avg battery:      {:.1}%", avg),
        None => println!("  avg battery:      n/a"),
    }
    if let Some(last) = db.get_recent_messages(1).await.first() {
        println!("  last message:     {}", last.timestamp);
    }

    db.close().await;
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();

    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .map(|cfg| cfg.logging.level.as_str())
            .map(|level| match level.to_ascii_lowercase().as_str() {
                "error" => log::LevelFilter::Error,
                "warn" => log::LevelFilter::Warn,
                "debug" => log::LevelFilter::Debug,
                "trace" => log::LevelFilter::Trace,
                _ => log::LevelFilter::Info,
            })
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|cfg| cfg.logging.file.clone());
    if let Some(file) = log_file {
        if let Ok(f) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
        {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // When stdout is not a terminal (service mode) the file is the
            // only sink; on a TTY we mirror to the console as well.
            let is_tty = atty::is(atty::Stream::Stdout);

            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }

    let _ = builder.try_init();
}
