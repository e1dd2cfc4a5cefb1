use multichain_warmup::app;
use multichain_warmup::menu::{self, Action};
use multichain_warmup::settings::Settings;

use anyhow::Result;
use clap::Parser;
use core_logic::{setup_logger, MetricsCollector, WorkerRunner};
use dotenv::dotenv;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "chains/multichain/config.toml")]
    config: String,
    /// Skip the menu and run this mode.
    #[arg(short, long, value_enum)]
    mode: Option<Action>,
    #[arg(short, long)]
    export_metrics: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let settings = match Settings::load(&args.config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load config {}: {:#}", args.config, e);
            return Ok(());
        }
    };

    let log_dir = settings.paths.log_dir.display().to_string();
    let _log_guard = setup_logger(&log_dir, &["multichain_warmup"]);
    info!("Config loaded from {}", args.config);

    let action = match args.mode {
        Some(action) => action,
        None => menu::choose_action()?,
    };
    info!("Selected: {}", action);

    let shutdown = WorkerRunner::shutdown_token();
    let result = match action.mode() {
        None => app::create_database(&settings).map(|db| {
            info!("Database ready with {} wallets", db.len());
        }),
        Some(mode) => app::run_mode(mode, &settings, &shutdown).await.map(|_| ()),
    };
    if let Err(e) = &result {
        error!("{} failed: {:#}", action, e);
    }

    if let Some(metrics_path) = args.export_metrics {
        let metrics = MetricsCollector::global();
        match metrics.export_to_file(&metrics_path).await {
            Ok(_) => info!("Metrics exported to {}", metrics_path),
            Err(e) => error!("Failed to export metrics: {}", e),
        }
    }

    result
}
