use clap::Parser;
use pricewire_config::Settings;
use pricewire_log::error;
use std::path::PathBuf;

/// E-mail driven price-list ingestion pipeline.
#[derive(Parser)]
#[command(name = "pricewire", version, about)]
struct Cli {
    /// Path to the configuration file (JSON or TOML); `PRICEWIRE_*`
    /// environment variables override file values.
    #[arg(long, short, env = "PRICEWIRE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    pricewire_log::init();
    if pricewire_log::tracing_compat::install().is_err() {
        // A subscriber installed by a test harness is fine to keep.
    }

    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = pricewire_server::app::run(settings).await {
        error!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}
