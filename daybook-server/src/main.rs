use anyhow::Result;
use clap::Parser;
use daybook::config::ObservabilityConfig;
use daybook::{ApiServer, Config, Daybook};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "daybook-server")]
#[command(about = "Daybook worklog server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "daybook.toml", env = "DAYBOOK_CONFIG")]
    config: String,

    /// Address to bind, overrides server.bind_addr
    #[arg(long)]
    bind: Option<String>,
}

/// RUST_LOG wins over the configured level; LOG_FORMAT over the configured format.
fn init_tracing(observability: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&observability.log_level));
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| observability.log_format.clone());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_or_create(Path::new(&args.config))?;
    init_tracing(&config.observability);

    tracing::info!("Starting Daybook server");
    tracing::info!("Config file: {}", args.config);

    let metrics = if config.observability.metrics_enabled {
        Some(PrometheusBuilder::new().install_recorder()?)
    } else {
        None
    };

    let addr = args.bind.clone().unwrap_or_else(|| config.server.bind_addr.clone());
    let app = Arc::new(Daybook::open(config)?);
    app.bootstrap().await?;

    let mut server = ApiServer::new(app);
    if let Some(handle) = metrics {
        server = server.with_metrics(handle);
    }

    tracing::info!("Listening on {}", addr);
    server.serve(&addr).await?;

    Ok(())
}
