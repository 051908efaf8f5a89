use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::net::TcpListener;

use optifolio_backend::app;
use optifolio_backend::config::{AppConfig, ProviderKind};
use optifolio_backend::external::csv_provider::CsvPriceProvider;
use optifolio_backend::external::mock::MockPriceProvider;
use optifolio_backend::external::price_provider::PriceProvider;
use optifolio_backend::external::yahoo::YahooProvider;
use optifolio_backend::logging::{init_logging, LoggingConfig};
use optifolio_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env()).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let config = AppConfig::from_env().map_err(|e| anyhow!(e))?;

    let provider: Arc<dyn PriceProvider> = match config.price_provider {
        ProviderKind::Yahoo => {
            tracing::info!("📊 Using price provider: Yahoo Finance");
            Arc::new(YahooProvider::new())
        }
        ProviderKind::Csv => {
            let dir = config
                .price_data_dir
                .clone()
                .context("PRICE_DATA_DIR is required for the csv provider")?;
            tracing::info!("📊 Using price provider: CSV files in {}", dir.display());
            Arc::new(CsvPriceProvider::new(dir))
        }
        ProviderKind::Mock => {
            tracing::info!("📊 Using price provider: synthetic mock data");
            Arc::new(MockPriceProvider::new())
        }
    };

    tracing::info!(
        "⚙️ Engine: {} frontier points, short selling {}, tolerance {:e}",
        config.engine.frontier_points,
        config.engine.allow_short,
        config.engine.tolerance
    );

    let state = AppState {
        price_provider: provider,
        engine: config.engine.clone(),
    };
    let app = app::create_app(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("🚀 Optifolio backend running at http://{}/", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
