use mfsync::application::services::sync_service::SyncService;
use mfsync::config::SyncConfig;
use mfsync::infrastructure::flex_client::{FlexClientConfig, FlexQueryClient};
use mfsync::infrastructure::moneyforward::{MoneyForwardConfig, MoneyForwardGateway};
use mfsync::infrastructure::yahoo_fx::YahooFxClient;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mfsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SyncConfig::from_env()?;

    let reports = FlexQueryClient::with_config(
        config.flex_token.clone(),
        config.flex_query_id.clone(),
        FlexClientConfig {
            poll_attempts: config.poll_attempts,
            poll_delay: Duration::from_secs(config.poll_delay_secs),
            ..FlexClientConfig::default()
        },
    );
    let rates = YahooFxClient::new()?;
    let gateway = MoneyForwardGateway::new(MoneyForwardConfig {
        portfolio_url: config.portfolio_url.clone(),
        settle_delay: Duration::from_secs(config.settle_delay_secs),
        ..MoneyForwardConfig::default()
    })?;

    let mut service = SyncService::new(reports, rates, gateway);
    let summary = service.run(&config.mf_email, &config.mf_password).await?;

    info!(
        mutations = summary.mutations(),
        cash_unchanged = summary.cash.unchanged,
        equity_unchanged = summary.equity.unchanged,
        equity_unsupported = summary.equity.unsupported,
        "done"
    );
    Ok(())
}
