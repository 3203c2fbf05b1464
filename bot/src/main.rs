use agora_bot::BotConfig;
use agora_bot::Controller;
use agora_bot::ControllerConfig;
use agora_bot::RationaleListener;
use agora_chat::DiscordClient;
use agora_feed::KoiosClient;
use agora_store::Store;
use agora_summarizer::GeminiClient;
use agora_summarizer::GeminiConfig;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("agora-bot v{} starting", env!("CARGO_PKG_VERSION"));

    let config = BotConfig::from_env()?;

    let store = Arc::new(Store::open(&config.db_path)?);
    let counts = store.counts_by_status().await?;
    let watermark = store.get_watermark().await?;
    tracing::info!(
        db = %config.db_path.display(),
        in_flight = counts.non_terminal(),
        finalized = counts.finalized,
        ?watermark,
        "Store opened"
    );

    let feed = KoiosClient::new(&config.koios_base_url, config.koios_api_token.clone());
    let summarizer = GeminiClient::new(
        &config.gemini_api_key,
        GeminiConfig {
            model: config.gemini_model.clone(),
            ..Default::default()
        },
    );
    let chat = Arc::new(DiscordClient::new(&config.discord_bot_token));

    let controller = Controller::new(
        Arc::clone(&store),
        feed,
        summarizer,
        Arc::clone(&chat),
        ControllerConfig::from(&config),
    );
    let listener = Arc::new(RationaleListener::new(Arc::clone(&store), Arc::clone(&chat)));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let listener_task = {
        let listener = Arc::clone(&listener);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { listener.run(shutdown).await })
    };

    controller.run(shutdown_rx).await;
    let _ = listener_task.await;

    tracing::info!("agora-bot stopped");
    Ok(())
}
