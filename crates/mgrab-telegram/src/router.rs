use std::{net::SocketAddr, sync::Arc};

use teloxide::{
    dispatching::Dispatcher, dptree, error_handlers::LoggingErrorHandler, prelude::*,
    update_listeners::webhooks,
};
use tracing::{debug, info};

use mgrab_core::{
    config::Config,
    download::{DownloadOrchestrator, OrchestratorConfig},
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    resolver::client::MediaResolver,
    session::SessionStore,
    users::KnownUsers,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub known_users: Arc<KnownUsers>,
    pub messenger: Arc<dyn MessagingPort>,
    pub resolver: Arc<dyn MediaResolver>,
    pub downloads: Arc<DownloadOrchestrator>,
}

/// Wire everything up and serve the webhook until the process dies.
///
/// The webhook endpoint acknowledges every update uniformly; all real work
/// (and all failure handling) happens behind the dispatcher.
pub async fn run_webhook(
    cfg: Arc<Config>,
    resolver: Arc<dyn MediaResolver>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        info!(username = me.username(), "mgrab started");
    }
    info!(
        download_dir = %cfg.download_dir.display(),
        port = cfg.port,
        max_concurrent = cfg.max_concurrent_downloads,
        "configuration loaded"
    );

    // Raw Telegram messenger wrapped with the throttling decorator so
    // edit-heavy progress reporting stays under Telegram flood limits.
    let raw: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> =
        Arc::new(ThrottledMessenger::new(raw, ThrottleConfig::default()));

    let sessions = Arc::new(SessionStore::new());
    let known_users = Arc::new(KnownUsers::new());
    let downloads = Arc::new(DownloadOrchestrator::new(
        resolver.clone(),
        messenger.clone(),
        sessions.clone(),
        OrchestratorConfig {
            download_dir: cfg.download_dir.clone(),
            max_concurrent: cfg.max_concurrent_downloads,
            progress_edit_interval: cfg.progress_edit_interval,
        },
    ));

    // Abandoned flows never self-clean; sweep them on an interval.
    {
        let sessions = sessions.clone();
        let ttl = cfg.session_ttl;
        let every = cfg.session_sweep_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                let removed = sessions.prune(ttl).await;
                if removed > 0 {
                    debug!(removed, "pruned stale sessions");
                }
            }
        });
    }

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        sessions,
        known_users,
        messenger,
        resolver,
        downloads,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let url: url::Url = format!("https://{}/webhook", cfg.webhook_host).parse()?;
    let listener = webhooks::axum(bot.clone(), webhooks::Options::new(addr, url))
        .await
        .map_err(|e| anyhow::anyhow!("failed to register webhook: {e}"))?;

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("an error from the update listener"),
        )
        .await;

    Ok(())
}
