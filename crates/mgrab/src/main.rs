use std::sync::Arc;

use mgrab_core::{config::Config, resolver::client::MediaResolver};
use mgrab_ytdlp::YtdlpResolver;

#[tokio::main]
async fn main() -> Result<(), mgrab_core::Error> {
    mgrab_core::logging::init("mgrab")?;

    let cfg = Arc::new(Config::load()?);

    let resolver: Arc<dyn MediaResolver> = Arc::new(YtdlpResolver::new(
        cfg.ytdlp_path.clone(),
        cfg.fetch_socket_timeout,
    ));

    mgrab_telegram::router::run_webhook(cfg, resolver)
        .await
        .map_err(|e| mgrab_core::Error::Transport(format!("telegram bot failed: {e}")))?;

    Ok(())
}
