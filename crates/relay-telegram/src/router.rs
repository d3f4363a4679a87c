use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use relay_core::{
    config::Config,
    fetch::HttpFetcher,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    ports::ReleaseStore,
    service::UploadService,
    transfer::TransferSettings,
};
use relay_github::GitHubClient;

use crate::{handlers, TelegramMessenger, TelegramSource};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub service: Arc<UploadService>,
}

impl AppState {
    pub fn store(&self) -> &dyn ReleaseStore {
        self.service.store()
    }
}

/// Bot client without a total request timeout: attachment downloads may run
/// for a long time.
fn build_bot(cfg: &Config) -> anyhow::Result<Bot> {
    let client = reqwest::Client::builder()
        .connect_timeout(cfg.connect_timeout)
        .tcp_nodelay(true)
        .build()?;
    let bot = Bot::with_client(cfg.telegram_bot_token.clone(), client);

    Ok(match cfg.telegram_api_url.as_deref() {
        Some(raw) => bot.set_api_url(parse_api_url(raw)?),
        None => bot,
    })
}

fn parse_api_url(raw: &str) -> anyhow::Result<reqwest::Url> {
    let url = reqwest::Url::parse(raw.trim())
        .map_err(|e| anyhow::anyhow!("TELEGRAM_API_URL is not a valid URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("TELEGRAM_API_URL must use http or https");
    }
    Ok(url)
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = build_bot(&cfg)?;

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed"),
    }

    let store = Arc::new(GitHubClient::new(&cfg)?);
    match store.release().await {
        Ok(release) => tracing::info!(
            target_release = %store.describe(),
            release_id = release.id,
            "release found"
        ),
        Err(e) => tracing::warn!(target_release = %store.describe(), error = %e, "release lookup failed"),
    }
    tracing::info!(admins = cfg.admin_user_ids.len(), max_file_size = cfg.max_file_size, "relay configured");

    // Progress edits hit the same message for the whole transfer; throttle
    // them. The adapter still retries once on 429 RetryAfter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let opener = Arc::new(TelegramSource::new(
        bot.clone(),
        HttpFetcher::new(cfg.connect_timeout)?,
    ));
    let service = Arc::new(UploadService::new(
        messenger.clone(),
        store,
        opener,
        TransferSettings::from_config(&cfg),
    ));

    let state = Arc::new(AppState {
        cfg,
        messenger,
        service,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
