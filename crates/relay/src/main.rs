use std::sync::Arc;

use relay_core::config::Config;

mod health;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay_core::logging::init("relay")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        repo = %cfg.github_repo,
        tag = %cfg.github_release_tag,
        temp_dir = %cfg.temp_dir.display(),
        "configuration loaded"
    );

    if cfg.health_enabled {
        let addr = cfg.health_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(&addr).await {
                tracing::error!(%addr, error = %e, "health server failed");
            }
        });
    }

    tokio::select! {
        res = relay_telegram::router::run_polling(cfg) => {
            res.map_err(|e| anyhow::anyhow!("telegram bot failed: {e}"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    Ok(())
}
