// TaskBoard - tabbed task tracker
// Headless host: opens the board, reports what it loaded and shuts down cleanly

use anyhow::Context;
use taskboard::services::LoadOutcome;
use taskboard::{default_data_dir, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TaskBoard {}", env!("CARGO_PKG_VERSION"));

    let data_dir = match std::env::args_os().nth(1) {
        Some(dir) => dir.into(),
        None => default_data_dir().context("Failed to resolve data directory")?,
    };

    let state = AppState::open(data_dir.clone())
        .await
        .with_context(|| format!("Failed to open board in {}", data_dir.display()))?;

    if let LoadOutcome::Recovered { preserved } = state.data.load_outcome() {
        tracing::warn!("Started from an empty board; unreadable data kept at {:?}", preserved);
    }

    state.ensure_default_tab().await?;

    {
        let shared = state.data.app_data();
        let doc = shared.read().await;
        for tab in &doc.tabs {
            tracing::info!(
                "Tab '{}': {} columns, {} rows, last modified {}",
                tab.name,
                tab.columns.len(),
                tab.rows.len(),
                tab.last_modified
            );
        }
    }

    let backups = state.backups.list_backups().await?;
    tracing::info!(
        "Language {}, theme {:?}, {} backups",
        state.settings.load_language().await,
        state.settings.load_theme().await,
        backups.len()
    );

    state.shutdown().await.context("Failed to save board")?;

    Ok(())
}
