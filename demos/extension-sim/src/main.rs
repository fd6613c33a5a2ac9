//! Extension simulator: background, two pages, popup and options page in one
//! process.
//!
//! Run with: cargo run -p extension-sim -- [config.toml]

use std::sync::Arc;

use anyhow::Context as _;
use ext_bridge_context::{BackgroundController, ContentScript, LifecycleEvent, OptionsPage, Popup};
use ext_bridge_core::{BridgeConfig, ContentAction, StorageBackendKind, Theme};
use ext_bridge_storage::{
    SettingsStore,
    storage::{FileBackend, MemoryBackend},
};
use ext_bridge_transport::MessageBus;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => BridgeConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => {
            let mut config = BridgeConfig::default();
            config.apply_env(|var| std::env::var(var).ok())?;
            config
        }
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .init();

    let store = match config.storage.backend {
        StorageBackendKind::Memory => SettingsStore::new(Arc::new(MemoryBackend::new())),
        StorageBackendKind::File => {
            let path = config.storage.resolved_path();
            tracing::info!(path = %path.display(), "Using file storage");
            SettingsStore::new(Arc::new(FileBackend::open(path).await?))
        }
    };
    let changes = store.on_change(|changes| {
        for (key, change) in changes {
            tracing::info!(%key, new = ?change.new_value, "Storage changed");
        }
    });

    let timeout = config.request_timeout();
    let bus = MessageBus::new();
    let background = BackgroundController::new(store.clone(), bus.clone(), timeout);
    let event = if store.settings().await?.is_some() {
        LifecycleEvent::Startup
    } else {
        LifecycleEvent::Installed
    };
    background.handle_lifecycle(event).await?;
    let handle = background.start().await?;

    let docs = bus.open_tab(1, "https://docs.rs/tokio", "tokio - Rust");
    let docs = ContentScript::inject(&bus, &store, docs.id, timeout).await?;
    let news = bus.open_tab(1, "https://news.ycombinator.com", "Hacker News");
    let news = ContentScript::inject(&bus, &store, news.id, timeout).await?;
    bus.open_tab(2, "chrome://extensions", "Extensions");
    bus.activate_tab(news.tab().id)?;

    let mut popup = Popup::open(&bus, timeout).await;
    tracing::info!(view = ?popup.view(), "Popup opened");

    match popup.run_action(ContentAction::new("ping")).await {
        Ok(result) => tracing::info!(?result, "Ping answered"),
        Err(e) => tracing::warn!("Ping failed: {e}"),
    }

    let enabled = popup.toggle().await?;
    tracing::info!(enabled, "Toggled extension from popup");
    let mut watch = docs.subscribe_enabled();
    watch.wait_for(|value| *value == enabled).await?;

    let mut options = OptionsPage::load(&bus, timeout).await?;
    options.set_theme(Theme::Dark).await?;
    options.set_enabled(true).await?;
    tracing::info!(settings = ?options.settings(), "Options saved");
    watch.wait_for(|value| *value).await?;

    docs.select_text(Some("async runtime".to_string()));
    match background
        .on_menu_clicked("highlight", docs.tab().id, Some("async runtime".to_string()))
        .await
    {
        Ok(response) => tracing::info!(?response, "Menu item handled"),
        // Menus are only registered on install.
        Err(e) => tracing::warn!("Menu click ignored: {e}"),
    }

    let snapshot = serde_json::Value::Object(store.get_all().await?);
    tracing::info!(%snapshot, "Final storage");

    news.detach();
    docs.detach();
    handle.shutdown();
    changes.remove();
    Ok(())
}
