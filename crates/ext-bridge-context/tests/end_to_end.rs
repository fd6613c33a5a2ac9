//! Contexts talking to each other over one bus and one store.

use std::{sync::Arc, time::Duration};

use ext_bridge_context::{
    BackgroundController, BackgroundHandle, ContentScript, ContextError, LifecycleEvent,
    OptionsPage, Popup,
};
use ext_bridge_core::{
    ContentAction, Envelope, GetSettings, GetTabInfo, SenderContext, Settings, Theme,
    UNKNOWN_MESSAGE_TYPE, WireResponse,
};
use ext_bridge_storage::{SettingsStore, storage::FileBackend};
use ext_bridge_transport::{Channel, Destination, MessageBus};
use serde_json::json;

const TIMEOUT: Duration = Duration::from_millis(300);

struct World {
    bus: MessageBus,
    store: SettingsStore,
    background: BackgroundController,
    handle: BackgroundHandle,
}

async fn installed() -> World {
    installed_with(SettingsStore::in_memory()).await
}

async fn installed_with(store: SettingsStore) -> World {
    let bus = MessageBus::new();
    let background = BackgroundController::new(store.clone(), bus.clone(), TIMEOUT);
    background
        .handle_lifecycle(LifecycleEvent::Installed)
        .await
        .unwrap();
    let handle = background.start().await.unwrap();
    World {
        bus,
        store,
        background,
        handle,
    }
}

impl World {
    async fn page(&self, window: u32, url: &str, title: &str) -> ContentScript {
        let tab = self.bus.open_tab(window, url, title);
        ContentScript::inject(&self.bus, &self.store, tab.id, TIMEOUT)
            .await
            .unwrap()
    }

    fn popup_channel(&self) -> Channel {
        Channel::new(self.bus.clone(), SenderContext::popup(), TIMEOUT)
    }
}

async fn settle(script: &ContentScript, enabled: bool) {
    let mut rx = script.subscribe_enabled();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|value| *value == enabled))
        .await
        .expect("fan-out did not arrive")
        .unwrap();
}

#[tokio::test]
async fn registered_kind_answers_with_data() {
    let world = installed().await;
    let _page = world.page(1, "https://news.test/today", "Today").await;

    let popup = Popup::open(&world.bus, TIMEOUT).await;
    assert_eq!(popup.view().error, None);
    assert_eq!(popup.view().settings, Some(Settings::default()));
    let page = popup.view().page.clone().unwrap();
    assert_eq!(page.url, "https://news.test/today");
    assert_eq!(page.title, "Today");

    let direct = world
        .popup_channel()
        .send_to_active_tab(GetTabInfo)
        .await
        .into_result()
        .unwrap();
    assert_eq!(direct, page);
}

#[tokio::test]
async fn unregistered_kind_is_rejected_exactly() {
    let world = installed().await;
    let page = world.page(1, "https://a.test", "A").await;
    let channel = world.popup_channel();

    let unknown = channel
        .send_envelope(
            Destination::Background,
            Envelope::raw("FORMAT_DISK", json!({})),
        )
        .await;
    assert_eq!(unknown, WireResponse::err(UNKNOWN_MESSAGE_TYPE));
    assert_eq!(
        serde_json::to_value(&unknown).unwrap(),
        json!({ "success": false, "error": "Unknown message type" })
    );

    // Content scripts do not answer GET_SETTINGS.
    let response = channel.send_to_tab(page.tab().id, GetSettings).await;
    assert_eq!(response.error.as_deref(), Some(UNKNOWN_MESSAGE_TYPE));
    assert_eq!(response.data, None);
}

#[tokio::test]
async fn initializing_twice_equals_once() {
    let world = installed().await;
    let once = world.store.get_all().await.unwrap();

    world
        .background
        .handle_lifecycle(LifecycleEvent::Startup)
        .await
        .unwrap();
    world
        .background
        .handle_lifecycle(LifecycleEvent::Installed)
        .await
        .unwrap();
    assert_eq!(world.store.get_all().await.unwrap(), once);
}

#[tokio::test]
async fn partial_update_keeps_other_fields() {
    let world = installed().await;
    let mut options = tokio_test::assert_ok!(OptionsPage::load(&world.bus, TIMEOUT).await);
    tokio_test::assert_ok!(options.set_theme(Theme::Dark).await);
    assert_eq!(options.status(), Some("Settings saved"));

    let settings = world
        .popup_channel()
        .send_to_background(GetSettings)
        .await
        .into_result()
        .unwrap()
        .unwrap();
    assert_eq!(
        settings,
        Settings {
            theme: Theme::Dark,
            ..Settings::default()
        }
    );
    assert_eq!(options.settings(), &settings);
}

#[tokio::test]
async fn cleared_store_reports_absent_settings() {
    let world = installed().await;
    let channel = world.popup_channel();

    world.store.clear().await.unwrap();
    assert!(world.store.get_all().await.unwrap().is_empty());
    let response = channel.send_to_background(GetSettings).await;
    assert!(response.success);
    assert_eq!(response.into_result(), Ok(None));

    let mut options = OptionsPage::load(&world.bus, TIMEOUT).await.unwrap();
    assert_eq!(options.settings(), &Settings::default());
    options.set_notifications(false).await.unwrap();

    let settings = channel
        .send_to_background(GetSettings)
        .await
        .into_result()
        .unwrap()
        .unwrap();
    assert!(!settings.notifications);
    assert_eq!(settings.theme, Theme::System);
}

#[tokio::test]
async fn unreachable_tab_fails_without_hanging() {
    let world = installed().await;
    let tab = world.bus.open_tab(1, "chrome://settings", "Settings");
    let err = ContentScript::inject(&world.bus, &world.store, tab.id, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::Transport(_)));

    let started = tokio::time::Instant::now();
    let response = world
        .popup_channel()
        .send_to_tab(tab.id, ContentAction::new("ping"))
        .await;
    assert!(!response.success);
    assert!(response.error.is_some());
    assert!(started.elapsed() < TIMEOUT);

    let mut popup = Popup::open(&world.bus, TIMEOUT).await;
    assert!(popup.run_action(ContentAction::new("ping")).await.is_err());
    assert!(popup.view().error.is_some());
}

#[tokio::test]
async fn toggle_persists_and_fans_out() {
    let world = installed().await;
    assert_eq!(world.store.settings().await.unwrap(), Some(Settings::default()));

    let first = world.page(1, "https://a.test", "A").await;
    let second = world.page(2, "https://b.test", "B").await;
    let privileged = world.bus.open_tab(2, "chrome://newtab", "New Tab");
    assert!(first.is_enabled() && second.is_enabled());

    let mut popup = Popup::open(&world.bus, TIMEOUT).await;
    assert!(!popup.toggle().await.unwrap());
    assert!(!popup.is_enabled());

    let settings = world
        .popup_channel()
        .send_to_background(GetSettings)
        .await
        .into_result()
        .unwrap();
    assert_eq!(
        settings,
        Some(Settings {
            enabled: false,
            theme: Theme::System,
            notifications: true,
        })
    );

    settle(&first, false).await;
    settle(&second, false).await;

    let report = world.background.broadcast_state(false).await;
    let mut delivered = report.delivered.clone();
    delivered.sort_unstable();
    assert_eq!(delivered, vec![first.tab().id, second.tab().id]);
    assert_eq!(report.skipped, vec![privileged.id]);

    world.bus.activate_tab(first.tab().id).unwrap();
    let mut popup = Popup::open(&world.bus, TIMEOUT).await;
    let err = popup
        .run_action(ContentAction::new("ping"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Extension is disabled");
}

#[tokio::test]
async fn options_reset_re_enables_pages() {
    let world = installed().await;
    let page = world.page(1, "https://a.test", "A").await;

    let mut options = OptionsPage::load(&world.bus, TIMEOUT).await.unwrap();
    options.set_enabled(false).await.unwrap();
    options.set_theme(Theme::Light).await.unwrap();
    settle(&page, false).await;

    options.reset().await.unwrap();
    assert_eq!(options.settings(), &Settings::default());
    assert_eq!(world.store.settings().await.unwrap(), Some(Settings::default()));
    settle(&page, true).await;
}

#[tokio::test]
async fn menu_click_forwards_selection() {
    let world = installed().await;
    let page = world.page(1, "https://a.test", "A").await;
    page.select_text(Some("needle".to_string()));

    let result = world
        .background
        .on_menu_clicked("getSelection", page.tab().id, Some("needle".to_string()))
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(result.result, Some(json!("needle")));

    let result = world
        .background
        .on_menu_clicked("highlight", page.tab().id, None)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(result.result, Some(json!({ "highlighted": true })));
    assert!(page.is_highlighted());
}

#[tokio::test]
async fn visits_are_counted_per_page_load() {
    let world = installed().await;
    let _a = world.page(1, "https://a.test", "A").await;
    let _b = world.page(1, "https://b.test", "B").await;

    let all = world.store.get_all().await.unwrap();
    assert_eq!(all["userData"]["visitCount"], json!(2));
}

#[tokio::test]
async fn settings_survive_restart_with_file_backend() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");

    let backend = FileBackend::open(&path).await.unwrap();
    let world = installed_with(SettingsStore::new(Arc::new(backend))).await;
    let mut options = OptionsPage::load(&world.bus, TIMEOUT).await.unwrap();
    options.set_theme(Theme::Dark).await.unwrap();
    world.handle.shutdown();

    let reopened = SettingsStore::new(Arc::new(FileBackend::open(&path).await.unwrap()));
    let bus = MessageBus::new();
    let background = BackgroundController::new(reopened.clone(), bus.clone(), TIMEOUT);
    background
        .handle_lifecycle(LifecycleEvent::Updated {
            previous_version: "0.1.0".to_string(),
        })
        .await
        .unwrap();
    let _handle = background.start().await.unwrap();

    let settings = Channel::new(bus, SenderContext::popup(), TIMEOUT)
        .send_to_background(GetSettings)
        .await
        .into_result()
        .unwrap()
        .unwrap();
    assert_eq!(settings.theme, Theme::Dark);

    let keys: Vec<String> = reopened.get_all().await.unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["settings".to_string(), "userData".to_string()]);
}
