//! Background controller.

use std::{sync::Arc, time::Duration};

use ext_bridge_core::{
    Ack, ContentAction, ContentActionResult, ExtensionStateChanged, GetSettings, GetTabInfo,
    MessageResponse, PageInfo, SenderContext, Settings, StorageChanges, TabId, ToggleExtension,
    UpdateSettings,
};
use ext_bridge_router::{HandlerError, HandlerTable, Listener, Router, RouterHandle};
use ext_bridge_storage::{SettingsKey, SettingsStore, StorageKey};
use ext_bridge_transport::{Channel, MessageBus};
use futures::StreamExt;
use tokio::{sync::RwLock, task::JoinHandle};

use crate::{ContextError, MenuItem};

/// Where the background is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Ready,
}

/// Host lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Fresh install.
    Installed,
    /// New version over an existing install.
    Updated { previous_version: String },
    /// Browser started with the extension already installed.
    Startup,
}

/// Outcome of one `EXTENSION_STATE_CHANGED` fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: Vec<TabId>,
    /// Tabs that could not be reached or refused the notification.
    pub skipped: Vec<TabId>,
}

struct Inner {
    store: SettingsStore,
    bus: MessageBus,
    channel: Channel,
    state: RwLock<LifecycleState>,
    menus: RwLock<Vec<MenuItem>>,
}

/// The long-lived background context.
///
/// Owns the background handler table and notifies every content script
/// whenever the enabled flag changes. Cheap to clone.
#[derive(Clone)]
pub struct BackgroundController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BackgroundController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundController")
            .field("timeout", &self.inner.channel.timeout())
            .finish_non_exhaustive()
    }
}

impl BackgroundController {
    /// Create a controller. Nothing runs until [`BackgroundController::start`].
    #[must_use]
    pub fn new(store: SettingsStore, bus: MessageBus, timeout: Duration) -> Self {
        let channel = Channel::new(bus.clone(), SenderContext::background(), timeout);
        Self {
            inner: Arc::new(Inner {
                store,
                bus,
                channel,
                state: RwLock::new(LifecycleState::Uninitialized),
                menus: RwLock::new(Vec::new()),
            }),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        *self.inner.state.read().await
    }

    #[must_use]
    pub fn store(&self) -> &SettingsStore {
        &self.inner.store
    }

    /// React to a host lifecycle event and become ready.
    ///
    /// Install and startup write defaults for absent keys; an update leaves
    /// stored settings untouched. Install also registers the menu entries.
    ///
    /// # Errors
    /// Returns error if writing defaults fails; the state is left unchanged.
    pub async fn handle_lifecycle(
        &self,
        event: LifecycleEvent,
    ) -> Result<LifecycleState, ContextError> {
        match &event {
            LifecycleEvent::Installed => {
                self.inner.store.initialize_defaults().await?;
                *self.inner.menus.write().await = MenuItem::defaults();
                tracing::info!("Extension installed");
            }
            LifecycleEvent::Updated { previous_version } => {
                tracing::info!(%previous_version, "Extension updated");
            }
            LifecycleEvent::Startup => {
                self.inner.store.initialize_defaults().await?;
                tracing::info!("Browser started");
            }
        }
        let mut state = self.inner.state.write().await;
        *state = LifecycleState::Ready;
        Ok(*state)
    }

    /// Handlers answered by the background.
    #[must_use]
    pub fn handler_table(&self) -> HandlerTable {
        let settings = self.clone();
        let update = self.clone();
        let toggle = self.clone();
        let tab_info = self.clone();

        HandlerTable::new()
            .on(move |_: GetSettings, _| {
                let this = settings.clone();
                async move { Ok(this.inner.store.settings().await?) }
            })
            .on(move |msg: UpdateSettings, _| {
                let this = update.clone();
                async move {
                    this.inner.store.update_settings(&msg.0).await?;
                    Ok(Ack::OK)
                }
            })
            .on(move |msg: ToggleExtension, _| {
                let this = toggle.clone();
                async move {
                    this.inner.store.set_enabled(msg.enabled).await?;
                    Ok(Ack::OK)
                }
            })
            .on(move |_: GetTabInfo, sender: SenderContext| {
                let this = tab_info.clone();
                async move {
                    let tab = sender
                        .tab
                        .or_else(|| this.inner.bus.active_tab())
                        .ok_or_else(|| HandlerError::msg("No active tab found"))?;
                    Ok(PageInfo {
                        url: tab.url,
                        title: tab.title,
                    })
                }
            })
    }

    /// Attach the background router to the bus and start watching the
    /// enabled flag.
    ///
    /// # Errors
    /// Returns [`ContextError::NotReady`] before any lifecycle event.
    pub async fn start(&self) -> Result<BackgroundHandle, ContextError> {
        if self.state().await != LifecycleState::Ready {
            return Err(ContextError::NotReady);
        }

        let router = Router::new("background", self.handler_table()).spawn();
        self.inner.bus.attach_background(router.listener());

        // Fan-outs run one at a time, in the order the flag changed.
        let mut feed = self.inner.store.subscribe().into_stream();
        let this = self.clone();
        let fan_out = tokio::spawn(async move {
            while let Some(changes) = feed.next().await {
                if let Some(enabled) = enabled_transition(&changes) {
                    this.broadcast_state(enabled).await;
                }
            }
        });

        tracing::info!("Background ready");
        Ok(BackgroundHandle { router, fan_out })
    }

    /// Send `EXTENSION_STATE_CHANGED { enabled }` to every tab.
    ///
    /// Tabs without a content script, or whose script fails or times out,
    /// are skipped.
    pub async fn broadcast_state(&self, enabled: bool) -> FanOutReport {
        let tabs = self.inner.bus.tabs();
        let sends = tabs.iter().map(|tab| async move {
            let response = self
                .inner
                .channel
                .send_to_tab(tab.id, ExtensionStateChanged { enabled })
                .await;
            (tab.id, response)
        });

        let mut report = FanOutReport::default();
        for (tab_id, response) in futures::future::join_all(sends).await {
            if response.is_success() {
                report.delivered.push(tab_id);
            } else {
                tracing::debug!(
                    tab = tab_id,
                    error = response.error_message().unwrap_or_default(),
                    "Skipped tab during state fan-out"
                );
                report.skipped.push(tab_id);
            }
        }
        tracing::info!(
            enabled,
            delivered = report.delivered.len(),
            skipped = report.skipped.len(),
            "Broadcast extension state"
        );
        report
    }

    /// Registered menu entries.
    pub async fn menu_items(&self) -> Vec<MenuItem> {
        self.inner.menus.read().await.clone()
    }

    /// Forward a menu click to the clicked tab as a content action carrying
    /// the current selection.
    ///
    /// # Errors
    /// Returns [`ContextError::UnknownMenuItem`] for an unregistered entry.
    pub async fn on_menu_clicked(
        &self,
        item_id: &str,
        tab_id: TabId,
        selection: Option<String>,
    ) -> Result<MessageResponse<ContentActionResult>, ContextError> {
        if !self
            .inner
            .menus
            .read()
            .await
            .iter()
            .any(|item| item.id == item_id)
        {
            return Err(ContextError::UnknownMenuItem(item_id.to_string()));
        }

        let mut action = ContentAction::new(item_id);
        if let Some(selection) = selection {
            action = action.with_data(serde_json::Value::String(selection));
        }
        tracing::debug!(item = item_id, tab = tab_id, "Menu item clicked");
        Ok(self.inner.channel.send_to_tab(tab_id, action).await)
    }
}

/// New value of the enabled flag, if `changes` flipped it.
///
/// An absent previous record counts as the default settings; a removed
/// record is not a transition.
fn enabled_transition(changes: &StorageChanges) -> Option<bool> {
    let change = changes.get(SettingsKey::NAME)?;
    let enabled_of = |value: &serde_json::Value| {
        serde_json::from_value::<Settings>(value.clone())
            .ok()
            .map(|settings| settings.enabled)
    };

    let after = enabled_of(change.new_value.as_ref()?)?;
    let before = change
        .old_value
        .as_ref()
        .and_then(enabled_of)
        .unwrap_or(Settings::default().enabled);
    (before != after).then_some(after)
}

/// Owner of the running background.
#[derive(Debug)]
pub struct BackgroundHandle {
    router: RouterHandle,
    fan_out: JoinHandle<()>,
}

impl BackgroundHandle {
    #[must_use]
    pub fn listener(&self) -> Listener {
        self.router.listener()
    }

    /// Stop answering messages and stop fanning out.
    pub fn shutdown(self) {
        self.fan_out.abort();
        self.router.shutdown();
    }
}
