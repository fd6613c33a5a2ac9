//! Content script: one per tab, attached when the page loads.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use ext_bridge_core::{
    Ack, ContentAction, ContentActionResult, ExtensionStateChanged, GetSettings, GetTabInfo,
    PageInfo, SenderContext, Settings, Tab, TabId,
};
use ext_bridge_router::{HandlerError, HandlerTable, Router, RouterHandle};
use ext_bridge_storage::SettingsStore;
use ext_bridge_transport::{Channel, MessageBus, TransportError, is_privileged_url};
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::ContextError;

/// Page-local state shared with the handlers.
#[derive(Debug)]
struct Page {
    info: PageInfo,
    enabled: watch::Sender<bool>,
    highlighted: AtomicBool,
    selection: Mutex<Option<String>>,
}

impl Page {
    fn selection(&self) -> Option<String> {
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn run(&self, action: &ContentAction) -> Result<ContentActionResult, HandlerError> {
        if !*self.enabled.borrow() {
            return Err(HandlerError::msg("Extension is disabled"));
        }
        let result = match action.action.as_str() {
            "ping" => json!("pong"),
            "highlight" => {
                let highlighted = !self.highlighted.fetch_xor(true, Ordering::SeqCst);
                json!({ "highlighted": highlighted })
            }
            "getSelection" => self.selection().map_or(Value::Null, Value::String),
            other => return Err(HandlerError::msg(format!("Unknown action: {other}"))),
        };
        Ok(ContentActionResult {
            success: true,
            result: Some(result),
        })
    }
}

/// A content script living in one tab.
#[derive(Debug)]
pub struct ContentScript {
    tab: Tab,
    bus: MessageBus,
    page: Arc<Page>,
    router: RouterHandle,
}

impl ContentScript {
    /// Load the script into `tab_id`: attach its listener, count the visit
    /// and ask the background whether the extension is enabled.
    ///
    /// If the background cannot answer, the script assumes the default.
    ///
    /// # Errors
    /// Returns error for an unknown or privileged tab, or if the visit cannot
    /// be recorded.
    pub async fn inject(
        bus: &MessageBus,
        store: &SettingsStore,
        tab_id: TabId,
        timeout: Duration,
    ) -> Result<Self, ContextError> {
        let tab = bus.tab(tab_id).ok_or(TransportError::TabNotFound(tab_id))?;
        if is_privileged_url(&tab.url) {
            return Err(TransportError::PrivilegedPage(tab.url).into());
        }

        let (enabled, _) = watch::channel(Settings::default().enabled);
        let page = Arc::new(Page {
            info: PageInfo {
                url: tab.url.clone(),
                title: tab.title.clone(),
            },
            enabled,
            highlighted: AtomicBool::new(false),
            selection: Mutex::new(None),
        });

        let router = Router::new(format!("tab-{tab_id}"), handler_table(&page)).spawn();
        if let Err(e) = bus.attach_content_script(tab_id, router.listener()) {
            router.shutdown();
            return Err(e.into());
        }
        let script = Self {
            tab,
            bus: bus.clone(),
            page,
            router,
        };

        let visits = match store.record_visit(now_ms()).await {
            Ok(visits) => visits,
            Err(e) => {
                script.detach();
                return Err(e.into());
            }
        };
        tracing::debug!(tab = tab_id, visit_count = visits.visit_count, "Content script loaded");

        let channel = Channel::new(
            bus.clone(),
            SenderContext::content_script(script.tab.clone()),
            timeout,
        );
        match channel.send_to_background(GetSettings).await.into_result() {
            Ok(Some(settings)) => {
                script.page.enabled.send_replace(settings.enabled);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(tab = tab_id, "Could not read settings: {e}"),
        }
        Ok(script)
    }

    #[must_use]
    pub const fn tab(&self) -> &Tab {
        &self.tab
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.page.enabled.borrow()
    }

    #[must_use]
    pub fn is_highlighted(&self) -> bool {
        self.page.highlighted.load(Ordering::SeqCst)
    }

    /// Watch the enabled flag as the background broadcasts it.
    #[must_use]
    pub fn subscribe_enabled(&self) -> watch::Receiver<bool> {
        self.page.enabled.subscribe()
    }

    /// Set the user's text selection on the page.
    pub fn select_text(&self, selection: Option<String>) {
        *self
            .page
            .selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = selection;
    }

    /// Unload the script. Calls in flight observe a closed port.
    pub fn detach(self) {
        self.bus.detach_content_script(self.tab.id);
        self.router.shutdown();
    }
}

fn handler_table(page: &Arc<Page>) -> HandlerTable {
    let tab_page = Arc::clone(page);
    let action = Arc::clone(page);
    let state = Arc::clone(page);

    HandlerTable::new()
        .on(move |_: GetTabInfo, _| {
            let info = tab_page.info.clone();
            async move { Ok(info) }
        })
        .on(move |msg: ContentAction, _| {
            let outcome = action.run(&msg);
            async move { outcome }
        })
        .on(move |msg: ExtensionStateChanged, _| {
            state.enabled.send_replace(msg.enabled);
            if !msg.enabled {
                state.highlighted.store(false, Ordering::SeqCst);
            }
            async { Ok(Ack::OK) }
        })
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
