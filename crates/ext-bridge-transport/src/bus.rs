//! In-process stand-in for the host's message bus and tab registry.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use ext_bridge_core::{Tab, TabId, WindowId};
use ext_bridge_router::Listener;

use crate::TransportError;

/// URL prefixes on which the host never runs content scripts.
const PRIVILEGED_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "edge://",
    "about:",
    "moz-extension://",
    "view-source:",
    "https://chrome.google.com/webstore",
];

/// Whether the host refuses to inject content scripts into `url`.
#[must_use]
pub fn is_privileged_url(url: &str) -> bool {
    PRIVILEGED_PREFIXES
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

#[derive(Debug)]
struct TabSlot {
    tab: Tab,
    listener: Option<Listener>,
}

#[derive(Debug, Default)]
struct BusState {
    background: Option<Listener>,
    tabs: BTreeMap<TabId, TabSlot>,
    active_by_window: HashMap<WindowId, TabId>,
    focused_window: Option<WindowId>,
    next_tab_id: TabId,
}

/// Registry of every context reachable by message: the single background
/// listener and one optional listener per tab, plus window focus.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MessageBus {
    state: Arc<RwLock<BusState>>,
}

impl MessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BusState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BusState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the background context's listener.
    pub fn attach_background(&self, listener: Listener) {
        if self.write().background.replace(listener).is_some() {
            tracing::warn!("Replaced an existing background listener");
        }
    }

    pub fn detach_background(&self) {
        self.write().background = None;
    }

    /// Listener of the background context.
    ///
    /// # Errors
    /// Returns [`TransportError::NoReceiver`] if no background is running.
    pub fn background(&self) -> Result<Listener, TransportError> {
        self.read()
            .background
            .clone()
            .filter(|listener| !listener.is_closed())
            .ok_or(TransportError::NoReceiver)
    }

    /// Open a tab in `window_id`. It becomes the window's active tab and the
    /// window gains focus.
    pub fn open_tab(
        &self,
        window_id: WindowId,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> Tab {
        let mut state = self.write();
        state.next_tab_id += 1;
        let tab = Tab {
            id: state.next_tab_id,
            window_id,
            url: url.into(),
            title: title.into(),
        };
        state.tabs.insert(
            tab.id,
            TabSlot {
                tab: tab.clone(),
                listener: None,
            },
        );
        state.active_by_window.insert(window_id, tab.id);
        state.focused_window = Some(window_id);
        tracing::debug!(tab = tab.id, window = window_id, url = %tab.url, "Opened tab");
        tab
    }

    /// Close a tab. Any content script in it goes away with it.
    pub fn close_tab(&self, tab_id: TabId) -> Option<Tab> {
        let mut state = self.write();
        let slot = state.tabs.remove(&tab_id)?;
        let window_id = slot.tab.window_id;
        if state.active_by_window.get(&window_id) == Some(&tab_id) {
            let fallback = state
                .tabs
                .values()
                .rev()
                .find(|other| other.tab.window_id == window_id)
                .map(|other| other.tab.id);
            match fallback {
                Some(next) => {
                    state.active_by_window.insert(window_id, next);
                }
                None => {
                    state.active_by_window.remove(&window_id);
                }
            }
        }
        Some(slot.tab)
    }

    /// Navigate a tab. The page's content script is unloaded.
    ///
    /// # Errors
    /// Returns [`TransportError::TabNotFound`] for an unknown tab.
    pub fn navigate(
        &self,
        tab_id: TabId,
        url: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Tab, TransportError> {
        let mut state = self.write();
        let slot = state
            .tabs
            .get_mut(&tab_id)
            .ok_or(TransportError::TabNotFound(tab_id))?;
        slot.tab.url = url.into();
        slot.tab.title = title.into();
        slot.listener = None;
        Ok(slot.tab.clone())
    }

    /// Make `tab_id` the active tab of its window and focus that window.
    ///
    /// # Errors
    /// Returns [`TransportError::TabNotFound`] for an unknown tab.
    pub fn activate_tab(&self, tab_id: TabId) -> Result<(), TransportError> {
        let mut state = self.write();
        let window_id = state
            .tabs
            .get(&tab_id)
            .map(|slot| slot.tab.window_id)
            .ok_or(TransportError::TabNotFound(tab_id))?;
        state.active_by_window.insert(window_id, tab_id);
        state.focused_window = Some(window_id);
        Ok(())
    }

    /// Focus a window, or no window at all.
    pub fn focus_window(&self, window_id: Option<WindowId>) {
        self.write().focused_window = window_id;
    }

    /// Install a content script's listener in `tab_id`.
    ///
    /// # Errors
    /// Returns error if the tab does not exist or hosts a privileged page.
    pub fn attach_content_script(
        &self,
        tab_id: TabId,
        listener: Listener,
    ) -> Result<Tab, TransportError> {
        let mut state = self.write();
        let slot = state
            .tabs
            .get_mut(&tab_id)
            .ok_or(TransportError::TabNotFound(tab_id))?;
        if is_privileged_url(&slot.tab.url) {
            return Err(TransportError::PrivilegedPage(slot.tab.url.clone()));
        }
        slot.listener = Some(listener);
        Ok(slot.tab.clone())
    }

    /// Remove the content script listener of `tab_id`, if any.
    pub fn detach_content_script(&self, tab_id: TabId) -> bool {
        self.write()
            .tabs
            .get_mut(&tab_id)
            .and_then(|slot| slot.listener.take())
            .is_some()
    }

    /// Listener of the content script in `tab_id`.
    ///
    /// # Errors
    /// Returns error if the tab is unknown or nothing listens in it.
    pub fn tab_listener(&self, tab_id: TabId) -> Result<Listener, TransportError> {
        let state = self.read();
        let slot = state
            .tabs
            .get(&tab_id)
            .ok_or(TransportError::TabNotFound(tab_id))?;
        slot.listener
            .clone()
            .filter(|listener| !listener.is_closed())
            .ok_or(TransportError::NoReceiver)
    }

    #[must_use]
    pub fn tab(&self, tab_id: TabId) -> Option<Tab> {
        self.read().tabs.get(&tab_id).map(|slot| slot.tab.clone())
    }

    /// Every open tab, in id order.
    #[must_use]
    pub fn tabs(&self) -> Vec<Tab> {
        self.read()
            .tabs
            .values()
            .map(|slot| slot.tab.clone())
            .collect()
    }

    /// The active tab of the focused window.
    #[must_use]
    pub fn active_tab(&self) -> Option<Tab> {
        let state = self.read();
        let window_id = state.focused_window?;
        let tab_id = state.active_by_window.get(&window_id)?;
        state.tabs.get(tab_id).map(|slot| slot.tab.clone())
    }
}
