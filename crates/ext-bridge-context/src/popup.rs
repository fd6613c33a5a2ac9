//! Popup controller.

use std::time::Duration;

use ext_bridge_core::{
    ContentAction, ContentActionResult, GetSettings, GetTabInfo, PageInfo, SenderContext,
    Settings, ToggleExtension,
};
use ext_bridge_transport::{Channel, MessageBus};
use serde_json::Value;

use crate::{
    ContextError,
    error::{accepted, acknowledged},
};

/// What the popup shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopupView {
    /// `None` until settings exist.
    pub settings: Option<Settings>,
    pub page: Option<PageInfo>,
    /// Most recent failure, cleared by the next success.
    pub error: Option<String>,
    pub last_result: Option<Value>,
}

/// The popup: a pure caller holding a local view.
#[derive(Debug)]
pub struct Popup {
    channel: Channel,
    view: PopupView,
}

impl Popup {
    /// Open the popup and load settings and the current page concurrently.
    ///
    /// Failures are shown in the view rather than returned.
    pub async fn open(bus: &MessageBus, timeout: Duration) -> Self {
        let channel = Channel::new(bus.clone(), SenderContext::popup(), timeout);
        let (settings, page) = tokio::join!(
            channel.send_to_background(GetSettings),
            channel.send_to_background(GetTabInfo),
        );

        let mut view = PopupView::default();
        match accepted(settings) {
            Ok(settings) => view.settings = settings,
            Err(e) => view.error = Some(e.to_string()),
        }
        match accepted(page) {
            Ok(page) => view.page = Some(page),
            Err(e) => {
                view.error.get_or_insert_with(|| e.to_string());
            }
        }
        Self { channel, view }
    }

    #[must_use]
    pub const fn view(&self) -> &PopupView {
        &self.view
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.view.settings.unwrap_or_default().enabled
    }

    /// Flip the enabled flag.
    ///
    /// The view changes immediately and is reverted if the background does
    /// not confirm.
    ///
    /// # Errors
    /// Returns error if the background rejects or never answers.
    pub async fn toggle(&mut self) -> Result<bool, ContextError> {
        let previous = self.view.settings;
        let mut optimistic = previous.unwrap_or_default();
        optimistic.enabled = !optimistic.enabled;
        self.view.settings = Some(optimistic);

        let response = self
            .channel
            .send_to_background(ToggleExtension {
                enabled: optimistic.enabled,
            })
            .await;
        match acknowledged(response) {
            Ok(()) => {
                self.view.error = None;
                Ok(optimistic.enabled)
            }
            Err(e) => {
                tracing::warn!("Toggle failed, reverting: {e}");
                self.view.settings = previous;
                self.view.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Run a page action in the active tab.
    ///
    /// # Errors
    /// Returns error if there is no active tab or the page refuses.
    pub async fn run_action(
        &mut self,
        action: ContentAction,
    ) -> Result<ContentActionResult, ContextError> {
        match accepted(self.channel.send_to_active_tab(action).await) {
            Ok(result) => {
                self.view.error = None;
                self.view.last_result.clone_from(&result.result);
                Ok(result)
            }
            Err(e) => {
                self.view.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ext_bridge_core::Ack;
    use ext_bridge_router::{HandlerTable, Router, RouterHandle};

    use super::*;

    fn unconfirming_background(bus: &MessageBus) -> RouterHandle {
        let table = HandlerTable::new()
            .on(|_: GetSettings, _| async { Ok(Some(Settings::default())) })
            .on(|_: ToggleExtension, _| async { Ok(Ack { success: false }) });
        let handle = Router::new("background", table).spawn();
        bus.attach_background(handle.listener());
        handle
    }

    #[tokio::test]
    async fn test_open_without_background_shows_error() {
        let bus = MessageBus::new();
        let popup = Popup::open(&bus, Duration::from_millis(50)).await;
        assert_eq!(popup.view().settings, None);
        assert_eq!(popup.view().page, None);
        assert!(
            popup
                .view()
                .error
                .as_deref()
                .unwrap()
                .contains("Receiving end does not exist")
        );
        assert!(popup.is_enabled());
    }

    #[tokio::test]
    async fn test_failed_toggle_reverts() {
        let bus = MessageBus::new();
        let mut popup = Popup::open(&bus, Duration::from_millis(50)).await;
        assert!(popup.toggle().await.is_err());
        assert_eq!(popup.view().settings, None);
        assert!(popup.is_enabled());
    }

    #[tokio::test]
    async fn test_unconfirmed_toggle_reverts() {
        let bus = MessageBus::new();
        let _background = unconfirming_background(&bus);
        let mut popup = Popup::open(&bus, Duration::from_millis(200)).await;
        assert_eq!(popup.view().settings, Some(Settings::default()));

        let err = popup.toggle().await.unwrap_err();
        assert!(matches!(err, ContextError::Rejected(_)));
        assert!(popup.is_enabled());
        assert_eq!(popup.view().settings, Some(Settings::default()));
        assert_eq!(popup.view().error, Some(err.to_string()));
    }

    #[tokio::test]
    async fn test_action_without_active_tab() {
        let bus = MessageBus::new();
        let mut popup = Popup::open(&bus, Duration::from_millis(50)).await;
        let err = popup.run_action(ContentAction::new("ping")).await.unwrap_err();
        assert_eq!(err.to_string(), "No active tab found");
        assert_eq!(popup.view().last_result, None);
    }
}
