//! Channel adapters: one outbound message, one structured response.

use std::time::Duration;

use ext_bridge_core::{Envelope, Message, MessageResponse, SenderContext, TabId, WireResponse};
use ext_bridge_router::Listener;

use crate::{MessageBus, TransportError};

/// Where a message should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Background,
    Tab(TabId),
    /// The active tab of the focused window, resolved at send time.
    ActiveTab,
}

/// A context's outbound side.
///
/// Every call resolves to a [`MessageResponse`]; transport problems become
/// `{ success: false, error }` and every call is bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct Channel {
    bus: MessageBus,
    sender: SenderContext,
    timeout: Duration,
}

impl Channel {
    /// Create a channel that identifies itself as `sender`.
    #[must_use]
    pub const fn new(bus: MessageBus, sender: SenderContext, timeout: Duration) -> Self {
        Self {
            bus,
            sender,
            timeout,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn bus(&self) -> &MessageBus {
        &self.bus
    }

    #[must_use]
    pub const fn sender(&self) -> &SenderContext {
        &self.sender
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send to the background context.
    pub async fn send_to_background<M: Message>(&self, message: M) -> MessageResponse<M::Response> {
        self.send(Destination::Background, &message).await
    }

    /// Send to the content script of `tab_id`.
    pub async fn send_to_tab<M: Message>(
        &self,
        tab_id: TabId,
        message: M,
    ) -> MessageResponse<M::Response> {
        self.send(Destination::Tab(tab_id), &message).await
    }

    /// Send to the content script of the focused window's active tab.
    pub async fn send_to_active_tab<M: Message>(&self, message: M) -> MessageResponse<M::Response> {
        self.send(Destination::ActiveTab, &message).await
    }

    /// Send a typed message and decode the reply.
    pub async fn send<M: Message>(
        &self,
        destination: Destination,
        message: &M,
    ) -> MessageResponse<M::Response> {
        let envelope = match Envelope::new(message) {
            Ok(envelope) => envelope,
            Err(e) => return MessageResponse::err(TransportError::Encode(e).to_string()),
        };
        self.send_envelope(destination, envelope).await.decode()
    }

    /// Send a raw envelope. Transport failures become failed responses.
    pub async fn send_envelope(
        &self,
        destination: Destination,
        envelope: Envelope,
    ) -> WireResponse {
        let kind = envelope.kind.clone();
        match self.request(destination, envelope).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(?destination, %kind, "Message not delivered: {e}");
                WireResponse::err(e.to_string())
            }
        }
    }

    /// Send a raw envelope and wait for the reply.
    ///
    /// # Errors
    /// Returns error if no destination resolves, nothing listens there, the
    /// destination goes away mid-call, or the reply misses the deadline.
    pub async fn request(
        &self,
        destination: Destination,
        envelope: Envelope,
    ) -> Result<WireResponse, TransportError> {
        let listener = self.resolve(destination)?;
        let exchange = async {
            let reply = listener
                .deliver(envelope, self.sender.clone())
                .await
                .map_err(|_| TransportError::NoReceiver)?;
            reply.await.map_err(|_| TransportError::PortClosed)
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(
                u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    fn resolve(&self, destination: Destination) -> Result<Listener, TransportError> {
        match destination {
            Destination::Background => self.bus.background(),
            Destination::Tab(tab_id) => self.bus.tab_listener(tab_id),
            Destination::ActiveTab => {
                let tab = self.bus.active_tab().ok_or(TransportError::NoActiveTab)?;
                self.bus.tab_listener(tab.id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ext_bridge_core::{
        Ack, ContentAction, ContentActionResult, GetSettings, GetTabInfo, Origin, PageInfo,
        Settings, ToggleExtension,
    };
    use ext_bridge_router::{HandlerTable, Router, RouterHandle};

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn background(bus: &MessageBus) -> RouterHandle {
        let table = HandlerTable::new()
            .on(|_: GetSettings, _| async { Ok(Some(Settings::default())) })
            .on(|_: ToggleExtension, sender: SenderContext| async move {
                assert_eq!(sender.origin, Origin::Popup);
                Ok(Ack::OK)
            });
        let handle = Router::new("background", table).spawn();
        bus.attach_background(handle.listener());
        handle
    }

    fn content_script(bus: &MessageBus, tab_id: TabId) -> RouterHandle {
        let table = HandlerTable::new()
            .on(|_: GetTabInfo, _| async move {
                Ok(PageInfo {
                    url: "https://a.test".to_string(),
                    title: "A".to_string(),
                })
            })
            .on(|msg: ContentAction, _| async move {
                if msg.action == "hang" {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok(ContentActionResult {
                    success: true,
                    result: None,
                })
            });
        let handle = Router::new(format!("tab-{tab_id}"), table).spawn();
        bus.attach_content_script(tab_id, handle.listener()).unwrap();
        handle
    }

    fn popup(bus: &MessageBus) -> Channel {
        Channel::new(bus.clone(), SenderContext::popup(), TIMEOUT)
    }

    #[tokio::test]
    async fn test_send_to_background() {
        let bus = MessageBus::new();
        let _bg = background(&bus);

        let settings = popup(&bus).send_to_background(GetSettings).await;
        assert_eq!(settings.into_result(), Ok(Some(Settings::default())));

        let ack = popup(&bus)
            .send_to_background(ToggleExtension { enabled: true })
            .await;
        assert_eq!(ack.into_result(), Ok(Ack::OK));
    }

    #[tokio::test]
    async fn test_background_absent() {
        let bus = MessageBus::new();
        let response = popup(&bus).send_to_background(GetSettings).await;
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Could not establish connection. Receiving end does not exist.")
        );
    }

    #[tokio::test]
    async fn test_tab_without_listener_fails_fast() {
        let bus = MessageBus::new();
        let tab = bus.open_tab(1, "chrome://settings", "Settings");

        let response = popup(&bus)
            .send_to_tab(tab.id, ContentAction::new("ping"))
            .await;
        assert!(!response.success);
        assert!(response.data.is_none());
        assert!(response.error.unwrap().contains("Receiving end does not exist"));

        let response = popup(&bus).send_to_tab(77, GetTabInfo).await;
        assert_eq!(response.error.as_deref(), Some("No tab with id: 77"));
    }

    #[tokio::test]
    async fn test_active_tab_resolution() {
        let bus = MessageBus::new();
        let response = popup(&bus).send_to_active_tab(GetTabInfo).await;
        assert_eq!(response.error.as_deref(), Some("No active tab found"));

        let tab = bus.open_tab(1, "https://a.test", "A");
        let _cs = content_script(&bus, tab.id);
        let info = popup(&bus).send_to_active_tab(GetTabInfo).await.into_result().unwrap();
        assert_eq!(info.title, "A");
    }

    #[tokio::test]
    async fn test_unresponsive_tab_times_out() {
        let bus = MessageBus::new();
        let tab = bus.open_tab(1, "https://a.test", "A");
        let _cs = content_script(&bus, tab.id);

        let channel = popup(&bus).with_timeout(Duration::from_millis(50));
        let response = channel.send_to_tab(tab.id, ContentAction::new("hang")).await;
        assert_eq!(response.error.as_deref(), Some("No response within 50 ms"));
    }

    #[tokio::test]
    async fn test_teardown_mid_call_closes_port() {
        let bus = MessageBus::new();
        let tab = bus.open_tab(1, "https://a.test", "A");
        let cs = content_script(&bus, tab.id);

        let channel = popup(&bus).with_timeout(Duration::from_secs(5));
        let pending = tokio::spawn(async move {
            channel.send_to_tab(tab.id, ContentAction::new("hang")).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cs.shutdown();

        let response = pending.await.unwrap();
        assert_eq!(
            response.error.as_deref(),
            Some("The message port closed before a response was received.")
        );
    }
}
