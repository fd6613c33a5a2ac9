//! Typed request payloads and the wire envelope.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{MessageKind, Settings, SettingsPatch};

/// A request payload bound to exactly one kind.
///
/// The associated `Response` is the shape of `data` in a successful reply.
pub trait Message: Serialize + DeserializeOwned + Send + 'static {
    const KIND: MessageKind;
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// Generic acknowledgement `{ success }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub const OK: Self = Self { success: true };
}

/// `{ url, title }` of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// `GET_TAB_INFO`: no payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTabInfo;

impl Message for GetTabInfo {
    const KIND: MessageKind = MessageKind::GetTabInfo;
    type Response = PageInfo;
}

/// `TOGGLE_EXTENSION { enabled }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleExtension {
    pub enabled: bool,
}

impl Message for ToggleExtension {
    const KIND: MessageKind = MessageKind::ToggleExtension;
    type Response = Ack;
}

/// `GET_SETTINGS`: no payload. Answers `null` before initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSettings;

impl Message for GetSettings {
    const KIND: MessageKind = MessageKind::GetSettings;
    type Response = Option<Settings>;
}

/// `UPDATE_SETTINGS`: a partial settings record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateSettings(pub SettingsPatch);

impl Message for UpdateSettings {
    const KIND: MessageKind = MessageKind::UpdateSettings;
    type Response = Ack;
}

/// `CONTENT_ACTION { action, data? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAction {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ContentAction {
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Reply data of `CONTENT_ACTION`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Message for ContentAction {
    const KIND: MessageKind = MessageKind::ContentAction;
    type Response = ContentActionResult;
}

/// `EXTENSION_STATE_CHANGED { enabled }`, sent by the background to tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionStateChanged {
    pub enabled: bool,
}

impl Message for ExtensionStateChanged {
    const KIND: MessageKind = MessageKind::ExtensionStateChanged;
    type Response = Ack;
}

/// What actually travels between contexts: `{ type, payload }`.
///
/// `type` is kept as a raw string so that a receiver can answer tags it does
/// not know instead of failing to decode the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Encode a typed message.
    ///
    /// # Errors
    /// Returns error if the payload fails to serialize.
    pub fn new<M: Message>(message: &M) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: M::KIND.as_str().to_string(),
            payload: serde_json::to_value(message)?,
        })
    }

    /// Build an envelope from an arbitrary tag and payload.
    #[must_use]
    pub fn raw(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// The kind, if the tag is one this build knows.
    #[must_use]
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::parse(&self.kind)
    }
}
