//! Options page controller.

use std::time::Duration;

use ext_bridge_core::{GetSettings, SenderContext, Settings, SettingsPatch, Theme, UpdateSettings};
use ext_bridge_transport::{Channel, MessageBus};

use crate::{
    ContextError,
    error::{accepted, acknowledged},
};

/// The options page. Every edit goes through `UPDATE_SETTINGS`; the local
/// copy only changes once the background confirms.
#[derive(Debug)]
pub struct OptionsPage {
    channel: Channel,
    settings: Settings,
    status: Option<String>,
}

impl OptionsPage {
    /// Open the page and load the current settings. Absent settings show as
    /// the defaults.
    ///
    /// # Errors
    /// Returns error if the background cannot be reached.
    pub async fn load(bus: &MessageBus, timeout: Duration) -> Result<Self, ContextError> {
        let channel = Channel::new(bus.clone(), SenderContext::options(), timeout);
        let settings = accepted(channel.send_to_background(GetSettings).await)?;
        Ok(Self {
            channel,
            settings: settings.unwrap_or_default(),
            status: None,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Outcome of the last save, for display.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// # Errors
    /// Returns error if the background rejects or never answers.
    pub async fn set_theme(&mut self, theme: Theme) -> Result<(), ContextError> {
        self.save(SettingsPatch::theme(theme)).await
    }

    /// # Errors
    /// Returns error if the background rejects or never answers.
    pub async fn set_notifications(&mut self, notifications: bool) -> Result<(), ContextError> {
        self.save(SettingsPatch::notifications(notifications)).await
    }

    /// # Errors
    /// Returns error if the background rejects or never answers.
    pub async fn set_enabled(&mut self, enabled: bool) -> Result<(), ContextError> {
        self.save(SettingsPatch::enabled(enabled)).await
    }

    /// Restore every field to its default.
    ///
    /// # Errors
    /// Returns error if the background rejects or never answers.
    pub async fn reset(&mut self) -> Result<(), ContextError> {
        self.save(SettingsPatch::full(Settings::default())).await
    }

    async fn save(&mut self, patch: SettingsPatch) -> Result<(), ContextError> {
        match acknowledged(self.channel.send_to_background(UpdateSettings(patch)).await) {
            Ok(()) => {
                self.settings = self.settings.merged(&patch);
                self.status = Some("Settings saved".to_string());
                Ok(())
            }
            Err(e) => {
                tracing::warn!(?patch, "Saving settings failed: {e}");
                self.status = Some(e.to_string());
                Err(e)
            }
        }
    }
}
