//! Persisted records: `settings` and `userData`.

use serde::{Deserialize, Serialize};

/// Color theme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// The full settings record.
///
/// Always stored whole; partial updates go through [`SettingsPatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub enabled: bool,
    pub theme: Theme,
    pub notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            theme: Theme::System,
            notifications: true,
        }
    }
}

impl Settings {
    /// Shallow-merge `patch` over `self`.
    #[must_use]
    pub fn merged(self, patch: &SettingsPatch) -> Self {
        Self {
            enabled: patch.enabled.unwrap_or(self.enabled),
            theme: patch.theme.unwrap_or(self.theme),
            notifications: patch.notifications.unwrap_or(self.notifications),
        }
    }
}

/// Partial settings record carried by `UPDATE_SETTINGS`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<bool>,
}

impl SettingsPatch {
    #[must_use]
    pub const fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            theme: None,
            notifications: None,
        }
    }

    #[must_use]
    pub const fn theme(theme: Theme) -> Self {
        Self {
            enabled: None,
            theme: Some(theme),
            notifications: None,
        }
    }

    #[must_use]
    pub const fn notifications(notifications: bool) -> Self {
        Self {
            enabled: None,
            theme: None,
            notifications: Some(notifications),
        }
    }

    /// A patch that overwrites every field.
    #[must_use]
    pub const fn full(settings: Settings) -> Self {
        Self {
            enabled: Some(settings.enabled),
            theme: Some(settings.theme),
            notifications: Some(settings.notifications),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.theme.is_none() && self.notifications.is_none()
    }
}

/// Visit bookkeeping stored under `userData`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    /// Unix epoch milliseconds of the most recent visit.
    pub last_visit: i64,
    pub visit_count: u64,
}

impl UserData {
    /// Count one more visit at `now_ms`.
    #[must_use]
    pub const fn visited(self, now_ms: i64) -> Self {
        Self {
            last_visit: now_ms,
            visit_count: self.visit_count.saturating_add(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "enabled": true, "theme": "system", "notifications": true })
        );
    }

    #[test]
    fn test_merge_is_shallow() {
        let current = Settings {
            enabled: false,
            theme: Theme::Light,
            notifications: true,
        };
        let merged = current.merged(&SettingsPatch::theme(Theme::Dark));
        assert_eq!(merged.theme, Theme::Dark);
        assert!(!merged.enabled);
        assert!(merged.notifications);
        assert_eq!(current.merged(&SettingsPatch::default()), current);
    }

    #[test]
    fn test_patch_skips_absent_fields() {
        let json = serde_json::to_string(&SettingsPatch::notifications(false)).unwrap();
        assert_eq!(json, r#"{"notifications":false}"#);

        let parsed: SettingsPatch = serde_json::from_str(r#"{"theme":"dark"}"#).unwrap();
        assert_eq!(parsed, SettingsPatch::theme(Theme::Dark));
    }

    #[test]
    fn test_settings_rejects_partial_record() {
        let parsed = serde_json::from_str::<Settings>(r#"{"enabled":true}"#);
        assert!(parsed.is_err());
        assert!(serde_json::from_str::<Settings>(
            r#"{"enabled":true,"theme":"sepia","notifications":true}"#
        )
        .is_err());
    }

    #[test]
    fn test_user_data_wire_names() {
        let data = UserData::default().visited(1_700_000_000_000).visited(1_700_000_000_500);
        let json = serde_json::to_value(data).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "lastVisit": 1_700_000_000_500_i64, "visitCount": 2 })
        );
    }
}
