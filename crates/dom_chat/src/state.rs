//! Shared application state.
//!
//! A small store holding the signed-in user, a global loading flag and UI
//! preferences. Cloning an [`AppState`] yields another handle onto the same
//! store; the session orchestrator uses it to drop the user on an auth
//! failure.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// The signed-in user, as returned by the identity endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub tenant_id: String,
    pub email: String,
    pub is_active: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ja,
    En,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

/// UI preferences.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UiSettings {
    pub theme: Theme,
    pub language: Language,
    pub font_size: FontSize,
}

/// Partial update of [`UiSettings`]; unset fields are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct UiSettingsPatch {
    pub theme: Option<Theme>,
    pub language: Option<Language>,
    pub font_size: Option<FontSize>,
}

impl UiSettingsPatch {
    pub fn theme(mut self, theme: Theme) -> Self {
        self.theme = Some(theme);
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn font_size(mut self, font_size: FontSize) -> Self {
        self.font_size = Some(font_size);
        self
    }
}

#[derive(Debug, Default)]
struct Inner {
    current_user: Option<User>,
    loading: usize,
    ui_settings: UiSettings,
}

/// Handle onto the shared application state.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    inner: Arc<RwLock<Inner>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.read().current_user.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.read().current_user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.inner
            .read()
            .current_user
            .as_ref()
            .map(|u| u.is_admin)
            .unwrap_or(false)
    }

    /// Set or clear the signed-in user.
    pub fn set_current_user(&self, user: Option<User>) {
        self.inner.write().current_user = user;
    }

    pub fn is_loading(&self) -> bool {
        self.inner.read().loading > 0
    }

    /// Force the loading flag. Outstanding guards are forgotten.
    pub fn set_loading(&self, loading: bool) {
        self.inner.write().loading = usize::from(loading);
    }

    /// Mark the app loading until the returned guard is dropped.
    ///
    /// Guards nest: the flag clears when the last one goes away.
    pub fn loading_guard(&self) -> LoadingGuard {
        self.inner.write().loading += 1;
        LoadingGuard {
            state: self.clone(),
        }
    }

    pub fn ui_settings(&self) -> UiSettings {
        self.inner.read().ui_settings
    }

    /// Merge `patch` into the UI settings and return the result.
    pub fn update_ui_settings(&self, patch: UiSettingsPatch) -> UiSettings {
        let mut inner = self.inner.write();
        let settings = &mut inner.ui_settings;
        if let Some(theme) = patch.theme {
            settings.theme = theme;
        }
        if let Some(language) = patch.language {
            settings.language = language;
        }
        if let Some(font_size) = patch.font_size {
            settings.font_size = font_size;
        }
        *settings
    }
}

/// Keeps [`AppState::is_loading`] true while alive.
#[must_use = "the loading flag clears as soon as the guard is dropped"]
pub struct LoadingGuard {
    state: AppState,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let mut inner = self.state.inner.write();
        inner.loading = inner.loading.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_admin: bool) -> User {
        User {
            id: "u-1".into(),
            tenant_id: "t-1".into(),
            email: "user@example.com".into(),
            is_active: true,
            is_admin,
        }
    }

    #[test]
    fn test_defaults() {
        let state = AppState::new();
        assert!(!state.is_logged_in());
        assert!(!state.is_admin());
        assert!(!state.is_loading());

        let settings = state.ui_settings();
        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.language, Language::Ja);
        assert_eq!(settings.font_size, FontSize::Medium);
    }

    #[test]
    fn test_user_is_shared_between_handles() {
        let state = AppState::new();
        let other = state.clone();

        state.set_current_user(Some(user(true)));
        assert!(other.is_logged_in());
        assert!(other.is_admin());

        other.set_current_user(None);
        assert!(state.current_user().is_none());
    }

    #[test]
    fn test_partial_ui_update() {
        let state = AppState::new();
        let settings = state.update_ui_settings(UiSettingsPatch::default().theme(Theme::Dark));

        assert_eq!(settings.theme, Theme::Dark);
        assert_eq!(settings.language, Language::Ja);
        assert_eq!(state.ui_settings(), settings);
    }

    #[test]
    fn test_loading_guards_nest() {
        let state = AppState::new();
        let outer = state.loading_guard();
        let inner = state.loading_guard();
        drop(inner);
        assert!(state.is_loading());
        drop(outer);
        assert!(!state.is_loading());

        state.set_loading(true);
        assert!(state.is_loading());
        state.set_loading(false);
        assert!(!state.is_loading());
    }

    #[test]
    fn test_ui_settings_wire_format() {
        let json = serde_json::to_value(UiSettings::default()).unwrap();
        assert_eq!(json["theme"], "light");
        assert_eq!(json["font_size"], "medium");
    }
}
