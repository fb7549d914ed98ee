use super::ChatApp;
use crate::db::models::Theme;
use crate::db::{KEY_API_KEY, KEY_FIRST_VISIT, KEY_SIDEBAR_OPEN, KEY_SOUND_ENABLED, KEY_THEME};
use crate::error::AppError;
use std::collections::BTreeMap;

/// Mask a secret for display, keeping the first and last four characters.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "*".repeat(chars.len())
    }
}

impl ChatApp {
    /// Current settings for display. The API key is masked.
    pub fn get_settings(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        map.insert("provider", format!("{:?}", self.config.provider).to_lowercase());
        map.insert("model", self.config.model.clone());
        map.insert("sound_enabled", self.sound_enabled().to_string());
        map.insert("theme", format!("{:?}", self.theme()).to_lowercase());
        map.insert("sidebar_open", self.sidebar_open().to_string());

        let stored: Option<String> = self.store.load(KEY_API_KEY);
        if let Some(key) = self.config.api_key.clone().or(stored) {
            map.insert("api_key", mask_secret(&key));
        }
        if let Some(url) = &self.config.proxy_url {
            map.insert("proxy_url", url.clone());
        }
        map
    }

    /// Remember an API key entered by the user and rebuild the client. A key
    /// from configuration still wins over the saved one.
    pub fn set_api_key(&mut self, key: &str) -> Result<(), AppError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::Configuration("API key must not be empty".into()));
        }
        self.store.save(KEY_API_KEY, key);
        self.client = None;
        if self.config.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
            self.notify(
                "The configured API key takes precedence over the saved one. \
                 Unset URDU_GPT__API_KEY to use it.",
            );
        }
        Ok(())
    }

    pub fn sound_enabled(&self) -> bool {
        self.store.load_or(KEY_SOUND_ENABLED, true)
    }

    /// Flip the sound setting, returning the new value.
    pub fn toggle_sound(&mut self) -> bool {
        let enabled = !self.sound_enabled();
        self.store.save(KEY_SOUND_ENABLED, &enabled);
        self.notify(if enabled {
            "Sound enabled. Message sounds have been turned on."
        } else {
            "Sound disabled. Message sounds have been turned off."
        });
        enabled
    }

    pub fn theme(&self) -> Theme {
        self.store.load(KEY_THEME)
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.store.save(KEY_THEME, &theme);
    }

    pub fn sidebar_open(&self) -> bool {
        self.store.load_or(KEY_SIDEBAR_OPEN, true)
    }

    pub fn toggle_sidebar(&mut self) -> bool {
        let open = !self.sidebar_open();
        self.store.save(KEY_SIDEBAR_OPEN, &open);
        open
    }

    pub fn is_first_visit(&self) -> bool {
        !self.store.contains(KEY_FIRST_VISIT)
    }

    pub fn mark_visited(&mut self) {
        self.store.save(KEY_FIRST_VISIT, &true);
    }
}
