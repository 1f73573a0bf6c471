use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

use crate::{correlator::DEFAULT_REJECTION_NOTICE, wizard::WizardTimeouts};

pub const SETTINGS_FILE: &str = "bot.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub prompt_timeout_secs: u64,
    pub side_channel_timeout_secs: u64,
    pub preview_timeout_secs: u64,
    pub view_timeout_secs: u64,
    pub preload_pages: usize,
    pub rejection_notice: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/drafts.db".into(),
            prompt_timeout_secs: 300,
            side_channel_timeout_secs: 600,
            preview_timeout_secs: 900,
            view_timeout_secs: 120,
            preload_pages: 1,
            rejection_notice: DEFAULT_REJECTION_NOTICE.into(),
        }
    }
}

impl Settings {
    pub fn wizard_timeouts(&self) -> WizardTimeouts {
        WizardTimeouts {
            prompt: Duration::from_secs(self.prompt_timeout_secs),
            side_channel: Duration::from_secs(self.side_channel_timeout_secs),
            preview: Duration::from_secs(self.preview_timeout_secs),
        }
    }

    pub fn view_timeout(&self) -> Duration {
        Duration::from_secs(self.view_timeout_secs)
    }
}

/// Keys accepted in the settings file; anything absent keeps its default.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    database_url: Option<String>,
    prompt_timeout_secs: Option<u64>,
    side_channel_timeout_secs: Option<u64>,
    preview_timeout_secs: Option<u64>,
    view_timeout_secs: Option<u64>,
    preload_pages: Option<usize>,
    rejection_notice: Option<String>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then `path` if it exists, then `APP__*` variables from `env`.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = parsed(&env, "APP__PROMPT_TIMEOUT_SECS") {
        settings.prompt_timeout_secs = v;
    }
    if let Some(v) = parsed(&env, "APP__SIDE_CHANNEL_TIMEOUT_SECS") {
        settings.side_channel_timeout_secs = v;
    }
    if let Some(v) = parsed(&env, "APP__PREVIEW_TIMEOUT_SECS") {
        settings.preview_timeout_secs = v;
    }
    if let Some(v) = parsed(&env, "APP__VIEW_TIMEOUT_SECS") {
        settings.view_timeout_secs = v;
    }
    if let Some(v) = parsed(&env, "APP__PRELOAD_PAGES") {
        settings.preload_pages = v;
    }
    if let Some(v) = env("APP__REJECTION_NOTICE") {
        settings.rejection_notice = v;
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.prompt_timeout_secs {
        settings.prompt_timeout_secs = v;
    }
    if let Some(v) = file_cfg.side_channel_timeout_secs {
        settings.side_channel_timeout_secs = v;
    }
    if let Some(v) = file_cfg.preview_timeout_secs {
        settings.preview_timeout_secs = v;
    }
    if let Some(v) = file_cfg.view_timeout_secs {
        settings.view_timeout_secs = v;
    }
    if let Some(v) = file_cfg.preload_pages {
        settings.preload_pages = v;
    }
    if let Some(v) = file_cfg.rejection_notice {
        settings.rejection_notice = v;
    }
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
