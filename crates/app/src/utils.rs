//! Settings persistence and small display helpers.

use shared::settings::AppSettings;
use std::path::PathBuf;

fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "deepthink")
        .map(|dirs| dirs.config_dir().join("settings.json"))
}

/// Load settings from disk or return defaults.
pub fn load_settings_or_default() -> AppSettings {
    if let Some(path) = config_path() {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            match serde_json::from_str::<AppSettings>(&contents) {
                Ok(settings) => return settings,
                Err(e) => tracing::warn!("settings file unreadable, using defaults: {e}"),
            }
        }
    }
    AppSettings::default()
}

/// Save settings to disk. Failures are logged, never fatal.
pub fn save_settings(settings: &AppSettings) {
    let Some(path) = config_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match serde_json::to_string_pretty(settings) {
        Ok(json) => {
            if let Err(e) = std::fs::write(&path, json) {
                tracing::warn!("could not save settings: {e}");
            }
        }
        Err(e) => tracing::warn!("could not serialize settings: {e}"),
    }
}

/// Hand text to the window system clipboard through egui's platform output.
pub fn copy_to_clipboard(ctx: &egui::Context, text: &str) {
    ctx.output_mut(|o| o.copied_text = text.to_string());
}

/// "Total Thinking: 12.3s" header label text.
pub fn format_thinking(total_secs: f64) -> String {
    format!("Total Thinking: {total_secs:.1}s")
}

/// "API Credits: $1.23" header label text.
pub fn format_balance(balance: f64) -> String {
    format!("API Credits: ${balance:.2}")
}
