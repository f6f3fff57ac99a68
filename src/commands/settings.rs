use crate::db::Database;
use crate::models::Settings;
use crate::services::keywords::KeywordTable;
use crate::services::state::AppState;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPayload {
    pub ocr_language: Option<String>,
    pub keywords_path: Option<String>,
    pub staging_dir: Option<String>,
    pub watch_folder: Option<String>,
}

const KEYS: [&str; 3] = ["keywords_path", "staging_dir", "watch_folder"];

pub fn load_settings(db: &Database) -> Result<Settings, String> {
    let get = |key: &str| db.get_setting(key).map_err(|e| e.to_string());
    let defaults = Settings::default();
    Ok(Settings {
        ocr_language: get("ocr_language")?.unwrap_or(defaults.ocr_language),
        keywords_path: get(KEYS[0])?,
        staging_dir: get(KEYS[1])?,
        watch_folder: get(KEYS[2])?,
    })
}

pub async fn get_settings(state: &AppState) -> Result<Settings, String> {
    let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
    load_settings(&db)
}

/// Persists the given fields. An empty string clears an optional setting.
pub async fn save_settings(payload: SettingsPayload, state: &AppState) -> Result<Settings, String> {
    if let Some(path) = payload.keywords_path.as_deref().filter(|p| !p.trim().is_empty()) {
        KeywordTable::load(std::path::Path::new(path)).map_err(|e| e.to_string())?;
    }

    let settings = {
        let db = state.db.lock().map_err(|_| "DB lock".to_string())?;
        if let Some(language) = payload.ocr_language.as_deref() {
            if language.trim().is_empty() {
                return Err("OCR language must not be empty".to_string());
            }
            db.set_setting("ocr_language", language.trim()).map_err(|e| e.to_string())?;
        }

        let values = [payload.keywords_path, payload.staging_dir, payload.watch_folder];
        for (key, value) in KEYS.iter().zip(values) {
            match value {
                Some(value) if value.trim().is_empty() => db.clear_setting(key).map_err(|e| e.to_string())?,
                Some(value) => db.set_setting(key, value.trim()).map_err(|e| e.to_string())?,
                None => {}
            }
        }
        load_settings(&db)?
    };

    state.update_settings(settings.clone()).map_err(|e| e.to_string())?;
    Ok(settings)
}
