use std::path::Path;

use beam_core::LaserSettings;

/// Read settings from a JSON file. Missing fields keep their defaults and
/// out-of-range values are clamped.
pub fn load_settings(path: &Path) -> Result<LaserSettings, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read settings {}: {}", path.display(), e))?;
    let settings: LaserSettings = serde_json::from_str(&json)
        .map_err(|e| format!("Invalid settings {}: {}", path.display(), e))?;
    Ok(settings.sanitized())
}

/// Write settings to disk as pretty JSON.
pub fn save_settings(path: &Path, settings: &LaserSettings) -> Result<(), String> {
    let json = serde_json::to_string_pretty(settings).map_err(|e| e.to_string())?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write settings {}: {}", path.display(), e))
}
