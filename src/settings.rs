//! `settings.json` in the data folder.
//!
//! Every key is optional. A kiosk must come up even with a broken settings
//! file, so loading never fails outright: each key with the right JSON type
//! overrides its default, and anything else is collected into an error that
//! is returned next to the settings for the caller to report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::SettingsError;

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Crossfade length in seconds.
    pub fade_seconds: f64,
    /// Image drawn behind all media, relative to the data folder.
    pub background_image: String,
    pub rotate_content_180_degrees: bool,
    pub fullscreen: bool,
    pub mouse_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fade_seconds: 1.0,
            background_image: String::new(),
            rotate_content_180_degrees: false,
            fullscreen: true,
            mouse_enabled: false,
        }
    }
}

impl Settings {
    /// Loads the settings file. Whatever could be applied is kept even when
    /// an error is returned.
    pub fn load(data_folder: &Path) -> (Self, Option<SettingsError>) {
        let path = data_folder.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(source) => return (Self::default(), Some(SettingsError::Read { path, source })),
        };
        let json = match serde_json::from_str::<Value>(&raw) {
            Ok(json) => json,
            Err(source) => return (Self::default(), Some(SettingsError::Parse { path, source })),
        };

        let (settings, problems) = match json.as_object() {
            Some(object) => Self::from_object(object),
            None => (Self::default(), vec!["expected a JSON object".to_string()]),
        };
        let error = (!problems.is_empty()).then(|| SettingsError::Invalid { path, problems });
        (settings, error)
    }

    /// Applies every known key whose value has the expected type. `null`
    /// leaves the default in place.
    pub fn from_object(object: &Map<String, Value>) -> (Self, Vec<String>) {
        let mut settings = Self::default();
        let mut problems = Vec::new();

        for (key, value) in object {
            if value.is_null() {
                continue;
            }
            let applied = match key.as_str() {
                "fadeSeconds" => value.as_f64().map(|v| settings.fade_seconds = v),
                "backgroundImage" => value
                    .as_str()
                    .map(|v| settings.background_image = v.to_string()),
                "rotateContent180Degrees" => value
                    .as_bool()
                    .map(|v| settings.rotate_content_180_degrees = v),
                "fullscreen" => value.as_bool().map(|v| settings.fullscreen = v),
                "mouseEnabled" => value.as_bool().map(|v| settings.mouse_enabled = v),
                _ => {
                    problems.push(format!("unknown key `{}`", key));
                    continue;
                }
            };
            if applied.is_none() {
                problems.push(format!("`{}` has the wrong type ({})", key, value));
            }
        }

        (settings, problems)
    }

    /// Fade length, with nonsense values treated as "no fade".
    pub fn fade_duration(&self) -> Duration {
        if self.fade_seconds.is_finite() && self.fade_seconds > 0.0 {
            Duration::from_secs_f64(self.fade_seconds)
        } else {
            Duration::ZERO
        }
    }

    pub fn background_path(&self, data_folder: &Path) -> Option<PathBuf> {
        (!self.background_image.is_empty()).then(|| data_folder.join(&self.background_image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"fadeSeconds": 0.5, "backgroundImage": "bg.png"}"#,
        )
        .unwrap();

        let (settings, err) = Settings::load(dir.path());
        assert!(err.is_none());
        assert_eq!(settings.fade_duration(), Duration::from_millis(500));
        assert_eq!(
            settings.background_path(dir.path()),
            Some(dir.path().join("bg.png"))
        );
        assert!(!settings.rotate_content_180_degrees);
    }

    #[test]
    fn missing_file_yields_defaults_and_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, err) = Settings::load(dir.path());
        assert_eq!(settings, Settings::default());
        assert!(matches!(err, Some(SettingsError::Read { .. })));
    }

    #[test]
    fn wrong_types_and_unknown_keys_keep_the_valid_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"fadeSeconds": 0.5, "rotateContent180Degrees": true, "fullscreen": "yes", "dmxPort": "COM3"}"#,
        )
        .unwrap();

        let (settings, err) = Settings::load(dir.path());
        assert_eq!(settings.fade_duration(), Duration::from_millis(500));
        assert!(settings.rotate_content_180_degrees);
        assert!(settings.fullscreen);

        match err {
            Some(SettingsError::Invalid { problems, .. }) => {
                assert_eq!(problems.len(), 2);
                assert!(problems.iter().any(|p| p.contains("fullscreen")));
                assert!(problems.iter().any(|p| p.contains("dmxPort")));
            }
            other => panic!("expected an invalid settings error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);

        std::fs::write(&path, r#"{"fadeSeconds": 0.5"#).unwrap();
        let (settings, err) = Settings::load(dir.path());
        assert_eq!(settings, Settings::default());
        assert!(matches!(err, Some(SettingsError::Parse { .. })));

        std::fs::write(&path, "[1, 2]").unwrap();
        let (settings, err) = Settings::load(dir.path());
        assert_eq!(settings, Settings::default());
        assert!(matches!(err, Some(SettingsError::Invalid { .. })));
    }

    #[test]
    fn null_values_keep_defaults_silently() {
        let object = serde_json::json!({"fadeSeconds": null, "mouseEnabled": true});
        let (settings, problems) = Settings::from_object(object.as_object().unwrap());
        assert!(problems.is_empty());
        assert_eq!(settings.fade_seconds, 1.0);
        assert!(settings.mouse_enabled);
    }

    #[test]
    fn negative_fade_means_no_fade() {
        let settings = Settings {
            fade_seconds: -2.0,
            ..Settings::default()
        };
        assert_eq!(settings.fade_duration(), Duration::ZERO);
        assert_eq!(settings.background_path(Path::new("/data")), None);
    }
}
