use serde::Deserialize;
use std::{fs, path::Path};
use toml_edit::{DocumentMut, value};

use crate::layout;

#[derive(Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Branch the last ingest ran against; used as the default location.
    #[serde(default)]
    pub last_location: Option<String>,
    /// Override for the layout reconstructor's baseline tolerance.
    #[serde(default = "default_tolerance")]
    pub layout_tolerance: f64,
}

fn default_db_path() -> String {
    "store/reports.db".to_string()
}

fn default_tolerance() -> f64 {
    layout::Y_TOLERANCE
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: default_db_path(),
            last_location: None,
            layout_tolerance: default_tolerance(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.as_ref().exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Remember the location of the latest run without disturbing the rest
    /// of the file.
    pub fn update_last_location(
        path: impl AsRef<Path>,
        location: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = fs::read_to_string(&path).unwrap_or_default();
        let mut doc = content.parse::<DocumentMut>()?;

        doc["last_location"] = value(location);

        if let Some(dir) = path.as_ref().parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let cfg = Config::load("no/such/file.toml").unwrap();
        assert_eq!(cfg.db_path, "store/reports.db");
        assert_eq!(cfg.layout_tolerance, layout::Y_TOLERANCE);
        assert!(cfg.last_location.is_none());
    }

    #[test]
    fn test_parse_overrides() {
        let cfg: Config = toml::from_str(
            "db_path = \"other.db\"\nlast_location = \"farmacia-02\"\nlayout_tolerance = 3.5\n",
        )
        .unwrap();
        assert_eq!(cfg.db_path, "other.db");
        assert_eq!(cfg.last_location.as_deref(), Some("farmacia-02"));
        assert_eq!(cfg.layout_tolerance, 3.5);
    }
}
