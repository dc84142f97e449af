use std::{env, fs, path::Path, path::PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Runtime configuration loaded from `settings.yml`. A missing or malformed
/// document is a setup defect and fails fast; everything downstream of here
/// treats bad *data* as non-fatal.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub runtime: Runtime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    #[serde(default = "default_raw_json")]
    pub raw_json: PathBuf,
    #[serde(default = "default_raw_csv")]
    pub raw_csv: PathBuf,
    #[serde(default = "default_raw_xlsx")]
    pub raw_xlsx: PathBuf,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runtime {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_forecast_horizon")]
    pub forecast_horizon: u32,
    #[serde(default = "default_top_ingredients")]
    pub top_ingredients: u32,
    /// Selects the hashed aggregation backend; both backends produce
    /// identical feature tables.
    #[serde(default)]
    pub fast_aggregation: bool,
    /// Optional encoding label for raw flat-file input (defaults to UTF-8).
    #[serde(default)]
    pub input_encoding: Option<String>,
}

fn default_raw_json() -> PathBuf {
    PathBuf::from("data/raw/json")
}

fn default_raw_csv() -> PathBuf {
    PathBuf::from("data/raw/csv")
}

fn default_raw_xlsx() -> PathBuf {
    PathBuf::from("data/raw/xlsx")
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

fn default_seed() -> u64 {
    42
}

fn default_forecast_horizon() -> u32 {
    6
}

fn default_top_ingredients() -> u32 {
    12
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            raw_json: default_raw_json(),
            raw_csv: default_raw_csv(),
            raw_xlsx: default_raw_xlsx(),
            processed_dir: default_processed_dir(),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            forecast_horizon: default_forecast_horizon(),
            top_ingredients: default_top_ingredients(),
            fast_aggregation: false,
            input_encoding: None,
        }
    }
}

/// Environment toggle for the alternate aggregation backend, mirroring the
/// settings flag.
pub const FAST_AGG_ENV: &str = "FAST_AGG";

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        ensure!(
            path.exists(),
            "Settings file not found: {}",
            path.display()
        );
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading settings from {path:?}"))?;
        let mut settings: Settings = serde_yaml::from_str(&raw)
            .with_context(|| format!("Parsing settings YAML {path:?}"))?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// `FAST_AGG=1` (or true/yes/si) switches on the hashed backend without
    /// editing the settings document.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var(FAST_AGG_ENV) {
            let token = crate::data::normalize_token(&value);
            if matches!(token.as_str(), "1" | "true" | "yes" | "si") {
                self.runtime.fast_aggregation = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_fill_missing_sections() {
        let settings: Settings = serde_yaml::from_str("runtime:\n  seed: 7\n").unwrap();
        assert_eq!(settings.runtime.seed, 7);
        assert_eq!(settings.runtime.forecast_horizon, 6);
        assert_eq!(settings.paths.raw_csv, PathBuf::from("data/raw/csv"));
        assert!(!settings.runtime.fast_aggregation);
    }

    #[test]
    fn load_rejects_missing_file() {
        assert!(Settings::load(Path::new("does/not/exist.yml")).is_err());
    }
}
