use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::app::SendSettings;
use crate::constants::{DEFAULT_PRIMARY_LOCALE, DEFAULT_SECONDARY_LOCALE, DEFAULT_SOURCE_SYSTEM, DEFAULT_TARGET_SYSTEM};
use crate::error::{MigratorError, Result};
use crate::types::LocalePair;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub locales: LocalesConfig,
    pub migration: MigrationConfig,
    pub target: TargetConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalesConfig {
    pub primary: String,
    pub secondary: String,
    /// Market code tagged onto sent entries
    pub market: Option<String>,
}

impl Default for LocalesConfig {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PRIMARY_LOCALE.to_string(),
            secondary: DEFAULT_SECONDARY_LOCALE.to_string(),
            market: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub database_path: String,
    pub source_system: String,
    pub target_system: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            database_path: "data/migrations.db".to_string(),
            source_system: DEFAULT_SOURCE_SYSTEM.to_string(),
            target_system: DEFAULT_TARGET_SYSTEM.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Directory the filesystem target writes entries into
    pub entries_dir: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            entries_dir: "data/entries".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: "logs".to_string() }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            MigratorError::Config(format!("Failed to read config file '{}': {}", config_path.display(), e))
        })?;
        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file means all defaults
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            debug!("No config file at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Apply `MIGRATOR_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = value.trim().to_string();
            }
        };
        set(&mut self.locales.primary, "MIGRATOR_PRIMARY_LOCALE");
        set(&mut self.locales.secondary, "MIGRATOR_SECONDARY_LOCALE");
        set(&mut self.migration.database_path, "MIGRATOR_DB_PATH");
        set(&mut self.migration.source_system, "MIGRATOR_SOURCE_SYSTEM");
        set(&mut self.migration.target_system, "MIGRATOR_TARGET_SYSTEM");
        set(&mut self.target.entries_dir, "MIGRATOR_ENTRIES_DIR");
        set(&mut self.logging.dir, "MIGRATOR_LOG_DIR");
        if let Some(market) = lookup("MIGRATOR_MARKET").filter(|v| !v.trim().is_empty()) {
            self.locales.market = Some(market.trim().to_string());
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("locales.primary", &self.locales.primary),
            ("locales.secondary", &self.locales.secondary),
            ("migration.database_path", &self.migration.database_path),
            ("migration.source_system", &self.migration.source_system),
            ("migration.target_system", &self.migration.target_system),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(MigratorError::Config(format!("'{name}' must not be empty")));
            }
        }
        if self.locales.primary == self.locales.secondary {
            return Err(MigratorError::Config(
                "primary and secondary locales must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn locale_pair(&self) -> LocalePair {
        LocalePair::new(&self.locales.primary, &self.locales.secondary)
    }

    pub fn send_settings(&self) -> SendSettings {
        SendSettings {
            source_system: self.migration.source_system.clone(),
            target_system: self.migration.target_system.clone(),
            locales: self.locale_pair(),
            market: self.locales.market.clone(),
            allow_unmet_dependencies: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [locales]
            primary = "sq-AL"
            secondary = "en"
            market = "AL"
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.locale_pair(), LocalePair::new("sq-AL", "en"));
        assert_eq!(config.migration.source_system, "aem");
        assert_eq!(config.target.entries_dir, "data/entries");
        assert_eq!(config.send_settings().market.as_deref(), Some("AL"));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.locales.primary, "en-US");
        assert!(Config::load(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("MIGRATOR_MARKET", "XK"),
            ("MIGRATOR_DB_PATH", "/tmp/m.db"),
            ("MIGRATOR_TARGET_SYSTEM", "  "),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.locales.market.as_deref(), Some("XK"));
        assert_eq!(config.migration.database_path, "/tmp/m.db");
        assert_eq!(config.migration.target_system, "contentful");
    }

    #[test]
    fn identical_locales_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[locales]\nprimary = \"en\"\nsecondary = \"en\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(MigratorError::Config(_))));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[locales\nprimary = 1").unwrap();
        assert!(matches!(Config::load(&path), Err(MigratorError::Toml(_))));
    }
}
