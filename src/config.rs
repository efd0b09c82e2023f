use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::exports::ExportOptions;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/vmimport.toml";
const DEFAULT_TEMPLATE_DIR: &str = "/var/lib/vz/template/imported_templates";
const DEFAULT_EXPORTS_FILE: &str = "/etc/exports";

/// How prompts are presented to the operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    /// Line-based prompts on stdin/stdout
    #[default]
    Plain,
    /// Full-screen dialog boxes
    Dialog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ui: UiMode,
    pub template_dir: PathBuf,
    pub exports_file: PathBuf,
    pub export: ExportConfig,
    pub service: ServiceConfig,
    pub toolstack: ToolstackConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Client specification written in front of the option list
    pub clients: String,
    #[serde(flatten)]
    pub options: ExportOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Overrides the systemd unit detected from the OS family
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolstackConfig {
    pub program: String,
    pub lvm_thin_storage: String,
    pub directory_storage: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ui: UiMode::default(),
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            exports_file: PathBuf::from(DEFAULT_EXPORTS_FILE),
            export: ExportConfig::default(),
            service: ServiceConfig::default(),
            toolstack: ToolstackConfig::default(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            clients: "*".to_string(),
            options: ExportOptions::default(),
        }
    }
}

impl Default for ToolstackConfig {
    fn default() -> Self {
        Self {
            program: "qm".to_string(),
            lvm_thin_storage: "local-lvm".to_string(),
            directory_storage: "local".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.template_dir = expand_path(&config.template_dir)?;
        config.exports_file = expand_path(&config.exports_file)?;
        Ok(config)
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path {:?}", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(&temp.path().join("vmimport.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.exports_file, PathBuf::from("/etc/exports"));
        assert_eq!(config.export.clients, "*");
        assert_eq!(config.toolstack.program, "qm");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vmimport.toml");
        fs::write(
            &path,
            r#"
ui = "dialog"
template_dir = "/srv/templates"

[export]
root_squash = true

[service]
unit = "nfs-server"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.ui, UiMode::Dialog);
        assert_eq!(config.template_dir, PathBuf::from("/srv/templates"));
        assert_eq!(config.exports_file, PathBuf::from("/etc/exports"));
        assert!(config.export.options.root_squash);
        assert!(config.export.options.read_write);
        assert_eq!(config.service.unit.as_deref(), Some("nfs-server"));
        assert_eq!(config.toolstack.lvm_thin_storage, "local-lvm");
    }

    #[test]
    #[serial]
    fn test_paths_are_expanded() {
        let temp = TempDir::new().unwrap();
        std::env::set_var("VMIMPORT_TEST_ROOT", temp.path());
        let path = temp.path().join("vmimport.toml");
        fs::write(&path, "exports_file = \"$VMIMPORT_TEST_ROOT/exports\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.exports_file, temp.path().join("exports"));
        std::env::remove_var("VMIMPORT_TEST_ROOT");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vmimport.toml");
        fs::write(&path, "ui = \"curses\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
