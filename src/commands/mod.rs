use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::exports::{ExportConfigManager, ExportEntry, ExportOptions};
use crate::provision::ServiceProvisioner;
use crate::system::{CommandRunner, SystemRunner};
use anyhow::{bail, Result};
use std::path::Path;

mod export;
mod provision;
mod reload;
mod run;
mod status;

pub fn execute(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let runner = SystemRunner;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run::execute(&config, &runner),

        Commands::Provision => provision::execute(&config, &runner),

        Commands::Export(args) => export::execute(&config, &runner, args),

        Commands::Reload => reload::execute(&config, &runner),

        Commands::Status => status::execute(&config, &runner),
    }
}

/// Config file values with command-line overrides applied.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.config)?;
    if let Some(exports_file) = &cli.exports_file {
        config.exports_file = exports_file.clone();
    }
    if let Some(template_dir) = &cli.template_dir {
        config.template_dir = template_dir.clone();
    }
    if let Some(ui) = cli.ui {
        config.ui = ui;
    }
    tracing::debug!(?config, "resolved configuration");
    Ok(config)
}

fn provisioner<'a>(config: &Config, runner: &'a dyn CommandRunner) -> ServiceProvisioner<'a> {
    ServiceProvisioner::new(runner).with_unit(config.service.unit.clone())
}

fn export_manager<'a>(
    config: &Config,
    runner: &'a dyn CommandRunner,
) -> ExportConfigManager<'a> {
    let unit = provisioner(config, runner).service_unit();
    ExportConfigManager::new(&config.exports_file, unit, runner)
}

/// Export entry for `dir` using the configured client specification.
fn export_entry(config: &Config, dir: &Path, options: ExportOptions) -> Result<ExportEntry> {
    if !dir.is_absolute() {
        bail!("Export path {:?} must be absolute", dir);
    }
    let Some(path) = dir.to_str() else {
        bail!("Export path {:?} is not valid UTF-8", dir);
    };
    if path.chars().any(char::is_whitespace) {
        bail!("Export path {:?} must not contain whitespace", dir);
    }
    Ok(ExportEntry::new(path, options).with_clients(&config.export.clients))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_cli_overrides_config_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("vmimport.toml");
        std::fs::write(&config_path, "template_dir = \"/from/file\"\nui = \"dialog\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "vmimport",
            "--config",
            config_path.to_str().unwrap(),
            "--exports-file",
            "/tmp/exports",
            "--ui",
            "plain",
            "status",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();

        assert_eq!(config.exports_file, PathBuf::from("/tmp/exports"));
        assert_eq!(config.template_dir, PathBuf::from("/from/file"));
        assert_eq!(config.ui, crate::config::UiMode::Plain);
    }

    #[test]
    fn test_export_entry_validation() {
        let mut config = Config::default();
        config.export.clients = "10.0.0.0/24".to_string();

        let entry =
            export_entry(&config, Path::new("/srv/templates"), ExportOptions::default()).unwrap();
        assert_eq!(
            entry.to_string(),
            "/srv/templates 10.0.0.0/24(rw,sync,no_subtree_check,no_root_squash)"
        );

        assert!(export_entry(&config, Path::new("srv"), ExportOptions::default()).is_err());
        assert!(export_entry(&config, Path::new("/srv/my vms"), ExportOptions::default()).is_err());
    }
}
