use crate::config::Config;
use crate::exports::ExportEntry;
use crate::privilege;
use crate::system::CommandRunner;
use crate::templates::TemplateStore;
use crate::ui::{self, Progress};
use anyhow::Result;

pub fn execute(config: &Config, runner: &dyn CommandRunner) -> Result<()> {
    provision_host(config, runner)?;
    ui::success("Provisioned", "NFS configuration is complete");
    Ok(())
}

/// Validate, check privilege, then install, start, template directory,
/// export. Every step must succeed before the next one runs.
pub(super) fn provision_host(config: &Config, runner: &dyn CommandRunner) -> Result<()> {
    let entry = super::export_entry(config, &config.template_dir, config.export.options)?;
    privilege::ensure_privileged()?;
    apply(config, runner, &entry)
}

/// The mutating half of provisioning. Failures from here on are
/// `ProvisionError`s so the exit code reports partial changes.
fn apply(config: &Config, runner: &dyn CommandRunner, entry: &ExportEntry) -> Result<()> {
    let provisioner = super::provisioner(config, runner);
    let installed = Progress::run("Checking", "NFS server utilities", "Ready", || {
        provisioner.ensure_installed()
    })?;
    if installed {
        ui::info(format!("Installed NFS server for {} host", provisioner.os_family()));
    }

    Progress::run(
        "Starting",
        format!("{} (start + enable)", provisioner.service_unit()),
        "Running",
        || provisioner.ensure_running(),
    )?;

    TemplateStore::new(&config.template_dir).ensure_dir()?;

    let manager = super::export_manager(config, runner);
    Progress::run(
        "Exporting",
        format!("{} in {}", entry, manager.exports_file().display()),
        "Exported",
        || manager.ensure_export(entry),
    )?;
    Ok(())
}
