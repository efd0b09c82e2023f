use crate::config::Config;
use crate::system::CommandRunner;
use crate::templates::TemplateStore;
use crate::ui;
use anyhow::{Context, Result};

pub fn execute(config: &Config, runner: &dyn CommandRunner) -> Result<()> {
    let provisioner = super::provisioner(config, runner);
    let capability = provisioner.capability();
    let yes_no = |value: bool| if value { "yes" } else { "no" };

    ui::info(format!("OS family: {}", capability.os_family));
    ui::info(format!("Service unit: {}", provisioner.service_unit()));
    ui::info(format!(
        "NFS server installed: {}",
        yes_no(capability.service_installed)
    ));
    ui::info(format!(
        "NFS server running: {}",
        yes_no(capability.service_running)
    ));

    let templates = TemplateStore::new(&config.template_dir);
    let entry = super::export_entry(config, templates.dir(), config.export.options)?;
    let manager = super::export_manager(config, runner);
    let exported = manager
        .has_export(&entry)
        .with_context(|| format!("Failed to read {:?}", manager.exports_file()))?;

    if exported {
        ui::success("Exported", &entry);
    } else {
        ui::warn(format!(
            "{} has no entry `{}`",
            manager.exports_file().display(),
            entry
        ));
    }

    if templates.dir().exists() {
        ui::info(format!(
            "Templates in {}: {}",
            templates.dir().display(),
            templates.list()?.len()
        ));
    } else {
        ui::info(format!(
            "Template directory {} does not exist yet",
            templates.dir().display()
        ));
    }
    Ok(())
}
