use crate::config::Config;
use crate::privilege;
use crate::system::CommandRunner;
use crate::ui::Progress;
use anyhow::Result;

pub fn execute(config: &Config, runner: &dyn CommandRunner) -> Result<()> {
    privilege::ensure_privileged()?;

    let manager = super::export_manager(config, runner);
    Progress::run(
        "Reloading",
        format!("exports from {}", manager.exports_file().display()),
        "Reloaded",
        || manager.reload(),
    )?;
    Ok(())
}
