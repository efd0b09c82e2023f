use crate::cli::ExportArgs;
use crate::config::Config;
use crate::exports::ExportOptions;
use crate::system::CommandRunner;
use crate::{privilege, ui};
use anyhow::Result;

pub fn execute(config: &Config, runner: &dyn CommandRunner, args: ExportArgs) -> Result<()> {
    let options = ExportOptions {
        read_write: !args.read_only,
        sync: !args.async_writes,
        subtree_check: args.subtree_check,
        root_squash: args.root_squash,
    };
    let entry = super::export_entry(config, &args.path, options)?;

    privilege::ensure_privileged()?;
    let manager = super::export_manager(config, runner);

    if args.no_reload {
        manager.write_entry(&entry)?;
        ui::success("Written", &entry);
        ui::info("Run `vmimport reload` to apply the export table");
    } else {
        manager.ensure_export(&entry)?;
        ui::success("Exported", &entry);
    }
    Ok(())
}
