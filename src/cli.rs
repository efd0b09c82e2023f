use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{UiMode, DEFAULT_CONFIG_PATH};

/// VM import host tool
///
/// Prepares a virtualization host to receive VM templates over NFS, then
/// walks the operator through downloading templates, converting them into
/// VMs and managing existing VMs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file
    #[arg(long, global = true, value_name = "FILE", env = "VMIMPORT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// NFS export table to manage (overrides the config file)
    #[arg(long, global = true, value_name = "FILE")]
    pub exports_file: Option<PathBuf>,

    /// Template storage directory (overrides the config file)
    #[arg(long, global = true, value_name = "DIR")]
    pub template_dir: Option<PathBuf>,

    /// Prompt style (overrides the config file)
    #[arg(long, global = true, value_enum)]
    pub ui: Option<UiMode>,

    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision the host, then open the interactive menu
    Run,

    /// Install, start and export the NFS server without opening the menu
    Provision,

    /// Ensure a single export entry for a directory
    Export(ExportArgs),

    /// Re-read the export table and restart the NFS server
    ///
    /// Use this to recover after a failed reload: the export file is already
    /// correct at that point.
    Reload,

    /// Show what the host currently provides (no changes are made)
    Status,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Directory to export
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Export read-only instead of read-write
    #[arg(long)]
    pub read_only: bool,

    /// Reply before changes are committed to stable storage
    #[arg(long = "async")]
    pub async_writes: bool,

    /// Enable subtree checking
    #[arg(long)]
    pub subtree_check: bool,

    /// Map requests from remote root to the anonymous user
    #[arg(long)]
    pub root_squash: bool,

    /// Only write the export table, do not reload the server
    #[arg(long)]
    pub no_reload: bool,
}
