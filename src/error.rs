use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for failures that happened before any system change was made.
pub const EXIT_NO_CHANGES: u8 = 1;
/// Exit code for failures that may have left the host partially provisioned.
pub const EXIT_PARTIAL_CHANGES: u8 = 2;

/// Fatal provisioning failures.
///
/// Any of these aborts the whole process: the workflow menu is never offered
/// against a host whose export is not live.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("vmimport must be run as root (currently running as '{user}'); re-run with sudo")]
    InsufficientPrivilege { user: String },

    #[error("unsupported operating system; please install the NFS server utilities manually")]
    UnsupportedPlatform,

    #[error("package installation failed: `{command}` {status}")]
    InstallationFailed { command: String, status: String },

    #[error("failed to start NFS server: `{command}` {status}")]
    ServiceStartFailed { command: String, status: String },

    #[error("failed to prepare template directory {path:?}")]
    TemplateDirFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to update export table {path:?}")]
    ExportWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "failed to reload NFS exports: `{command}` {status}; the export file is already \
         up to date, run `vmimport reload` to retry"
    )]
    ExportReloadFailed { command: String, status: String },
}

impl ProvisionError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            ProvisionError::InsufficientPrivilege { .. } | ProvisionError::UnsupportedPlatform => {
                EXIT_NO_CHANGES
            }
            ProvisionError::InstallationFailed { .. }
            | ProvisionError::ServiceStartFailed { .. }
            | ProvisionError::TemplateDirFailed { .. }
            | ProvisionError::ExportWriteFailed { .. }
            | ProvisionError::ExportReloadFailed { .. } => EXIT_PARTIAL_CHANGES,
        }
    }
}

/// Outcomes of a workflow step that return control to the main menu.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("cancelled")]
    UserCancelled,

    #[error("{action} failed: {message}")]
    DownstreamActionFailed {
        action: &'static str,
        message: String,
    },
}

impl WorkflowError {
    pub fn downstream(action: &'static str, err: anyhow::Error) -> Self {
        WorkflowError::DownstreamActionFailed {
            action,
            message: format!("{err:#}"),
        }
    }
}

/// Map an error reaching the top-level handler to a process exit code.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ProvisionError>())
        .map(ProvisionError::exit_code)
        .unwrap_or(EXIT_NO_CHANGES)
}

/// Render an exit status the way it appears in error messages.
pub(crate) fn describe_status(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}
