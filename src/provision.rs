use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{describe_status, ProvisionError};
use crate::system::{CommandRunner, Invocation};

/// Binary whose presence means the NFS server utilities are installed.
pub(crate) const CONTROL_BINARY: &str = "exportfs";
const FALLBACK_UNIT: &str = "nfs-kernel-server";

/// Host operating system family, detected from marker files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Debian,
    RedHat,
    Unknown,
}

impl OsFamily {
    /// Probe marker files below `root` (normally `/`).
    pub fn detect(root: &Path) -> Self {
        if root.join("etc/debian_version").exists() {
            OsFamily::Debian
        } else if root.join("etc/redhat-release").exists() {
            OsFamily::RedHat
        } else {
            OsFamily::Unknown
        }
    }

    /// Package refresh followed by package install, or `None` when unsupported.
    pub fn install_plan(self) -> Option<[Invocation; 2]> {
        match self {
            OsFamily::Debian => Some([
                Invocation::new("apt-get", ["update"]),
                Invocation::new("apt-get", ["install", "-y", "nfs-kernel-server"]),
            ]),
            OsFamily::RedHat => Some([
                Invocation::new("yum", ["makecache"]),
                Invocation::new("yum", ["install", "-y", "nfs-utils"]),
            ]),
            OsFamily::Unknown => None,
        }
    }

    pub fn service_unit(self) -> Option<&'static str> {
        match self {
            OsFamily::Debian => Some("nfs-kernel-server"),
            OsFamily::RedHat => Some("nfs-server"),
            OsFamily::Unknown => None,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OsFamily::Debian => "debian",
            OsFamily::RedHat => "redhat",
            OsFamily::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// What the host currently provides. Derived on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapability {
    pub service_installed: bool,
    pub service_running: bool,
    pub os_family: OsFamily,
}

/// Installs, starts and enables the NFS server.
pub struct ServiceProvisioner<'a> {
    runner: &'a dyn CommandRunner,
    root: PathBuf,
    unit_override: Option<String>,
}

impl<'a> ServiceProvisioner<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            root: PathBuf::from("/"),
            unit_override: None,
        }
    }

    /// Resolve OS marker files below `root` instead of `/`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_unit(mut self, unit: Option<String>) -> Self {
        self.unit_override = unit;
        self
    }

    pub fn os_family(&self) -> OsFamily {
        OsFamily::detect(&self.root)
    }

    /// Systemd unit of the NFS server on this host.
    pub fn service_unit(&self) -> String {
        self.unit_override
            .clone()
            .or_else(|| self.os_family().service_unit().map(str::to_string))
            .unwrap_or_else(|| FALLBACK_UNIT.to_string())
    }

    pub fn is_installed(&self) -> bool {
        self.runner.find_program(CONTROL_BINARY).is_some()
    }

    pub fn capability(&self) -> HostCapability {
        let unit = self.service_unit();
        let service_running = self
            .runner
            .capture(&Invocation::new("systemctl", ["is-active", "--quiet", unit.as_str()]))
            .map(|output| output.success())
            .unwrap_or(false);

        HostCapability {
            service_installed: self.is_installed(),
            service_running,
            os_family: self.os_family(),
        }
    }

    /// Install the NFS server package unless its control binary is present.
    ///
    /// Returns whether an installation took place.
    pub fn ensure_installed(&self) -> Result<bool, ProvisionError> {
        if self.is_installed() {
            tracing::info!("NFS utilities are already installed");
            return Ok(false);
        }

        let family = self.os_family();
        let plan = family
            .install_plan()
            .ok_or(ProvisionError::UnsupportedPlatform)?;
        tracing::info!(%family, "installing NFS utilities");

        for invocation in &plan {
            run_checked(self.runner, invocation, |command, status| {
                ProvisionError::InstallationFailed { command, status }
            })?;
        }
        Ok(true)
    }

    /// Start the server now and on every boot. Both are no-ops when already done.
    pub fn ensure_running(&self) -> Result<(), ProvisionError> {
        let unit = self.service_unit();
        for action in ["start", "enable"] {
            let invocation = Invocation::new("systemctl", [action, unit.as_str()]);
            run_checked(self.runner, &invocation, |command, status| {
                ProvisionError::ServiceStartFailed { command, status }
            })?;
        }
        tracing::info!(%unit, "NFS server started and enabled");
        Ok(())
    }
}

fn run_checked<F>(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
    fail: F,
) -> Result<(), ProvisionError>
where
    F: Fn(String, String) -> ProvisionError,
{
    let output = runner
        .run(invocation)
        .map_err(|err| fail(invocation.to_string(), format!("could not be started: {err}")))?;
    if output.success() {
        Ok(())
    } else {
        Err(fail(invocation.to_string(), describe_status(output.code)))
    }
}
