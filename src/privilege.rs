use nix::unistd::{geteuid, Uid};

use crate::error::ProvisionError;

/// Refuse to continue unless the effective user is root.
///
/// Must run before anything touches the filesystem or the service manager.
pub fn ensure_privileged() -> Result<(), ProvisionError> {
    check_uid(geteuid())
}

fn check_uid(uid: Uid) -> Result<(), ProvisionError> {
    if uid.is_root() {
        tracing::debug!("running with root privileges");
        return Ok(());
    }

    Err(ProvisionError::InsufficientPrivilege {
        user: whoami::username(),
    })
}
