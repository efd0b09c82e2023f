use crate::error::ProvisionError;
use anyhow::{bail, Context, Result};
use std::fs::{self, File, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tar::Archive;
use walkdir::WalkDir;

/// rwxrwxr-x
const TEMPLATE_DIR_MODE: u32 = 0o775;

/// The directory holding imported VM templates, shared over NFS.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if needed and reset its mode.
    pub fn ensure_dir(&self) -> Result<(), ProvisionError> {
        let failed = |source| ProvisionError::TemplateDirFailed {
            path: self.dir.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(failed)?;
        fs::set_permissions(&self.dir, Permissions::from_mode(TEMPLATE_DIR_MODE))
            .map_err(failed)?;
        tracing::debug!(dir = ?self.dir, "template directory ready");
        Ok(())
    }

    /// All OVF descriptors below the directory, sorted by path. Disk images
    /// and other payload files are skipped.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).follow_links(false) {
            let entry =
                entry.with_context(|| format!("Failed to scan template directory {:?}", self.dir))?;
            if entry.file_type().is_file() && is_descriptor(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Resolve an operator-supplied path to an existing OVF descriptor inside
    /// the directory. Relative paths are taken relative to the directory.
    pub fn resolve(&self, candidate: &Path) -> Result<PathBuf> {
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.dir.join(candidate)
        };

        let resolved = joined
            .canonicalize()
            .with_context(|| format!("Template file {:?} does not exist", joined))?;
        let root = self
            .dir
            .canonicalize()
            .with_context(|| format!("Template directory {:?} does not exist", self.dir))?;

        if !resolved.starts_with(&root) {
            bail!("{:?} is outside the template directory {:?}", resolved, root);
        }
        if !resolved.is_file() {
            bail!("{:?} is not a file", resolved);
        }
        if !is_descriptor(&resolved) {
            bail!("{:?} is not an .ovf descriptor", resolved);
        }
        Ok(resolved)
    }
}

fn is_descriptor(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("ovf"))
}

/// Unpack an OVA archive into `dest` and return the OVF descriptor it
/// carries. `dest` is replaced as a whole; a failed unpack leaves nothing
/// behind.
pub fn unpack_ova(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let parent = dest
        .parent()
        .with_context(|| format!("{:?} has no parent directory", dest))?;
    let staging = tempfile::Builder::new()
        .prefix(".unpack-")
        .tempdir_in(parent)
        .with_context(|| format!("Failed to create staging directory in {:?}", parent))?;

    let file = File::open(archive)
        .with_context(|| format!("Failed to open OVA archive {:?}", archive))?;
    Archive::new(file)
        .unpack(staging.path())
        .with_context(|| format!("Failed to unpack OVA archive {:?}", archive))?;

    let descriptor = TemplateStore::new(staging.path())
        .list()?
        .into_iter()
        .next()
        .with_context(|| format!("OVA archive {:?} contains no .ovf descriptor", archive))?;
    let relative = descriptor.strip_prefix(staging.path())?.to_path_buf();

    if dest.exists() {
        fs::remove_dir_all(dest)
            .with_context(|| format!("Failed to replace previous template {:?}", dest))?;
    }
    fs::rename(staging.path(), dest)
        .with_context(|| format!("Failed to move unpacked template to {:?}", dest))?;
    tracing::debug!(archive = ?archive, dest = ?dest, "unpacked OVA");
    Ok(dest.join(relative))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::fs::File;
    use std::path::Path;

    /// Write a tar archive holding `entries` as (name, contents) pairs.
    pub fn write_ova(path: &Path, entries: &[(&str, &str)]) {
        let mut builder = tar::Builder::new(File::create(path).unwrap());
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .unwrap();
        }
        builder.finish().unwrap();
    }
}
