//! Ownership of the NFS export table.
//!
//! Every mutation is a locked, full read-modify-write: the file is read into
//! lines, every line exporting the target path is dropped, the managed entry
//! is appended and the result replaces the original through a temp file in the
//! same directory. Re-running with the same or updated options converges to
//! exactly one line per path.

use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{describe_status, ProvisionError};
use crate::system::{CommandRunner, Invocation};

const NEW_FILE_MODE: u32 = 0o644;

/// Option flags of a single export, rendered in `exports(5)` syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub read_write: bool,
    pub sync: bool,
    pub subtree_check: bool,
    pub root_squash: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            read_write: true,
            sync: true,
            subtree_check: false,
            root_squash: false,
        }
    }
}

impl fmt::Display for ExportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            if self.read_write { "rw" } else { "ro" },
            if self.sync { "sync" } else { "async" },
            if self.subtree_check {
                "subtree_check"
            } else {
                "no_subtree_check"
            },
            if self.root_squash {
                "root_squash"
            } else {
                "no_root_squash"
            },
        ];
        write!(f, "{}", flags.join(","))
    }
}

/// One managed line of the export table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub path: String,
    pub clients: String,
    pub options: ExportOptions,
}

impl ExportEntry {
    pub fn new(path: impl Into<String>, options: ExportOptions) -> Self {
        Self {
            path: path.into(),
            clients: "*".to_string(),
            options,
        }
    }

    pub fn with_clients(mut self, clients: impl Into<String>) -> Self {
        self.clients = clients.into();
        self
    }

    /// Whether `line` exports the same path as this entry.
    pub fn matches(&self, line: &str) -> bool {
        exported_path(line) == Some(self.path.as_str())
    }
}

impl fmt::Display for ExportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}({})", self.path, self.clients, self.options)
    }
}

/// First field of an export line; comments and blank lines export nothing.
fn exported_path(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    trimmed.split_whitespace().next()
}

/// The export table as an ordered sequence of raw lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFile {
    lines: Vec<String>,
}

impl ExportFile {
    /// Split on `\n` only. A `\r` stays part of its line so untouched lines
    /// are written back byte for byte.
    pub fn parse(contents: &str) -> Self {
        Self {
            lines: contents
                .split_inclusive('\n')
                .map(|line| line.strip_suffix('\n').unwrap_or(line).to_string())
                .collect(),
        }
    }

    /// Read the table; a missing file is an empty table.
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contains(&self, entry: &ExportEntry) -> bool {
        let wanted = entry.to_string();
        self.lines
            .iter()
            .any(|line| line.strip_suffix('\r').unwrap_or(line) == wanted)
    }

    /// Replace every line exporting `entry.path` with a single fresh line.
    pub fn upsert(&mut self, entry: &ExportEntry) {
        self.lines.retain(|line| !entry.matches(line));
        self.lines.push(entry.to_string());
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// A rewritten export table sitting in a temp file next to its target.
///
/// Dropping it without calling [`StagedExport::commit`] deletes the temp file
/// and leaves the target untouched.
#[derive(Debug)]
pub struct StagedExport {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedExport {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Atomically replace the target with the staged contents.
    pub fn commit(self) -> Result<(), ProvisionError> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|err| ProvisionError::ExportWriteFailed {
                path: target.clone(),
                source: err.error,
            })?;
        Ok(())
    }
}

/// Sole owner of reads and writes to the export table.
pub struct ExportConfigManager<'a> {
    exports_file: PathBuf,
    service_unit: String,
    runner: &'a dyn CommandRunner,
}

impl<'a> ExportConfigManager<'a> {
    pub fn new(
        exports_file: impl Into<PathBuf>,
        service_unit: impl Into<String>,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            exports_file: exports_file.into(),
            service_unit: service_unit.into(),
            runner,
        }
    }

    pub fn exports_file(&self) -> &Path {
        &self.exports_file
    }

    /// Ensure exactly one export line for `entry.path` with `entry`'s options,
    /// then make the running server pick it up.
    pub fn ensure_export(&self, entry: &ExportEntry) -> Result<(), ProvisionError> {
        self.write_entry(entry)?;
        self.reload()
    }

    /// Steps up to and including the on-disk replacement, without reloading.
    pub fn write_entry(&self, entry: &ExportEntry) -> Result<(), ProvisionError> {
        let _lock = self.lock()?;
        let staged = self.stage(entry)?;
        staged.commit()?;
        tracing::info!(path = %entry.path, file = ?self.exports_file, "export entry written");
        Ok(())
    }

    /// Build the rewritten table in a temp file without touching the target.
    pub fn stage(&self, entry: &ExportEntry) -> Result<StagedExport, ProvisionError> {
        let write_failed = |source: io::Error| ProvisionError::ExportWriteFailed {
            path: self.exports_file.clone(),
            source,
        };

        let mut table = ExportFile::load(&self.exports_file).map_err(write_failed)?;
        table.upsert(entry);

        let permissions = match fs::metadata(&self.exports_file) {
            Ok(meta) => meta.permissions(),
            Err(_) => Permissions::from_mode(NEW_FILE_MODE),
        };

        let mut temp = NamedTempFile::new_in(self.parent_dir()).map_err(write_failed)?;
        temp.write_all(table.render().as_bytes())
            .map_err(write_failed)?;
        temp.as_file().sync_all().map_err(write_failed)?;
        fs::set_permissions(temp.path(), permissions).map_err(write_failed)?;

        Ok(StagedExport {
            temp,
            target: self.exports_file.clone(),
        })
    }

    /// Whether the table currently holds exactly this entry.
    pub fn has_export(&self, entry: &ExportEntry) -> io::Result<bool> {
        Ok(ExportFile::load(&self.exports_file)?.contains(entry))
    }

    /// Re-read the export table into the kernel, then restart the server so
    /// the daemon and the on-disk table agree.
    pub fn reload(&self) -> Result<(), ProvisionError> {
        let steps = [
            Invocation::new("exportfs", ["-ra"]),
            Invocation::new("systemctl", ["restart", self.service_unit.as_str()]),
        ];
        for invocation in &steps {
            let reload_failed = |status: String| ProvisionError::ExportReloadFailed {
                command: invocation.to_string(),
                status,
            };
            let output = self
                .runner
                .run(invocation)
                .map_err(|err| reload_failed(format!("could not be started: {err}")))?;
            if !output.success() {
                return Err(reload_failed(describe_status(output.code)));
            }
        }
        tracing::info!(unit = %self.service_unit, "exports reloaded");
        Ok(())
    }

    fn parent_dir(&self) -> &Path {
        match self.exports_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .exports_file
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.exports_file.with_file_name(name)
    }

    /// Advisory lock serializing concurrent runs against the same table.
    fn lock(&self) -> Result<Flock<File>, ProvisionError> {
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| ProvisionError::ExportWriteFailed {
                path: lock_path.clone(),
                source,
            })?;
        tracing::debug!(?lock_path, "waiting for export table lock");
        Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            ProvisionError::ExportWriteFailed {
                path: lock_path,
                source: io::Error::from(errno),
            }
        })
    }
}
