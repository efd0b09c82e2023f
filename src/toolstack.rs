//! External collaborators of the workflow: the virtualization toolstack that
//! converts templates and manages VMs, and the HTTP fetcher for templates.

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use url::Url;

use crate::config::ToolstackConfig;
use crate::system::{CommandOutput, CommandRunner, Invocation};
use crate::templates;
use crate::workflow::{StorageKind, VmCreationRequest};

const DEFAULT_USER_AGENT: &str = concat!("vmimport/", env!("CARGO_PKG_VERSION"));

/// Lifecycle actions offered for an existing VM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmAction {
    Start,
    Shutdown,
    Stop,
}

impl VmAction {
    pub const ALL: [VmAction; 3] = [VmAction::Start, VmAction::Shutdown, VmAction::Stop];

    fn command(self) -> &'static str {
        match self {
            VmAction::Start => "start",
            VmAction::Shutdown => "shutdown",
            VmAction::Stop => "stop",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VmAction::Start => "Start VM",
            VmAction::Shutdown => "Shut down VM",
            VmAction::Stop => "Stop VM (force)",
        }
    }
}

impl fmt::Display for VmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

pub trait VirtToolstack {
    /// Convert the template and register the VM. Returns a summary for the operator.
    fn create_vm(&self, request: &VmCreationRequest) -> Result<String>;

    fn list_vms(&self) -> Result<String>;

    fn vm_action(&self, vm_id: &str, action: VmAction) -> Result<()>;
}

/// Proxmox `qm` command-line toolstack
pub struct QmToolstack<'a> {
    runner: &'a dyn CommandRunner,
    config: ToolstackConfig,
}

impl<'a> QmToolstack<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: ToolstackConfig) -> Self {
        Self { runner, config }
    }

    fn storage_for(&self, kind: StorageKind) -> &str {
        match kind {
            StorageKind::LvmThin => &self.config.lvm_thin_storage,
            StorageKind::Directory => &self.config.directory_storage,
        }
    }

    fn qm<I, S>(&self, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = Invocation::new(&self.config.program, args);
        let output = self
            .runner
            .capture(&invocation)
            .with_context(|| format!("Failed to run `{invocation}`"))?;
        if !output.success() {
            let detail = output.stderr.trim();
            bail!(
                "`{invocation}` {}{}",
                crate::error::describe_status(output.code),
                if detail.is_empty() {
                    String::new()
                } else {
                    format!(": {detail}")
                }
            );
        }
        Ok(output)
    }
}

impl VirtToolstack for QmToolstack<'_> {
    fn create_vm(&self, request: &VmCreationRequest) -> Result<String> {
        let template = request.template_file_path.to_string_lossy().into_owned();
        let storage = self.storage_for(request.storage_kind).to_string();
        self.qm([
            "importovf".to_string(),
            request.vm_id.clone(),
            template,
            storage.clone(),
        ])?;
        self.qm([
            "set".to_string(),
            request.vm_id.clone(),
            "--name".to_string(),
            request.vm_name.clone(),
        ])?;
        tracing::info!(vm_id = %request.vm_id, %storage, "VM imported");
        Ok(format!(
            "Created VM {} ({}) on storage '{storage}'",
            request.vm_name, request.vm_id
        ))
    }

    fn list_vms(&self) -> Result<String> {
        Ok(self.qm(["list"])?.stdout)
    }

    fn vm_action(&self, vm_id: &str, action: VmAction) -> Result<()> {
        self.qm([action.command(), vm_id])?;
        Ok(())
    }
}

pub trait TemplateFetcher {
    /// Download `url` into `dest_dir`, returning the file to import.
    fn fetch(&self, url: &Url, dest_dir: &Path) -> Result<PathBuf>;
}

/// Blocking HTTP(S) downloader
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }
}

impl TemplateFetcher for HttpFetcher {
    fn fetch(&self, url: &Url, dest_dir: &Path) -> Result<PathBuf> {
        let file_name = file_name_from_url(url)?;

        let mut response = self
            .http
            .get(url.clone())
            .header(USER_AGENT, DEFAULT_USER_AGENT)
            .send()
            .with_context(|| format!("Failed to download template from {url}"))?;

        if !response.status().is_success() {
            bail!("Template download returned {}", response.status());
        }

        let stored = store_template(&mut response, &file_name, dest_dir)?;
        tracing::info!(%url, dest = ?stored, "template downloaded");
        Ok(stored)
    }
}

/// Stream a template into `dest_dir` through a temporary file in the same
/// directory. Nothing appears under the final name unless the whole stream
/// was written. An `.ova` archive is unpacked into a directory named after
/// it and the contained descriptor is returned instead.
pub fn store_template(
    reader: &mut impl Read,
    file_name: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let mut temp = NamedTempFile::new_in(dest_dir)
        .with_context(|| format!("Failed to create temporary file in {:?}", dest_dir))?;
    let written = io::copy(reader, &mut temp)
        .with_context(|| format!("Failed while writing {file_name} to {:?}", dest_dir))?;
    temp.flush()
        .with_context(|| format!("Failed to flush {file_name} to {:?}", dest_dir))?;
    tracing::debug!(file = file_name, bytes = written, "template stream stored");

    let dest = dest_dir.join(file_name);
    if is_ova(&dest) {
        return templates::unpack_ova(temp.path(), &dest.with_extension(""));
    }

    temp.persist(&dest)
        .with_context(|| format!("Failed to move template into place at {:?}", dest))?;
    Ok(dest)
}

fn is_ova(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("ova"))
}

/// Last non-empty path segment of the URL, used as the stored file name.
pub fn file_name_from_url(url: &Url) -> Result<String> {
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|segment| !segment.is_empty()))
        .filter(|segment| *segment != "." && *segment != "..")
        .with_context(|| format!("Cannot derive a file name from {url}"))?;
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::testing::RecordingRunner;
    use crate::templates::testing::write_ova;
    use rstest::rstest;
    use tempfile::TempDir;

    fn request() -> VmCreationRequest {
        VmCreationRequest {
            vm_id: "120".to_string(),
            vm_name: "metasploitable".to_string(),
            template_file_path: PathBuf::from("/srv/templates/ms.ovf"),
            storage_kind: StorageKind::LvmThin,
        }
    }

    #[test]
    fn test_create_vm_imports_then_names() {
        let runner = RecordingRunner::new();
        let toolstack = QmToolstack::new(&runner, ToolstackConfig::default());

        let summary = toolstack.create_vm(&request()).unwrap();

        assert_eq!(
            runner.calls(),
            [
                "qm importovf 120 /srv/templates/ms.ovf local-lvm",
                "qm set 120 --name metasploitable",
            ]
        );
        assert!(summary.contains("local-lvm"));
    }

    #[test]
    fn test_create_vm_uses_directory_storage() {
        let runner = RecordingRunner::new();
        let toolstack = QmToolstack::new(&runner, ToolstackConfig::default());
        let mut request = request();
        request.storage_kind = StorageKind::Directory;

        toolstack.create_vm(&request).unwrap();
        assert_eq!(runner.calls()[0], "qm importovf 120 /srv/templates/ms.ovf local");
    }

    #[test]
    fn test_failed_import_skips_rename() {
        let runner = RecordingRunner::new()
            .failing("qm importovf 120 /srv/templates/ms.ovf local-lvm", 2);
        let toolstack = QmToolstack::new(&runner, ToolstackConfig::default());

        let err = toolstack.create_vm(&request()).unwrap_err();
        assert!(err.to_string().contains("exited with status 2"));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_list_and_actions() {
        let runner = RecordingRunner::new().with_output("qm list", "VMID NAME\n120 ms\n");
        let toolstack = QmToolstack::new(&runner, ToolstackConfig::default());

        assert!(toolstack.list_vms().unwrap().contains("120 ms"));
        toolstack.vm_action("120", VmAction::Shutdown).unwrap();
        assert_eq!(runner.calls(), ["qm list", "qm shutdown 120"]);
    }

    #[rstest]
    #[case("https://download.vulnhub.com/kioptrix/Kioptrix_Level_1.ova", Some("Kioptrix_Level_1.ova"))]
    #[case("https://example.com/files/vm.ovf/", Some("vm.ovf"))]
    #[case("https://example.com/", None)]
    fn test_file_name_from_url(#[case] raw: &str, #[case] expected: Option<&str>) {
        let url = Url::parse(raw).unwrap();
        assert_eq!(file_name_from_url(&url).ok().as_deref(), expected);
    }

    /// Yields some bytes, then fails like a dropped connection.
    struct BrokenStream {
        sent: bool,
    }

    impl Read for BrokenStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
            }
            self.sent = true;
            let chunk = b"partial template";
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_interrupted_download_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let mut stream = BrokenStream { sent: false };

        let err = store_template(&mut stream, "vm.ovf", temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("connection reset"));
        assert!(entries(temp.path()).is_empty());
    }

    #[test]
    fn test_store_template_keeps_plain_files() {
        let temp = TempDir::new().unwrap();

        let stored = store_template(&mut &b"<Envelope/>"[..], "vm.ovf", temp.path()).unwrap();
        let disk = store_template(&mut &b"disk"[..], "vm.vmdk", temp.path()).unwrap();

        assert_eq!(stored, temp.path().join("vm.ovf"));
        assert_eq!(std::fs::read_to_string(&stored).unwrap(), "<Envelope/>");
        assert_eq!(disk, temp.path().join("vm.vmdk"));
        assert_eq!(entries(temp.path()), ["vm.ovf", "vm.vmdk"]);
    }

    #[test]
    fn test_store_template_unpacks_ova() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("source.ova");
        write_ova(&archive, &[("vm.ovf", "<Envelope/>"), ("vm-disk1.vmdk", "disk")]);

        let dest = temp.path().join("templates");
        std::fs::create_dir(&dest).unwrap();
        let mut reader = std::fs::File::open(&archive).unwrap();
        let descriptor = store_template(&mut reader, "Kioptrix_Level_1.ova", &dest).unwrap();

        assert_eq!(descriptor, dest.join("Kioptrix_Level_1/vm.ovf"));
        assert_eq!(entries(&dest), ["Kioptrix_Level_1"]);
        assert_eq!(entries(&dest.join("Kioptrix_Level_1")), ["vm-disk1.vmdk", "vm.ovf"]);
    }
}
