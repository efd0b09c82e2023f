//! Interactive menu loop run once the host is provisioned.
//!
//! ```text
//! MainMenu ──choice──> ConvertAndCreateVM ─┐
//!          ──choice──> DownloadTemplate ───┼──> MainMenu
//!          ──choice──> ManageVMs ──────────┘
//!          ──choice──> Exit (terminal)
//! ```

use anyhow::Result;
use std::fmt;
use std::path::PathBuf;
use url::Url;

use crate::error::WorkflowError;
use crate::port::InteractionPort;
use crate::templates::TemplateStore;
use crate::toolstack::{TemplateFetcher, VirtToolstack, VmAction};

const MAIN_MENU: [(&str, WorkflowStep); 4] = [
    ("Convert and create VM", WorkflowStep::ConvertAndCreateVM),
    ("Download VulnHub template", WorkflowStep::DownloadTemplate),
    ("Manage VMs", WorkflowStep::ManageVMs),
    ("Exit", WorkflowStep::Exit),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    MainMenu,
    ConvertAndCreateVM,
    DownloadTemplate,
    ManageVMs,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    LvmThin,
    Directory,
}

impl StorageKind {
    pub const ALL: [StorageKind; 2] = [StorageKind::LvmThin, StorageKind::Directory];

    pub fn label(self) -> &'static str {
        match self {
            StorageKind::LvmThin => "LVM-Thin",
            StorageKind::Directory => "Directory",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fully validated input for the toolstack. Only ever built once all four
/// answers are in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmCreationRequest {
    pub vm_id: String,
    pub vm_name: String,
    pub template_file_path: PathBuf,
    pub storage_kind: StorageKind,
}

type StepResult<T> = Result<std::result::Result<T, WorkflowError>>;

pub struct WorkflowEngine<'a> {
    port: &'a mut dyn InteractionPort,
    toolstack: &'a dyn VirtToolstack,
    fetcher: &'a dyn TemplateFetcher,
    templates: TemplateStore,
}

impl<'a> WorkflowEngine<'a> {
    pub fn new(
        port: &'a mut dyn InteractionPort,
        toolstack: &'a dyn VirtToolstack,
        fetcher: &'a dyn TemplateFetcher,
        templates: TemplateStore,
    ) -> Self {
        Self {
            port,
            toolstack,
            fetcher,
            templates,
        }
    }

    /// Loop until Exit is chosen. Only terminal I/O failures escape.
    pub fn run(&mut self) -> Result<()> {
        let mut step = WorkflowStep::MainMenu;
        while step != WorkflowStep::Exit {
            step = self.advance(step)?;
        }
        self.port.show_message("Exiting...")?;
        Ok(())
    }

    /// Execute one state and return the next.
    pub fn advance(&mut self, step: WorkflowStep) -> Result<WorkflowStep> {
        let outcome = match step {
            WorkflowStep::MainMenu => return self.main_menu(),
            WorkflowStep::Exit => return Ok(WorkflowStep::Exit),
            WorkflowStep::ConvertAndCreateVM => self.convert_and_create()?,
            WorkflowStep::DownloadTemplate => self.download_template()?,
            WorkflowStep::ManageVMs => self.manage_vms()?,
        };

        match outcome {
            Ok(summary) => self.port.show_message(&summary)?,
            Err(WorkflowError::UserCancelled) => {
                self.port.show_message("Cancelled, returning to the main menu.")?
            }
            Err(err @ WorkflowError::DownstreamActionFailed { .. }) => {
                tracing::debug!(error = %err, "workflow step failed");
                self.port.show_message(&format!("Error: {err}"))?
            }
        }
        Ok(WorkflowStep::MainMenu)
    }

    fn main_menu(&mut self) -> Result<WorkflowStep> {
        let labels = MAIN_MENU.map(|(label, _)| label);
        let choice = self.port.prompt_choice("Please enter your choice", &labels)?;
        Ok(choice
            .map(|idx| MAIN_MENU[idx].1)
            .unwrap_or(WorkflowStep::Exit))
    }

    fn convert_and_create(&mut self) -> StepResult<String> {
        let Some(vm_id) = self.ask_valid("Enter VM ID", validate_vm_id)? else {
            return Ok(Err(WorkflowError::UserCancelled));
        };
        let Some(vm_name) = self.ask_valid("Enter VM name", validate_vm_name)? else {
            return Ok(Err(WorkflowError::UserCancelled));
        };
        let Some(template_file_path) = self.ask_template()? else {
            return Ok(Err(WorkflowError::UserCancelled));
        };
        let storage_labels = StorageKind::ALL.map(StorageKind::label);
        let Some(storage_idx) = self
            .port
            .prompt_choice("Select storage type", &storage_labels)?
        else {
            return Ok(Err(WorkflowError::UserCancelled));
        };

        let request = VmCreationRequest {
            vm_id,
            vm_name,
            template_file_path,
            storage_kind: StorageKind::ALL[storage_idx],
        };
        self.port.show_message(&format!(
            "Converting and creating VM {} with ID {}...",
            request.vm_name, request.vm_id
        ))?;

        Ok(self
            .toolstack
            .create_vm(&request)
            .map_err(|err| WorkflowError::downstream("VM creation", err)))
    }

    fn download_template(&mut self) -> StepResult<String> {
        loop {
            let Some(raw) = self.port.prompt_text("Enter the download link")? else {
                return Ok(Err(WorkflowError::UserCancelled));
            };
            let url = match Url::parse(&raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => url,
                _ => {
                    self.port
                        .show_message(&format!("'{raw}' is not an http(s) URL"))?;
                    continue;
                }
            };

            self.port
                .show_message(&format!("Downloading template from {url}..."))?;
            return Ok(self
                .fetcher
                .fetch(&url, self.templates.dir())
                .map(|path| format!("Template saved to {}", path.display()))
                .map_err(|err| WorkflowError::downstream("Template download", err)));
        }
    }

    fn manage_vms(&mut self) -> StepResult<String> {
        let listing = match self.toolstack.list_vms() {
            Ok(listing) => listing,
            Err(err) => return Ok(Err(WorkflowError::downstream("Listing VMs", err))),
        };
        self.port.show_message(listing.trim_end())?;

        let mut labels: Vec<&str> = VmAction::ALL.iter().map(|action| action.label()).collect();
        labels.push("Back");
        let Some(choice) = self.port.prompt_choice("Select an action", &labels)? else {
            return Ok(Err(WorkflowError::UserCancelled));
        };
        let Some(&action) = VmAction::ALL.get(choice) else {
            return Ok(Ok("Returning to the main menu.".to_string()));
        };
        let Some(vm_id) = self.ask_valid("Enter VM ID", validate_vm_id)? else {
            return Ok(Err(WorkflowError::UserCancelled));
        };

        Ok(self
            .toolstack
            .vm_action(&vm_id, action)
            .map(|()| format!("VM {vm_id}: {action} requested"))
            .map_err(|err| WorkflowError::downstream("VM action", err)))
    }

    /// Ask until the answer validates or the operator cancels.
    fn ask_valid(
        &mut self,
        label: &str,
        validate: fn(&str) -> std::result::Result<(), String>,
    ) -> Result<Option<String>> {
        loop {
            let Some(answer) = self.port.prompt_text(label)? else {
                return Ok(None);
            };
            match validate(&answer) {
                Ok(()) => return Ok(Some(answer)),
                Err(problem) => self.port.show_message(&problem)?,
            }
        }
    }

    fn ask_template(&mut self) -> Result<Option<PathBuf>> {
        loop {
            let Some(candidate) = self.port.prompt_file(self.templates.dir())? else {
                return Ok(None);
            };
            match self.templates.resolve(&candidate) {
                Ok(path) => return Ok(Some(path)),
                Err(err) => self.port.show_message(&format!("{err:#}"))?,
            }
        }
    }
}

fn validate_vm_id(answer: &str) -> std::result::Result<(), String> {
    match answer.parse::<u32>() {
        Ok(id) if id >= 100 && id.to_string() == answer => Ok(()),
        _ => Err(format!("'{answer}' is not a valid VM ID (an integer of 100 or more)")),
    }
}

fn validate_vm_name(answer: &str) -> std::result::Result<(), String> {
    if answer.chars().any(char::is_whitespace) {
        Err("VM name must not contain whitespace".to_string())
    } else {
        Ok(())
    }
}
