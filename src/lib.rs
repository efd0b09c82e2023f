// Public API
pub mod cli;
pub mod commands;
pub mod error;

// Host provisioning
pub mod config;
pub mod exports;
pub mod privilege;
pub mod provision;
pub mod system;
pub mod templates;

// Interactive workflow
pub mod port;
pub mod toolstack;
pub mod workflow;

pub mod ui;

// Re-export main types
pub use config::{Config, UiMode};
pub use error::{ProvisionError, WorkflowError};
pub use exports::{ExportConfigManager, ExportEntry, ExportFile, ExportOptions, StagedExport};
pub use port::{DialogPort, InteractionPort, LinePort};
pub use provision::{HostCapability, OsFamily, ServiceProvisioner};
pub use system::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use templates::TemplateStore;
pub use toolstack::{HttpFetcher, QmToolstack, TemplateFetcher, VirtToolstack, VmAction};
pub use workflow::{StorageKind, VmCreationRequest, WorkflowEngine, WorkflowStep};
