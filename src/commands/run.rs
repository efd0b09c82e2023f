use crate::config::{Config, UiMode};
use crate::port::{DialogPort, InteractionPort, LinePort};
use crate::system::CommandRunner;
use crate::templates::TemplateStore;
use crate::toolstack::{HttpFetcher, QmToolstack};
use crate::ui;
use crate::workflow::WorkflowEngine;
use anyhow::Result;

pub fn execute(config: &Config, runner: &dyn CommandRunner) -> Result<()> {
    super::provision::provision_host(config, runner)?;
    ui::success("Ready", "NFS configuration is complete. Proceeding to the menu...");

    let toolstack = QmToolstack::new(runner, config.toolstack.clone());
    let fetcher = HttpFetcher::new()?;
    let templates = TemplateStore::new(&config.template_dir);
    let mut port: Box<dyn InteractionPort> = match config.ui {
        UiMode::Plain => Box::new(LinePort::stdio()),
        UiMode::Dialog => Box::new(DialogPort::new()),
    };

    WorkflowEngine::new(port.as_mut(), &toolstack, &fetcher, templates).run()
}
