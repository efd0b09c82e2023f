//! Presentation boundary of the workflow.
//!
//! Every prompt returns `Ok(None)` when the operator cancels. I/O failures of
//! the terminal and unreadable template directories are errors.

use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::templates::TemplateStore;

pub trait InteractionPort {
    fn show_message(&mut self, text: &str) -> Result<()>;

    fn prompt_text(&mut self, label: &str) -> Result<Option<String>>;

    /// Returns the index of the selected option.
    fn prompt_choice(&mut self, label: &str, options: &[&str]) -> Result<Option<usize>>;

    fn prompt_file(&mut self, start_dir: &Path) -> Result<Option<PathBuf>>;
}

/// Line-based prompts. A blank answer or end of input cancels.
pub struct LinePort<R, W> {
    input: R,
    output: W,
}

impl LinePort<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> LinePort<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn ask(&mut self, label: &str) -> Result<Option<String>> {
        write!(self.output, "{label}: ")?;
        self.output.flush()?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("Failed to read from terminal")?;
        if read == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }

        let answer = line.trim();
        if answer.is_empty() {
            Ok(None)
        } else {
            Ok(Some(answer.to_string()))
        }
    }
}

impl<R: BufRead, W: Write> InteractionPort for LinePort<R, W> {
    fn show_message(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{text}")?;
        Ok(())
    }

    fn prompt_text(&mut self, label: &str) -> Result<Option<String>> {
        self.ask(label)
    }

    fn prompt_choice(&mut self, label: &str, options: &[&str]) -> Result<Option<usize>> {
        loop {
            for (idx, option) in options.iter().enumerate() {
                writeln!(self.output, "{}) {option}", idx + 1)?;
            }
            let Some(answer) = self.ask(label)? else {
                return Ok(None);
            };
            match answer.parse::<usize>() {
                Ok(choice) if (1..=options.len()).contains(&choice) => {
                    return Ok(Some(choice - 1))
                }
                _ => writeln!(self.output, "Invalid option. Please try again.")?,
            }
        }
    }

    fn prompt_file(&mut self, start_dir: &Path) -> Result<Option<PathBuf>> {
        let files = TemplateStore::new(start_dir).list()?;
        if files.is_empty() {
            writeln!(self.output, "No templates found in {}", start_dir.display())?;
        } else {
            writeln!(self.output, "Templates in {}:", start_dir.display())?;
            for (idx, file) in files.iter().enumerate() {
                writeln!(self.output, "{}) {}", idx + 1, display_relative(start_dir, file))?;
            }
        }

        let Some(answer) = self.ask("Enter path to template file (or its number)")? else {
            return Ok(None);
        };
        let picked = answer
            .parse::<usize>()
            .ok()
            .and_then(|choice| choice.checked_sub(1))
            .and_then(|idx| files.get(idx).cloned());
        Ok(Some(picked.unwrap_or_else(|| PathBuf::from(answer))))
    }
}

/// Full-screen dialog prompts. Esc cancels a selection, an empty answer
/// cancels a text prompt.
pub struct DialogPort {
    theme: ColorfulTheme,
}

impl Default for DialogPort {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogPort {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl InteractionPort for DialogPort {
    fn show_message(&mut self, text: &str) -> Result<()> {
        println!("{text}");
        Ok(())
    }

    fn prompt_text(&mut self, label: &str) -> Result<Option<String>> {
        let answer = Input::<String>::with_theme(&self.theme)
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()
            .context("Failed to read from terminal")?;
        let answer = answer.trim();
        Ok((!answer.is_empty()).then(|| answer.to_string()))
    }

    fn prompt_choice(&mut self, label: &str, options: &[&str]) -> Result<Option<usize>> {
        Select::with_theme(&self.theme)
            .with_prompt(label)
            .items(options)
            .default(0)
            .interact_opt()
            .context("Failed to read from terminal")
    }

    fn prompt_file(&mut self, start_dir: &Path) -> Result<Option<PathBuf>> {
        let files = TemplateStore::new(start_dir).list()?;
        if files.is_empty() {
            self.show_message(&format!("No templates found in {}", start_dir.display()))?;
            return Ok(None);
        }

        let labels: Vec<String> = files
            .iter()
            .map(|file| display_relative(start_dir, file))
            .collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Select template file")
            .items(&labels)
            .default(0)
            .interact_opt()
            .context("Failed to read from terminal")?;
        Ok(selection.map(|idx| files[idx].clone()))
    }
}

fn display_relative(base: &Path, file: &Path) -> String {
    file.strip_prefix(base)
        .unwrap_or(file)
        .display()
        .to_string()
}
